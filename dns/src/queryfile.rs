//! Loading, saving, and upgrading whole files of queries.

use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::ops::Index;
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use log::*;

use crate::opt::Opt;
use crate::types::{TypeError, TypeTable};
use crate::wire::{build_query, WireError};


/// The most bytes a record is allowed to hold: the biggest DNS message a
/// UDP datagram over IPv4 can carry once the IP and UDP headers have
/// taken their 28 bytes. The raw file format could frame up to 65535,
/// but a record that long could never be sent.
const MAX_RECORD_LEN: usize = 65507;

/// The size of the fixed DNS message header.
const HEADER_LEN: usize = 12;

/// The offset of the big-endian ARCOUNT field within the header.
const ARCOUNT_OFFSET: usize = 10;


/// One complete DNS query message, kept as raw wire bytes so it can be
/// dropped into an outgoing packet without further work.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct QueryRecord {
    bytes: Vec<u8>,
}

impl QueryRecord {

    fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The record’s bytes, exactly as they should appear on the wire.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The number of bytes in this record.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Increments the big-endian ARCOUNT field in the message header.
    fn bump_arcount(&mut self) {
        let arcount = u16::from_be_bytes([
            self.bytes[ARCOUNT_OFFSET],
            self.bytes[ARCOUNT_OFFSET + 1],
        ]).wrapping_add(1);

        let [hi, lo] = arcount.to_be_bytes();
        self.bytes[ARCOUNT_OFFSET] = hi;
        self.bytes[ARCOUNT_OFFSET + 1] = lo;
    }
}


/// An ordered corpus of query records, loaded from a dnsperf-style text
/// file or from the compact raw format, and indexed during sending.
#[derive(PartialEq, Eq, Debug, Clone, Default)]
pub struct QueryFile {
    records: Vec<QueryRecord>,
}

impl QueryFile {

    /// Creates a new, empty corpus.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of records in the corpus.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the corpus holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Loads a text file of whitespace-separated `name type` pairs,
    /// compiling each pair into a query record. On success the new records
    /// replace any previous contents; on failure the corpus is untouched.
    ///
    /// The scanner consumes two tokens at a time without regard for line
    /// boundaries, so the count in a reported error is the ordinal of the
    /// failing pair rather than a source line number. This matches what
    /// dnsperf-format consumers have always done with these files.
    pub fn read_txt(&mut self, path: impl AsRef<Path>) -> Result<(), QueryFileError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| QueryFileError::Io { action: "opening query file", source: e })?;

        let list = Self::compile_pairs(BufReader::new(file))?;

        info!("Loaded {} queries from {}", list.len(), path.display());
        self.records = list;
        Ok(())
    }

    fn compile_pairs(reader: impl BufRead) -> Result<Vec<QueryRecord>, QueryFileError> {
        let mut table = TypeTable::default();
        let mut list = Vec::new();
        let mut pending: Option<String> = None;
        let mut line_no = 0_usize;

        for line in reader.lines() {
            let line = line
                .map_err(|e| QueryFileError::Io { action: "reading query file", source: e })?;

            for token in line.split_whitespace() {
                match pending.take() {
                    None => {
                        pending = Some(token.into());
                    }
                    Some(name) => {
                        line_no += 1;

                        let record = Self::compile(&mut table, &name, token)
                            .map_err(|source| QueryFileError::Line { line: line_no, source })?;
                        list.push(record);
                    }
                }
            }
        }

        // a final name token with no type after it falls off the end,
        // exactly as a two-tokens-at-a-time scanner leaves it
        if let Some(name) = pending {
            debug!("Ignoring trailing token {:?}", name);
        }

        Ok(list)
    }

    fn compile(table: &mut TypeTable, name: &str, qtype: &str) -> Result<QueryRecord, RecordError> {
        let qtype = table.lookup(qtype)?;
        let bytes = build_query(name, qtype)?;

        Ok(QueryRecord::new(bytes))
    }

    /// Loads a raw query file: any number of records, each a sixteen-bit
    /// big-endian length followed by that many payload bytes.
    ///
    /// A clean end-of-file between records — or directly after a length,
    /// before any of its payload — ends the stream; a length or payload
    /// cut off part-way through is an error, as is a zero-length record
    /// or one too big to ever leave the machine in a datagram.
    pub fn read_raw(&mut self, path: impl AsRef<Path>) -> Result<(), QueryFileError> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| QueryFileError::Io { action: "opening query file", source: e })?;

        let list = Self::read_records(BufReader::new(file))?;

        info!("Loaded {} queries from {}", list.len(), path.display());
        self.records = list;
        Ok(())
    }

    fn read_records(mut reader: impl Read) -> Result<Vec<QueryRecord>, QueryFileError> {
        let mut list = Vec::new();

        loop {
            let mut len_bytes = [0_u8; 2];
            let got = read_chunk(&mut reader, &mut len_bytes)
                .map_err(|e| QueryFileError::Io { action: "reading record length", source: e })?;

            if got == 0 {
                break;
            }
            else if got < len_bytes.len() {
                return Err(QueryFileError::Truncated);
            }

            let len = usize::from(u16::from_be_bytes(len_bytes));
            if len == 0 {
                return Err(QueryFileError::ZeroLengthRecord);
            }
            else if len > MAX_RECORD_LEN {
                return Err(QueryFileError::RecordTooLong { index: list.len() });
            }

            let mut payload = vec![0_u8; len];
            let got = read_chunk(&mut reader, &mut payload)
                .map_err(|e| QueryFileError::Io { action: "reading record", source: e })?;

            if got == 0 {
                // a length with nothing after it is a clean end
                break;
            }
            else if got < len {
                return Err(QueryFileError::Truncated);
            }

            list.push(QueryRecord::new(payload));
        }

        Ok(list)
    }

    /// Writes the corpus out in the raw format, in order.
    pub fn write_raw(&self, path: impl AsRef<Path>) -> Result<(), QueryFileError> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| QueryFileError::Io { action: "creating query file", source: e })?;

        let mut writer = BufWriter::new(file);
        for (index, record) in self.records.iter().enumerate() {
            let len = u16::try_from(record.len())
                .map_err(|_| QueryFileError::RecordTooLong { index })?;

            writer.write_u16::<BigEndian>(len)
                .and_then(|_| writer.write_all(record.bytes()))
                .map_err(|e| QueryFileError::Io { action: "writing query file", source: e })?;
        }

        writer.flush()
            .map_err(|e| QueryFileError::Io { action: "writing query file", source: e })?;

        debug!("Wrote {} queries to {}", self.len(), path.display());
        Ok(())
    }

    /// Upgrades every record in the corpus to EDNS: the header’s ARCOUNT
    /// goes up by one, and an OPT pseudo-record with the given UDP buffer
    /// size and flags is appended to the message.
    pub fn edns(&mut self, udp_payload_size: u16, flags: u16) -> Result<(), QueryFileError> {
        let opt = Opt { udp_payload_size, flags }.to_bytes()
            .map_err(|e| QueryFileError::Io { action: "encoding OPT record", source: e })?;

        for (index, record) in self.records.iter_mut().enumerate() {
            if record.len() < HEADER_LEN {
                return Err(QueryFileError::RecordTooShort { index });
            }
            else if record.len() + opt.len() > MAX_RECORD_LEN {
                return Err(QueryFileError::RecordTooLong { index });
            }

            record.bump_arcount();
            record.bytes.extend_from_slice(&opt);
        }

        Ok(())
    }
}

impl Index<usize> for QueryFile {
    type Output = QueryRecord;

    fn index(&self, index: usize) -> &Self::Output {
        &self.records[index]
    }
}


/// Reads from the given reader until the buffer is full or the stream
/// ends, returning how many bytes were actually placed.
fn read_chunk(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;

    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(filled)
}


/// Something that can go wrong loading or rewriting a query corpus.
#[derive(Debug)]
pub enum QueryFileError {

    /// There was a problem reading or writing the underlying file.
    Io {

        /// What was being attempted when the error happened.
        action: &'static str,

        /// The error the OS gave back.
        source: io::Error,
    },

    /// One of the `name type` pairs in a text file failed to compile.
    Line {

        /// The 1-based ordinal of the failing pair.
        line: usize,

        /// What was wrong with it.
        source: RecordError,
    },

    /// A raw file ended in the middle of a length or a payload.
    Truncated,

    /// A raw file contained a record with a length of zero.
    ZeroLengthRecord,

    /// A record is too small to hold even a DNS message header.
    RecordTooShort {

        /// The index of the offending record.
        index: usize,
    },

    /// A record too big to fit a UDP datagram alongside its headers.
    RecordTooLong {

        /// The index of the offending record.
        index: usize,
    },
}

impl fmt::Display for QueryFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { action, source }    => write!(f, "{}: {}", action, source),
            Self::Line { line, source }    => write!(f, "reading query file at line {}: {}", line, source),
            Self::Truncated                => write!(f, "truncated record in raw query file"),
            Self::ZeroLengthRecord         => write!(f, "zero-length record in raw query file"),
            Self::RecordTooShort { index } => write!(f, "record {} too short to carry a DNS header", index),
            Self::RecordTooLong { index }  => write!(f, "record {} too large to send in a UDP datagram", index),
        }
    }
}


/// Something wrong with a single `name type` pair.
#[derive(PartialEq, Debug)]
pub enum RecordError {

    /// The type mnemonic failed to resolve.
    Type(TypeError),

    /// The name failed to compile into a question.
    Wire(WireError),
}

impl From<TypeError> for RecordError {
    fn from(inner: TypeError) -> Self {
        Self::Type(inner)
    }
}

impl From<WireError> for RecordError {
    fn from(inner: WireError) -> Self {
        Self::Wire(inner)
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(e)  => e.fmt(f),
            Self::Wire(e)  => e.fmt(f),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;
    use pretty_assertions::assert_eq;

    // In-memory loading goes through the same code paths as the file
    // methods; the on-disk behaviour is covered in tests/query_file_tests.rs.

    fn corpus(records: Vec<Vec<u8>>) -> QueryFile {
        QueryFile { records: records.into_iter().map(QueryRecord::new).collect() }
    }

    #[test]
    fn compile_pairs_across_lines() {
        let text = "example.com A\nexample.net\nAAAA one.example MX\n";
        let records = QueryFile::compile_pairs(Cursor::new(text)).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(&records[1].bytes()[12..], &[
            0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            0x03, b'n', b'e', b't', 0x00,
            0x00, 0x1c,  // AAAA
            0x00, 0x01,  // IN
        ]);
    }

    #[test]
    fn compile_pair_error_counts_pairs() {
        let text = "one.example A two.example NOPE";
        let e = QueryFile::compile_pairs(Cursor::new(text)).unwrap_err();

        assert_eq!(e.to_string(), "reading query file at line 2: unrecognised QTYPE: NOPE");
    }

    #[test]
    fn trailing_name_is_dropped() {
        let text = "one.example A dangling";
        let records = QueryFile::compile_pairs(Cursor::new(text)).unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn raw_records() {
        let raw = b"\x00\x03abc\x00\x01z";
        let records = QueryFile::read_records(Cursor::new(&raw[..])).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].bytes(), b"abc");
        assert_eq!(records[1].bytes(), b"z");
    }

    #[test]
    fn raw_empty_stream() {
        let records = QueryFile::read_records(Cursor::new(&b""[..])).unwrap();

        assert!(records.is_empty());
    }

    #[test]
    fn raw_length_at_eof() {
        let raw = b"\x00\x03abc\x00\x09";
        let records = QueryFile::read_records(Cursor::new(&raw[..])).unwrap();

        assert_eq!(records.len(), 1);
    }

    #[test]
    fn raw_truncated_payload() {
        let raw = b"\x00\x09abc";
        let e = QueryFile::read_records(Cursor::new(&raw[..])).unwrap_err();

        assert!(matches!(e, QueryFileError::Truncated));
    }

    #[test]
    fn raw_truncated_length() {
        let raw = b"\x00\x03abc\x00";
        let e = QueryFile::read_records(Cursor::new(&raw[..])).unwrap_err();

        assert!(matches!(e, QueryFileError::Truncated));
    }

    #[test]
    fn raw_zero_length_record() {
        let raw = b"\x00\x00";
        let e = QueryFile::read_records(Cursor::new(&raw[..])).unwrap_err();

        assert!(matches!(e, QueryFileError::ZeroLengthRecord));
    }

    #[test]
    fn raw_record_at_the_datagram_limit() {
        // 65507 bytes is the biggest message a datagram can carry
        let mut raw = vec![ 0xff, 0xe3 ];
        raw.extend(std::iter::repeat(0xcc).take(MAX_RECORD_LEN));

        let records = QueryFile::read_records(Cursor::new(&raw[..])).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), MAX_RECORD_LEN);
    }

    #[test]
    fn raw_record_too_big_to_send() {
        // one byte past the limit: framable in the file format, but it
        // could never go out on the wire
        let raw = b"\x00\x01a\xff\xe4";
        let e = QueryFile::read_records(Cursor::new(&raw[..])).unwrap_err();

        assert!(matches!(e, QueryFileError::RecordTooLong { index: 1 }));
    }

    #[test]
    fn edns_upgrade() {
        let header = vec![
            0xab, 0xcd, 0x01, 0x00,
            0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut record = header;
        record.extend_from_slice(&[
            0x07, b'e', b'x', b'a', b'm', b'p', b'l', b'e',
            0x00, 0x00, 0x01, 0x00, 0x01,
        ]);
        assert_eq!(record.len(), 25);

        let mut qf = corpus(vec![ record ]);
        qf.edns(4096, 0x8000).unwrap();

        assert_eq!(qf[0].len(), 36);
        assert_eq!(&qf[0].bytes()[10..12], &[ 0x00, 0x01 ]);
        assert_eq!(&qf[0].bytes()[25..], &[
            0x00, 0x00, 0x29, 0x10, 0x00, 0x00, 0x00, 0x80, 0x00, 0x00, 0x00,
        ]);
    }

    #[test]
    fn edns_twice_counts_twice() {
        let record = vec![0_u8; 23];
        let mut qf = corpus(vec![ record ]);

        qf.edns(512, 0).unwrap();
        qf.edns(512, 0).unwrap();

        assert_eq!(qf[0].len(), 45);
        assert_eq!(&qf[0].bytes()[10..12], &[ 0x00, 0x02 ]);
    }

    #[test]
    fn edns_rejects_short_records() {
        let mut qf = corpus(vec![ vec![0_u8; 4] ]);

        assert!(matches!(qf.edns(512, 0),
                         Err(QueryFileError::RecordTooShort { index: 0 })));
    }

    #[test]
    fn edns_rejects_overflowing_records() {
        let mut qf = corpus(vec![ vec![0_u8; MAX_RECORD_LEN - 5] ]);

        assert!(matches!(qf.edns(512, 0),
                         Err(QueryFileError::RecordTooLong { index: 0 })));
    }
}
