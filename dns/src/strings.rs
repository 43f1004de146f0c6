//! Writing domain names in the DNS wire format.

use std::convert::TryFrom;
use std::fmt;
use std::io::{self, Write};

use byteorder::WriteBytesExt;
use log::*;


/// Domain names in the DNS protocol are encoded as **Labels**, which are
/// segments of ASCII characters prefixed by their length. When written out,
/// each segment is followed by a dot.
///
/// The maximum length of a segment is 255 characters.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Clone)]
pub struct Labels {
    segments: Vec<(u8, String)>,
}

#[cfg(feature = "with_idna")]
fn label_to_ascii(label: &str) -> Result<String, unic_idna::Errors> {
    let flags = unic_idna::Flags{use_std3_ascii_rules: false, transitional_processing: false, verify_dns_length: true};
    unic_idna::to_ascii(label, flags)
}

#[cfg(not(feature = "with_idna"))]
fn label_to_ascii(label: &str) -> Result<String, ()> {
    Ok(label.to_owned())
}

impl Labels {

    /// Creates a new empty set of labels, which represent the root of the DNS
    /// as a domain with no name.
    pub fn root() -> Self {
        Self { segments: Vec::new() }
    }

    /// Encodes the given input string as labels. If any segment is too long,
    /// returns that segment as an error.
    pub fn encode(input: &str) -> Result<Self, &str> {
        let mut segments = Vec::new();

        for label in input.split('.') {
            if label.is_empty() {
                continue;
            }

            let label_idn = label_to_ascii(label)
                    .map_err(|e| {
                        warn!("Could not encode label {:?}: {:?}", label, e);
                        label
                    })?;

            match u8::try_from(label_idn.len()) {
                Ok(length) => {
                    segments.push((length, label_idn));
                }
                Err(e) => {
                    warn!("Could not encode label {:?}: {}", label, e);
                    return Err(label);
                }
            }
        }

        Ok(Self { segments })
    }

    /// Returns the number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of bytes these labels occupy on the wire: one
    /// length byte plus the text of each segment, plus the root label.
    pub fn wire_len(&self) -> usize {
        self.segments.iter()
            .map(|(length, _)| usize::from(*length) + 1)
            .sum::<usize>() + 1
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (_, segment) in &self.segments {
            write!(f, "{}.", segment)?;
        }

        Ok(())
    }
}


/// An extension for `Write` that enables writing domain names.
pub(crate) trait WriteLabels {

    /// Write a domain name.
    ///
    /// The names being queried are written with one byte slice per
    /// domain segment, preceded by each segment’s length, with the
    /// whole thing ending with a segment of zero length.
    ///
    /// So “dns.lookup.dog” would be encoded as:
    /// “3, dns, 6, lookup, 3, dog, 0”.
    fn write_labels(&mut self, input: &Labels) -> io::Result<()>;
}

impl<W: Write> WriteLabels for W {
    fn write_labels(&mut self, input: &Labels) -> io::Result<()> {
        for (length, label) in &input.segments {
            self.write_u8(*length)?;

            for b in label.as_bytes() {
                self.write_u8(*b)?;
            }
        }

        self.write_u8(0)?;  // terminate the string
        Ok(())
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn root() {
        let mut buf = Vec::new();
        buf.write_labels(&Labels::root()).unwrap();

        assert_eq!(buf, &[ 0x00 ]);
        assert_eq!(Labels::root().wire_len(), 1);
    }

    #[test]
    fn one_label() {
        let mut buf = Vec::new();
        buf.write_labels(&Labels::encode("one").unwrap()).unwrap();

        assert_eq!(buf, &[
            0x03,  // label of length 3
            b'o', b'n', b'e',  // label
            0x00,  // end writing
        ]);
    }

    #[test]
    fn two_labels() {
        let labels = Labels::encode("one.two").unwrap();

        let mut buf = Vec::new();
        buf.write_labels(&labels).unwrap();

        assert_eq!(buf, &[
            0x03,  // label of length 3
            b'o', b'n', b'e',  // label
            0x03,  // label of length 3
            b't', b'w', b'o',  // label
            0x00,  // end writing
        ]);

        assert_eq!(labels.wire_len(), 9);
    }

    #[test]
    fn trailing_dot() {
        assert_eq!(Labels::encode("example.com."),
                   Labels::encode("example.com"));
    }

    #[test]
    fn wire_len_matches_output() {
        let labels = Labels::encode("dns.lookup.dog").unwrap();

        let mut buf = Vec::new();
        buf.write_labels(&labels).unwrap();

        assert_eq!(buf.len(), labels.wire_len());
    }
}
