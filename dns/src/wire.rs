//! Building query messages in the DNS wire format.

use std::fmt;
use std::io;

use byteorder::{BigEndian, WriteBytesExt};
use log::*;

use crate::strings::{Labels, WriteLabels};


/// The flags field of a standard query: everything clear except RD.
const FLAGS_QUERY: u16 = 0b_0000_0001_0000_0000;

/// The **Internet** class.
const QCLASS_IN: u16 = 1;

/// The longest a complete domain name is allowed to be on the wire.
const MAX_NAME_LEN: usize = 255;


/// Compiles a domain name and a type number into a complete DNS query
/// message: a twelve-byte header with a random transaction ID and the RD
/// flag set, followed by a single question.
///
/// The output is at most 12 + 255 + 4 bytes long.
pub fn build_query(name: &str, qtype: u16) -> Result<Vec<u8>, WireError> {
    let qname = Labels::encode(name)
        .map_err(|segment| WireError::InvalidName(segment.into()))?;

    if qname.wire_len() > MAX_NAME_LEN {
        return Err(WireError::NameTooLong(name.into()));
    }

    let transaction_id = rand::random::<u16>();
    trace!("Building query {:#06x} for {:?} type {}", transaction_id, name, qtype);

    let mut bytes = Vec::with_capacity(32);

    bytes.write_u16::<BigEndian>(transaction_id)?;
    bytes.write_u16::<BigEndian>(FLAGS_QUERY)?;

    bytes.write_u16::<BigEndian>(1)?;  // query count
    bytes.write_u16::<BigEndian>(0)?;  // answer count
    bytes.write_u16::<BigEndian>(0)?;  // authority RR count
    bytes.write_u16::<BigEndian>(0)?;  // additional RR count

    bytes.write_labels(&qname)?;
    bytes.write_u16::<BigEndian>(qtype)?;
    bytes.write_u16::<BigEndian>(QCLASS_IN)?;

    Ok(bytes)
}


/// Something that can go wrong while building a query message.
#[derive(PartialEq, Debug)]
pub enum WireError {

    /// A segment of the domain name could not be encoded as a label.
    InvalidName(String),

    /// The domain name as a whole is too long for the wire.
    NameTooLong(String),

    /// There was a problem writing the bytes out. This can only really
    /// happen with a writer less forgiving than a vector.
    Io(String),
}

impl From<io::Error> for WireError {
    fn from(inner: io::Error) -> Self {
        Self::Io(inner.to_string())
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(segment)  => write!(f, "couldn't encode label {:?}", segment),
            Self::NameTooLong(name)     => write!(f, "domain name {:?} too long", name),
            Self::Io(e)                 => write!(f, "couldn't write query: {}", e),
        }
    }
}
