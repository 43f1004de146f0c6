//! The EDNS OPT pseudo-record, as sent in queries.

use std::io;

use byteorder::{BigEndian, WriteBytesExt};


/// A **OPT** _(options)_ pseudo-record, which extends the DNS protocol
/// with negotiation fields that the original header had no room for.
///
/// Unlike all the other record types, the OPT record is not data about a
/// domain name: it re-purposes the name, class, and TTL fields of a
/// regular additional-section record to carry a supported UDP payload
/// size and sixteen bits of extended flags (including the DNSSEC OK bit).
///
/// # References
///
/// - [RFC 6891](https://tools.ietf.org/html/rfc6891) — Extension Mechanisms
///   for DNS (April 2013)
#[derive(PartialEq, Debug, Copy, Clone)]
pub struct Opt {

    /// The maximum size of a UDP packet that the sender supports.
    pub udp_payload_size: u16,

    /// Sixteen bits worth of flags. The top bit is DNSSEC OK.
    pub flags: u16,
}

impl Opt {

    /// The record type number associated with OPT.
    pub const RR_TYPE: u16 = 41;

    /// The DNSSEC OK bit within the flags field.
    pub const DO: u16 = 0x8000;

    /// The number of bytes an OPT record with no payload occupies.
    pub const WIRE_LEN: usize = 11;

    /// Serialises this OPT record into its additional-section encoding:
    /// the root name, the OPT type number, and the re-purposed class and
    /// TTL fields, with an empty payload.
    pub fn to_bytes(self) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(Self::WIRE_LEN);

        bytes.write_u8(0)?;  // name
        bytes.write_u16::<BigEndian>(Self::RR_TYPE)?;
        bytes.write_u16::<BigEndian>(self.udp_payload_size)?;
        bytes.write_u8(0)?;  // higher bits
        bytes.write_u8(0)?;  // EDNS(0) version
        bytes.write_u16::<BigEndian>(self.flags)?;
        bytes.write_u16::<BigEndian>(0)?;  // no data

        Ok(bytes)
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wire_encoding() {
        let opt = Opt { udp_payload_size: 512, flags: 0 };

        assert_eq!(opt.to_bytes().unwrap(), &[
            0x00,  // name
            0x00, 0x29,  // type OPT
            0x02, 0x00,  // UDP payload size
            0x00,  // higher bits
            0x00,  // EDNS(0) version
            0x00, 0x00,  // flags
            0x00, 0x00,  // no data
        ]);
    }

    #[test]
    fn dnssec_ok() {
        let opt = Opt { udp_payload_size: 4096, flags: Opt::DO };
        let bytes = opt.to_bytes().unwrap();

        assert_eq!(bytes.len(), Opt::WIRE_LEN);
        assert_eq!(&bytes[3..5], &[ 0x10, 0x00 ]);
        assert_eq!(&bytes[7..9], &[ 0x80, 0x00 ]);
    }
}
