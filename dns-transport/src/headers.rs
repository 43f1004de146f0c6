//! Coalesced IPv4 and UDP headers, built by hand.
//!
//! The generator writes these in front of every query payload, so the
//! layout has to be exactly the 28 bytes the wire expects. Every
//! multi-byte field is kept as a big-endian byte array, which makes the
//! endianness explicit at each assignment and keeps the checksum
//! arithmetic portable.

use std::net::Ipv4Addr;


/// The fixed size of an IPv4 header with no options.
const IP_HEADER_LEN: u16 = 20;

/// The fixed size of a UDP header.
const UDP_HEADER_LEN: u16 = 8;

/// The biggest payload that still fits in a single IPv4 datagram
/// alongside the two headers.
const MAX_PAYLOAD_LEN: u16 = u16::MAX - IP_HEADER_LEN - UDP_HEADER_LEN;


/// An IPv4 header, fields in wire order.
#[repr(C)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct Ipv4Header {
    version_ihl: u8,
    tos: u8,
    tot_len: [u8; 2],
    id: [u8; 2],
    frag_off: [u8; 2],
    ttl: u8,
    protocol: u8,
    check: [u8; 2],
    saddr: [u8; 4],
    daddr: [u8; 4],
}

/// A UDP header, fields in wire order.
#[repr(C)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct UdpHeader {
    source: [u8; 2],
    dest: [u8; 2],
    len: [u8; 2],
    check: [u8; 2],
}

/// The **header pair** glued in front of each outgoing query: an IPv4
/// header immediately followed by a UDP header, with no padding between
/// them. One of these plus the query payload makes one packet.
#[repr(C)]
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub struct HeaderPair {
    ip: Ipv4Header,
    udp: UdpHeader,
}

impl HeaderPair {

    /// The number of bytes a header pair occupies on the wire.
    pub const LEN: usize = 28;

    /// Builds the headers for one packet: a UDP datagram of
    /// `payload_len` bytes from `src_ip:src_port` to `dst_ip:dst_port`,
    /// with the given IP identification value. The IP checksum is filled
    /// in; the UDP checksum is left as zero, which UDP over IPv4 permits.
    ///
    /// # Panics
    ///
    /// Panics if the payload could not fit in a single datagram.
    pub fn new(
        src_ip: Ipv4Addr,
        dst_ip: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        ip_id: u16,
        payload_len: u16,
    ) -> Self {
        assert!(payload_len <= MAX_PAYLOAD_LEN, "payload of {} bytes cannot fit a datagram", payload_len);

        let udp_len = payload_len + UDP_HEADER_LEN;
        let tot_len = udp_len + IP_HEADER_LEN;

        let mut ip = Ipv4Header {
            version_ihl: 0x45,  // version 4, ihl 5 words
            tos: 0,
            tot_len: tot_len.to_be_bytes(),
            id: ip_id.to_be_bytes(),
            frag_off: [0; 2],
            ttl: 8,
            protocol: 17,  // UDP
            check: [0; 2],
            saddr: src_ip.octets(),
            daddr: dst_ip.octets(),
        };
        ip.check = checksum(&ip).to_be_bytes();

        let udp = UdpHeader {
            source: src_port.to_be_bytes(),
            dest: dst_port.to_be_bytes(),
            len: udp_len.to_be_bytes(),
            check: [0; 2],
        };

        Self { ip, udp }
    }
}


/// The Internet checksum over the ten sixteen-bit words of the header,
/// with the carries folded back in twice and the result complemented.
/// Summing big-endian words and storing the complement back big-endian
/// gives the right bits on hosts of either endianness.
fn checksum(ip: &Ipv4Header) -> u16 {
    let words = [
        u16::from_be_bytes([ip.version_ihl, ip.tos]),
        u16::from_be_bytes(ip.tot_len),
        u16::from_be_bytes(ip.id),
        u16::from_be_bytes(ip.frag_off),
        u16::from_be_bytes([ip.ttl, ip.protocol]),
        u16::from_be_bytes(ip.check),
        u16::from_be_bytes([ip.saddr[0], ip.saddr[1]]),
        u16::from_be_bytes([ip.saddr[2], ip.saddr[3]]),
        u16::from_be_bytes([ip.daddr[0], ip.daddr[1]]),
        u16::from_be_bytes([ip.daddr[2], ip.daddr[3]]),
    ];

    let mut sum: u32 = words.iter().map(|w| u32::from(*w)).sum();
    sum = (sum >> 16) + (sum & 0xffff);
    sum += sum >> 16;

    !(sum as u16)
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn example() -> HeaderPair {
        HeaderPair::new(
            Ipv4Addr::new(192, 0, 2, 1),
            Ipv4Addr::new(192, 0, 2, 53),
            16384,
            8053,
            0x4242,
            29,
        )
    }

    #[test]
    fn no_padding() {
        assert_eq!(std::mem::size_of::<Ipv4Header>(), 20);
        assert_eq!(std::mem::size_of::<UdpHeader>(), 8);
        assert_eq!(std::mem::size_of::<HeaderPair>(), HeaderPair::LEN);
    }

    #[test]
    fn lengths() {
        let pair = example();

        assert_eq!(pair.ip.tot_len, (29_u16 + 8 + 20).to_be_bytes());
        assert_eq!(pair.udp.len, (29_u16 + 8).to_be_bytes());
    }

    #[test]
    fn fields_in_network_order() {
        let pair = example();

        assert_eq!(pair.ip.version_ihl, 0x45);
        assert_eq!(pair.ip.ttl, 8);
        assert_eq!(pair.ip.protocol, 17);
        assert_eq!(pair.ip.id, [ 0x42, 0x42 ]);
        assert_eq!(pair.ip.saddr, [ 192, 0, 2, 1 ]);
        assert_eq!(pair.ip.daddr, [ 192, 0, 2, 53 ]);
        assert_eq!(pair.udp.source, [ 0x40, 0x00 ]);
        assert_eq!(pair.udp.dest, [ 0x1f, 0x75 ]);
        assert_eq!(pair.udp.check, [ 0x00, 0x00 ]);
    }

    #[test]
    fn checksum_verifies() {
        // RFC 1071: summing every word of a checksummed header, including
        // the checksum itself, must give all-ones
        let pair = example();

        let mut sum: u32 = 0;
        sum += u32::from(u16::from_be_bytes([pair.ip.version_ihl, pair.ip.tos]));
        sum += u32::from(u16::from_be_bytes(pair.ip.tot_len));
        sum += u32::from(u16::from_be_bytes(pair.ip.id));
        sum += u32::from(u16::from_be_bytes(pair.ip.frag_off));
        sum += u32::from(u16::from_be_bytes([pair.ip.ttl, pair.ip.protocol]));
        sum += u32::from(u16::from_be_bytes(pair.ip.check));
        sum += u32::from(u16::from_be_bytes([pair.ip.saddr[0], pair.ip.saddr[1]]));
        sum += u32::from(u16::from_be_bytes([pair.ip.saddr[2], pair.ip.saddr[3]]));
        sum += u32::from(u16::from_be_bytes([pair.ip.daddr[0], pair.ip.daddr[1]]));
        sum += u32::from(u16::from_be_bytes([pair.ip.daddr[2], pair.ip.daddr[3]]));

        sum = (sum >> 16) + (sum & 0xffff);
        sum += sum >> 16;

        assert_eq!(sum & 0xffff, 0xffff);
    }

    #[test]
    fn checksum_differs_by_id() {
        let one = HeaderPair::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 1000, 53, 1, 64);
        let two = HeaderPair::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2), 1000, 53, 2, 64);

        assert_ne!(one.ip.check, two.ip.check);
    }

    #[test]
    #[should_panic(expected = "cannot fit a datagram")]
    fn oversized_payload() {
        let _ = HeaderPair::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, 1, 1, 1, u16::MAX);
    }
}
