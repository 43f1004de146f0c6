//! Layer-2 addresses for packet sockets.

use std::fmt;
use std::mem;


/// A **link-layer address**: the `sockaddr_ll` an AF_PACKET socket deals
/// in. The generator builds one as the destination template for every
/// outgoing packet; the receive ring hands one back for every frame, which
/// the echo responder can pass straight back to `send_to`.
#[repr(transparent)]
#[derive(Copy, Clone)]
pub struct LinkAddr(libc::sockaddr_ll);

impl LinkAddr {

    /// The size the kernel expects for a `sockaddr_ll`.
    pub(crate) const LEN: libc::socklen_t = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;

    /// Builds the address used as the destination of outgoing packets: the
    /// given interface, IPv4 as the carried protocol, and the given
    /// six-byte hardware address. The kernel writes the Ethernet header
    /// from this, which is what lets the generator skip ARP entirely.
    pub fn unicast(ifindex: u32, mac: [u8; 6]) -> Self {
        // SAFETY: sockaddr_ll is plain data, and all-zeroes is a valid value.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };

        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = (libc::ETH_P_IP as u16).to_be();
        addr.sll_ifindex = ifindex as libc::c_int;
        addr.sll_halen = 6;
        addr.sll_addr[..6].copy_from_slice(&mac);

        Self(addr)
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr_ll {
        &self.0
    }
}

impl fmt::Debug for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let halen = usize::from(self.0.sll_halen.min(8));
        let mac = self.0.sll_addr[..halen].iter()
            .map(|octet| format!("{:02x}", octet))
            .collect::<Vec<_>>()
            .join(":");

        f.debug_struct("LinkAddr")
         .field("ifindex", &self.0.sll_ifindex)
         .field("addr", &mac)
         .finish()
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template() {
        let addr = LinkAddr::unicast(3, [ 0xde, 0xad, 0xbe, 0xef, 0x00, 0x01 ]);

        assert_eq!(addr.0.sll_family, libc::AF_PACKET as libc::c_ushort);
        assert_eq!(addr.0.sll_protocol, 0x0800_u16.to_be());
        assert_eq!(addr.0.sll_ifindex, 3);
        assert_eq!(addr.0.sll_halen, 6);
        assert_eq!(&addr.0.sll_addr[..6], &[ 0xde, 0xad, 0xbe, 0xef, 0x00, 0x01 ]);
    }
}
