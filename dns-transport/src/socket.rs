//! Opening, binding, and sending on AF_PACKET sockets.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use log::*;

use crate::headers::HeaderPair;
use crate::link::LinkAddr;
use crate::ring::RxRing;
use crate::Error;


/// An **AF_PACKET socket**, the kernel facility that deals in raw layer-2
/// frames. dogpile opens one per worker: the sender side pushes batches of
/// hand-built packets through it with `sendmmsg`, and the receiver side
/// maps a ring over it and counts what comes back.
///
/// The socket is opened as `SOCK_DGRAM`, so the kernel supplies the
/// Ethernet header on transmit (from the `LinkAddr` destination) and
/// strips it on receive — frames start at the IP header on both sides.
#[derive(Debug)]
pub struct PacketSocket {
    fd: OwnedFd,
}

impl PacketSocket {

    /// Opens a new packet socket carrying IPv4.
    pub fn open() -> Result<Self, Error> {
        let protocol = libc::c_int::from((libc::ETH_P_IP as u16).to_be());

        // SAFETY: opening a socket touches no caller memory; the result
        // is checked before use.
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_DGRAM, protocol) };
        if fd < 0 {
            return Err(Error::syscall("socket(AF_PACKET, SOCK_DGRAM)"));
        }

        debug!("Opened packet socket with fd {}", fd);

        // SAFETY: the descriptor was just created, so nothing else owns it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Binds the socket to the given interface, then joins the per-process
    /// fanout group in CPU mode, so the kernel delivers each received
    /// packet to whichever socket lives on the CPU that picked it up.
    pub fn bind(&self, ifindex: u32) -> Result<(), Error> {
        // SAFETY: sockaddr_ll is plain data, and all-zeroes is a valid value.
        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_ifindex = ifindex as libc::c_int;

        // SAFETY: addr is a valid sockaddr_ll for the duration of the call.
        let res = unsafe {
            libc::bind(
                self.raw_fd(),
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                LinkAddr::LEN,
            )
        };
        if res < 0 {
            return Err(Error::syscall("bind AF_PACKET"));
        }

        // SAFETY: getpid cannot fail and touches no memory.
        let pid = unsafe { libc::getpid() };
        let fanout = (pid as u32 & 0xffff) | ((libc::PACKET_FANOUT_CPU as u32) << 16);

        self.set_packet_opt(libc::PACKET_FANOUT, fanout, "setsockopt PACKET_FANOUT")?;
        if let Ok(joined) = self.packet_opt(libc::PACKET_FANOUT) {
            trace!("Joined fanout group {:#010x}", joined);
        }

        Ok(())
    }

    /// Resolves an interface name and binds to it.
    pub fn bind_interface(&self, name: &str) -> Result<(), Error> {
        self.bind(ifindex(name)?)
    }

    /// Waits up to `timeout_ms` milliseconds for the socket to become
    /// readable. Returns the poll result: zero on timeout, positive when
    /// there is something to read. A negative timeout waits forever.
    pub fn poll(&self, timeout_ms: i32) -> Result<i32, Error> {
        let mut pfd = libc::pollfd {
            fd: self.raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: pfd is a valid pollfd for the duration of the call.
            let res = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if res >= 0 {
                return Ok(res);
            }

            let e = io::Error::last_os_error();
            if e.kind() != io::ErrorKind::Interrupted {
                return Err(Error::Syscall { call: "poll", source: e });
            }
        }
    }

    /// Sets a 32-bit `SOL_PACKET` socket option.
    pub(crate) fn set_packet_opt(&self, name: libc::c_int, value: u32, call: &'static str) -> Result<(), Error> {
        // SAFETY: the value pointer and length describe a real u32.
        let res = unsafe {
            libc::setsockopt(
                self.raw_fd(),
                libc::SOL_PACKET,
                name,
                (&value as *const u32).cast(),
                mem::size_of::<u32>() as libc::socklen_t,
            )
        };

        if res < 0 {
            Err(Error::syscall(call))
        }
        else {
            Ok(())
        }
    }

    /// Reads a 32-bit `SOL_PACKET` socket option back.
    pub fn packet_opt(&self, name: libc::c_int) -> Result<u32, Error> {
        let mut value = 0_u32;
        let mut len = mem::size_of::<u32>() as libc::socklen_t;

        // SAFETY: the value pointer and length describe a real u32.
        let res = unsafe {
            libc::getsockopt(
                self.raw_fd(),
                libc::SOL_PACKET,
                name,
                (&mut value as *mut u32).cast(),
                &mut len,
            )
        };

        if res < 0 {
            Err(Error::syscall("getsockopt SOL_PACKET"))
        }
        else {
            Ok(value)
        }
    }

    /// Hands a whole batch of packets to the kernel with as few
    /// `sendmmsg` calls as it takes: each packet is the given header pair
    /// followed by its payload, all destined for `addr`. Transient
    /// `EAGAIN` results are retried until the batch is fully accepted.
    /// Returns the number of packets sent, which is always the batch size
    /// on success.
    pub fn send_batch(
        &self,
        headers: &[HeaderPair],
        payloads: &[&[u8]],
        addr: &LinkAddr,
    ) -> Result<usize, Error> {
        assert_eq!(headers.len(), payloads.len());
        let count = headers.len();

        let mut iovecs = Vec::with_capacity(count * 2);
        for (header, payload) in headers.iter().zip(payloads) {
            iovecs.push(libc::iovec {
                iov_base: (header as *const HeaderPair as *mut HeaderPair).cast(),
                iov_len: HeaderPair::LEN,
            });
            iovecs.push(libc::iovec {
                iov_base: (payload.as_ptr() as *mut u8).cast(),
                iov_len: payload.len(),
            });
        }

        let mut msgs = Vec::with_capacity(count);
        for i in 0 .. count {
            // SAFETY: msghdr is plain data, and all-zeroes is a valid value.
            let mut hdr: libc::msghdr = unsafe { mem::zeroed() };
            hdr.msg_name = (addr.as_ptr() as *mut libc::sockaddr_ll).cast();
            hdr.msg_namelen = LinkAddr::LEN;
            hdr.msg_iov = &mut iovecs[i * 2];
            hdr.msg_iovlen = 2;

            msgs.push(libc::mmsghdr { msg_hdr: hdr, msg_len: 0 });
        }

        let mut offset = 0;
        while offset < count {
            // SAFETY: msgs, iovecs, and everything they point into are
            // alive and unmoved for the duration of the call.
            let res = unsafe {
                libc::sendmmsg(
                    self.raw_fd(),
                    msgs.as_mut_ptr().add(offset),
                    (count - offset) as libc::c_uint,
                    0,
                )
            };

            if res < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::WouldBlock {
                    continue;
                }

                return Err(Error::Syscall { call: "sendmmsg", source: e });
            }

            offset += res as usize;
        }

        Ok(offset)
    }

    /// Sends a single raw packet to the given link-layer address without
    /// waiting for buffer space. The caller decides whether a would-block
    /// result matters; the echo path shrugs it off.
    pub fn send_to(&self, buf: &[u8], addr: &LinkAddr) -> Result<usize, Error> {
        // SAFETY: buf and addr are alive for the duration of the call.
        let res = unsafe {
            libc::sendto(
                self.raw_fd(),
                buf.as_ptr().cast(),
                buf.len(),
                libc::MSG_DONTWAIT,
                addr.as_ptr().cast(),
                LinkAddr::LEN,
            )
        };

        if res < 0 {
            Err(Error::syscall("sendto"))
        }
        else {
            Ok(res as usize)
        }
    }

    /// Maps a receive ring of `frame_count` frames of `1 << frame_bits`
    /// bytes each over this socket.
    pub fn rx_ring(&self, frame_bits: u32, frame_count: usize) -> Result<RxRing<'_>, Error> {
        RxRing::enable(self, frame_bits, frame_count)
    }

    pub(crate) fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}


/// Resolves an interface name to its index.
pub fn ifindex(name: &str) -> Result<u32, Error> {
    let c_name = CString::new(name)
        .map_err(|_| Error::UnknownInterface(name.into()))?;

    // SAFETY: the pointer is a valid C string for the duration of the call.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(Error::syscall("if_nametoindex"));
    }

    trace!("Interface {:?} has index {}", name, index);
    Ok(index)
}
