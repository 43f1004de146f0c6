//! The memory-mapped receive ring.
//!
//! `PACKET_RX_RING` turns a packet socket into a circular buffer of
//! fixed-size frames that the kernel writes arriving packets straight
//! into. Each frame starts with a `tpacket_hdr` whose status word says
//! who owns it: the kernel fills a frame and flips it to `TP_STATUS_USER`,
//! the consumer reads it and flips it back to `TP_STATUS_KERNEL`. That
//! status word is the only synchronisation between the two sides, so it
//! is read with acquire ordering and released with release ordering.

use std::io;
use std::mem;
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::*;

use crate::link::LinkAddr;
use crate::socket::PacketSocket;
use crate::Error;


const TPACKET_ALIGNMENT: usize = libc::TPACKET_ALIGNMENT as usize;

const fn tpacket_align(n: usize) -> usize {
    (n + TPACKET_ALIGNMENT - 1) & !(TPACKET_ALIGNMENT - 1)
}


/// The shape of a ring: how the frame count and size the caller asked for
/// divide into the block layout the kernel wants.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
struct RingGeometry {
    frame_size: usize,
    frame_count: usize,
    block_size: usize,
    block_count: usize,
}

impl RingGeometry {

    /// Frames must hold a whole packet each, so their size is a power of
    /// two; blocks must hold a whole number of frames and be at least a
    /// page.
    fn new(frame_bits: u32, frame_count: usize, page_size: usize) -> Self {
        let frame_size = 1_usize << frame_bits;
        let block_size = page_size.max(frame_size);
        let block_count = frame_size * frame_count / block_size;

        Self { frame_size, frame_count, block_size, block_count }
    }

    fn map_size(&self) -> usize {
        self.frame_size * self.frame_count
    }

    fn request(&self) -> libc::tpacket_req {
        libc::tpacket_req {
            tp_block_size: self.block_size as u32,
            tp_block_nr: self.block_count as u32,
            tp_frame_size: self.frame_size as u32,
            tp_frame_nr: self.frame_count as u32,
        }
    }
}


/// A mapped **receive ring** over a packet socket.
///
/// The ring borrows its socket, polls it when the next frame is not ready
/// yet, and unmaps itself when dropped. Frames are visited strictly in
/// order; the consumer must never look at a frame the kernel still owns,
/// and this type never does.
pub struct RxRing<'socket> {
    socket: &'socket PacketSocket,
    map: NonNull<u8>,
    geometry: RingGeometry,
    ll_offset: usize,
    current: usize,
}

impl<'socket> RxRing<'socket> {

    pub(crate) fn enable(
        socket: &'socket PacketSocket,
        frame_bits: u32,
        frame_count: usize,
    ) -> Result<Self, Error> {
        // SAFETY: sysconf touches no caller memory.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size < 0 {
            return Err(Error::syscall("sysconf(_SC_PAGESIZE)"));
        }

        let geometry = RingGeometry::new(frame_bits, frame_count, page_size as usize);
        let req = geometry.request();

        // SAFETY: req is a valid tpacket_req for the duration of the call.
        let res = unsafe {
            libc::setsockopt(
                socket.raw_fd(),
                libc::SOL_PACKET,
                libc::PACKET_RX_RING,
                (&req as *const libc::tpacket_req).cast(),
                mem::size_of::<libc::tpacket_req>() as libc::socklen_t,
            )
        };
        if res < 0 {
            return Err(Error::syscall("setsockopt PACKET_RX_RING"));
        }

        // SAFETY: mapping the ring the socket just agreed to; the result
        // is checked before use.
        let map = unsafe {
            libc::mmap(
                ptr::null_mut(),
                geometry.map_size(),
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_LOCKED,
                socket.raw_fd(),
                0,
            )
        };
        if map == libc::MAP_FAILED {
            return Err(Error::syscall("mmap"));
        }

        debug!("Mapped a {} byte ring: {} frames of {} in {} blocks of {}",
               geometry.map_size(), geometry.frame_count, geometry.frame_size,
               geometry.block_count, geometry.block_size);

        let map = NonNull::new(map.cast::<u8>())
            .ok_or_else(|| Error::Syscall {
                call: "mmap",
                source: io::Error::from_raw_os_error(libc::EINVAL),
            })?;

        Ok(Self {
            socket,
            map,
            geometry,
            ll_offset: tpacket_align(mem::size_of::<libc::tpacket_hdr>()),
            current: 0,
        })
    }

    /// Visits the next frame of the ring, if there is one.
    ///
    /// If the current frame is still owned by the kernel, this polls the
    /// socket for up to `timeout_ms` milliseconds (forever, if negative)
    /// and returns `Ok(false)` if nothing arrived. Otherwise the callback
    /// is invoked exactly once with the packet bytes and the sender's
    /// link-layer address, the frame is handed back to the kernel, and
    /// the ring advances. The callback's error, if any, is propagated
    /// after the frame has been released.
    pub fn next<F>(&mut self, timeout_ms: i32, mut callback: F) -> Result<bool, Error>
    where F: FnMut(&mut [u8], &LinkAddr) -> Result<(), Error>
    {
        if !self.frame_ready() {
            if self.socket.poll(timeout_ms)? == 0 {
                return Ok(false);
            }

            if !self.frame_ready() {
                return Ok(false);
            }
        }

        let frame = self.frame_ptr();

        // SAFETY: the acquire load in frame_ready saw TP_STATUS_USER, so
        // the kernel has finished writing this frame and published its
        // header fields.
        let (net, len) = unsafe {
            let header = &*frame.cast::<libc::tpacket_hdr>().cast_const();
            (header.tp_net as usize, header.tp_len as usize)
        };

        // SAFETY: the link-layer address and the packet bytes both lie
        // inside this frame, at offsets the kernel promises; the frame is
        // ours until the status word is put back.
        let addr = unsafe { ptr::read_unaligned(frame.add(self.ll_offset).cast::<LinkAddr>()) };
        let buf = unsafe { slice::from_raw_parts_mut(frame.add(net), len) };

        let result = callback(buf, &addr);

        self.release_frame();
        result?;

        Ok(true)
    }

    fn frame_ready(&self) -> bool {
        self.frame_status().load(Ordering::Acquire) & (libc::TP_STATUS_USER as usize) != 0
    }

    fn release_frame(&mut self) {
        self.frame_status().store(libc::TP_STATUS_KERNEL as usize, Ordering::Release);
        self.current = (self.current + 1) % self.geometry.frame_count;
    }

    /// The status word is the first field of the frame's `tpacket_hdr`.
    /// The kernel writes it concurrently with our reads, so it is only
    /// ever touched as an atomic.
    fn frame_status(&self) -> &AtomicUsize {
        // SAFETY: the frame base is alignment-compatible with the header's
        // leading unsigned long, and atomics keep the racing kernel store
        // well-defined.
        unsafe { &*self.frame_ptr().cast::<AtomicUsize>().cast_const() }
    }

    fn frame_ptr(&self) -> *mut u8 {
        // SAFETY: current is always below frame_count, so the offset stays
        // inside the mapping.
        unsafe { self.map.as_ptr().add(self.current * self.geometry.frame_size) }
    }
}

impl Drop for RxRing<'_> {
    fn drop(&mut self) {
        // SAFETY: unmapping the region mapped at construction.
        if unsafe { libc::munmap(self.map.as_ptr().cast(), self.geometry.map_size()) } < 0 {
            warn!("Failed to unmap ring: {}", io::Error::last_os_error());
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn alignment() {
        assert_eq!(tpacket_align(1), 16);
        assert_eq!(tpacket_align(16), 16);
        assert_eq!(tpacket_align(17), 32);
        assert_eq!(tpacket_align(mem::size_of::<libc::tpacket_hdr>()) % 16, 0);
    }

    #[test]
    fn generator_geometry() {
        // 2048-byte frames, 1024 of them, on a 4 KiB page
        let g = RingGeometry::new(11, 1024, 4096);

        assert_eq!(g, RingGeometry {
            frame_size: 2048,
            frame_count: 1024,
            block_size: 4096,
            block_count: 512,
        });
        assert_eq!(g.map_size(), 2 * 1024 * 1024);
    }

    #[test]
    fn echo_geometry() {
        // 512-byte frames, 4096 of them, on a 4 KiB page
        let g = RingGeometry::new(9, 4096, 4096);

        assert_eq!(g, RingGeometry {
            frame_size: 512,
            frame_count: 4096,
            block_size: 4096,
            block_count: 512,
        });
    }

    #[test]
    fn frames_larger_than_a_page() {
        let g = RingGeometry::new(13, 16, 4096);

        assert_eq!(g.block_size, 8192);
        assert_eq!(g.block_count, 16);
        assert_eq!(g.block_size * g.block_count, g.map_size());
    }
}
