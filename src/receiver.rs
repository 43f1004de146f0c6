//! The receiving half of a worker pair: takes frames off the ring and
//! counts them. Replies are never parsed, only tallied.

use std::sync::atomic::Ordering;

use log::*;

use dns_transport::{Error, PacketSocket};

use crate::state::SharedState;


/// Receive frames are 2 KiB, enough for any reply the generator's
/// queries could provoke without EDNS payloads larger than that.
const FRAME_BITS: u32 = 11;

/// How many frames the ring holds.
const FRAME_COUNT: usize = 1024;

/// How long one poll is allowed to block, bounding how stale the stop
/// flag can get.
const POLL_TIMEOUT_MS: i32 = 10;


/// One receiver thread's worth of state.
pub struct Receiver<'pipeline> {
    shared: &'pipeline SharedState,
    socket: &'pipeline PacketSocket,
    index: usize,
}

impl<'pipeline> Receiver<'pipeline> {

    pub fn new(shared: &'pipeline SharedState, socket: &'pipeline PacketSocket, index: usize) -> Self {
        Self { shared, socket, index }
    }

    /// Maps the ring and counts frames until told to stop.
    pub fn run(self) -> Result<(), Error> {
        let mut ring = self.socket.rx_ring(FRAME_BITS, FRAME_COUNT)?;
        let mut rx_count = 0_u64;

        let shared = self.shared;
        while !shared.stopped() {
            let counted = ring.next(POLL_TIMEOUT_MS, |_buf, _addr| {
                shared.rx_count.fetch_add(1, Ordering::Relaxed);
                Ok(())
            })?;

            if counted {
                rx_count += 1;
            }
        }

        debug!("Receiver {} counted {} replies", self.index, rx_count);
        Ok(())
    }
}
