//! The sending half of a worker pair: builds batches of packets, pushes
//! them through the socket, and paces itself against the shared rate.

use std::convert::TryFrom;
use std::sync::atomic::Ordering;

use log::*;

use dns_transport::time::{Stamp, NANOS_PER_SEC};
use dns_transport::{Error, HeaderPair, LinkAddr, PacketSocket};

use crate::state::SharedState;


/// How many source ports each thread cycles through. Spreading queries
/// over a range of ports keeps receive-side flow hashing busy.
const PORTS_PER_THREAD: u16 = 4096;

/// The bottom of the source port range; thread ranges stack above it.
const PORT_BASE: u16 = 16384;


/// A cursor that deals queries out across the sender threads: thread `i`
/// starts at position `i` and steps by the thread count, so every record
/// gets sent and no two threads send the same one in the same pass.
#[derive(PartialEq, Debug)]
pub struct QueryCursor {
    position: usize,
    step: usize,
    length: usize,
}

impl QueryCursor {

    /// A cursor over `length` records starting at `start`, visiting
    /// every `step`th one.
    pub fn new(start: usize, step: usize, length: usize) -> Self {
        assert!(length > 0, "cannot cursor over an empty corpus");
        Self { position: start % length, step, length }
    }

    /// The current position, stepping the cursor along for next time.
    pub fn advance(&mut self) -> usize {
        let current = self.position;

        self.position += self.step;
        while self.position >= self.length {
            self.position -= self.length;
        }

        current
    }
}


/// One sender thread's worth of state.
pub struct Sender<'pipeline> {
    shared: &'pipeline SharedState,
    socket: &'pipeline PacketSocket,
    index: usize,
    cursor: QueryCursor,
    port_base: u16,
    port_offset: u16,
    ip_id: u16,
    tx_count: u64,
}

impl<'pipeline> Sender<'pipeline> {

    /// Sets up the sender with index `index` of the pipeline: its own
    /// slice of the source port space and its own starting point in the
    /// query corpus.
    pub fn new(shared: &'pipeline SharedState, socket: &'pipeline PacketSocket, index: usize) -> Self {
        let cursor = QueryCursor::new(index, shared.thread_count, shared.queries.len());
        let port_base = PORT_BASE.wrapping_add(PORTS_PER_THREAD.wrapping_mul(index as u16));

        Self {
            shared, socket, index, cursor, port_base,
            port_offset: 0,
            ip_id: 0,
            tx_count: 0,
        }
    }

    /// Waits for the start signal, then sends batches until told to stop.
    ///
    /// Pacing works on the monotonic clock: after each batch the sender
    /// sleeps to an absolute deadline one inter-batch interval away, and
    /// whatever the scheduler made it oversleep is knocked off the next
    /// deadline, so the error feeds back instead of accumulating.
    pub fn run(mut self) -> Result<(), Error> {
        let addr = LinkAddr::unicast(self.shared.ifindex, self.shared.dest_mac);

        let batch_size = self.shared.batch_size;
        let mut headers = Vec::with_capacity(batch_size);
        let mut payloads = Vec::with_capacity(batch_size);

        self.shared.start.wait();
        trace!("Sender {} starting", self.index);

        let mut now = Stamp::now()?;
        let mut error = 0_i64;

        while !self.shared.stopped() {
            headers.clear();
            payloads.clear();

            for _ in 0 .. batch_size {
                let position = self.cursor.advance();
                let query = &self.shared.queries[position];
                let payload_len = u16::try_from(query.len()).expect("query bigger than a packet");

                headers.push(HeaderPair::new(
                    self.shared.src_ip,
                    self.shared.dest_ip,
                    self.source_port(),
                    self.shared.dest_port,
                    self.next_ip_id(),
                    payload_len,
                ));
                payloads.push(query.bytes());
            }

            let sent = self.socket.send_batch(&headers, &payloads, &addr)?;
            self.tx_count += sent as u64;
            self.shared.tx_count.fetch_add(sent as u32, Ordering::Relaxed);

            let rate = self.shared.rate.load(Ordering::Relaxed).max(1);
            let delta = NANOS_PER_SEC * (batch_size * self.shared.thread_count) as i64
                        / i64::from(rate);

            let next = now + (delta - error);
            next.sleep_until()?;
            now = Stamp::now()?;
            error = now - next;
        }

        debug!("Sender {} sent {} packets", self.index, self.tx_count);
        Ok(())
    }

    fn source_port(&mut self) -> u16 {
        let port = self.port_base.wrapping_add(self.port_offset);
        self.port_offset = (self.port_offset + 1) % PORTS_PER_THREAD;
        port
    }

    fn next_ip_id(&mut self) -> u16 {
        let id = self.ip_id;
        self.ip_id = self.ip_id.wrapping_add(1);
        id
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursor_deals_across_threads() {
        let mut first = QueryCursor::new(0, 2, 5);
        let mut second = QueryCursor::new(1, 2, 5);

        let a: Vec<_> = (0 .. 5).map(|_| first.advance()).collect();
        let b: Vec<_> = (0 .. 5).map(|_| second.advance()).collect();

        assert_eq!(a, vec![ 0, 2, 4, 1, 3 ]);
        assert_eq!(b, vec![ 1, 3, 0, 2, 4 ]);
    }

    #[test]
    fn cursor_wraps_on_exact_boundary() {
        // landing exactly on the length must wrap to zero, not index
        // one past the end
        let mut cursor = QueryCursor::new(0, 3, 6);

        let seen: Vec<_> = (0 .. 4).map(|_| cursor.advance()).collect();
        assert_eq!(seen, vec![ 0, 3, 0, 3 ]);
    }

    #[test]
    fn cursor_with_more_threads_than_queries() {
        let mut cursor = QueryCursor::new(4, 5, 3);

        let seen: Vec<_> = (0 .. 4).map(|_| cursor.advance()).collect();
        assert!(seen.iter().all(|position| *position < 3));
    }

    #[test]
    fn single_thread_visits_everything() {
        let mut cursor = QueryCursor::new(0, 1, 4);

        let seen: Vec<_> = (0 .. 8).map(|_| cursor.advance()).collect();
        assert_eq!(seen, vec![ 0, 1, 2, 3, 0, 1, 2, 3 ]);
    }
}
