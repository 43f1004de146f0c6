//! State shared between every thread in the pipeline, and the timer
//! thread that walks it through its lifecycle.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Condvar, Mutex};

use log::*;

use dns::QueryFile;
use dns_transport::time;
use dns_transport::Error;


/// Everything the worker threads share. The configuration fields are
/// settled before any thread starts and never written again; the
/// counters and the rate are atomics that every thread pokes at freely,
/// as hints rather than synchronisation.
pub struct SharedState {

    /// How many sender/receiver pairs are running.
    pub thread_count: usize,

    /// How many packets each sender builds per sendmmsg call.
    pub batch_size: usize,

    /// The interface everything is bound to.
    pub ifindex: u32,

    /// The UDP port the server is listening on.
    pub dest_port: u16,

    /// The address queries claim to come from.
    pub src_ip: Ipv4Addr,

    /// The address of the server under test.
    pub dest_ip: Ipv4Addr,

    /// The hardware address packets are steered towards.
    pub dest_mac: [u8; 6],

    /// The compiled query corpus, read-only from here on.
    pub queries: QueryFile,

    /// How many seconds to run for after the start signal.
    pub runtime: u32,

    /// How much the rate adapter adds each tick.
    pub increment: u32,

    /// Whether the adapter ramps unconditionally.
    pub ramp: bool,

    /// The current target rate, in packets per second across all threads.
    pub rate: AtomicU32,

    /// Replies counted since the last adapter tick.
    pub rx_count: AtomicU32,

    /// Packets sent since the last adapter tick.
    pub tx_count: AtomicU32,

    /// The cooperative shutdown flag.
    pub stop: AtomicBool,

    /// The gate every worker waits behind until the pipeline starts.
    pub start: StartGate,
}

impl SharedState {

    /// Whether the pipeline has been told to wind down.
    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}


/// A one-shot **start gate**: workers block on `wait` until some other
/// thread calls `open`, after which every wait returns immediately.
///
/// Starting everyone at once like this means each worker takes its clock
/// baseline right after the signal, so the pacing loops all begin from
/// the same place.
#[derive(Default)]
pub struct StartGate {
    started: Mutex<bool>,
    cond: Condvar,
}

impl StartGate {

    /// Creates a gate in the closed position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the gate is open.
    pub fn wait(&self) {
        let mut started = self.started.lock().unwrap();
        while !*started {
            started = self.cond.wait(started).unwrap();
        }
    }

    /// Opens the gate and wakes everyone behind it.
    pub fn open(&self) {
        *self.started.lock().unwrap() = true;
        self.cond.notify_all();
    }
}


/// The timer thread: gives every worker a second to reach the gate, opens
/// it, lets the pipeline run for the configured time, then raises the
/// stop flag and lets the workers wind down on their own.
pub fn life_timer(shared: &SharedState) -> Result<(), Error> {
    time::sleep_for(1)?;
    shared.start.open();
    info!("Pipeline started, running for {} seconds", shared.runtime);

    time::sleep_for(shared.runtime)?;
    shared.stop.store(true, Ordering::Relaxed);
    info!("Stop signalled");

    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn gate_releases_waiters() {
        let gate = StartGate::new();
        let through = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0 .. 4 {
                scope.spawn(|| {
                    gate.wait();
                    through.fetch_add(1, Ordering::SeqCst);
                });
            }

            gate.open();
        });

        assert_eq!(through.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn open_gate_does_not_block() {
        let gate = StartGate::new();
        gate.open();
        gate.wait();
        gate.wait();
    }
}
