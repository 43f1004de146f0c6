//! The rate adapter: a feedback loop that steers the sending rate
//! towards the fastest the server can actually answer.
//!
//! Every tick it averages the recent receive counts into a receive rate,
//! then sets the target to the midpoint of that and the best rate seen so
//! far, plus the configured increment. At steady state the target sits
//! exactly one increment above what comes back — a small, stable loss
//! margin that marks the server's limit. Ramp mode skips the feedback and
//! just climbs.

use std::collections::VecDeque;
use std::sync::atomic::Ordering;

use dns_transport::time::{Stamp, NANOS_PER_SEC};
use dns_transport::Error;

use crate::state::SharedState;


/// Nanoseconds between adapter ticks.
const TICK_NS: i64 = 100_000_000;

/// How many ticks the rolling average looks back over.
const WINDOW: usize = 20;


/// A rolling window of receive counts.
#[derive(PartialEq, Debug)]
pub struct RateWindow {
    samples: VecDeque<u32>,
    capacity: usize,
}

impl RateWindow {

    pub fn new(capacity: usize) -> Self {
        Self { samples: VecDeque::with_capacity(capacity + 1), capacity }
    }

    /// Adds a sample, dropping the oldest once the window is full.
    pub fn push(&mut self, sample: u32) {
        self.samples.push_back(sample);
        if self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// The mean of the samples currently in the window.
    pub fn average(&self) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.samples.iter().map(|s| u64::from(*s)).sum();
        (sum / self.samples.len() as u64) as u32
    }

    /// Whether the window has seen enough samples to be trusted.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }
}


/// Scales a per-tick count up to a per-second rate.
fn per_second(count: u32) -> u32 {
    ((u64::from(count) * NANOS_PER_SEC as u64) / TICK_NS as u64) as u32
}


/// The adapter thread.
pub fn run(shared: &SharedState) -> Result<(), Error> {
    let mut window = RateWindow::new(WINDOW);
    let mut rx_max = 0_u32;
    let mut peak = 0_u32;

    shared.start.wait();
    let mut next = Stamp::now()?;

    loop {
        next = next + TICK_NS;
        next.sleep_until()?;

        window.push(shared.rx_count.load(Ordering::Relaxed));
        let rx_rate = per_second(window.average());
        rx_max = rx_max.max(rx_rate);

        // the reported peak ignores the noisy ticks before the window
        // first fills
        if window.is_full() {
            peak = peak.max(rx_rate);
        }

        println!("{} {} {} {} {}",
                 next,
                 shared.rate.load(Ordering::Relaxed),
                 rx_rate,
                 shared.tx_count.load(Ordering::Relaxed),
                 shared.rx_count.load(Ordering::Relaxed));

        let rate = if shared.ramp {
            shared.rate.load(Ordering::Relaxed).saturating_add(shared.increment)
        }
        else {
            let sought = 0.5 * (f64::from(rx_rate) + f64::from(rx_max))
                       + f64::from(shared.increment);
            sought as u32
        };
        shared.rate.store(rate, Ordering::Relaxed);

        shared.rx_count.store(0, Ordering::Relaxed);
        shared.tx_count.store(0, Ordering::Relaxed);

        if shared.stopped() {
            break;
        }
    }

    println!("Peak RX rate = {}", peak);
    Ok(())
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn average_of_partial_window() {
        let mut window = RateWindow::new(4);
        window.push(10);
        window.push(20);

        assert_eq!(window.average(), 15);
        assert!(!window.is_full());
    }

    #[test]
    fn oldest_samples_fall_out() {
        let mut window = RateWindow::new(3);
        for sample in [ 100, 1, 2, 3 ] {
            window.push(sample);
        }

        assert!(window.is_full());
        assert_eq!(window.average(), 2);
    }

    #[test]
    fn per_second_scales_by_tick() {
        // ten ticks to a second
        assert_eq!(per_second(1_000), 10_000);
        assert_eq!(per_second(0), 0);
    }

    #[test]
    fn empty_window_averages_to_zero() {
        assert_eq!(RateWindow::new(8).average(), 0);
    }
}
