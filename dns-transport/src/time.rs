//! Monotonic-clock arithmetic and absolute sleeps.
//!
//! The pacing loop needs to sleep until a *point in time* rather than for
//! a duration, so that scheduling jitter in one batch can be paid back in
//! the next instead of accumulating. The standard library only offers
//! relative sleeps, hence this thin layer over `clock_nanosleep` with
//! `TIMER_ABSTIME`.

use std::fmt;
use std::io;
use std::ops::{Add, Sub};
use std::ptr;

use crate::Error;


/// The number of nanoseconds in a second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;


/// A point on the monotonic clock, as a second count and a nanosecond
/// remainder that is always in `0..1e9`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Debug, Copy, Clone)]
pub struct Stamp {
    sec: i64,
    nsec: i64,
}

impl Stamp {

    /// Reads the monotonic clock.
    pub fn now() -> Result<Self, Error> {
        let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };

        // SAFETY: ts is valid for writes for the duration of the call.
        if unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) } < 0 {
            return Err(Error::syscall("clock_gettime"));
        }

        Ok(Self { sec: ts.tv_sec, nsec: ts.tv_nsec })
    }

    /// Sleeps until this point on the monotonic clock, coming straight
    /// back if it has already passed. Interrupted sleeps are resumed;
    /// the absolute deadline makes that loss-free.
    pub fn sleep_until(self) -> Result<(), Error> {
        let ts = libc::timespec { tv_sec: self.sec, tv_nsec: self.nsec };

        loop {
            // SAFETY: ts is a valid timespec for the duration of the call.
            let res = unsafe {
                libc::clock_nanosleep(libc::CLOCK_MONOTONIC, libc::TIMER_ABSTIME, &ts, ptr::null_mut())
            };

            match res {
                0 => return Ok(()),
                e if e == libc::EINTR => continue,
                e => return Err(Error::Syscall {
                    call: "clock_nanosleep",
                    source: io::Error::from_raw_os_error(e),
                }),
            }
        }
    }

    fn normalised(sec: i64, nsec: i64) -> Self {
        Self {
            sec: sec + nsec.div_euclid(NANOS_PER_SEC),
            nsec: nsec.rem_euclid(NANOS_PER_SEC),
        }
    }
}

/// Adding a (possibly negative) nanosecond count to a stamp.
impl Add<i64> for Stamp {
    type Output = Self;

    fn add(self, nanos: i64) -> Self {
        Self::normalised(self.sec, self.nsec + nanos)
    }
}

/// The nanosecond distance between two stamps.
impl Sub for Stamp {
    type Output = i64;

    fn sub(self, other: Self) -> i64 {
        (self.sec - other.sec) * NANOS_PER_SEC + (self.nsec - other.nsec)
    }
}

/// Stamps print as the stats lines need them: seconds, a dot, and the
/// zero-padded nanosecond remainder.
impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.sec, self.nsec)
    }
}


/// Sleeps for the given number of whole seconds, resuming after
/// interruptions with whatever the kernel says is left.
pub fn sleep_for(seconds: u32) -> Result<(), Error> {
    let mut ts = libc::timespec { tv_sec: i64::from(seconds), tv_nsec: 0 };

    loop {
        let mut remaining = libc::timespec { tv_sec: 0, tv_nsec: 0 };

        // SAFETY: both timespecs are valid for the duration of the call.
        let res = unsafe {
            libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &ts, &mut remaining)
        };

        match res {
            0 => return Ok(()),
            e if e == libc::EINTR => {
                ts = remaining;
                continue;
            }
            e => return Err(Error::Syscall {
                call: "clock_nanosleep",
                source: io::Error::from_raw_os_error(e),
            }),
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn stamp(sec: i64, nsec: i64) -> Stamp {
        Stamp { sec, nsec }
    }

    #[test]
    fn add_carries() {
        assert_eq!(stamp(4, 999_999_999) + 2, stamp(5, 1));
        assert_eq!(stamp(4, 0) + NANOS_PER_SEC, stamp(5, 0));
        assert_eq!(stamp(4, 500_000_000) + 3 * NANOS_PER_SEC, stamp(7, 500_000_000));
    }

    #[test]
    fn add_negative_borrows() {
        assert_eq!(stamp(4, 1) + -2, stamp(3, 999_999_999));
        assert_eq!(stamp(4, 0) + -NANOS_PER_SEC, stamp(3, 0));
    }

    #[test]
    fn subtract() {
        assert_eq!(stamp(5, 1) - stamp(4, 999_999_999), 2);
        assert_eq!(stamp(4, 999_999_999) - stamp(5, 1), -2);
        assert_eq!(stamp(10, 0) - stamp(10, 0), 0);
    }

    #[test]
    fn pacing_round_trip() {
        // the sender's feedback loop: the error measured after a sleep is
        // subtracted from the next deadline
        let now = stamp(100, 900_000_000);
        let next = now + 250_000_000;

        assert_eq!(next, stamp(101, 150_000_000));

        let woke = next + 40_000;  // scheduling jitter
        let error = woke - next;
        assert_eq!(error, 40_000);

        assert_eq!(woke + (250_000_000 - error), stamp(101, 400_000_000));
    }

    #[test]
    fn display_pads_nanoseconds() {
        assert_eq!(stamp(86400, 12).to_string(), "86400.000000012");
        assert_eq!(stamp(1, 999_999_999).to_string(), "1.999999999");
    }
}
