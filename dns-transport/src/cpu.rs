//! Pinning worker threads to CPUs.
//!
//! The pipeline runs one sender and one receiver per CPU, and the fanout
//! group routes received packets by the CPU that picked them up — so the
//! whole scheme only works if each worker actually stays on its CPU.

use std::io;
use std::mem;

use crate::Error;


/// Restricts the calling thread to the single given CPU.
pub fn pin_current_thread(cpu: usize) -> Result<(), Error> {
    if cpu >= libc::CPU_SETSIZE as usize {
        return Err(Error::Syscall {
            call: "sched_setaffinity",
            source: io::Error::from_raw_os_error(libc::EINVAL),
        });
    }

    // SAFETY: cpu_set_t is plain data; all-zeroes is the empty set, and
    // CPU_SET writes within its bounds for any cpu below CPU_SETSIZE.
    let set = unsafe {
        let mut set: libc::cpu_set_t = mem::zeroed();
        libc::CPU_SET(cpu, &mut set);
        set
    };

    // SAFETY: a pid of zero targets the calling thread, and the set
    // pointer is valid for the duration of the call.
    let res = unsafe {
        libc::sched_setaffinity(0, mem::size_of::<libc::cpu_set_t>(), &set)
    };

    if res < 0 {
        Err(Error::syscall("sched_setaffinity"))
    }
    else {
        Ok(())
    }
}
