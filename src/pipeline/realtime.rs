//! Scheduling priority for the sampler thread

use std::io;

/// Highest SCHED_FIFO priority on Linux
const MAX_FIFO_PRIORITY: u8 = 99;

/// Move the calling thread to SCHED_FIFO at `priority`
///
/// Returns `Ok(false)` when `priority` is 0, meaning normal scheduling was
/// requested. Fails without CAP_SYS_NICE or a suitable RLIMIT_RTPRIO.
#[cfg(target_os = "linux")]
pub fn request_fifo_priority(priority: u8) -> io::Result<bool> {
    if priority == 0 {
        return Ok(false);
    }

    let param = libc::sched_param {
        sched_priority: libc::c_int::from(priority.min(MAX_FIFO_PRIORITY)),
    };
    // SAFETY: `param` outlives the call and pid 0 targets the calling thread.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc == 0 {
        Ok(true)
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
pub fn request_fifo_priority(priority: u8) -> io::Result<bool> {
    if priority == 0 {
        return Ok(false);
    }
    let _ = MAX_FIFO_PRIORITY;
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "SCHED_FIFO is only supported on Linux",
    ))
}
