// Readiness multiplexing over `poll(2)`.
//
// One bounded, blocking wait per loop iteration covers every monitored
// descriptor — sockets, the listener, and the shutdown pipe alike. The
// result for each member is a tri-state: no event, readable, or closed
// (hang-up/error). Results are derived fresh every iteration and never
// persisted.
//
// The bounded timeout keeps the loop responsive even if no member ever
// becomes ready, and guarantees the wait can never wedge forever.

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Per-member readiness outcome for one wait. Members with no pending event
/// are simply absent (`classify` returns `None` for them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// Pending input: bytes to read, a connection to accept, or a shutdown
    /// byte in the pipe.
    Readable,
    /// Hang-up, error, or an invalid descriptor.
    Closed,
}

/// Build a pollfd entry monitoring `fd` for readability. All members are
/// watched with the same interest; writes go straight to the OS buffers.
pub fn poll_fd(fd: RawFd) -> libc::pollfd {
    libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    }
}

/// Block until at least one member is ready or the timeout elapses.
/// Returns the number of members with a non-zero outcome; zero means the
/// timeout elapsed (a no-op iteration for the caller). Interrupted waits
/// are retried; any other failure is surfaced for the caller to treat as
/// fatal.
pub fn wait(fds: &mut [libc::pollfd], timeout: Duration) -> io::Result<usize> {
    let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    loop {
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Classify one member's `revents` into the tri-state. Hang-up and error
/// conditions win over readability: a peer that sent bytes and then hung up
/// is treated as closed, matching the disconnect handling of the loop.
pub fn classify(revents: libc::c_short) -> Option<Readiness> {
    if revents == 0 {
        None
    } else if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        Some(Readiness::Closed)
    } else if revents & libc::POLLIN != 0 {
        Some(Readiness::Readable)
    } else {
        Some(Readiness::Closed)
    }
}
