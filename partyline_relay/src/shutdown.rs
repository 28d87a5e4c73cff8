// Shutdown coordination through the readiness wait.
//
// An external termination request — Ctrl-C, or a programmatic stop — must be
// observable by the event loop without a second synchronization primitive.
// The classic self-pipe does this: the read end sits in the connection table
// and is polled like any socket; a trigger writes one byte to the write end,
// making the read end readable on the next wait.
//
// `trigger` is a single nonblocking `write(2)`, which is async-signal-safe,
// so the `ctrlc` handler can call it directly. The pipe is never drained:
// observing readability *is* the signal, and once the loop has seen it the
// loop's own exit is the cleanup. Repeated triggers at worst fill the pipe
// and become no-ops, so a second interrupt during teardown does nothing.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;

/// Read end of the shutdown pipe. Lives in the connection table as the
/// shutdown source; becomes readable once a termination request arrives.
pub struct ShutdownSignal {
    fd: OwnedFd,
}

impl AsRawFd for ShutdownSignal {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Cloneable trigger for the shutdown pipe. Safe to call from a signal
/// handler and from any thread; triggering more than once is harmless.
#[derive(Clone)]
pub struct ShutdownHandle {
    fd: Arc<OwnedFd>,
}

impl ShutdownHandle {
    /// Request shutdown. Never blocks and never fails visibly: a full pipe
    /// means a request is already pending, and a closed read end means the
    /// loop is already gone.
    pub fn trigger(&self) {
        let byte = [1u8];
        unsafe {
            libc::write(self.fd.as_raw_fd(), byte.as_ptr().cast(), 1);
        }
    }
}

/// Create the shutdown pipe: a trigger handle and the pollable signal end.
pub fn shutdown_pair() -> io::Result<(ShutdownHandle, ShutdownSignal)> {
    let mut fds: [libc::c_int; 2] = [0; 2];
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    // Wrap immediately so error paths below close both ends.
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    set_cloexec(read_end.as_raw_fd())?;
    set_cloexec(write_end.as_raw_fd())?;
    set_nonblocking(write_end.as_raw_fd())?;

    Ok((
        ShutdownHandle {
            fd: Arc::new(write_end),
        },
        ShutdownSignal { fd: read_end },
    ))
}

fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::readiness::{self, Readiness};

    fn readiness_of(signal: &ShutdownSignal) -> Option<Readiness> {
        let mut fds = [readiness::poll_fd(signal.as_raw_fd())];
        readiness::wait(&mut fds, Duration::from_millis(200)).unwrap();
        readiness::classify(fds[0].revents)
    }

    #[test]
    fn trigger_makes_signal_readable() {
        let (handle, signal) = shutdown_pair().unwrap();
        assert_eq!(readiness_of(&signal), None);
        handle.trigger();
        assert_eq!(readiness_of(&signal), Some(Readiness::Readable));
    }

    #[test]
    fn repeated_triggers_are_harmless() {
        let (handle, signal) = shutdown_pair().unwrap();
        for _ in 0..10_000 {
            handle.trigger();
        }
        assert_eq!(readiness_of(&signal), Some(Readiness::Readable));
    }

    #[test]
    fn cloned_handle_triggers_the_same_pipe() {
        let (handle, signal) = shutdown_pair().unwrap();
        let clone = handle.clone();
        drop(handle);
        clone.trigger();
        assert_eq!(readiness_of(&signal), Some(Readiness::Readable));
    }

    #[test]
    fn trigger_after_signal_dropped_does_not_panic() {
        let (handle, signal) = shutdown_pair().unwrap();
        drop(signal);
        handle.trigger();
    }
}
