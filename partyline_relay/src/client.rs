// Library client for the relay.
//
// `RelayClient` is a thin connected stream: raw send/receive with no wire
// format, mirroring the server's byte passthrough. On top of it,
// `run_bridge` multiplexes a local input descriptor (normally stdin) and
// the relay connection with the same bounded readiness wait the server
// uses, forwarding each input read as `"<name>: <bytes>"` and printing
// relay bytes verbatim.
//
// The name prefix is cosmetic, client-side text concatenation — the relay
// itself never frames or rewrites anything.
//
// This module lives in the relay crate because it has zero extra
// dependencies; integration tests and the `client` binary both use it.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use tracing::debug;

use crate::endpoint::{Endpoint, Stream};
use crate::readiness::{self, Readiness};
use crate::server::READ_BUFFER_LEN;

/// How long one bridge wait may block before re-checking for input.
const BRIDGE_POLL_TIMEOUT: Duration = Duration::from_secs(3);

/// A connection to a running relay.
pub struct RelayClient {
    stream: Stream,
}

impl RelayClient {
    /// Connect to a relay at the given endpoint.
    pub fn connect(endpoint: &Endpoint) -> io::Result<Self> {
        let stream = Stream::connect(endpoint)?;
        Ok(Self { stream })
    }

    /// Send raw bytes to the relay.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Receive whatever the relay has for us, up to `buffer.len()` bytes.
    /// Returns 0 on EOF (relay gone).
    pub fn recv(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buffer)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }

    /// Bridge a local input descriptor and the relay connection until either
    /// side ends: input EOF, relay EOF, or a hang-up on either. Input reads
    /// are forwarded with the `"<name>: "` prefix; relay bytes are written
    /// to `output` verbatim.
    pub fn run_bridge<I, W>(&mut self, name: &str, input: &I, output: &mut W) -> io::Result<()>
    where
        I: AsRawFd,
        W: Write,
    {
        let prefix = format!("{name}: ");
        let input_fd = input.as_raw_fd();

        loop {
            let mut fds = [
                readiness::poll_fd(self.stream.as_raw_fd()),
                readiness::poll_fd(input_fd),
            ];
            let ready = readiness::wait(&mut fds, BRIDGE_POLL_TIMEOUT)?;
            if ready == 0 {
                continue;
            }

            match readiness::classify(fds[0].revents) {
                Some(Readiness::Readable) => {
                    let mut buffer = [0u8; READ_BUFFER_LEN];
                    let count = self.stream.read(&mut buffer)?;
                    if count == 0 {
                        debug!("relay closed the connection");
                        return Ok(());
                    }
                    output.write_all(&buffer[..count])?;
                    output.flush()?;
                }
                Some(Readiness::Closed) => {
                    debug!("relay connection hung up");
                    return Ok(());
                }
                None => {}
            }

            match readiness::classify(fds[1].revents) {
                Some(Readiness::Readable) => {
                    let mut buffer = [0u8; READ_BUFFER_LEN];
                    let count = read_fd(input_fd, &mut buffer)?;
                    if count == 0 {
                        debug!("input closed");
                        return Ok(());
                    }
                    let mut message = Vec::with_capacity(prefix.len() + count);
                    message.extend_from_slice(prefix.as_bytes());
                    message.extend_from_slice(&buffer[..count]);
                    self.stream.write_all(&message)?;
                }
                Some(Readiness::Closed) => {
                    debug!("input hung up");
                    return Ok(());
                }
                None => {}
            }
        }
    }
}

/// Unbuffered read on a raw descriptor. Stdin must be read unbuffered here:
/// a buffered reader could hold bytes the readiness wait knows nothing
/// about, and the bridge would stall on them.
fn read_fd(fd: RawFd, buffer: &mut [u8]) -> io::Result<usize> {
    let rc = unsafe { libc::read(fd, buffer.as_mut_ptr().cast(), buffer.len()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(rc as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::{RelayConfig, start_relay};
    use crate::shutdown::shutdown_pair;

    #[test]
    fn send_and_recv_through_a_relay() {
        let (handle, bound) = start_relay(RelayConfig {
            bind: Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 0,
            },
            poll_timeout: Duration::from_millis(100),
        })
        .unwrap();
        let endpoint = bound.endpoint();

        let mut alice = RelayClient::connect(&endpoint).unwrap();
        let mut bob = RelayClient::connect(&endpoint).unwrap();
        bob.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

        // Give the loop a pass to accept both.
        std::thread::sleep(Duration::from_millis(100));

        alice.send(b"hi bob").unwrap();
        let mut buffer = [0u8; 64];
        let count = bob.recv(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"hi bob");

        handle.stop();
    }

    #[test]
    fn bridge_prefixes_input_and_ends_on_relay_eof() {
        let (handle, bound) = start_relay(RelayConfig {
            bind: Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 0,
            },
            poll_timeout: Duration::from_millis(100),
        })
        .unwrap();
        let endpoint = bound.endpoint();

        let mut observer = RelayClient::connect(&endpoint).unwrap();
        observer
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut bridged = RelayClient::connect(&endpoint).unwrap();

        // A pipe stands in for stdin.
        let (input_tx, input_rx) = shutdown_pair().unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let bridge = std::thread::spawn(move || {
            let mut output = Vec::new();
            let result = bridged.run_bridge("bob", &input_rx, &mut output);
            (result, output)
        });

        // Feed one "keystroke" through the pipe and watch it arrive with
        // the name prefix.
        input_tx.trigger();
        let mut buffer = [0u8; 64];
        let count = observer.recv(&mut buffer).unwrap();
        assert_eq!(&buffer[..count], b"bob: \x01");

        // Stopping the relay ends the bridge cleanly.
        handle.stop();
        let (result, output) = bridge.join().unwrap();
        result.unwrap();
        assert!(output.is_empty(), "observer never sent anything");
    }
}
