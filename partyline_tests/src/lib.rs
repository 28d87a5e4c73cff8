// Test support for end-to-end relay scenarios.
//
// `TestChatClient` wraps the real `RelayClient` — the same code path the
// `client` binary uses — with synchronous helpers suited to assertions:
// bounded reads, drain-until-quiet, and expect-exact-bytes. The only
// test-specific logic is the timeout handling; everything on the wire goes
// through the production client.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use partyline_relay::{Endpoint, RelayClient};

/// How long `expect_bytes` keeps reading before giving up.
const EXPECT_DEADLINE: Duration = Duration::from_secs(5);

/// How long a drain read waits before concluding the line is quiet.
const QUIET_WINDOW: Duration = Duration::from_millis(150);

pub struct TestChatClient {
    client: RelayClient,
}

impl TestChatClient {
    pub fn connect(endpoint: &Endpoint) -> Self {
        let client = RelayClient::connect(endpoint).unwrap();
        client.set_read_timeout(Some(QUIET_WINDOW)).unwrap();
        Self { client }
    }

    pub fn send(&mut self, bytes: &[u8]) {
        self.client.send(bytes).unwrap();
    }

    /// Read until exactly `expected` has arrived (tolerating split reads),
    /// then assert nothing extra is queued behind it.
    pub fn expect_bytes(&mut self, expected: &[u8]) {
        let deadline = Instant::now() + EXPECT_DEADLINE;
        let mut received = Vec::new();
        while received.len() < expected.len() {
            assert!(
                Instant::now() < deadline,
                "timed out waiting for {expected:?}; got {received:?}"
            );
            let mut buf = [0u8; 256];
            match self.client.recv(&mut buf) {
                Ok(0) => panic!("connection closed while waiting for {expected:?}"),
                Ok(count) => received.extend_from_slice(&buf[..count]),
                Err(err) if is_timeout(&err) => {}
                Err(err) => panic!("read failed: {err}"),
            }
        }
        assert_eq!(received, expected);
        self.expect_silence();
    }

    /// Assert nothing arrives within the quiet window.
    pub fn expect_silence(&mut self) {
        let mut buf = [0u8; 256];
        match self.client.recv(&mut buf) {
            Ok(0) => panic!("connection closed while expecting silence"),
            Ok(count) => panic!("expected silence, read {:?}", &buf[..count]),
            Err(err) => assert!(is_timeout(&err), "read failed: {err}"),
        }
    }

    /// Drain anything queued, then assert the relay has closed this
    /// connection.
    pub fn expect_disconnected(&mut self) {
        let deadline = Instant::now() + EXPECT_DEADLINE;
        loop {
            assert!(Instant::now() < deadline, "timed out waiting for EOF");
            let mut buf = [0u8; 256];
            match self.client.recv(&mut buf) {
                Ok(0) => return,
                Ok(_) => {}
                Err(err) if is_timeout(&err) => {}
                // A reset also counts as the relay being gone.
                Err(err) if err.kind() == ErrorKind::ConnectionReset => return,
                Err(err) => panic!("read failed: {err}"),
            }
        }
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
