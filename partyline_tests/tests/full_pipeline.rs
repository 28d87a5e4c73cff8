// End-to-end tests for the relay through its public library API.
//
// Each test starts a real relay with `start_relay` and connects real
// `RelayClient` instances (via the TestChatClient wrapper) — the same code
// paths as the live binaries, with no test doubles on the wire.

use std::thread;
use std::time::Duration;

use partyline_relay::server::{RelayConfig, start_relay};
use partyline_relay::{Endpoint, RelayHandle};
use partyline_tests::TestChatClient;

fn start_test_relay(bind: Endpoint) -> (RelayHandle, Endpoint) {
    let config = RelayConfig {
        bind,
        poll_timeout: Duration::from_millis(200),
    };
    let (handle, bound) = start_relay(config).unwrap();
    (handle, bound.endpoint())
}

fn tcp_loopback() -> Endpoint {
    Endpoint::Tcp {
        host: "127.0.0.1".into(),
        port: 0,
    }
}

/// Let the relay's loop thread process pending accepts and reads.
fn settle() {
    thread::sleep(Duration::from_millis(100));
}

#[test]
fn three_clients_chat_one_departs() {
    let (handle, endpoint) = start_test_relay(tcp_loopback());

    let mut one = TestChatClient::connect(&endpoint);
    let mut two = TestChatClient::connect(&endpoint);
    let mut three = TestChatClient::connect(&endpoint);
    settle();

    // Client 1 speaks; 2 and 3 hear exactly those bytes; 1 hears nothing.
    one.send(b"hello");
    two.expect_bytes(b"hello");
    three.expect_bytes(b"hello");
    one.expect_silence();

    // Client 2 leaves; traffic keeps flowing between the survivors.
    drop(two);
    settle();

    three.send(b"hi");
    one.expect_bytes(b"hi");
    three.expect_silence();

    // Clean shutdown closes the survivors.
    handle.stop();
    one.expect_disconnected();
    three.expect_disconnected();
}

#[test]
fn consecutive_messages_keep_their_byte_sequences() {
    let (handle, endpoint) = start_test_relay(tcp_loopback());

    let mut speaker = TestChatClient::connect(&endpoint);
    let mut listener = TestChatClient::connect(&endpoint);
    settle();

    speaker.send(b"one ");
    listener.expect_bytes(b"one ");
    speaker.send(b"two ");
    listener.expect_bytes(b"two ");
    speaker.send(b"three");
    listener.expect_bytes(b"three");

    handle.stop();
}

#[test]
fn unix_transport_runs_the_same_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.sock");
    let (handle, endpoint) = start_test_relay(Endpoint::Unix { path: path.clone() });

    let mut one = TestChatClient::connect(&endpoint);
    let mut two = TestChatClient::connect(&endpoint);
    settle();

    one.send(b"local bytes");
    two.expect_bytes(b"local bytes");
    one.expect_silence();

    handle.stop();
    assert!(!path.exists(), "bind path should be removed on clean exit");
}

#[test]
fn two_speakers_do_not_hear_themselves() {
    let (handle, endpoint) = start_test_relay(tcp_loopback());

    let mut left = TestChatClient::connect(&endpoint);
    let mut right = TestChatClient::connect(&endpoint);
    settle();

    left.send(b"ping");
    right.expect_bytes(b"ping");
    right.send(b"pong");
    left.expect_bytes(b"pong");

    left.expect_silence();
    right.expect_silence();

    handle.stop();
}
