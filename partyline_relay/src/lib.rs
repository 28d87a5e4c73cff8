// partyline_relay — single-process party-line byte relay.
//
// The relay accepts an unbounded set of stream connections (TCP or
// Unix-domain), multiplexes readiness over all of them with one blocking
// wait per iteration, and broadcasts whatever bytes one peer sends to every
// other peer. Delivery is best-effort with no framing and no persistence:
// a dropped peer simply stops receiving, and everyone else keeps talking.
//
// Module overview:
// - `endpoint.rs`:  Address resolution and the transport-neutral
//                   `Listener`/`Stream` wrappers. The only place the TCP vs
//                   Unix-domain split is visible.
// - `readiness.rs`: Bounded `poll(2)` wait and per-member classification
//                   (no event / readable / closed).
// - `shutdown.rs`:  Self-pipe shutdown source — termination requests become
//                   readiness events the loop observes like any socket.
// - `table.rs`:     The connection table (listener, shutdown source, peers
//                   in acceptance order) and the broadcast relay with
//                   per-recipient failure isolation.
// - `server.rs`:    The event loop: snapshot dispatch, deferred compaction,
//                   `start_relay`/`RelayHandle` for embedding.
// - `client.rs`:    Library client plus the poll-driven terminal bridge
//                   used by the `client` binary.
//
// The relay runs as a standalone binary (`main.rs`) or embedded via
// `start_relay`; either way a single thread owns the table and the loop.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod readiness;
pub mod server;
pub mod shutdown;
pub mod table;

pub use client::RelayClient;
pub use endpoint::{BoundAddr, Endpoint};
pub use error::RelayError;
pub use server::{RelayConfig, RelayHandle, run_relay, start_relay};
