// The event loop and dispatcher for the relay server.
//
// Architecture: a single thread owns the connection table and runs the loop.
// Each iteration blocks on one bounded readiness wait over the whole table,
// snapshots the ready set, and dispatches each ready member in ascending
// slot order: accept on the listener, read-and-relay on a peer, stop on the
// shutdown source. All removals discovered during a pass — disconnected
// peers and failed broadcast recipients alike — are deferred to a sweep at
// the end of the pass, applied highest slot first, so slot numbers stay
// valid for every entry in the snapshot. Naive in-place compaction while
// scanning would either skip the member that shifts into the just-processed
// slot or read the next member twice; the snapshot-and-sweep discipline
// rules both out structurally.
//
// Accepts and reads happen only after a positive readiness indication, so
// the wait is the loop's only blocking point.
//
// Shutdown: the loop finishes the pass in which the shutdown source became
// ready — sibling events in the same snapshot are still honored — then tears
// the table down and returns. Embedders get `start_relay`, which runs the
// loop on one background thread (still the only thread touching the table)
// and hands back a `RelayHandle` for stopping it.

use std::collections::BTreeSet;
use std::io::Read;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::endpoint::{BoundAddr, Endpoint, Listener};
use crate::error::RelayError;
use crate::readiness::{self, Readiness};
use crate::shutdown::{self, ShutdownHandle, ShutdownSignal};
use crate::table::{ConnectionTable, LISTENER_SLOT, SHUTDOWN_SLOT};

/// Upper bound for one peer read. A read that fills the buffer exactly is
/// still one complete logical read; whatever the peer sent beyond it
/// surfaces in the next readiness pass.
pub const READ_BUFFER_LEN: usize = 1024;

/// Configuration for starting a relay server.
pub struct RelayConfig {
    /// Where to listen: a host/port pair or a local-socket path.
    pub bind: Endpoint,
    /// Upper bound for one readiness wait. The loop stays responsive to
    /// termination at this cadence even if no member ever becomes ready.
    pub poll_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: Endpoint::Tcp {
                host: "127.0.0.1".into(),
                port: 7878,
            },
            poll_timeout: Duration::from_secs(3),
        }
    }
}

/// Handle returned by `start_relay` to control the running server.
pub struct RelayHandle {
    shutdown: ShutdownHandle,
    thread: Option<thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// A trigger for the relay's shutdown source, e.g. for a Ctrl-C handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Signal the relay to stop and wait for the loop to unwind. Consuming
    /// the handle makes a second stop unrepresentable; the trigger itself is
    /// idempotent anyway.
    pub fn stop(mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Bind the configured endpoint and run the relay loop on a background
/// thread. Returns a handle for stopping it and the actual bound address
/// (useful when port 0 is used to let the OS pick a free port).
pub fn start_relay(config: RelayConfig) -> Result<(RelayHandle, BoundAddr), RelayError> {
    let listener = Listener::bind(&config.bind)?;
    let bound = listener.bound().map_err(|source| RelayError::Bind {
        target: config.bind.to_string(),
        source,
    })?;
    let (handle, signal) = shutdown::shutdown_pair().map_err(RelayError::ShutdownSetup)?;

    let poll_timeout = config.poll_timeout;
    let thread = thread::spawn(move || {
        if let Err(err) = run_relay(listener, signal, poll_timeout) {
            error!(error = %err, "relay loop terminated");
        }
    });

    Ok((
        RelayHandle {
            shutdown: handle,
            thread: Some(thread),
        },
        bound,
    ))
}

/// Run the relay loop on the calling thread until the shutdown source is
/// observed (clean return) or a fatal fault occurs. On clean exit every
/// member descriptor is closed and a Unix-domain bind path is removed.
pub fn run_relay(
    listener: Listener,
    signal: ShutdownSignal,
    poll_timeout: Duration,
) -> Result<(), RelayError> {
    let mut table = ConnectionTable::new(listener, signal);
    info!("relay loop running");

    loop {
        let mut fds = table.pollfds();
        let ready_count = readiness::wait(&mut fds, poll_timeout).map_err(RelayError::Wait)?;
        if ready_count == 0 {
            continue;
        }

        // Snapshot the ready set before any mutation; slot numbers in the
        // snapshot stay valid for the whole pass because removals are
        // deferred and additions only append.
        let ready: Vec<(usize, Readiness)> = fds
            .iter()
            .enumerate()
            .filter_map(|(slot, fd)| readiness::classify(fd.revents).map(|r| (slot, r)))
            .collect();

        if run_pass(&mut table, &ready)? {
            break;
        }
    }

    info!(peers = table.peer_count(), "relay stopping");
    table.teardown();
    Ok(())
}

/// Dispatch one readiness snapshot. Returns `true` once the shutdown source
/// has been observed; the caller exits after this pass.
fn run_pass(table: &mut ConnectionTable, ready: &[(usize, Readiness)]) -> Result<bool, RelayError> {
    let mut doomed: BTreeSet<usize> = BTreeSet::new();
    let mut stopping = false;

    for &(slot, readiness) in ready {
        match (slot, readiness) {
            // Any event on the shutdown source means stop; the byte in the
            // pipe carries no payload worth reading.
            (SHUTDOWN_SLOT, _) => {
                info!("shutdown requested");
                stopping = true;
            }
            (LISTENER_SLOT, Readiness::Readable) => match table.listener().accept() {
                Ok(stream) => {
                    let slot = table.add(stream);
                    debug!(slot, peers = table.peer_count(), "accepted connection");
                }
                // One failed accept must not bring down existing sessions.
                Err(err) => warn!(error = %err, "accept failed"),
            },
            (LISTENER_SLOT, Readiness::Closed) => return Err(RelayError::ListenerLost),
            (slot, Readiness::Closed) => {
                doomed.insert(slot);
            }
            (slot, Readiness::Readable) => {
                let mut buffer = [0u8; READ_BUFFER_LEN];
                match table.peer_mut(slot).read(&mut buffer) {
                    Ok(0) => {
                        doomed.insert(slot);
                    }
                    Ok(count) => {
                        let failed = table.relay_from(slot, &buffer[..count], &doomed);
                        doomed.extend(failed);
                    }
                    Err(err) => {
                        debug!(slot, error = %err, "peer read failed");
                        doomed.insert(slot);
                    }
                }
            }
        }
    }

    // Deferred compaction: highest slot first keeps the remaining indices
    // valid while each removal shifts the peers above it down.
    for &slot in doomed.iter().rev() {
        table.remove(slot);
    }

    Ok(stopping)
}
