// Error taxonomy for the relay.
//
// Only process-ending conditions live here: failures that mean the server
// cannot run at all (resolution, bind, the readiness primitive itself).
// Per-connection trouble — a failed accept, a peer read error or EOF, a
// failed broadcast write — is never an error value; the loop logs it and
// keeps serving the remaining connections.

use std::io;

use thiserror::Error;

/// Fatal relay errors. Any of these terminates the server with a non-zero
/// exit code when running as a binary.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listen host could not be resolved to a usable address.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },

    /// Binding or inspecting the listening endpoint failed.
    #[error("failed to bind {target}: {source}")]
    Bind { target: String, source: io::Error },

    /// The shutdown pipe could not be created or configured.
    #[error("failed to set up the shutdown signal: {0}")]
    ShutdownSetup(io::Error),

    /// The readiness wait itself failed (not a timeout). The polling
    /// primitive is assumed-reliable infrastructure, so this indicates an
    /// unrecoverable environment fault.
    #[error("readiness wait failed: {0}")]
    Wait(io::Error),

    /// The listening endpoint reported hang-up or error. Without a working
    /// listener the server cannot serve, so this is treated like a wait
    /// failure rather than a per-connection event.
    #[error("listening endpoint reported hang-up or error")]
    ListenerLost,
}
