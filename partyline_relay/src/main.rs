// CLI entry point for the partyline relay server.
//
// Binds the configured endpoint and runs the relay loop on the main thread.
// Ctrl-C is converted into a write on the shutdown pipe, so the loop
// observes termination through the same readiness wait it uses for I/O and
// unwinds cleanly (every connection closed, a Unix-domain bind path
// removed) before exiting with code 0. Fatal setup or readiness faults
// exit non-zero with a diagnostic.
//
// Usage:
//   relay [OPTIONS]
//     --host <HOST>    Listen host (default: 127.0.0.1)
//     --port <PORT>    Listen port (default: 7878)
//     --unix <PATH>    Listen on a Unix-domain socket instead of TCP

use std::process;

use tracing::info;

use partyline_relay::endpoint::Listener;
use partyline_relay::error::RelayError;
use partyline_relay::server::RelayConfig;
use partyline_relay::shutdown::shutdown_pair;
use partyline_relay::{Endpoint, run_relay};

fn main() {
    init_tracing();
    let config = parse_args();

    if let Err(err) = run(config) {
        eprintln!("relay error: {err}");
        process::exit(1);
    }
}

fn run(config: RelayConfig) -> Result<(), RelayError> {
    let listener = Listener::bind(&config.bind)?;
    let bound = listener.bound().map_err(|source| RelayError::Bind {
        target: config.bind.to_string(),
        source,
    })?;
    let (handle, signal) = shutdown_pair().map_err(RelayError::ShutdownSetup)?;

    ctrlc::set_handler(move || handle.trigger())
        .map_err(|err| RelayError::ShutdownSetup(std::io::Error::other(err)))?;

    info!("relay listening on {bound}");
    run_relay(listener, signal, config.poll_timeout)
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Parse command-line arguments into a `RelayConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> RelayConfig {
    let mut config = RelayConfig::default();
    let mut host = "127.0.0.1".to_string();
    let mut port = 7878u16;
    let mut unix_path = None;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires a value");
                    process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    process::exit(1);
                });
            }
            "--unix" => {
                i += 1;
                unix_path = args.get(i).map(std::path::PathBuf::from).or_else(|| {
                    eprintln!("--unix requires a path");
                    process::exit(1);
                });
            }
            "--help" | "-h" => {
                print_usage();
                process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    config.bind = match unix_path {
        Some(path) => Endpoint::Unix { path },
        None => Endpoint::Tcp { host, port },
    };
    config
}

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <HOST>    Listen host (default: 127.0.0.1)");
    println!("  --port <PORT>    Listen port (default: 7878)");
    println!("  --unix <PATH>    Listen on a Unix-domain socket instead of TCP");
    println!("  --help, -h       Show this help");
}
