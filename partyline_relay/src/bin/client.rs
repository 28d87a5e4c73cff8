// Terminal chat client for the partyline relay.
//
// Connects to a running relay and bridges stdin to it: every line you type
// is forwarded to the relay prefixed with your name, and everything other
// peers send is printed verbatim. Exits when the relay goes away or stdin
// closes (Ctrl-D).
//
// Usage:
//   client <NAME> [OPTIONS]
//     --host <HOST>    Relay host (default: 127.0.0.1)
//     --port <PORT>    Relay port (default: 7878)
//     --unix <PATH>    Connect to a Unix-domain socket instead of TCP

use std::io;
use std::process;

use partyline_relay::{Endpoint, RelayClient};

fn main() {
    init_tracing();
    let (name, endpoint) = parse_args();

    let mut client = match RelayClient::connect(&endpoint) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("failed to connect to {endpoint}: {err}");
            process::exit(1);
        }
    };

    println!("connected to {endpoint} as {name}");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    if let Err(err) = client.run_bridge(&name, &stdin, &mut stdout) {
        eprintln!("client error: {err}");
        process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn parse_args() -> (String, Endpoint) {
    let mut name = None;
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
            other if name.is_none() && !other.starts_with('-') => {
                name = Some(other.to_string());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(name) = name else {
        eprintln!("A name is required.");
        print_usage();
        process::exit(1);
    };

    let endpoint = match unix_path {
        Some(path) => Endpoint::Unix { path },
        None => Endpoint::Tcp { host, port },
    };
    (name, endpoint)
}

fn print_usage() {
    println!("Usage: client <NAME> [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --host <HOST>    Relay host (default: 127.0.0.1)");
    println!("  --port <PORT>    Relay port (default: 7878)");
    println!("  --unix <PATH>    Connect to a Unix-domain socket instead of TCP");
    println!("  --help, -h       Show this help");
}
