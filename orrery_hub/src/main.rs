// CLI entry point for the Orrery session hub.
//
// Starts a standalone hub that renderer peers connect to. The hub
// arbitrates hostship and rebroadcasts the host's simulation state — it
// never runs a simulation. See `server.rs` for the networking architecture
// and `session.rs` for the session state.
//
// Usage:
//   hub [OPTIONS]
//     --port <PORT>        Listen port (default: 7601)
//     --name <NAME>        Session name (default: orrery-session)
//     --password <PASS>    Session password (optional)
//     --queue-requests     Queue hostship requests instead of rejecting
//     --max-peers <N>      Max peers (default: 16)
//     --config <FILE>      Load a JSON config file (flags after it override)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use orrery_hub::server::{HubConfig, start_hub};

fn main() {
    env_logger::init();

    let config = parse_args();

    let (handle, addr) = match start_hub(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start hub: {e}");
            std::process::exit(1);
        }
    };

    println!("Hub listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // The process exits on SIGINT/SIGTERM by default, which is fine for a
    // standalone hub — the reader threads are torn down with it. A signal
    // handler flipping this flag (via the `ctrlc` crate) would make the
    // shutdown below graceful; not needed yet.
    let running = Arc::new(AtomicBool::new(true));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments into a `HubConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> HubConfig {
    let mut config = HubConfig::default();
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                config.session_name = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--password" => {
                i += 1;
                config.password = args.get(i).cloned().or_else(|| {
                    eprintln!("--password requires a value");
                    std::process::exit(1);
                });
            }
            "--queue-requests" => {
                config.queue_hostship_requests = true;
            }
            "--max-peers" => {
                i += 1;
                config.max_peers = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--max-peers requires a valid number");
                    std::process::exit(1);
                });
            }
            "--config" => {
                i += 1;
                let path = args.get(i).unwrap_or_else(|| {
                    eprintln!("--config requires a file path");
                    std::process::exit(1);
                });
                config = load_config_file(path);
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config
}

/// Load a `HubConfig` from a JSON file. Missing fields fall back to their
/// defaults.
fn load_config_file(path: &str) -> HubConfig {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read config file {path}: {e}");
        std::process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("Failed to parse config file {path}: {e}");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: hub [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>        Listen port (default: 7601)");
    println!("  --name <NAME>        Session name (default: orrery-session)");
    println!("  --password <PASS>    Session password (optional)");
    println!("  --queue-requests     Queue hostship requests instead of rejecting");
    println!("  --max-peers <N>      Max peers (default: 16)");
    println!("  --config <FILE>      Load a JSON config file (flags after it override)");
    println!("  --help, -h           Show this help");
}
