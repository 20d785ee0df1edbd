// CLI entry point for the Skirmish session host.
//
// Starts a standalone host that game clients connect to. The host owns the
// authoritative session state, validates every request, and replicates
// state slices to all peers. See `host.rs` for the networking architecture
// and `replicator.rs` for the replication policy.
//
// Usage:
//   skirmish-host [OPTIONS]
//     --port <PORT>           Listen port (default: 7878)
//     --name <NAME>           Session name (default: skirmish-session)
//     --max-peers <N>         Max connected peers (default: 8)
//     --sync-interval <MS>    Anti-entropy rebroadcast interval (default: 1000)
//     --seed <N>              Session rng seed (default: 0)
//     --data <FILE>           Scenario data JSON (default: built-in demo)

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use skirmish_core::data::GameData;
use skirmish_core::state::{MapDef, SessionState};
use skirmish_net::host::{HostConfig, start_host};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = parse_args();

    let (handle, addr) = match start_host(config) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Failed to start host: {e}");
            std::process::exit(1);
        }
    };

    println!("Host listening on {addr}");
    println!("Press Ctrl+C to stop.");

    // Wait for Ctrl+C.
    let running = Arc::new(AtomicBool::new(true));
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }

    println!("\nShutting down...");
    handle.stop();
}

/// Parse command-line arguments into a `HostConfig`. Uses simple
/// `std::env::args()` matching — no clap dependency.
fn parse_args() -> HostConfig {
    let mut config = HostConfig {
        state: default_state(),
        ..HostConfig::default()
    };
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
            "--max-peers" => {
                i += 1;
                config.max_peers =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--max-peers requires a valid number");
                        std::process::exit(1);
                    });
            }
            "--sync-interval" => {
                i += 1;
                config.sync_interval_ms =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--sync-interval requires a valid number of milliseconds");
                        std::process::exit(1);
                    });
            }
            "--seed" => {
                i += 1;
                config.seed = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--seed requires a valid number");
                    std::process::exit(1);
                });
            }
            "--data" => {
                i += 1;
                let path = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--data requires a file path");
                    std::process::exit(1);
                });
                config.data = load_data(&path);
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

/// A minimal starting state: one open arena and one fallback map for the
/// losers of a contested battle to retreat to.
fn default_state() -> SessionState {
    let mut state = SessionState::default();
    state.add_map(MapDef::open("arena", 32.0, 32.0));
    state.add_map(MapDef::open("camp", 16.0, 16.0));
    state
}

fn load_data(path: &str) -> GameData {
    let json = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Failed to read {path}: {e}");
        std::process::exit(1);
    });
    GameData::from_json(&json).unwrap_or_else(|e| {
        eprintln!("Failed to parse {path}: {e}");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!("Usage: skirmish-host [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --port <PORT>           Listen port (default: 7878)");
    println!("  --name <NAME>           Session name (default: skirmish-session)");
    println!("  --max-peers <N>         Max connected peers (default: 8)");
    println!("  --sync-interval <MS>    Anti-entropy rebroadcast interval (default: 1000)");
    println!("  --seed <N>              Session rng seed (default: 0)");
    println!("  --data <FILE>           Scenario data JSON (default: built-in demo)");
    println!("  --help, -h              Show this help");
}
