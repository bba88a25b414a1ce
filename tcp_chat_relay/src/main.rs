// CLI entry point for the chat relay.
//
// Runs the relay's tick loop on the main thread until SIGINT or SIGTERM. The
// signal only sets a flag; the loop notices it at the top of the next tick,
// flushes what is queued, and closes every connection. See `server.rs` for
// the loop and `session.rs` for the chat state.
//
// Usage:
//   relay [OPTIONS]
//     --config <FILE>      JSON config file (fields optional)
//     --host <ADDR>        Listen address (default: 0.0.0.0)
//     --port <PORT>        Listen port (default: 6000)
//     --name <NAME>        Chat name for the welcome line (default: Bad IRC)
//     --buffer-size <N>    Socket buffer size in bytes (default: 2048)
//     --tick-ms <MS>       Sleep between ticks (default: 10)
//
// Log verbosity follows `RUST_LOG` (default: info).

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use signal_hook::consts::{SIGINT, SIGTERM};
use tcp_chat_relay::config::RelayConfig;
use tcp_chat_relay::server::RelayServer;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = parse_args();

    let mut server = match RelayServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&shutdown)) {
            eprintln!("Failed to install signal handler: {e}");
            std::process::exit(1);
        }
    }

    println!("Relay listening on {}", server.local_addr());
    println!("Press Ctrl+C to stop.");

    server.run(&shutdown);
}

/// Parse command-line arguments into a `RelayConfig`. `--config` is applied
/// first wherever it appears, then the other flags override it.
fn parse_args() -> RelayConfig {
    let args: Vec<String> = std::env::args().collect();

    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .map(|i| {
            args.get(i + 1).map(PathBuf::from).unwrap_or_else(|| {
                eprintln!("--config requires a file path");
                std::process::exit(1);
            })
        });
    let mut config = match config_path {
        Some(path) => RelayConfig::from_json_file(&path).unwrap_or_else(|e| {
            eprintln!("{e}");
            std::process::exit(1);
        }),
        None => RelayConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1;
            }
            "--host" => {
                i += 1;
                config.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires an address");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                config.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                config.chat_name = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--buffer-size" => {
                i += 1;
                config.buffer_size = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .filter(|&n: &usize| n > 0)
                    .unwrap_or_else(|| {
                        eprintln!("--buffer-size requires a positive number");
                        std::process::exit(1);
                    });
            }
            "--tick-ms" => {
                i += 1;
                config.tick_interval_ms =
                    args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                        eprintln!("--tick-ms requires a valid number");
                        std::process::exit(1);
                    });
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

fn print_usage() {
    println!("Usage: relay [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config <FILE>      JSON config file (fields optional)");
    println!("  --host <ADDR>        Listen address (default: 0.0.0.0)");
    println!("  --port <PORT>        Listen port (default: 6000)");
    println!("  --name <NAME>        Chat name (default: Bad IRC)");
    println!("  --buffer-size <N>    Socket buffer size in bytes (default: 2048)");
    println!("  --tick-ms <MS>       Sleep between ticks (default: 10)");
    println!("  --help, -h           Show this help");
}
