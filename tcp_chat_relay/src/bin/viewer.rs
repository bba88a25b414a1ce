// Read-only viewer client for the chat relay.
//
// Registers as a viewer and prints every line the relay broadcasts until the
// relay goes away or Ctrl+C is pressed. The signal handler only sets a flag;
// the loop checks it each tick and closes the connection itself.
//
// Usage:
//   viewer [--host <ADDR>] [--port <PORT>]

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use tcp_chat_relay::client::Viewer;
use tcp_chat_relay::config::{ClientConfig, DEFAULT_PORT};
use tcp_chat_relay::error::ClientError;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let (host, port) = parse_args();
    let addr = resolve(&host, port);

    let config = ClientConfig::default();
    let poll_interval = config.poll_interval;
    let mut viewer = match Viewer::connect(addr, config) {
        Ok(viewer) => viewer,
        Err(ClientError::HandshakeRejected(_)) => {
            eprintln!("The server didn't recognise us as a Viewer.");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    println!("Connected to the server at {addr}.");
    println!("Press Ctrl-C to exit the Viewer at any time.");

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&stop)) {
            tracing::warn!(error = %e, "failed to install signal handler");
        }
    }

    while !stop.load(Ordering::SeqCst) {
        match viewer.poll() {
            Ok(lines) => {
                for line in lines {
                    println!("{line}");
                }
            }
            Err(ClientError::PeerDisconnected) => {
                println!("The server has disconnected us.");
                break;
            }
            Err(e) => tracing::debug!(error = %e, "poll failed"),
        }
        std::thread::sleep(poll_interval);
    }

    if stop.load(Ordering::SeqCst) {
        println!("Disconnecting from the chat...");
    }
    viewer.disconnect();
    println!("Disconnected from the chat server.");
}

fn resolve(host: &str, port: u16) -> SocketAddr {
    match (host, port).to_socket_addrs().ok().and_then(|mut a| a.next()) {
        Some(addr) => addr,
        None => {
            eprintln!("Could not resolve {host}:{port}");
            std::process::exit(1);
        }
    }
}

fn parse_args() -> (String, u16) {
    let mut host = String::from("localhost");
    let mut port = DEFAULT_PORT;
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires an address");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                println!("Usage: viewer [--host <ADDR>] [--port <PORT>]");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    (host, port)
}
