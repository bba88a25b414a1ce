// Interactive messenger client for the chat relay.
//
// Asks for a display name, claims it, then sends each line typed at the
// `<name>>` prompt as one chat message. `quit` or `exit` leaves gracefully.
// The loop also stops when the relay drops the connection.
//
// Usage:
//   messenger [--host <ADDR>] [--port <PORT>] [--name <NAME>]
//
// Logs go to stderr so they do not interleave with the prompt.

use std::io::{self, BufRead, Write};
use std::net::{SocketAddr, ToSocketAddrs};

use tcp_chat_relay::client::{Messenger, Submission};
use tcp_chat_relay::config::{ClientConfig, DEFAULT_PORT};
use tcp_chat_relay::error::ClientError;
use tracing_subscriber::EnvFilter;

struct Args {
    host: String,
    port: u16,
    name: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = parse_args();
    let addr = resolve(&args.host, args.port);
    let stdin = io::stdin();
    let mut input = stdin.lock();

    let name = match args.name {
        Some(name) => name,
        None => {
            print!("Enter a name to use: ");
            let _ = io::stdout().flush();
            read_line(&mut input).unwrap_or_default()
        }
    };

    let config = ClientConfig::messenger();
    let poll_interval = config.poll_interval;
    let mut messenger = match Messenger::connect(addr, name.trim(), config) {
        Ok(messenger) => messenger,
        Err(ClientError::HandshakeRejected(reason)) => {
            let reason =
                reason.unwrap_or_else(|| format!("\"{}\" is probably in use", name.trim()));
            eprintln!("The server rejected us; {reason}");
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    println!("Connected to the server at {addr}.");

    loop {
        print!("{}>", messenger.name());
        let _ = io::stdout().flush();
        let Some(line) = read_line(&mut input) else {
            messenger.disconnect();
            break;
        };

        match messenger.submit(&line) {
            Ok(Submission::Quit) => {
                println!("Exiting...");
                break;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "send failed"),
        }

        std::thread::sleep(poll_interval);
        if !messenger.is_connected() {
            println!("The server has disconnected us.");
            break;
        }
    }
    println!("Disconnected.");
}

/// One line from stdin, or `None` at end of input.
fn read_line(input: &mut impl BufRead) -> Option<String> {
    let mut line = String::new();
    match input.read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
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

fn parse_args() -> Args {
    let mut parsed = Args {
        host: "localhost".into(),
        port: DEFAULT_PORT,
        name: None,
    };
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                parsed.host = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--host requires an address");
                    std::process::exit(1);
                });
            }
            "--port" => {
                i += 1;
                parsed.port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
                    eprintln!("--port requires a valid port number");
                    std::process::exit(1);
                });
            }
            "--name" => {
                i += 1;
                parsed.name = args.get(i).cloned().or_else(|| {
                    eprintln!("--name requires a value");
                    std::process::exit(1);
                });
            }
            "--help" | "-h" => {
                println!("Usage: messenger [--host <ADDR>] [--port <PORT>] [--name <NAME>]");
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(1);
            }
        }
        i += 1;
    }

    parsed
}
