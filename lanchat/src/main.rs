//! Headless `LanChat` node: line-oriented terminal front end over the core.
//!
//! Reads commands from stdin, prints messages and peer changes to stdout,
//! logs to stderr. Commands:
//!
//! ```text
//! /join <group>     switch to a group channel
//! /dm <ip:port>     switch to a private thread with a peer
//! /peers            print the known peer list
//! /quit             shut down
//! <anything else>   send to the current conversation
//! ```

use std::process::ExitCode;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use lanchat::config::{CliArgs, NodeConfig};
use lanchat::history::ConversationKey;
use lanchat::node::{spawn_node, NodeCommand, NodeEvent, NodeHandle};
use lanchat::peers::PeerSnapshot;
use lanchat::transport::lan::LanTransport;

fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match NodeConfig::load(&cli) {
        Ok(config) => config,
        // A config file the user asked for by path must not be papered
        // over; only the implicit default-path lookup falls back.
        Err(error) if cli.config.is_some() => {
            eprintln!("config error: {error}");
            return ExitCode::FAILURE;
        }
        Err(error) => {
            eprintln!("config error: {error}, using defaults");
            NodeConfig::default()
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            tracing::error!(%error, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: NodeConfig) -> ExitCode {
    let self_id = config.self_id();
    let transport = match LanTransport::bind(config.transport_config(self_id)).await {
        Ok(transport) => transport,
        Err(error) => {
            tracing::error!(%error, "failed to bind network sockets");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%self_id, "node online");

    let initial = config
        .groups
        .first()
        .map_or_else(|| "general".to_string(), Clone::clone);
    println!("you are {self_id}, talking in #{initial}");

    let handle = spawn_node(transport, &config);
    repl(handle, ConversationKey::Group(initial)).await;
    ExitCode::SUCCESS
}

/// Drives the stdin/stdout loop until `/quit` or stdin closes.
async fn repl(handle: NodeHandle, mut current: ConversationKey) {
    let NodeHandle {
        self_id,
        commands,
        mut events,
    } = handle;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut peers: Vec<PeerSnapshot> = Vec::new();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    NodeEvent::Display { sender, content, timestamp, .. } => {
                        let who = if sender == self_id { "you".to_string() } else { sender.to_string() };
                        println!("[{}] {who}: {content}", timestamp.as_millis());
                    }
                    NodeEvent::PeerListChanged(list) => {
                        peers = list;
                        println!("* peers: {}", format_peers(&peers));
                    }
                    NodeEvent::SendFailed { target, reason } => {
                        println!("! could not deliver to {target}: {reason}");
                    }
                }
            }
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) | Err(_) => {
                        let _ = commands.send(NodeCommand::Shutdown).await;
                        break;
                    }
                };
                if !handle_line(&commands, &mut current, &peers, line.trim()).await {
                    break;
                }
            }
        }
    }
}

/// Interprets one input line. Returns `false` when the loop should end.
async fn handle_line(
    commands: &tokio::sync::mpsc::Sender<NodeCommand>,
    current: &mut ConversationKey,
    peers: &[PeerSnapshot],
    line: &str,
) -> bool {
    if line.is_empty() {
        return true;
    }

    if let Some(group) = line.strip_prefix("/join ") {
        let key = ConversationKey::Group(group.trim().to_string());
        *current = key.clone();
        let _ = commands
            .send(NodeCommand::SwitchConversation(key.clone()))
            .await;
        println!("* now talking in {key}");
        return true;
    }

    if let Some(addr) = line.strip_prefix("/dm ") {
        match addr.trim().parse() {
            Ok(peer) => {
                let key = ConversationKey::Private(peer);
                *current = key.clone();
                let _ = commands
                    .send(NodeCommand::SwitchConversation(key.clone()))
                    .await;
                println!("* now talking in {key}");
            }
            Err(_) => println!("! usage: /dm <ip:port>"),
        }
        return true;
    }

    match line {
        "/peers" => {
            println!("* peers: {}", format_peers(peers));
            true
        }
        "/quit" => {
            let _ = commands.send(NodeCommand::Shutdown).await;
            false
        }
        _ if line.starts_with('/') => {
            println!("! unknown command: {line}");
            true
        }
        text => {
            let _ = commands
                .send(NodeCommand::Send {
                    conversation: current.clone(),
                    content: text.to_string(),
                })
                .await;
            true
        }
    }
}

fn format_peers(peers: &[PeerSnapshot]) -> String {
    if peers.is_empty() {
        return "(none)".to_string();
    }
    peers
        .iter()
        .map(|p| format!("{} ({})", p.peer_id, p.state))
        .collect::<Vec<_>>()
        .join(", ")
}
