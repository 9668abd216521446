//! Two presence clients on an in-memory chat network.
//!
//! ```text
//! cargo run -p presence-demo                  # built-in config
//! cargo run -p presence-demo -- demo.json     # config loaded from JSON
//! RUST_LOG=parley=debug cargo run -p presence-demo
//! ```
//!
//! Alice uses the loaded config; Bob is the same config under another
//! nickname. Both join the control channel, discover each other, and
//! publish a party size that changes every few seconds.

use std::thread;
use std::time::{Duration, Instant};

use parley::prelude::*;
use parley_transport::{MemoryNetwork, MemoryTransport};

const RUN_FOR: Duration = Duration::from_secs(12);
const TICK_EVERY: Duration = Duration::from_millis(250);

fn load_config() -> Result<ConnectionConfig, ParleyError> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ParleyError::InvalidConfig(format!("{path}: {e}")))?;
            ConnectionConfig::from_json(&text)
        }
        None => Ok(ConnectionConfig::new("alice", "memory.local")
            .with_presence_channel("#lobby")
            .with_control_channel("#lobby-ctl", Some("hunter2".into()))),
    }
}

fn print_peers(name: &str, client: &ParleyClient<MemoryTransport>) {
    let identity = client.local_identity();
    println!(
        "{name} ({}, {}) sees {} peer(s)",
        identity.id,
        client.state(),
        client.peers().len()
    );
    for (id, peer) in client.peers() {
        println!(
            "    {:>6}  {:<14} party={:<3} bot={}",
            id.to_string(),
            peer.nickname, peer.party_size, peer.is_bot
        );
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    parley::init_logging("info");

    let config = load_config()?.validated()?;
    let mut bob_config = config.clone();
    bob_config.nickname = "bob".into();
    bob_config.username = "bob".into();
    bob_config.is_bot = true;

    tracing::info!(
        control = ?config.control_channel,
        presence = %config.presence_channel,
        "starting demo"
    );
    println!("{}", serde_json::to_string_pretty(&config)?);

    let network = MemoryNetwork::new();
    let mut alice = ParleyClient::new(network.transport(), PlaintextCipher, config)?;
    let mut bob = ParleyClient::new(network.transport(), PlaintextCipher, bob_config)?;

    bob.install_callback("PRIVMSG", |msg: &ChatMessage| {
        if let Some((target, text)) = msg.as_privmsg() {
            tracing::debug!(from = %msg.sender, %target, %text, "bob saw a message");
        }
        Ok(())
    });

    alice.connect();
    bob.connect();

    let started = Instant::now();
    let mut last_report = Instant::now();
    while started.elapsed() < RUN_FOR {
        let party_size = 1 + (started.elapsed().as_secs() / 4) as i32;
        alice.set_shared_state(SharedGameState {
            party_size,
            is_in_game: party_size > 1,
        });

        alice.tick();
        bob.tick();

        if last_report.elapsed() >= Duration::from_secs(2) {
            last_report = Instant::now();
            print_peers("alice", &alice);
            print_peers("bob", &bob);
            alice.send_message("hello lobby", MessageTarget::Presence);
        }
        thread::sleep(TICK_EVERY);
    }

    alice.disconnect();
    bob.disconnect();
    println!("network lines sent: {}", network.sent_lines().len());
    Ok(())
}
