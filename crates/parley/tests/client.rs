//! Integration tests for the client against an in-memory chat network.
//!
//! Each client owns its runtime, so these are plain `#[test]`s that poll
//! for the asynchronous effects with [`wait_until`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use parley::prelude::*;
use parley::protocol::SignalCodec;
use parley::transport::{MemoryNetwork, MemoryTransport};

const PRESENCE: &str = "#lobby";
const CONTROL: &str = "#lobby-ctl";
const SECRET: &str = "s3cret";

// =========================================================================
// Helpers
// =========================================================================

fn config(nick: &str) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(nick, "memory.test")
        .with_presence_channel(PRESENCE)
        .with_control_channel(CONTROL, Some(SECRET.into()));
    config.timing.join_delay_ms = 20;
    config.timing.worker_join_timeout_ms = 1_000;
    config
}

fn client(network: &MemoryNetwork, nick: &str) -> ParleyClient<MemoryTransport> {
    ParleyClient::new(network.transport(), PlaintextCipher, config(nick)).unwrap()
}

/// Polls `cond` every 10 ms for up to 5 seconds.
fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

fn seal(msg: SignalMessage) -> String {
    SignalCodec::new(PlaintextCipher, 'B').seal(&msg)
}

fn signal_line(msg: SignalMessage) -> String {
    format!("PRIVMSG {CONTROL} :{}", seal(msg))
}

fn has_sent(network: &MemoryNetwork, nick: &str, line: &str) -> bool {
    network.lines_sent_by(nick).iter().any(|sent| sent == line)
}

/// A client with local id `id` that has joined both channels and sent
/// its signon.
fn connected(network: &MemoryNetwork, nick: &str, id: u32) -> ParleyClient<MemoryTransport> {
    let mut client = client(network, nick);
    client.set_local_id(PeerId(id)).unwrap();
    client.connect();

    let login = format!("{nick}-{id}");
    let signon = signal_line(SignalMessage::Signon { id: PeerId(id) });
    wait_until("signon broadcast", || has_sent(network, &login, &signon));
    assert!(client.is_control_active());
    client
}

fn inject(network: &MemoryNetwork, sender: &str, msg: SignalMessage) {
    assert_eq!(network.inject(CONTROL, sender, &seal(msg)), 1, "nobody on {CONTROL}");
}

// =========================================================================
// Connection lifecycle
// =========================================================================

#[test]
fn test_connect_joins_channels_and_hardens_control_channel() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);

    assert_eq!(client.state(), ConnectionState::Running);
    assert_eq!(network.channel_members(PRESENCE), vec!["alice-7"]);
    assert_eq!(network.channel_members(CONTROL), vec!["alice-7"]);
    assert_eq!(network.channel_key(CONTROL).as_deref(), Some(SECRET));
    assert_eq!(network.channel_modes(CONTROL), "ns");
}

#[test]
fn test_connect_twice_while_running_is_noop() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    client.connect();
    thread::sleep(Duration::from_millis(100));

    assert_eq!(client.state(), ConnectionState::Running);
    assert_eq!(network.member_count(), 1);
}

#[test]
fn test_disconnect_terminates_worker_promptly() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    let started = Instant::now();
    client.disconnect();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(client.state(), ConnectionState::Off);
    assert!(!client.is_control_active());
    assert_eq!(network.member_count(), 0);
}

#[test]
fn test_disconnect_when_off_is_noop() {
    let network = MemoryNetwork::new();
    let mut client = client(&network, "alice");
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Off);
    assert!(!client.should_run());
}

#[test]
fn test_refused_connection_goes_joining_then_restarts_on_tick() {
    let network = MemoryNetwork::new();
    network.refuse_connections(true);
    let mut client = client(&network, "alice");

    client.connect();
    wait_until("setup failure", || client.state() == ConnectionState::Joining);
    assert_eq!(network.member_count(), 0);

    network.refuse_connections(false);
    wait_until("restart", || {
        client.tick();
        client.is_control_active()
    });
    assert_eq!(client.state(), ConnectionState::Running);
}

#[test]
fn test_rejected_login_goes_joining() {
    let network = MemoryNetwork::new();
    network.refuse_logins(true);
    let mut client = client(&network, "alice");

    client.connect();
    wait_until("login failure", || client.state() == ConnectionState::Joining);

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Off);
}

#[test]
fn test_lost_connection_restarts_under_fresh_identity() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    network.sever_all();
    wait_until("connection loss", || client.state() == ConnectionState::Joining);
    assert!(!client.is_control_active());

    wait_until("restart", || {
        client.tick();
        client.is_control_active()
    });
    let id = client.local_identity().id;
    assert_ne!(id, PeerId(7));
    assert_eq!(network.channel_members(CONTROL), vec![format!("alice-{}", id.get())]);
}

#[test]
fn test_disconnect_during_slow_connect_closes_link() {
    let network = MemoryNetwork::new();
    network.delay_connections(Duration::from_millis(300));
    let mut client = client(&network, "alice");

    client.connect();
    thread::sleep(Duration::from_millis(50));
    client.disconnect();
    thread::sleep(Duration::from_millis(400));

    assert_eq!(client.state(), ConnectionState::Off);
    assert_eq!(network.member_count(), 0);
}

#[test]
fn test_disconnect_during_slow_login_never_reaches_running() {
    let network = MemoryNetwork::new();
    network.delay_logins(Duration::from_millis(300));
    let mut client = client(&network, "alice");

    client.connect();
    wait_until("link open", || network.member_count() == 1);
    assert_eq!(client.state(), ConnectionState::Initializing);
    client.disconnect();

    let deadline = Instant::now() + Duration::from_millis(500);
    while Instant::now() < deadline {
        assert_eq!(client.state(), ConnectionState::Off);
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(network.member_count(), 0);
    assert!(network.sent_lines().is_empty());
}

#[test]
fn test_disconnect_before_join_delay_cancels_channel_join() {
    let network = MemoryNetwork::new();
    let mut config = config("alice");
    config.timing.join_delay_ms = 300;
    let mut client = ParleyClient::new(network.transport(), PlaintextCipher, config).unwrap();

    client.connect();
    wait_until("login", || client.state() == ConnectionState::Running);
    client.disconnect();
    thread::sleep(Duration::from_millis(500));

    assert!(network.sent_lines().is_empty());
    assert!(!client.is_control_active());
    assert_eq!(client.state(), ConnectionState::Off);
}

#[test]
fn test_drop_tears_down_connection() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);
    drop(client);
    assert_eq!(network.member_count(), 0);
}

// =========================================================================
// Configuration and identity
// =========================================================================

#[test]
fn test_update_config_while_running_is_not_idle() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    let err = client.update_config(config("bob")).unwrap_err();
    assert!(matches!(err, ParleyError::NotIdle(ConnectionState::Running)));
    assert!(client.set_local_id(PeerId(3)).is_err());
}

#[test]
fn test_update_config_while_off_applies_names() {
    let network = MemoryNetwork::new();
    let mut client = client(&network, "alice");

    client.update_config(config("Big Bob")).unwrap();

    assert_eq!(client.config().nickname, "Big_Bob");
    let identity = client.local_identity();
    assert_eq!(identity.nickname, "Big_Bob");
    assert!(identity.id.is_valid());
}

#[test]
fn test_new_rejects_invalid_config() {
    let network = MemoryNetwork::new();
    let result = ParleyClient::new(network.transport(), PlaintextCipher, config(""));
    assert!(matches!(result, Err(ParleyError::InvalidConfig(_))));
}

// =========================================================================
// Control channel signaling
// =========================================================================

#[test]
fn test_self_signon_regenerates_identity_and_reconnects() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    inject(&network, "impostor-7", SignalMessage::Signon { id: PeerId(7) });
    wait_until("identity change", || client.local_identity().id != PeerId(7));
    assert!(!client.peers().contains_key(&PeerId(7)));

    wait_until("restart", || {
        client.tick();
        client.is_control_active()
    });
    let id = client.local_identity().id;
    assert_ne!(id, PeerId(7));
    let signon = signal_line(SignalMessage::Signon { id });
    wait_until("signon under new id", || {
        has_sent(&network, &format!("alice-{}", id.get()), &signon)
    });
}

#[test]
fn test_auth_then_heartbeat_updates_peer() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);

    inject(&network, "bob-9", SignalMessage::Auth { id: PeerId(9), is_bot: false });
    wait_until("peer 9", || client.peers().contains_key(&PeerId(9)));

    let peers = client.peers();
    assert_eq!(peers.len(), 1);
    let bob = &peers[&PeerId(9)];
    assert_eq!(bob.nickname, "bob-9");
    assert!(!bob.is_bot);
    assert_eq!(bob.party_size, -1);

    inject(&network, "bob-9", SignalMessage::Heartbeat { id: PeerId(9), party_size: 3 });
    wait_until("party size", || {
        client.peers().get(&PeerId(9)).is_some_and(|p| p.party_size == 3)
    });
}

#[test]
fn test_heartbeat_from_unknown_peer_requests_reauth() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);

    inject(&network, "carol-12", SignalMessage::Heartbeat { id: PeerId(12), party_size: 1 });

    let request = signal_line(SignalMessage::ReauthRequest { id: PeerId(12) });
    wait_until("reauth request", || has_sent(&network, "alice-7", &request));
    assert!(client.peers().is_empty());
}

#[test]
fn test_reauth_request_for_local_id_rebroadcasts_auth() {
    let network = MemoryNetwork::new();
    let _client = connected(&network, "alice", 7);

    inject(&network, "bob-9", SignalMessage::ReauthRequest { id: PeerId(7) });

    let auth = signal_line(SignalMessage::Auth { id: PeerId(7), is_bot: false });
    wait_until("auth", || has_sent(&network, "alice-7", &auth));
}

#[test]
fn test_signon_is_answered_once_per_presence() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);
    let reply = signal_line(SignalMessage::SignonReply { id: PeerId(7) });

    inject(&network, "bob-9", SignalMessage::Signon { id: PeerId(9) });
    wait_until("signon reply", || has_sent(&network, "alice-7", &reply));
    inject(&network, "bob-9", SignalMessage::Signon { id: PeerId(9) });
    inject(&network, "bob-9", SignalMessage::SignonReply { id: PeerId(9) });
    thread::sleep(Duration::from_millis(100));

    let replies = network
        .lines_sent_by("alice-7")
        .iter()
        .filter(|line| **line == reply)
        .count();
    assert_eq!(replies, 1);
    assert!(client.peers().contains_key(&PeerId(9)));
}

#[test]
fn test_malformed_control_messages_are_dropped() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);

    for payload in ["garbage", "~Bcc_hb$abc$1", "~Bcc_auth$9", "~Bcc_auth$9$2", "~Bcc_signon$0"] {
        network.inject(CONTROL, "mallory-1", payload);
    }
    thread::sleep(Duration::from_millis(100));

    assert!(client.peers().is_empty());
    assert_eq!(client.state(), ConnectionState::Running);
    assert_eq!(client.local_identity().id, PeerId(7));
    // Only the join sequence and the signon were sent.
    assert_eq!(network.lines_sent_by("alice-7").len(), 6);
}

#[test]
fn test_signals_outside_control_channel_are_ignored() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);

    network.inject(PRESENCE, "bob-9", &seal(SignalMessage::Auth { id: PeerId(9), is_bot: false }));
    thread::sleep(Duration::from_millis(100));

    assert!(client.peers().is_empty());
}

#[test]
fn test_without_control_channel_control_mode_stays_off() {
    let network = MemoryNetwork::new();
    let mut config = config("alice");
    config.control_channel = None;
    let mut client = ParleyClient::new(network.transport(), PlaintextCipher, config).unwrap();
    client.set_local_id(PeerId(7)).unwrap();
    client.connect();

    wait_until("presence join", || network.channel_members(PRESENCE) == ["alice-7"]);
    thread::sleep(Duration::from_millis(50));
    client.tick();

    assert!(!client.is_control_active());
    assert!(network.channel_members(CONTROL).is_empty());
    assert!(!client.send_message("hi", MessageTarget::Control));
}

// =========================================================================
// Two clients
// =========================================================================

#[test]
fn test_two_clients_discover_each_other_and_share_state() {
    let network = MemoryNetwork::new();
    let mut alice = connected(&network, "alice", 7);
    let mut bob = connected(&network, "bob", 9);

    wait_until("mutual discovery", || {
        alice.peers().contains_key(&PeerId(9)) && bob.peers().contains_key(&PeerId(7))
    });

    bob.set_shared_state(SharedGameState {
        party_size: 4,
        is_in_game: true,
    });
    bob.tick();
    wait_until("heartbeat", || {
        alice.peers().get(&PeerId(9)).is_some_and(|p| p.party_size == 4)
    });
    assert!(!alice.peers()[&PeerId(9)].is_in_game);

    alice.set_shared_state(SharedGameState {
        party_size: 2,
        is_in_game: false,
    });
    alice.tick();
    wait_until("reverse heartbeat", || {
        bob.peers().get(&PeerId(7)).is_some_and(|p| p.party_size == 2)
    });
}

// =========================================================================
// Sweep
// =========================================================================

#[test]
fn test_tick_evicts_every_silent_peer() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    let reply = signal_line(SignalMessage::SignonReply { id: PeerId(7) });
    let replies = || {
        network
            .lines_sent_by("alice-7")
            .iter()
            .filter(|line| **line == reply)
            .count()
    };

    inject(&network, "bob-9", SignalMessage::Signon { id: PeerId(9) });
    inject(&network, "carol-12", SignalMessage::Auth { id: PeerId(12), is_bot: true });
    wait_until("two peers", || client.peers().len() == 2);
    wait_until("signon reply", || replies() == 1);

    client.tick();
    assert_eq!(client.peers().len(), 2);

    client.tick_at(Instant::now() + Duration::from_secs(11));
    assert!(client.peers().is_empty());

    // A peer that timed out is answered again when it signs on.
    inject(&network, "bob-9", SignalMessage::Signon { id: PeerId(9) });
    wait_until("second signon reply", || replies() == 2);
}

// =========================================================================
// Extension handlers and raw traffic
// =========================================================================

#[test]
fn test_callbacks_see_all_traffic_and_panics_are_isolated() {
    let network = MemoryNetwork::new();
    let client = connected(&network, "alice", 7);
    let texts = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    client.install_callback("PRIVMSG", |_msg: &ChatMessage| panic!("handler bug"));
    let seen = Arc::clone(&texts);
    client.install_callback("PRIVMSG", move |msg: &ChatMessage| {
        if let Some((_, text)) = msg.as_privmsg() {
            seen.lock().push(text.to_string());
        }
        Ok(())
    });
    let counter = Arc::clone(&calls);
    client.install_callback("NOTICE", move |_msg: &ChatMessage| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    network.inject(PRESENCE, "bob-9", "hello");
    inject(&network, "bob-9", SignalMessage::Auth { id: PeerId(9), is_bot: false });

    wait_until("peer 9", || client.peers().contains_key(&PeerId(9)));
    wait_until("both messages", || texts.lock().len() == 2);
    assert_eq!(texts.lock()[0], "hello");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_send_message_seals_text_for_target_channel() {
    let network = MemoryNetwork::new();
    let mut client = connected(&network, "alice", 7);

    assert!(client.send_message("hello", MessageTarget::Presence));
    assert!(client.send_raw("MODE #lobby +n"));
    assert!(!client.send_raw(""));

    wait_until("sealed message", || {
        has_sent(&network, "alice-7", "PRIVMSG #lobby :~Bhello")
    });
    wait_until("raw line", || has_sent(&network, "alice-7", "MODE #lobby +n"));

    client.disconnect();
    assert!(!client.send_raw("MODE #lobby +n"));
    assert!(!client.send_message("hello", MessageTarget::Presence));
}
