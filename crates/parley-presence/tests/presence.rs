//! Integration tests for the presence tables under concurrent use.
//!
//! The registry is written by the network worker and read by the owning
//! thread; these tests hammer it from several threads at once.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parley_presence::{
    GameStatePublisher, IdentityManager, PeerRecord, PeerRegistry, SharedGameState,
};
use parley_protocol::PeerId;

// =========================================================================
// Helpers
// =========================================================================

fn announce(registry: &PeerRegistry, id: u32, at: Instant) {
    registry.upsert_on_announce(
        PeerId(id),
        PeerRecord::announced(PeerId(id), format!("peer-{id}"), false, at),
    );
}

// =========================================================================
// Liveness
// =========================================================================

#[test]
fn test_heartbeats_from_many_threads_never_decrease_last_heartbeat() {
    let registry = Arc::new(PeerRegistry::new());
    let base = Instant::now();
    for id in 1..=4 {
        announce(&registry, id, base);
    }

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..500u64 {
                    // Interleave forward and backward timestamps.
                    let offset = if i % 2 == 0 { i } else { i / 3 };
                    let at = base + Duration::from_millis(offset * 10 + t);
                    for id in 1..=4 {
                        let _ = registry.update_on_heartbeat(PeerId(id), i as i32, false, at);
                    }
                }
            })
        })
        .collect();

    let reader = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let mut last_seen = [base; 5];
            for _ in 0..500 {
                for (id, record) in registry.snapshot() {
                    let slot = &mut last_seen[id.get() as usize];
                    assert!(record.last_heartbeat >= *slot, "peer {id} went backwards");
                    *slot = record.last_heartbeat;
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    reader.join().unwrap();
}

#[test]
fn test_heartbeat_flood_for_unknown_ids_creates_no_records() {
    let registry = Arc::new(PeerRegistry::new());
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for id in 1..=250u32 {
                    let id = PeerId(id + t * 250);
                    assert!(registry
                        .update_on_heartbeat(id, 1, false, Instant::now())
                        .is_err());
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert!(registry.is_empty());
}

#[test]
fn test_sweep_after_silence_empties_registry_of_all_stale_peers() {
    let registry = PeerRegistry::new();
    let base = Instant::now();
    for id in 1..=50 {
        announce(&registry, id, base);
    }
    announce(&registry, 51, base + Duration::from_secs(5));

    let removed = registry.sweep_expired(base + Duration::from_secs(10), Duration::from_secs(10));

    assert_eq!(removed.len(), 50);
    let remaining = registry.snapshot();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.contains_key(&PeerId(51)));
}

// =========================================================================
// Identity and shared state
// =========================================================================

#[test]
fn test_regenerated_identity_avoids_registered_peers() {
    let registry = PeerRegistry::new();
    let identity = IdentityManager::new("alice", "alice", false);
    let base = Instant::now();
    // Fill the bottom half of the id space.
    for id in 1..=5_000 {
        announce(&registry, id, base);
    }

    for _ in 0..10 {
        let id = identity.regenerate(|id| registry.contains(id));
        assert!(!registry.contains(id), "{id} is already a peer");
    }
}

#[test]
fn test_shared_state_is_read_as_one_unit() {
    let publisher = Arc::new(GameStatePublisher::default());
    let writer = {
        let publisher = Arc::clone(&publisher);
        thread::spawn(move || {
            for i in 0..2_000 {
                // party_size and is_in_game always change together.
                publisher.set(SharedGameState {
                    party_size: i % 2,
                    is_in_game: i % 2 == 1,
                });
            }
        })
    };
    for _ in 0..2_000 {
        let state = publisher.get();
        if state != SharedGameState::default() {
            assert_eq!(state.is_in_game, state.party_size == 1);
        }
    }
    writer.join().unwrap();
}
