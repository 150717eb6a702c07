// Copyright 2024 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! The short-TTL "alive clients" cache backing `Heartbeat`/`KillServer` (spec §4.4).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Heartbeat TTL (spec §4.4 "Heartbeat ... TTL = 1 minute").
const HEARTBEAT_TTL: Duration = Duration::from_secs(60);

pub struct AliveClients {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl AliveClients {
    pub fn new() -> AliveClients {
        AliveClients::with_ttl(HEARTBEAT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> AliveClients {
        AliveClients {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Refreshes `client_id`'s entry (spec §4.4 "heartbeat(client_id) refreshes the client's
    /// entry").
    pub fn heartbeat(&self, client_id: &str) {
        self.entries.lock().insert(client_id.to_owned(), Instant::now());
    }

    /// Removes `client_id` and returns the remaining live clients, logging any entries evicted
    /// for having expired (spec §4.4 "remove the caller ... and read the remainder").
    pub fn remove_and_list_remaining(&self, client_id: &str) -> Vec<String> {
        let mut entries = self.entries.lock();
        entries.remove(client_id);
        Self::evict_expired(&mut entries, self.ttl);
        entries.keys().cloned().collect()
    }

    fn evict_expired(entries: &mut HashMap<String, Instant>, ttl: Duration) {
        entries.retain(|client_id, seen_at| {
            let alive = seen_at.elapsed() <= ttl;
            if !alive {
                log::info!("evicting expired alive-client entry for {client_id}");
            }
            alive
        });
    }
}

impl Default for AliveClients {
    fn default() -> AliveClients {
        AliveClients::new()
    }
}
