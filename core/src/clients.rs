//! In-memory client directory: running aggregates per client id.
//!
//! Write discipline: only the persistence sink updates the directory, and
//! only after a transaction's final score is known. Customer and behavioral
//! evaluators read a clone of a single client's aggregates through the
//! evaluation context, never a reference into the map.

use crate::record::ClientAggregates;
use crate::types::ClientId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

const SHARDS: usize = 64;

pub struct ClientDirectory {
    shards: Vec<RwLock<HashMap<ClientId, ClientAggregates>>>,
}

impl ClientDirectory {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, client_id: &str) -> &RwLock<HashMap<ClientId, ClientAggregates>> {
        let mut hasher = DefaultHasher::new();
        client_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    pub fn get(&self, client_id: &str) -> Option<ClientAggregates> {
        self.shard(client_id).read().get(client_id).cloned()
    }

    /// Fold one scored transaction into a client's aggregates, creating the
    /// entry on first sight. Identity fields keep the first non-empty value.
    #[allow(clippy::too_many_arguments)]
    pub fn absorb(
        &self,
        client_id: &str,
        display_name: &str,
        country: &str,
        amount: f64,
        at: DateTime<Utc>,
        suspicious: bool,
        night: bool,
    ) -> ClientAggregates {
        let mut shard = self.shard(client_id).write();
        let entry = shard.entry(client_id.to_string()).or_insert_with(|| {
            ClientAggregates::new(
                client_id.to_string(),
                display_name.to_string(),
                country.to_string(),
                at,
            )
        });
        if entry.display_name.is_empty() && !display_name.is_empty() {
            entry.display_name = display_name.to_string();
        }
        if entry.country.is_empty() && !country.is_empty() {
            entry.country = country.to_string();
        }
        entry.absorb(amount, at, suspicious, night);
        entry.clone()
    }

    /// Seed an entry from persisted state at startup.
    pub fn insert(&self, aggregates: ClientAggregates) {
        self.shard(&aggregates.client_id.clone())
            .write()
            .insert(aggregates.client_id.clone(), aggregates);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ClientDirectory {
    fn default() -> Self {
        Self::new()
    }
}
