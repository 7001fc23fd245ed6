//! Client-relationship graph, built incrementally as batches flow through.
//!
//! Single owner of RelationshipEdge state for the run. Edges accumulate and
//! are never deleted. Locking is sharded by entity (edge key or client id),
//! never global, so workers touching unrelated clients do not serialize.
//!
//! Consistency: a network evaluation for transaction N of a batch sees the
//! edges applied for transactions 1..N-1 of that batch. Updates from other
//! in-flight batches become visible as they land (eventual across batches,
//! an accepted throughput trade-off).
//!
//! Centrality is a proxy, not graph-theoretic centrality: log-scaled degree
//! weighted by the node's suspicious-edge ratio. That keeps every update
//! O(1) instead of a full-graph pass per batch.

use crate::config::StrengthWeights;
use crate::record::Transaction;
use crate::types::{ClientId, ReferenceId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

const SHARDS: usize = 64;
const SCORE_CAP: f64 = 10.0;
const CENTRALITY_DEGREE_WEIGHT: f64 = 2.5;

/// Unordered client pair identifying an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub a: ClientId,
    pub b: ClientId,
}

impl EdgeKey {
    pub fn new(x: &str, y: &str) -> Self {
        if x <= y {
            Self { a: x.to_string(), b: y.to_string() }
        } else {
            Self { a: y.to_string(), b: x.to_string() }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelationshipEdge {
    pub client_a: ClientId,
    pub client_b: ClientId,
    pub transaction_count: u64,
    pub total_amount: f64,
    /// Derived, bounded [0, 10], monotonic in count and amount.
    pub connection_strength: f64,
    /// True once any constituent transaction was assessed high risk.
    pub is_suspicious: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeStats {
    degree: u64,
    suspicious_edges: u64,
}

/// Read-only view of one node handed to evaluators and the read path.
#[derive(Debug, Clone, Serialize)]
pub struct NodeView {
    pub client_id: ClientId,
    pub degree: u64,
    pub suspicious_edges: u64,
    pub centrality: f64,
}

fn shard_of<T: Hash>(key: &T) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() as usize) % SHARDS
}

fn centrality(stats: &NodeStats) -> f64 {
    if stats.degree == 0 {
        return 0.0;
    }
    let suspicious_ratio = stats.suspicious_edges as f64 / stats.degree as f64;
    let raw = CENTRALITY_DEGREE_WEIGHT * (1.0 + stats.degree as f64).ln() * (1.0 + suspicious_ratio);
    raw.min(SCORE_CAP)
}

pub struct RelationshipGraph {
    strength: StrengthWeights,
    edges: Vec<Mutex<HashMap<EdgeKey, RelationshipEdge>>>,
    nodes: Vec<Mutex<HashMap<ClientId, NodeStats>>>,
    /// Adjacency for the neighborhood read path only; evaluators never walk it.
    adjacency: Vec<Mutex<HashMap<ClientId, HashSet<ClientId>>>>,
    /// Reference ids whose graph update has been applied. Guards against
    /// double-counting when a batch is re-dispatched after a failure.
    applied: Vec<Mutex<HashSet<ReferenceId>>>,
}

impl RelationshipGraph {
    pub fn new(strength: StrengthWeights) -> Self {
        Self {
            strength,
            edges: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            nodes: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            adjacency: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            applied: (0..SHARDS).map(|_| Mutex::new(HashSet::new())).collect(),
        }
    }

    /// connection_strength = min(10, cw·ln(1+count) + aw·ln(1+amount/1e6)).
    /// Monotonic in both inputs, saturating at the cap.
    fn strength_of(&self, count: u64, amount: f64) -> f64 {
        let s = self.strength.count_weight * (1.0 + count as f64).ln()
            + self.strength.amount_weight * (1.0 + amount.max(0.0) / 1_000_000.0).ln();
        s.min(SCORE_CAP)
    }

    /// Apply one transaction to the graph. Idempotent per reference_id:
    /// a re-dispatched batch replaying the same record is a no-op. Returns
    /// the edge state after the call either way.
    pub fn apply(&self, tx: &Transaction) -> RelationshipEdge {
        let key = EdgeKey::new(&tx.sender.id, &tx.receiver.id);

        let fresh = self.applied[shard_of(&tx.reference_id)]
            .lock()
            .insert(tx.reference_id.clone());
        if !fresh {
            return self.edge(&tx.sender.id, &tx.receiver.id).unwrap_or(RelationshipEdge {
                client_a: key.a,
                client_b: key.b,
                transaction_count: 0,
                total_amount: 0.0,
                connection_strength: 0.0,
                is_suspicious: false,
            });
        }

        let mut new_edge = false;
        let edge = {
            let mut shard = self.edges[shard_of(&key)].lock();
            let edge = shard.entry(key.clone()).or_insert_with(|| {
                new_edge = true;
                RelationshipEdge {
                    client_a: key.a.clone(),
                    client_b: key.b.clone(),
                    transaction_count: 0,
                    total_amount: 0.0,
                    connection_strength: 0.0,
                    is_suspicious: false,
                }
            });
            edge.transaction_count += 1;
            edge.total_amount += tx.amount;
            edge.connection_strength = self.strength_of(edge.transaction_count, edge.total_amount);
            edge.clone()
        };

        if new_edge {
            for (node, peer) in [(&key.a, &key.b), (&key.b, &key.a)] {
                self.nodes[shard_of(node)].lock().entry(node.clone()).or_default().degree += 1;
                self.adjacency[shard_of(node)]
                    .lock()
                    .entry(node.clone())
                    .or_default()
                    .insert(peer.clone());
            }
        }

        edge
    }

    /// Pre-claim a reference id so a later `apply` for it is a no-op. Used
    /// when warming from a database that already holds its assessment.
    pub fn mark_applied(&self, reference_id: &str) {
        self.applied[shard_of(&reference_id.to_string())]
            .lock()
            .insert(reference_id.to_string());
    }

    /// Load a persisted edge during warm-up, rebuilding node stats and
    /// adjacency. Must only be called before workers start.
    pub fn seed_edge(&self, edge: RelationshipEdge) {
        let key = EdgeKey::new(&edge.client_a, &edge.client_b);
        for (node, peer) in [(&key.a, &key.b), (&key.b, &key.a)] {
            let mut nodes = self.nodes[shard_of(node)].lock();
            let stats = nodes.entry(node.clone()).or_default();
            stats.degree += 1;
            if edge.is_suspicious {
                stats.suspicious_edges += 1;
            }
            drop(nodes);
            self.adjacency[shard_of(node)]
                .lock()
                .entry(node.clone())
                .or_default()
                .insert(peer.clone());
        }
        self.edges[shard_of(&key)].lock().insert(key, edge);
    }

    /// Mark the edge behind a high-risk transaction as suspicious. Safe to
    /// call repeatedly; node suspicious-edge counts move only on the first
    /// transition.
    pub fn mark_suspicious(&self, sender: &str, receiver: &str) {
        let key = EdgeKey::new(sender, receiver);
        let flipped = {
            let mut shard = self.edges[shard_of(&key)].lock();
            match shard.get_mut(&key) {
                Some(edge) if !edge.is_suspicious => {
                    edge.is_suspicious = true;
                    true
                }
                _ => false,
            }
        };
        if flipped {
            for node in [&key.a, &key.b] {
                if let Some(stats) = self.nodes[shard_of(node)].lock().get_mut(node) {
                    stats.suspicious_edges += 1;
                }
            }
        }
    }

    pub fn edge(&self, x: &str, y: &str) -> Option<RelationshipEdge> {
        let key = EdgeKey::new(x, y);
        self.edges[shard_of(&key)].lock().get(&key).cloned()
    }

    pub fn node(&self, client_id: &str) -> Option<NodeView> {
        let stats = *self.nodes[shard_of(&client_id.to_string())]
            .lock()
            .get(client_id)?;
        Some(NodeView {
            client_id: client_id.to_string(),
            degree: stats.degree,
            suspicious_edges: stats.suspicious_edges,
            centrality: centrality(&stats),
        })
    }

    /// Immediate neighborhood of one client: the client, its peers, and the
    /// connecting edges. Serves the dashboard read path after batch completion.
    pub fn neighborhood(&self, client_id: &str) -> (Vec<NodeView>, Vec<RelationshipEdge>) {
        let peers: Vec<ClientId> = self.adjacency[shard_of(&client_id.to_string())]
            .lock()
            .get(client_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let mut nodes = Vec::with_capacity(peers.len() + 1);
        if let Some(center) = self.node(client_id) {
            nodes.push(center);
        }
        let mut edges = Vec::with_capacity(peers.len());
        for peer in &peers {
            if let Some(view) = self.node(peer) {
                nodes.push(view);
            }
            if let Some(edge) = self.edge(client_id, peer) {
                edges.push(edge);
            }
        }
        (nodes, edges)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|s| s.lock().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Channel, Party};
    use chrono::{TimeZone, Utc};

    fn tx(reference: &str, from: &str, to: &str, amount: f64) -> Transaction {
        let party = |id: &str| Party {
            id: id.to_string(),
            name: String::new(),
            account: None,
            bank_code: None,
            country: "KZ".to_string(),
        };
        Transaction {
            reference_id: reference.to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 4, 21, 12, 0, 0).unwrap(),
            amount,
            sender: party(from),
            receiver: party(to),
            purpose_text: String::new(),
            channel: Channel::Domestic,
        }
    }

    #[test]
    fn edge_key_is_unordered() {
        assert_eq!(EdgeKey::new("a", "b"), EdgeKey::new("b", "a"));
    }

    #[test]
    fn strength_is_monotonic_and_capped() {
        let graph = RelationshipGraph::new(StrengthWeights::default());
        let mut last = 0.0;
        for i in 0..50 {
            let edge = graph.apply(&tx(&format!("r{i}"), "a", "b", 5_000_000.0));
            assert!(edge.connection_strength >= last, "strength must not decrease");
            assert!(edge.connection_strength <= 10.0);
            last = edge.connection_strength;
        }
        // 50 transactions totaling 250M should saturate the scale.
        assert!(last > 9.5, "expected near-cap strength, got {last}");
    }

    #[test]
    fn replayed_reference_is_not_double_counted() {
        let graph = RelationshipGraph::new(StrengthWeights::default());
        graph.apply(&tx("r1", "a", "b", 100.0));
        graph.apply(&tx("r1", "a", "b", 100.0));
        let edge = graph.edge("a", "b").unwrap();
        assert_eq!(edge.transaction_count, 1);
        assert_eq!(edge.total_amount, 100.0);
    }

    #[test]
    fn degree_counts_distinct_peers() {
        let graph = RelationshipGraph::new(StrengthWeights::default());
        graph.apply(&tx("r1", "hub", "p1", 100.0));
        graph.apply(&tx("r2", "hub", "p2", 100.0));
        graph.apply(&tx("r3", "p3", "hub", 100.0));
        graph.apply(&tx("r4", "hub", "p1", 100.0)); // existing peer
        let hub = graph.node("hub").unwrap();
        assert_eq!(hub.degree, 3);
        assert!(hub.centrality > graph.node("p1").unwrap().centrality);
    }

    #[test]
    fn suspicious_flag_raises_centrality_once() {
        let graph = RelationshipGraph::new(StrengthWeights::default());
        graph.apply(&tx("r1", "a", "b", 100.0));
        graph.apply(&tx("r2", "a", "c", 100.0));
        let before = graph.node("a").unwrap().centrality;
        graph.mark_suspicious("a", "b");
        graph.mark_suspicious("b", "a"); // repeat, must not double-count
        let node = graph.node("a").unwrap();
        assert_eq!(node.suspicious_edges, 1);
        assert!(node.centrality > before);
    }

    #[test]
    fn neighborhood_returns_nodes_and_edges() {
        let graph = RelationshipGraph::new(StrengthWeights::default());
        graph.apply(&tx("r1", "hub", "p1", 100.0));
        graph.apply(&tx("r2", "hub", "p2", 200.0));
        let (nodes, edges) = graph.neighborhood("hub");
        assert_eq!(nodes.len(), 3);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| e.client_a == "hub" || e.client_b == "hub"));
    }
}
