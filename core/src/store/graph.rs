//! Relationship edge persistence and the neighborhood read path.

use super::client::{client_row_mapper, CLIENT_COLUMNS};
use super::AmlStore;
use crate::error::AmlResult;
use crate::graph::RelationshipEdge;
use crate::record::ClientAggregates;
use rusqlite::{params, OptionalExtension, Row};

fn edge_row_mapper(row: &Row<'_>) -> rusqlite::Result<RelationshipEdge> {
    Ok(RelationshipEdge {
        client_a: row.get(0)?,
        client_b: row.get(1)?,
        transaction_count: row.get::<_, i64>(2)? as u64,
        total_amount: row.get(3)?,
        connection_strength: row.get(4)?,
        is_suspicious: row.get::<_, i32>(5)? != 0,
    })
}

const EDGE_COLUMNS: &str =
    "client_a, client_b, transaction_count, total_amount, connection_strength, is_suspicious";

impl AmlStore {
    /// Store an edge snapshot. Edge state only ever grows in the in-memory
    /// graph, so every column takes the MAX of stored and incoming: snapshots
    /// from concurrent batches may arrive out of order, and a stale one must
    /// not shrink what a newer one already stored.
    pub fn upsert_edge(&self, edge: &RelationshipEdge) -> AmlResult<()> {
        self.conn().execute(
            "INSERT INTO relationship_edge (
                client_a, client_b, transaction_count, total_amount,
                connection_strength, is_suspicious
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(client_a, client_b) DO UPDATE SET
                transaction_count = MAX(relationship_edge.transaction_count, excluded.transaction_count),
                total_amount = MAX(relationship_edge.total_amount, excluded.total_amount),
                connection_strength = MAX(relationship_edge.connection_strength, excluded.connection_strength),
                is_suspicious = MAX(relationship_edge.is_suspicious, excluded.is_suspicious)",
            params![
                edge.client_a,
                edge.client_b,
                edge.transaction_count as i64,
                edge.total_amount,
                edge.connection_strength,
                if edge.is_suspicious { 1i32 } else { 0i32 },
            ],
        )?;
        Ok(())
    }

    pub fn get_edge(&self, client_a: &str, client_b: &str) -> AmlResult<Option<RelationshipEdge>> {
        // Edge keys are stored with (a, b) ordered; accept either order.
        let (a, b) = if client_a <= client_b { (client_a, client_b) } else { (client_b, client_a) };
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM relationship_edge WHERE client_a = ?1 AND client_b = ?2"
        ))?;
        stmt.query_row(params![a, b], edge_row_mapper)
            .optional()
            .map_err(Into::into)
    }

    pub fn edges_for_client(&self, client_id: &str) -> AmlResult<Vec<RelationshipEdge>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM relationship_edge
             WHERE client_a = ?1 OR client_b = ?1
             ORDER BY connection_strength DESC"
        ))?;
        let rows = stmt.query_map(params![client_id], edge_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Persisted neighborhood of one client: the connecting edges plus the
    /// aggregate rows of every involved client (center included when known).
    pub fn client_neighborhood(
        &self,
        client_id: &str,
    ) -> AmlResult<(Vec<ClientAggregates>, Vec<RelationshipEdge>)> {
        let edges = self.edges_for_client(client_id)?;
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CLIENT_COLUMNS} FROM client WHERE client_id = ?1"
        ))?;
        let mut nodes = Vec::with_capacity(edges.len() + 1);
        let mut ids: Vec<&str> = vec![client_id];
        for edge in &edges {
            let peer = if edge.client_a == client_id { &edge.client_b } else { &edge.client_a };
            ids.push(peer);
        }
        for id in ids {
            if let Some(node) = stmt.query_row(params![id], client_row_mapper).optional()? {
                nodes.push(node);
            }
        }
        Ok((nodes, edges))
    }

    /// Every persisted edge, used to warm the in-memory graph at startup.
    pub fn all_edges(&self) -> AmlResult<Vec<RelationshipEdge>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {EDGE_COLUMNS} FROM relationship_edge"))?;
        let rows = stmt.query_map([], edge_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn edge_count(&self) -> AmlResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM relationship_edge", [], |row| row.get(0))
            .map_err(Into::into)
    }
}
