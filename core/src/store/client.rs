//! Client aggregate persistence.

use super::{parse_timestamp_column, AmlStore};
use crate::error::AmlResult;
use crate::record::ClientAggregates;
use rusqlite::{params, OptionalExtension, Row};

pub(crate) fn client_row_mapper(row: &Row<'_>) -> rusqlite::Result<ClientAggregates> {
    Ok(ClientAggregates {
        client_id: row.get(0)?,
        display_name: row.get(1)?,
        country: row.get(2)?,
        total_transactions: row.get::<_, i64>(3)? as u64,
        total_amount: row.get(4)?,
        suspicious_count: row.get::<_, i64>(5)? as u64,
        first_seen: parse_timestamp_column(6, row.get(6)?)?,
        last_seen: parse_timestamp_column(7, row.get(7)?)?,
        amount_mean: row.get(8)?,
        amount_m2: row.get(9)?,
        night_transactions: row.get::<_, i64>(10)? as u64,
    })
}

pub(crate) const CLIENT_COLUMNS: &str = "client_id, display_name, country,
            total_transactions, total_amount, suspicious_count,
            first_seen, last_seen, amount_mean, amount_m2, night_transactions";

impl AmlStore {
    /// Write the full aggregate row, replacing whatever was there. The sink
    /// computes the new aggregates in memory and stores the absolute state,
    /// so replays that were filtered upstream can never double-count here.
    pub fn upsert_client(&self, c: &ClientAggregates) -> AmlResult<()> {
        self.conn().execute(
            "INSERT INTO client (
                client_id, display_name, country, total_transactions,
                total_amount, suspicious_count, first_seen, last_seen,
                amount_mean, amount_m2, night_transactions
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(client_id) DO UPDATE SET
                display_name = excluded.display_name,
                country = excluded.country,
                total_transactions = excluded.total_transactions,
                total_amount = excluded.total_amount,
                suspicious_count = excluded.suspicious_count,
                first_seen = excluded.first_seen,
                last_seen = excluded.last_seen,
                amount_mean = excluded.amount_mean,
                amount_m2 = excluded.amount_m2,
                night_transactions = excluded.night_transactions",
            params![
                c.client_id,
                c.display_name,
                c.country,
                c.total_transactions as i64,
                c.total_amount,
                c.suspicious_count as i64,
                c.first_seen.to_rfc3339(),
                c.last_seen.to_rfc3339(),
                c.amount_mean,
                c.amount_m2,
                c.night_transactions as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_client(&self, client_id: &str) -> AmlResult<Option<ClientAggregates>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {CLIENT_COLUMNS} FROM client WHERE client_id = ?1"))?;
        stmt.query_row(params![client_id], client_row_mapper)
            .optional()
            .map_err(Into::into)
    }

    /// Load every client row, used to warm the in-memory directory when a
    /// run continues against an existing database.
    pub fn all_clients(&self) -> AmlResult<Vec<ClientAggregates>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("SELECT {CLIENT_COLUMNS} FROM client"))?;
        let rows = stmt.query_map([], client_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn client_count(&self) -> AmlResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM client", [], |row| row.get(0))
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn upsert_replaces_absolute_state() {
        let store = AmlStore::in_memory().unwrap();
        store.migrate().unwrap();
        let ts = Utc.with_ymd_and_hms(2025, 4, 21, 12, 0, 0).unwrap();
        let mut agg = ClientAggregates::new("c1".into(), "Client One".into(), "KZ".into(), ts);
        agg.absorb(100.0, ts, false, false);
        store.upsert_client(&agg).unwrap();
        agg.absorb(300.0, ts, true, false);
        store.upsert_client(&agg).unwrap();

        let stored = store.get_client("c1").unwrap().unwrap();
        assert_eq!(stored.total_transactions, 2);
        assert_eq!(stored.total_amount, 400.0);
        assert_eq!(stored.suspicious_count, 1);
        assert_eq!(store.client_count().unwrap(), 1);
    }
}
