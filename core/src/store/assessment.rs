//! Assessment persistence and read paths.

use super::{parse_json_column, parse_timestamp_column, AmlStore};
use crate::error::AmlResult;
use crate::record::{ProfileScores, RiskAssessment, RiskLevel};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

fn assessment_row_mapper(row: &Row<'_>) -> rusqlite::Result<RiskAssessment> {
    let level_raw: String = row.get(11)?;
    let risk_level = RiskLevel::parse(&level_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            11,
            Type::Text,
            format!("unknown risk level '{level_raw}'").into(),
        )
    })?;
    Ok(RiskAssessment {
        reference_id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        timestamp: parse_timestamp_column(3, row.get(3)?)?,
        amount: row.get(4)?,
        scores: ProfileScores {
            transactional: row.get(5)?,
            network: row.get(6)?,
            customer: row.get(7)?,
            behavioral: row.get(8)?,
            geographic: row.get(9)?,
        },
        final_score: row.get(10)?,
        risk_level,
        indicators: parse_json_column(12, row.get(12)?)?,
    })
}

const ASSESSMENT_COLUMNS: &str = "reference_id, sender_id, receiver_id, ts, amount,
            score_transactional, score_network, score_customer, score_behavioral,
            score_geographic, final_score, risk_level, indicators";

impl AmlStore {
    /// Insert one assessment. Keyed by reference_id: re-ingesting the same
    /// export hits the conflict arm and leaves the stored verdict untouched.
    /// Returns whether the row was newly inserted, which is what gates the
    /// client-aggregate update.
    pub fn insert_assessment(&self, run_id: &str, a: &RiskAssessment) -> AmlResult<bool> {
        let indicators = serde_json::to_string(&a.indicators)?;
        let changed = self.conn().execute(
            "INSERT INTO assessment (
                reference_id, run_id, sender_id, receiver_id, ts, amount,
                score_transactional, score_network, score_customer,
                score_behavioral, score_geographic, final_score, risk_level,
                indicators
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(reference_id) DO NOTHING",
            params![
                a.reference_id,
                run_id,
                a.sender_id,
                a.receiver_id,
                a.timestamp.to_rfc3339(),
                a.amount,
                a.scores.transactional,
                a.scores.network,
                a.scores.customer,
                a.scores.behavioral,
                a.scores.geographic,
                a.final_score,
                a.risk_level.as_str(),
                indicators,
            ],
        )?;
        Ok(changed > 0)
    }

    pub fn assessment_by_reference(&self, reference_id: &str) -> AmlResult<Option<RiskAssessment>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessment WHERE reference_id = ?1"
        ))?;
        stmt.query_row(params![reference_id], assessment_row_mapper)
            .optional()
            .map_err(Into::into)
    }

    /// All assessments where the client is sender or receiver, newest first.
    pub fn assessments_for_client(&self, client_id: &str) -> AmlResult<Vec<RiskAssessment>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ASSESSMENT_COLUMNS} FROM assessment
             WHERE sender_id = ?1 OR receiver_id = ?1
             ORDER BY ts DESC"
        ))?;
        let rows = stmt.query_map(params![client_id], assessment_row_mapper)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Every persisted reference id, used to warm the graph's replay guard.
    pub fn all_reference_ids(&self) -> AmlResult<Vec<String>> {
        let mut stmt = self.conn().prepare("SELECT reference_id FROM assessment")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn assessment_count(&self) -> AmlResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM assessment", [], |row| row.get(0))
            .map_err(Into::into)
    }

    pub fn assessment_count_by_level(&self, level: RiskLevel) -> AmlResult<i64> {
        self.conn()
            .query_row(
                "SELECT COUNT(*) FROM assessment WHERE risk_level = ?1",
                params![level.as_str()],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }
}
