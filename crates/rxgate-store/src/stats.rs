use serde::Serialize;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;

/// Summary counts across the persisted tables.
#[derive(Clone, Debug, Serialize)]
pub struct StoreSummary {
    pub total_patients: u64,
    pub total_prescriptions: u64,
    pub total_feedback: u64,
    pub latest_model_version: Option<String>,
}

/// Aggregate read over all four tables in one lock acquisition.
#[instrument(skip(db))]
pub fn summary(db: &Database) -> Result<StoreSummary, StoreError> {
    db.with_conn(|conn| {
        let total_patients: i64 =
            conn.query_row("SELECT COUNT(*) FROM patient_inputs", [], |row| row.get(0))?;
        let total_prescriptions: i64 =
            conn.query_row("SELECT COUNT(*) FROM prescriptions", [], |row| row.get(0))?;
        let total_feedback: i64 =
            conn.query_row("SELECT COUNT(*) FROM doctor_feedback", [], |row| row.get(0))?;
        let latest_model_version: Option<String> = conn
            .query_row(
                "SELECT version FROM model_versions ORDER BY created_at DESC, id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .ok();

        Ok(StoreSummary {
            total_patients: total_patients as u64,
            total_prescriptions: total_prescriptions as u64,
            total_feedback: total_feedback as u64,
            latest_model_version,
        })
    })
}
