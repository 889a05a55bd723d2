use tracing::instrument;

use rxgate_core::domain::{now_rfc3339, ModelVersion};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Append-only ledger of model versions. The current version is the most
/// recent row.
pub struct VersionRepo {
    db: Database,
}

impl VersionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(version = %version))]
    pub fn append(
        &self,
        version: &str,
        training_samples: u32,
        feedback_samples: u32,
    ) -> Result<ModelVersion, StoreError> {
        let created_at = now_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO model_versions (version, training_samples, feedback_samples, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![version, training_samples, feedback_samples, created_at],
            )?;
            Ok(ModelVersion {
                version: version.to_string(),
                training_samples,
                feedback_samples,
                created_at,
            })
        })
    }

    /// The most recently appended version, if any.
    #[instrument(skip(self))]
    pub fn latest(&self) -> Result<Option<ModelVersion>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT version, training_samples, feedback_samples, created_at
                 FROM model_versions ORDER BY created_at DESC, id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query([])?;
            match rows.next()? {
                Some(row) => Ok(Some(ModelVersion {
                    version: row_helpers::get(row, 0, "model_versions", "version")?,
                    training_samples: row_helpers::get::<i64>(row, 1, "model_versions", "training_samples")?
                        as u32,
                    feedback_samples: row_helpers::get::<i64>(row, 2, "model_versions", "feedback_samples")?
                        as u32,
                    created_at: row_helpers::get(row, 3, "model_versions", "created_at")?,
                })),
                None => Ok(None),
            }
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM model_versions", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}
