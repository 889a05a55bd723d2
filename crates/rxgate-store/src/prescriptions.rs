use tracing::instrument;

use rxgate_core::domain::Prescription;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct PrescriptionRepo {
    db: Database,
}

impl PrescriptionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a prescription and return its server-assigned id.
    /// Medication lists are stored as JSON arrays.
    #[instrument(skip(self, rx), fields(model_version = %rx.model_version))]
    pub fn save(&self, rx: &Prescription) -> Result<i64, StoreError> {
        let medications = serde_json::to_string(&rx.medications)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO prescriptions (patient_input_id, medications, confidence, model_version, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    rx.patient_input_id,
                    medications,
                    rx.confidence,
                    rx.model_version,
                    rx.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<Prescription, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT patient_input_id, medications, confidence, model_version, created_at
                 FROM prescriptions WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => {
                    let raw: String = row_helpers::get(row, 1, "prescriptions", "medications")?;
                    Ok(Prescription {
                        patient_input_id: row_helpers::get_opt(row, 0, "prescriptions", "patient_input_id")?,
                        medications: row_helpers::parse_string_list(&raw, "prescriptions", "medications")?,
                        confidence: row_helpers::get(row, 2, "prescriptions", "confidence")?,
                        model_version: row_helpers::get(row, 3, "prescriptions", "model_version")?,
                        created_at: row_helpers::get(row, 4, "prescriptions", "created_at")?,
                    })
                }
                None => Err(StoreError::NotFound(format!("prescription {id}"))),
            }
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM prescriptions", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxgate_core::domain::PatientInput;

    use crate::patients::PatientRepo;

    #[test]
    fn save_and_get_roundtrip() {
        let db = Database::in_memory().unwrap();
        let patients = PatientRepo::new(db.clone());
        let repo = PrescriptionRepo::new(db);

        let patient_id = patients
            .save(&PatientInput::new("headache", 45, "female", "migraine"))
            .unwrap();

        let rx = Prescription::new(vec!["Ibuprofen".into(), "Acetaminophen".into()], 0.85, "1.0.0")
            .with_patient_input(patient_id);
        let id = repo.save(&rx).unwrap();

        let fetched = repo.get(id).unwrap();
        assert_eq!(fetched.medications, rx.medications);
        assert_eq!(fetched.confidence, 0.85);
        assert_eq!(fetched.patient_input_id, Some(patient_id));
    }

    #[test]
    fn save_without_patient_link() {
        let db = Database::in_memory().unwrap();
        let repo = PrescriptionRepo::new(db);
        let rx = Prescription::new(vec!["Ibuprofen".into()], 0.5, "1.0.0");
        let id = repo.save(&rx).unwrap();
        let fetched = repo.get(id).unwrap();
        assert_eq!(fetched.patient_input_id, None);
    }

    #[test]
    fn get_missing_is_not_found() {
        let db = Database::in_memory().unwrap();
        let repo = PrescriptionRepo::new(db);
        assert!(matches!(repo.get(42), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn corrupt_medications_column_detected() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO prescriptions (medications, confidence, model_version, created_at)
                 VALUES ('not json', 0.5, '1.0.0', '2026-01-01T00:00:00Z')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let repo = PrescriptionRepo::new(db);
        let result = repo.get(1);
        assert!(matches!(result, Err(StoreError::CorruptRow { .. })));
    }
}
