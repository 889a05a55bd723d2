use tracing::instrument;

use rxgate_core::domain::{DoctorFeedback, FeedbackRecord};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct FeedbackRepo {
    db: Database,
}

impl FeedbackRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a feedback record and return its server-assigned id.
    #[instrument(skip(self, feedback), fields(prescription_id = feedback.prescription_id, doctor_id = %feedback.doctor_id))]
    pub fn save(&self, feedback: &DoctorFeedback) -> Result<i64, StoreError> {
        let original = serde_json::to_string(&feedback.original_prescription)?;
        let modified = serde_json::to_string(&feedback.modified_prescription)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO doctor_feedback (prescription_id, original_prescription,
                                              modified_prescription, feedback_notes, doctor_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    feedback.prescription_id,
                    original,
                    modified,
                    feedback.feedback_notes,
                    feedback.doctor_id,
                    feedback.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<DoctorFeedback, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT prescription_id, original_prescription, modified_prescription,
                        feedback_notes, doctor_id, created_at
                 FROM doctor_feedback WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => {
                    let original: String =
                        row_helpers::get(row, 1, "doctor_feedback", "original_prescription")?;
                    let modified: String =
                        row_helpers::get(row, 2, "doctor_feedback", "modified_prescription")?;
                    Ok(DoctorFeedback {
                        prescription_id: row_helpers::get(row, 0, "doctor_feedback", "prescription_id")?,
                        original_prescription: row_helpers::parse_string_list(
                            &original,
                            "doctor_feedback",
                            "original_prescription",
                        )?,
                        modified_prescription: row_helpers::parse_string_list(
                            &modified,
                            "doctor_feedback",
                            "modified_prescription",
                        )?,
                        feedback_notes: row_helpers::get_opt(row, 3, "doctor_feedback", "feedback_notes")?
                            .unwrap_or_default(),
                        doctor_id: row_helpers::get(row, 4, "doctor_feedback", "doctor_id")?,
                        created_at: row_helpers::get(row, 5, "doctor_feedback", "created_at")?,
                    })
                }
                None => Err(StoreError::NotFound(format!("feedback {id}"))),
            }
        })
    }

    /// Feedback eligible for retraining, joined with patient context.
    /// Most recent first, bounded by `limit`.
    #[instrument(skip(self))]
    pub fn for_training(&self, limit: u32) -> Result<Vec<FeedbackRecord>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pi.symptoms, pi.age, pi.gender, pi.diagnosis,
                        df.original_prescription, df.modified_prescription, df.feedback_notes
                 FROM doctor_feedback df
                 JOIN prescriptions p ON df.prescription_id = p.id
                 JOIN patient_inputs pi ON p.patient_input_id = pi.id
                 ORDER BY df.created_at DESC, df.id DESC
                 LIMIT ?1",
            )?;
            let mut rows = stmt.query([limit])?;
            let mut records = Vec::new();
            while let Some(row) = rows.next()? {
                let original: String =
                    row_helpers::get(row, 4, "doctor_feedback", "original_prescription")?;
                let modified: String =
                    row_helpers::get(row, 5, "doctor_feedback", "modified_prescription")?;
                records.push(FeedbackRecord {
                    symptoms: row_helpers::get(row, 0, "patient_inputs", "symptoms")?,
                    age: row_helpers::get::<i64>(row, 1, "patient_inputs", "age")? as u32,
                    gender: row_helpers::get(row, 2, "patient_inputs", "gender")?,
                    diagnosis: row_helpers::get(row, 3, "patient_inputs", "diagnosis")?,
                    original_prescription: row_helpers::parse_string_list(
                        &original,
                        "doctor_feedback",
                        "original_prescription",
                    )?,
                    modified_prescription: row_helpers::parse_string_list(
                        &modified,
                        "doctor_feedback",
                        "modified_prescription",
                    )?,
                    feedback_notes: row_helpers::get_opt(row, 6, "doctor_feedback", "feedback_notes")?
                        .unwrap_or_default(),
                });
            }
            Ok(records)
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 =
                conn.query_row("SELECT COUNT(*) FROM doctor_feedback", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rxgate_core::domain::{PatientInput, Prescription};

    use crate::patients::PatientRepo;
    use crate::prescriptions::PrescriptionRepo;

    fn seed_prescription(db: &Database, symptoms: &str) -> i64 {
        let patient_id = PatientRepo::new(db.clone())
            .save(&PatientInput::new(symptoms, 45, "female", "hypertension"))
            .unwrap();
        PrescriptionRepo::new(db.clone())
            .save(
                &Prescription::new(vec!["Lisinopril".into()], 0.8, "1.0.0")
                    .with_patient_input(patient_id),
            )
            .unwrap()
    }

    #[test]
    fn save_and_get_roundtrip() {
        let db = Database::in_memory().unwrap();
        let rx_id = seed_prescription(&db, "back pain");
        let repo = FeedbackRepo::new(db);

        let fb = DoctorFeedback::new(
            rx_id,
            vec!["Lisinopril".into()],
            vec!["Lisinopril".into(), "Vitamin D".into()],
            "added vitamin D",
            "dr_test",
        );
        let id = repo.save(&fb).unwrap();

        let fetched = repo.get(id).unwrap();
        assert_eq!(fetched.prescription_id, rx_id);
        assert_eq!(fetched.original_prescription, vec!["Lisinopril".to_string()]);
        assert_eq!(fetched.modified_prescription.len(), 2);
        assert_eq!(fetched.doctor_id, "dr_test");
    }

    #[test]
    fn for_training_joins_patient_context() {
        let db = Database::in_memory().unwrap();
        let rx_id = seed_prescription(&db, "back pain, fatigue");
        let repo = FeedbackRepo::new(db);

        repo.save(&DoctorFeedback::new(
            rx_id,
            vec!["Lisinopril".into()],
            vec!["Amlodipine".into()],
            "switched agent",
            "dr_test",
        ))
        .unwrap();

        let records = repo.for_training(100).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symptoms, "back pain, fatigue");
        assert_eq!(records[0].modified_prescription, vec!["Amlodipine".to_string()]);
    }

    #[test]
    fn for_training_respects_limit_and_order() {
        let db = Database::in_memory().unwrap();
        let rx_id = seed_prescription(&db, "cough");
        let repo = FeedbackRepo::new(db);

        for i in 0..5 {
            repo.save(&DoctorFeedback::new(
                rx_id,
                vec!["A".into()],
                vec![format!("mod-{i}")],
                "",
                "dr",
            ))
            .unwrap();
        }

        let records = repo.for_training(3).unwrap();
        assert_eq!(records.len(), 3);
        // Most recent first
        assert_eq!(records[0].modified_prescription, vec!["mod-4".to_string()]);
    }

    #[test]
    fn for_training_empty_store() {
        let db = Database::in_memory().unwrap();
        let repo = FeedbackRepo::new(db);
        assert!(repo.for_training(100).unwrap().is_empty());
    }
}
