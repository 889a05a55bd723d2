use tracing::instrument;

use rxgate_core::domain::PatientInput;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

pub struct PatientRepo {
    db: Database,
}

impl PatientRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a patient input and return its server-assigned id.
    #[instrument(skip(self, input), fields(age = input.age))]
    pub fn save(&self, input: &PatientInput) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO patient_inputs (symptoms, age, gender, diagnosis, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    input.symptoms,
                    input.age,
                    input.gender,
                    input.diagnosis,
                    input.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    #[instrument(skip(self))]
    pub fn get(&self, id: i64) -> Result<PatientInput, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT symptoms, age, gender, diagnosis, created_at
                 FROM patient_inputs WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => Ok(PatientInput {
                    symptoms: row_helpers::get(row, 0, "patient_inputs", "symptoms")?,
                    age: row_helpers::get::<i64>(row, 1, "patient_inputs", "age")? as u32,
                    gender: row_helpers::get(row, 2, "patient_inputs", "gender")?,
                    diagnosis: row_helpers::get(row, 3, "patient_inputs", "diagnosis")?,
                    created_at: row_helpers::get(row, 4, "patient_inputs", "created_at")?,
                }),
                None => Err(StoreError::NotFound(format!("patient input {id}"))),
            }
        })
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM patient_inputs", [], |row| row.get(0))?;
            Ok(n as u64)
        })
    }
}
