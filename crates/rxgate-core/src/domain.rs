use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current wall-clock time as an RFC 3339 string (storage and wire format).
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

/// Structured patient data submitted with a prescription request.
/// Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientInput {
    pub symptoms: String,
    pub age: u32,
    pub gender: String,
    pub diagnosis: String,
    pub created_at: String,
}

impl PatientInput {
    pub fn new(
        symptoms: impl Into<String>,
        age: u32,
        gender: impl Into<String>,
        diagnosis: impl Into<String>,
    ) -> Self {
        Self {
            symptoms: symptoms.into(),
            age,
            gender: gender.into(),
            diagnosis: diagnosis.into(),
            created_at: now_rfc3339(),
        }
    }
}

/// A medication recommendation produced by a provider.
///
/// Never mutated after creation — doctor corrections are recorded as
/// separate [`DoctorFeedback`] entries, not in-place edits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub medications: Vec<String>,
    pub confidence: f64,
    pub model_version: String,
    pub patient_input_id: Option<i64>,
    pub created_at: String,
}

impl Prescription {
    pub fn new(medications: Vec<String>, confidence: f64, model_version: impl Into<String>) -> Self {
        Self {
            medications,
            confidence,
            model_version: model_version.into(),
            patient_input_id: None,
            created_at: now_rfc3339(),
        }
    }

    /// Sentinel prescription returned when generation fails internally.
    /// Keeps the contract that `generate` always yields a well-formed object.
    pub fn generation_failed(model_version: impl Into<String>) -> Self {
        Self::new(
            vec!["Unable to generate prescription".to_string()],
            0.0,
            model_version,
        )
    }

    pub fn with_patient_input(mut self, patient_input_id: i64) -> Self {
        self.patient_input_id = Some(patient_input_id);
        self
    }
}

/// A doctor's correction to an issued prescription.
///
/// `original_prescription` is a snapshot of the prescription's medication
/// list at feedback time — the audit trail, not a reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorFeedback {
    pub prescription_id: i64,
    pub original_prescription: Vec<String>,
    pub modified_prescription: Vec<String>,
    pub feedback_notes: String,
    pub doctor_id: String,
    pub created_at: String,
}

impl DoctorFeedback {
    pub fn new(
        prescription_id: i64,
        original_prescription: Vec<String>,
        modified_prescription: Vec<String>,
        feedback_notes: impl Into<String>,
        doctor_id: impl Into<String>,
    ) -> Self {
        Self {
            prescription_id,
            original_prescription,
            modified_prescription,
            feedback_notes: feedback_notes.into(),
            doctor_id: doctor_id.into(),
            created_at: now_rfc3339(),
        }
    }
}

/// One row of the append-only model version ledger.
/// The current version is the most recent row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub version: String,
    pub training_samples: u32,
    pub feedback_samples: u32,
    pub created_at: String,
}

/// A feedback row joined with its patient context, as fed to retraining.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub symptoms: String,
    pub age: u32,
    pub gender: String,
    pub diagnosis: String,
    pub original_prescription: Vec<String>,
    pub modified_prescription: Vec<String>,
    pub feedback_notes: String,
}
