//! Wire types: one JSON document per message, `type` selects the operation.

use serde::{Deserialize, Serialize};

use rxgate_core::domain::{now_rfc3339, PatientInput};

/// Inbound request. Unknown `type` values and malformed payloads surface as
/// a deserialization error, which the router reports as an `error` document.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GeneratePrescription {
        #[serde(default)]
        patient_input: PatientInputDoc,
    },
    DoctorFeedback {
        prescription_id: i64,
        #[serde(default)]
        original_prescription: Vec<String>,
        #[serde(default)]
        modified_prescription: Vec<String>,
        #[serde(default)]
        feedback_notes: String,
        doctor_id: String,
    },
    UpdateModel {},
}

/// Patient fields as submitted by clients. `name`, `medical_history` and
/// `allergies` are transport-layer metadata: accepted, never persisted
/// (`name` is echoed back in the response).
#[derive(Debug, Default, Deserialize)]
pub struct PatientInputDoc {
    pub name: Option<String>,
    #[serde(default)]
    pub age: u32,
    pub gender: Option<String>,
    #[serde(default)]
    pub symptoms: Symptoms,
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medical_history: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
}

impl PatientInputDoc {
    /// Build the domain object, applying wire defaults: symptom lists are
    /// joined with ", ", gender defaults to "Unknown", diagnosis to "".
    pub fn to_patient_input(&self) -> PatientInput {
        PatientInput::new(
            self.symptoms.joined(),
            self.age,
            self.gender.clone().unwrap_or_else(|| "Unknown".to_string()),
            self.diagnosis.clone().unwrap_or_default(),
        )
    }
}

/// Symptoms arrive as either free text or a list of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Symptoms {
    Text(String),
    List(Vec<String>),
}

impl Symptoms {
    pub fn joined(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(", "),
        }
    }
}

impl Default for Symptoms {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

/// Prescription payload as serialized in a success response.
#[derive(Debug, Serialize)]
pub struct PrescriptionPayload {
    pub medications: Vec<String>,
    pub confidence: f64,
    pub model_version: String,
    pub generated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
}

/// Outbound response. Every request yields exactly one of these.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    PrescriptionGenerated {
        status: &'static str,
        prescription_id: i64,
        prescription: PrescriptionPayload,
        message: String,
    },
    FeedbackSaved {
        status: &'static str,
        feedback_id: i64,
        prescription_id: i64,
        message: String,
    },
    ModelUpdated {
        status: &'static str,
        new_version: String,
        feedback_samples_used: u32,
        updated_at: String,
        message: String,
    },
    Error {
        status: &'static str,
        message: String,
        timestamp: String,
    },
}

impl Response {
    pub fn prescription_generated(
        prescription_id: i64,
        prescription: PrescriptionPayload,
    ) -> Self {
        Self::PrescriptionGenerated {
            status: "success",
            prescription_id,
            prescription,
            message: "Prescription generated successfully".to_string(),
        }
    }

    pub fn feedback_saved(feedback_id: i64, prescription_id: i64) -> Self {
        Self::FeedbackSaved {
            status: "success",
            feedback_id,
            prescription_id,
            message: "Doctor feedback saved successfully".to_string(),
        }
    }

    pub fn model_updated(new_version: String, feedback_samples_used: u32) -> Self {
        Self::ModelUpdated {
            status: "success",
            new_version,
            feedback_samples_used,
            updated_at: now_rfc3339(),
            message: "Model updated successfully".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            status: "error",
            message: message.into(),
            timestamp: now_rfc3339(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Serialize for the wire. These types cannot fail to serialize; the
    /// fallback guards the write path anyway.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","status":"error","message":"response serialization failed"}"#
                .to_string()
        })
    }
}
