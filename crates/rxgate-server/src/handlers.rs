//! Request handlers, one per operation. Handlers return
//! `Result<Response, HandlerError>`; the router collapses errors into
//! `error` documents at its boundary.

use std::sync::Arc;

use tracing::{info, instrument};

use rxgate_core::domain::DoctorFeedback;
use rxgate_core::errors::ModelError;
use rxgate_core::provider::PredictionProvider;
use rxgate_store::feedback::FeedbackRepo;
use rxgate_store::patients::PatientRepo;
use rxgate_store::prescriptions::PrescriptionRepo;
use rxgate_store::versions::VersionRepo;
use rxgate_store::{Database, StoreError};

use crate::protocol::{PatientInputDoc, PrescriptionPayload, Response};

/// How many feedback records a single re-versioning pass may consume.
const TRAINING_BATCH_LIMIT: u32 = 100;

/// Shared state available to all handlers.
pub struct HandlerState {
    pub db: Database,
    pub provider: Arc<dyn PredictionProvider>,
}

impl HandlerState {
    pub fn new(db: Database, provider: Arc<dyn PredictionProvider>) -> Self {
        Self { db, provider }
    }
}

/// Failures a handler can surface. Collapsed to an `error` response by the
/// router; never terminates the connection.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Model(#[from] ModelError),
}

/// Generate a prescription: persist the patient input, call the provider,
/// persist the linked prescription, echo the display name if supplied.
#[instrument(skip(state, doc), fields(age = doc.age))]
pub async fn generate_prescription(
    state: &Arc<HandlerState>,
    doc: PatientInputDoc,
) -> Result<Response, HandlerError> {
    let patient = doc.to_patient_input();
    let patient_id = PatientRepo::new(state.db.clone()).save(&patient)?;

    let prescription = state
        .provider
        .generate(&patient)
        .await
        .with_patient_input(patient_id);
    let prescription_id = PrescriptionRepo::new(state.db.clone()).save(&prescription)?;

    info!(
        prescription_id,
        patient_id,
        confidence = prescription.confidence,
        "prescription generated"
    );

    Ok(Response::prescription_generated(
        prescription_id,
        PrescriptionPayload {
            medications: prescription.medications,
            confidence: prescription.confidence,
            model_version: prescription.model_version,
            generated_at: prescription.created_at,
            // Display-only: not part of PatientInput, never persisted
            patient_name: doc.name,
        },
    ))
}

/// Record a doctor's correction. The stored prescription's medication list
/// is the authoritative `original_prescription` snapshot; the caller-supplied
/// copy is ignored so the audit trail cannot be forged.
#[instrument(skip(state, modified_prescription, feedback_notes))]
pub async fn doctor_feedback(
    state: &Arc<HandlerState>,
    prescription_id: i64,
    modified_prescription: Vec<String>,
    feedback_notes: String,
    doctor_id: String,
) -> Result<Response, HandlerError> {
    let stored = PrescriptionRepo::new(state.db.clone()).get(prescription_id)?;

    let feedback = DoctorFeedback::new(
        prescription_id,
        stored.medications,
        modified_prescription,
        feedback_notes,
        doctor_id,
    );
    let feedback_id = FeedbackRepo::new(state.db.clone()).save(&feedback)?;

    info!(feedback_id, prescription_id, "doctor feedback recorded");

    Ok(Response::feedback_saved(feedback_id, prescription_id))
}

/// Re-version the model from accumulated feedback and append the ledger row.
/// Valid with zero outstanding feedback.
#[instrument(skip(state))]
pub async fn update_model(state: &Arc<HandlerState>) -> Result<Response, HandlerError> {
    let records = FeedbackRepo::new(state.db.clone()).for_training(TRAINING_BATCH_LIMIT)?;
    let feedback_samples = records.len() as u32;

    let new_version = state.provider.update_with_feedback(&records).await?;

    let training_samples = PrescriptionRepo::new(state.db.clone()).count()? as u32;
    VersionRepo::new(state.db.clone()).append(&new_version, training_samples, feedback_samples)?;

    info!(version = %new_version, feedback_samples, "model re-versioned");

    Ok(Response::model_updated(new_version, feedback_samples))
}
