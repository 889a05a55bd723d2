use async_trait::async_trait;

use crate::domain::{FeedbackRecord, PatientInput, Prescription};
use crate::errors::ModelError;

/// Trait implemented by each prescription provider (rule engine, remote model).
///
/// Implementations are selected at construction time and hidden behind
/// `Arc<dyn PredictionProvider>` at the server boundary.
#[async_trait]
pub trait PredictionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// The version label stamped onto generated prescriptions.
    fn current_version(&self) -> String;

    /// Propose medications for the given patient input.
    ///
    /// Never fails: internal errors degrade to
    /// [`Prescription::generation_failed`] so the caller always has a
    /// well-formed object to serialize.
    async fn generate(&self, input: &PatientInput) -> Prescription;

    /// Incorporate doctor feedback and resolve to the new version label.
    /// May be long-running from the caller's perspective.
    async fn update_with_feedback(&self, records: &[FeedbackRecord]) -> Result<String, ModelError>;
}
