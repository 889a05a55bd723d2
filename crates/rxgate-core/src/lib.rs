pub mod domain;
pub mod errors;
pub mod provider;

pub use domain::{DoctorFeedback, FeedbackRecord, ModelVersion, PatientInput, Prescription};
pub use errors::ModelError;
pub use provider::PredictionProvider;
