//! Message dispatch. `dispatch` is total: every raw inbound message maps to
//! exactly one response document, whatever the handler does.

use std::sync::Arc;

use tracing::{debug, error};

use crate::handlers::{self, HandlerState};
use crate::protocol::{Request, Response};

/// Decode, validate, route, and collapse failures. Never panics, never
/// returns without a response.
pub async fn dispatch(state: &Arc<HandlerState>, raw: &str) -> Response {
    let request: Request = match serde_json::from_str(raw) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "malformed request");
            return Response::error(format!("invalid request: {e}"));
        }
    };

    let result = match request {
        Request::GeneratePrescription { patient_input } => {
            handlers::generate_prescription(state, patient_input).await
        }
        Request::DoctorFeedback {
            prescription_id,
            original_prescription: _,
            modified_prescription,
            feedback_notes,
            doctor_id,
        } => {
            handlers::doctor_feedback(
                state,
                prescription_id,
                modified_prescription,
                feedback_notes,
                doctor_id,
            )
            .await
        }
        Request::UpdateModel {} => handlers::update_model(state).await,
    };

    result.unwrap_or_else(|e| {
        error!(error = %e, "handler failed");
        Response::error(e.to_string())
    })
}
