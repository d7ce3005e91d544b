use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use taskhub_services::dispatch::{self, DispatchPayload};
use taskhub_services::fulfillment::FulfillmentOutcome;

use crate::{error::ApiError, state::AppState};

pub const SIGNATURE_HEADER: &str = "x-dispatch-signature";

/// Callback entry point for the delayed-message dispatch service. Signature
/// is verified before any state is read; every handled or no-op outcome is
/// a 200 so the service does not redeliver, and only genuine internal
/// errors become 5xx.
pub async fn dispatch_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing signature header".to_string()))?;

    dispatch::verify_signature(&state.settings.dispatch.webhook_secret, &body, sig_header)
        .map_err(|_| ApiError::Unauthorized("Invalid webhook signature".to_string()))?;

    let payload: DispatchPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    let outcome = state.fulfillment.fulfill(&payload).await?;

    let outcome = match outcome {
        FulfillmentOutcome::Sent => "sent",
        FulfillmentOutcome::Skipped => "skipped",
        FulfillmentOutcome::Failed => "failed",
        FulfillmentOutcome::NoOp => "noop",
    };
    Ok(Json(serde_json::json!({ "outcome": outcome })))
}
