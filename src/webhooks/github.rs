use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use tracing::{debug, error, info, warn};

use crate::error::PreviewError;
use crate::server::AppState;
use crate::webhooks::{events, signature};

const EVENT_HEADER: &str = "x-github-event";

/// `POST /webhook`.
///
/// The signature is checked against the raw body before anything is parsed.
/// Answers with an empty body: 200 once the event has been handled, 400 for a
/// bad signature or payload, 500 when a controller step failed.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let provided = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if !signature::verify(&body, provided, state.config.github_webhook_secret.as_bytes()) {
        warn!(has_header = provided.is_some(), "rejecting webhook with invalid signature");
        return PreviewError::SignatureError("signature mismatch".to_string()).status_code();
    }

    match headers.get(EVENT_HEADER).and_then(|v| v.to_str().ok()) {
        Some("ping") => {
            info!("Received ping from GitHub");
            return StatusCode::OK;
        }
        Some(name) if name != "pull_request" => {
            debug!(event = %name, "ignoring non pull_request event");
            return StatusCode::OK;
        }
        _ => {}
    }

    let event = match events::classify(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejecting malformed webhook");
            return PreviewError::from(e).status_code();
        }
    };

    info!(
        action = %event.action,
        repo = %event.repo_name,
        pr = event.pull_request_number,
        "Received webhook"
    );

    // Run on its own task so a client that hangs up mid-deploy does not
    // cancel the deployment halfway through.
    let controller = state.controller.clone();
    let task = tokio::spawn(async move { controller.dispatch(&event).await });

    match task.await {
        Ok(Ok(_)) => StatusCode::OK,
        Ok(Err(e)) => {
            error!(error = %e, "webhook processing failed");
            e.status_code()
        }
        Err(e) => {
            error!(error = %e, "webhook task panicked");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
