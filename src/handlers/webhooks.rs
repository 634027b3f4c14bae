use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use crate::error::ServiceError;
use crate::paystack::{signature, WebhookEvent};
use crate::services::webhook_processor;
use crate::websocket;
use crate::AppState;

fn plain(status: StatusCode, body: &'static str) -> Response {
    (status, body).into_response()
}

/// Paystack posts charge outcomes here. Anything other than a 2xx makes Paystack retry,
/// so malformed payloads are acknowledged and only storage failures answer 500.
pub async fn paystack_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let secret = match state.config.paystack_secret_key.as_deref() {
        Some(s) => s,
        None => {
            tracing::error!("PAYSTACK_SECRET_KEY not configured; rejecting webhook");
            return plain(StatusCode::INTERNAL_SERVER_ERROR, "Configuration error");
        }
    };

    match headers.get(signature::SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(sig) => {
            if !signature::verify(secret, &body, sig) {
                tracing::warn!("Webhook signature mismatch");
                return plain(StatusCode::UNAUTHORIZED, "Invalid signature");
            }
        }
        None if state.config.allow_unsigned_webhooks => {
            tracing::warn!("Accepting unsigned webhook (PAYSTACK_ALLOW_UNSIGNED_WEBHOOKS)");
        }
        None => {
            tracing::warn!("Webhook without signature header");
            return plain(StatusCode::UNAUTHORIZED, "Missing signature");
        }
    }

    let raw: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Webhook body is not JSON: {}", e);
            return plain(StatusCode::OK, "OK");
        }
    };
    let event: WebhookEvent = match serde_json::from_value(raw.clone()) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Webhook body is not a Paystack event: {}", e);
            return plain(StatusCode::OK, "OK");
        }
    };

    tracing::info!(event = %event.event, "Paystack webhook received");

    match webhook_processor::process_event(&state.db_pool, &state.config, &event, &raw).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook processed");
            websocket::broadcast_notifications(&state.broadcast_tx, outcome.notifications());
            plain(StatusCode::OK, "OK")
        }
        Err(ServiceError::Validation(msg)) => {
            tracing::warn!("Webhook payload rejected: {}", msg);
            plain(StatusCode::OK, "OK")
        }
        Err(e) => {
            tracing::error!("Webhook processing failed: {}", e);
            plain(StatusCode::INTERNAL_SERVER_ERROR, "Processing error")
        }
    }
}
