//! Payment gateway webhook

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use axum_extra::TypedHeader;
use serde_json::{Value, json};
use ulid::Ulid;

use super::{ApiError, AppState, WebhookSecretHeader};

/// Event types that mean the customer has paid.
const PAID_EVENTS: &[&str] = &["checkout.session.completed", "payment.succeeded"];

/// The booking id either at the top level or, as checkout sessions carry it,
/// under `data.object.metadata.booking_id`.
fn booking_id(event: &Value) -> Option<Ulid> {
    let raw = event
        .get("booking_id")
        .or_else(|| event.pointer("/data/object/metadata/booking_id"))?
        .as_str()?;
    Ulid::from_string(raw.trim()).ok()
}

fn secrets_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len()
        && expected
            .bytes()
            .zip(presented.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// Handle gateway notifications. Unknown event types are acknowledged and
/// ignored so the gateway stops retrying them.
pub async fn webhook(
    State(state): State<AppState>,
    secret: Option<TypedHeader<WebhookSecretHeader>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let authorized = match (&state.webhook_secret, &secret) {
        (Some(expected), Some(TypedHeader(WebhookSecretHeader(presented)))) => {
            secrets_match(expected, presented)
        }
        _ => false,
    };
    if !authorized {
        tracing::warn!("payment webhook rejected: bad or missing secret");
        return Err(ApiError::Unauthorized);
    }
    let Json(event) = payload?;

    let kind = event.get("type").and_then(Value::as_str).unwrap_or_default();
    if !PAID_EVENTS.contains(&kind) {
        tracing::debug!("payment webhook ignoring event type {kind:?}");
        return Ok(Json(json!({ "received": true })));
    }

    let id = booking_id(&event)
        .ok_or_else(|| ApiError::BadRequest("event carries no booking_id".to_string()))?;
    state.engine.confirm_payment(None, id).await?;
    Ok(Json(json!({ "received": true })))
}
