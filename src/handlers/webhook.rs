//! Gateway callback endpoint. Verifies an HMAC-SHA256 signature over the raw
//! body, translates the gateway payload, and hands the outcome to the
//! reconciler. Duplicate deliveries come back 200; gateways retry on
//! anything else and there is nothing to retry.

use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::adapters::gateway::{translate_status, CallbackPayload};
use crate::error::AppError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-callback-signature";

pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    verify_signature(&state.webhook_secret, &headers, body.as_bytes())?;

    let payload: CallbackPayload = serde_json::from_str(&body)
        .map_err(|e| AppError::Validation(format!("malformed callback payload: {e}")))?;

    let outcome = translate_status(&payload.transaction_status).ok_or_else(|| {
        AppError::Validation(format!(
            "unknown gateway status '{}'",
            payload.transaction_status
        ))
    })?;

    let tx = state
        .store
        .get_by_code(&payload.order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {}", payload.order_id)))?;

    tracing::debug!(
        transaction_code = %payload.order_id,
        gateway_status = %payload.transaction_status,
        gateway_reference = ?payload.gateway_reference,
        "gateway callback received"
    );

    let updated = state.reconciler.apply(tx.id, outcome).await?;
    Ok(Json(updated))
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing callback signature".to_string()))?;

    let raw = hex::decode(signature)
        .map_err(|_| AppError::Unauthorized("malformed callback signature".to_string()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Database(format!("webhook secret unusable: {e}")))?;
    mac.update(body);
    mac.verify_slice(&raw)
        .map_err(|_| AppError::Unauthorized("invalid callback signature".to_string()))
}

/// Computes the signature a caller must send; shared with the tests.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}
