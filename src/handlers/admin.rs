//! Operator overrides. These bypass the conditional-update safety, so each
//! use is gated on the admin token and audit-logged with the acting
//! operator.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::domain::TransactionStatus;
use crate::error::AppError;
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
const ADMIN_ACTOR_HEADER: &str = "x-admin-actor";

/// Constant-time token comparison. Both sides go through an HMAC so the
/// equality check runs over fixed-length tags instead of the secret itself.
fn tokens_match(provided: &str, expected: &str) -> bool {
    let mut provided_mac = HmacSha256::new_from_slice(expected.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    provided_mac.update(provided.as_bytes());
    let tag = provided_mac.finalize().into_bytes();

    let mut expected_mac = HmacSha256::new_from_slice(expected.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    expected_mac.update(expected.as_bytes());
    expected_mac.verify_slice(&tag).is_ok()
}

fn require_admin(headers: &HeaderMap, expected_token: &str) -> Result<String, AppError> {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing admin token".to_string()))?;
    if !tokens_match(token, expected_token) {
        return Err(AppError::Unauthorized("invalid admin token".to_string()));
    }
    Ok(headers
        .get(ADMIN_ACTOR_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("admin")
        .to_string())
}

/// Manual payment confirmation: force-transitions a transaction to PAID
/// regardless of its current status.
pub async fn mark_paid(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let actor = require_admin(&headers, &state.admin_token)?;

    let previous = state.store.get(id).await?;
    let tx = state.store.force_status(id, TransactionStatus::Paid).await?;

    tracing::warn!(
        transaction_id = %tx.id,
        transaction_code = %tx.code,
        previous_status = %previous.map(|t| t.status.to_string()).unwrap_or_default(),
        actor = %actor,
        "admin override: transaction forced to paid"
    );
    Ok(Json(tx))
}

/// Hard delete regardless of status. Normal flow only ever deletes OPEN
/// records; this is the operator escape hatch.
pub async fn purge(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let actor = require_admin(&headers, &state.admin_token)?;

    let previous = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))?;
    state.store.purge(id).await?;

    tracing::warn!(
        transaction_id = %previous.id,
        transaction_code = %previous.code,
        status = %previous.status,
        actor = %actor,
        "admin override: transaction hard-deleted"
    );
    Ok(StatusCode::NO_CONTENT)
}
