use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::services::checkout::CheckoutError;
use crate::services::reconcile::ReconcileError;
use crate::ports::StoreError;

/// HTTP-facing error taxonomy. Every variant maps to a stable machine code
/// in the response body so clients branch on typed kinds, never on message
/// substrings.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("offering not found or not purchasable")]
    OfferingNotFound,

    #[error("offering already purchased")]
    AlreadyPurchased {
        transaction_id: Uuid,
        transaction_code: String,
    },

    #[error("an open transaction already exists for this offering")]
    OpenTransactionExists {
        transaction_id: Uuid,
        transaction_code: String,
    },

    #[error("promo code rejected: {0}")]
    PromoInvalid(String),

    #[error("offering does not accept promo codes")]
    PromoNotAllowed,

    #[error("conflicting concurrent request: {0}")]
    Conflict(String),

    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("storage error: {0}")]
    Database(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::OfferingNotFound | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyPurchased { .. }
            | AppError::OpenTransactionExists { .. }
            | AppError::Conflict(_)
            | AppError::InvalidState(_) => StatusCode::CONFLICT,
            AppError::PromoInvalid(_) | AppError::PromoNotAllowed => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body.
    fn code(&self) -> &'static str {
        match self {
            AppError::OfferingNotFound => "offering_not_found",
            AppError::AlreadyPurchased { .. } => "already_purchased",
            AppError::OpenTransactionExists { .. } => "open_transaction_exists",
            AppError::PromoInvalid(_) => "promo_invalid",
            AppError::PromoNotAllowed => "promo_not_allowed",
            AppError::Conflict(_) => "conflict",
            AppError::GatewayUnavailable(_) => "gateway_unavailable",
            AppError::InvalidState(_) => "invalid_state",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Database(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut body = json!({
            "error": self.code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        // The disambiguation variants carry the existing transaction so the
        // caller can resume it or redirect to it.
        match &self {
            AppError::AlreadyPurchased {
                transaction_id,
                transaction_code,
            }
            | AppError::OpenTransactionExists {
                transaction_id,
                transaction_code,
            } => {
                body["transaction_id"] = json!(transaction_id);
                body["transaction_code"] = json!(transaction_code);
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict(reason) => AppError::Conflict(reason),
            StoreError::Database(reason) => AppError::Database(reason),
        }
    }
}

impl From<CheckoutError> for AppError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::OfferingNotFound(_) => AppError::OfferingNotFound,
            CheckoutError::AlreadyPurchased {
                transaction_id,
                transaction_code,
            } => AppError::AlreadyPurchased {
                transaction_id,
                transaction_code,
            },
            CheckoutError::OpenTransactionExists {
                transaction_id,
                transaction_code,
            } => AppError::OpenTransactionExists {
                transaction_id,
                transaction_code,
            },
            CheckoutError::PromoInvalid(rejection) => AppError::PromoInvalid(rejection.to_string()),
            CheckoutError::PromoNotAllowed => AppError::PromoNotAllowed,
            CheckoutError::Conflict => {
                AppError::Conflict("concurrent checkout in progress".to_string())
            }
            CheckoutError::NotFound(id) => AppError::NotFound(format!("transaction {id}")),
            CheckoutError::InvalidState { id, status } => {
                AppError::InvalidState(format!("transaction {id} is {status}, expected open"))
            }
            CheckoutError::GatewayUnavailable(reason) => AppError::GatewayUnavailable(reason),
            CheckoutError::Store(e) => e.into(),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::NotFound(id) => AppError::NotFound(format!("transaction {id}")),
            ReconcileError::Store(e) => e.into(),
        }
    }
}
