use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::services::checkout::CheckoutRequest;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub buyer_id: Uuid,
    pub offering_id: Uuid,
    pub promo_code: Option<String>,
    #[serde(default)]
    pub force_new: bool,
}

pub async fn initiate(
    State(state): State<AppState>,
    Json(body): Json<CheckoutBody>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .checkout
        .initiate_checkout(CheckoutRequest {
            buyer_id: body.buyer_id,
            offering_id: body.offering_id,
            promo_code: body.promo_code,
            force_new: body.force_new,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

#[derive(Debug, Deserialize)]
pub struct PreviewParams {
    pub offering_id: Uuid,
    pub promo_code: Option<String>,
}

pub async fn preview(
    State(state): State<AppState>,
    Query(params): Query<PreviewParams>,
) -> Result<impl IntoResponse, AppError> {
    let breakdown = state
        .checkout
        .preview_price(params.offering_id, params.promo_code.as_deref())
        .await?;
    Ok(Json(breakdown))
}

pub async fn issue_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.checkout.issue_payment_session(id).await?;
    Ok(Json(session))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {id}")))?;
    Ok(Json(tx))
}

pub async fn get_by_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state
        .store
        .get_by_code(&code)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("transaction {code}")))?;
    Ok(Json(tx))
}
