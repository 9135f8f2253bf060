use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::refunds::{
    AdminRefundError, CreateRefundCommand, REFUND_LIST_SPEC,
};
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct RefundCreateRequest {
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub reason: String,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&REFUND_LIST_SPEC)?;
    Ok(Json(state.refunds.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.refunds.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<RefundCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let refund = state
        .refunds
        .create(CreateRefundCommand {
            payment_id: payload.payment_id,
            amount_cents: payload.amount_cents,
            reason: payload.reason,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(refund)))
}

pub async fn approve(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let refund = state.refunds.approve(id).await.map_err(to_api)?;
    Ok(Json(refund))
}

pub async fn reject(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let refund = state.refunds.reject(id).await.map_err(to_api)?;
    Ok(Json(refund))
}

pub async fn process(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let refund = state.refunds.process(id).await.map_err(to_api)?;
    Ok(Json(refund))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.refunds.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminRefundError) -> ApiError {
    match err {
        AdminRefundError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminRefundError::NotFound => ApiError::not_found("refund not found"),
        AdminRefundError::UnknownPayment => ApiError::bad_request("payment does not exist", None),
        AdminRefundError::PaymentNotPaid => {
            ApiError::conflict("refunds require a paid payment", None)
        }
        AdminRefundError::ExceedsBalance { remaining_cents } => ApiError::conflict(
            "refund exceeds the refundable balance",
            Some(format!("{remaining_cents} cents remain refundable")),
        ),
        AdminRefundError::InvalidTransition => {
            ApiError::conflict("refund is not in a state that allows this transition", None)
        }
        AdminRefundError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
