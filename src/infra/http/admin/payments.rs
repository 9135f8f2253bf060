use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::admin::payments::{
    AdminPaymentError, CreatePaymentCommand, PAYMENT_LIST_SPEC,
};
use crate::domain::types::PaymentMethod;
use crate::infra::http::error::ApiError;

use super::{AdminState, ListParams};

#[derive(Debug, Deserialize)]
pub struct PaymentCreateRequest {
    pub enrollment_id: Uuid,
    pub amount_cents: i64,
    pub method: PaymentMethod,
    pub reference: Option<String>,
}

pub async fn list(
    State(state): State<AdminState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = params.into_query(&PAYMENT_LIST_SPEC)?;
    Ok(Json(state.payments.list(&query).await))
}

pub async fn detail(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    Json(state.payments.detail(&id).await)
}

pub async fn create(
    State(state): State<AdminState>,
    Json(payload): Json<PaymentCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state
        .payments
        .create(CreatePaymentCommand {
            enrollment_id: payload.enrollment_id,
            amount_cents: payload.amount_cents,
            method: payload.method,
            reference: payload.reference,
        })
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn record_paid(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.payments.record_paid(id).await.map_err(to_api)?;
    Ok(Json(payment))
}

pub async fn record_failed(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payment = state.payments.record_failed(id).await.map_err(to_api)?;
    Ok(Json(payment))
}

pub async fn remove(
    State(state): State<AdminState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.payments.delete(id).await.map_err(to_api)?;
    Ok(StatusCode::NO_CONTENT)
}

fn to_api(err: AdminPaymentError) -> ApiError {
    match err {
        AdminPaymentError::ConstraintViolation(field) => {
            ApiError::bad_request("invalid field value", Some(field.to_string()))
        }
        AdminPaymentError::NotFound => ApiError::not_found("payment not found"),
        AdminPaymentError::UnknownEnrollment => {
            ApiError::bad_request("enrollment does not exist", None)
        }
        AdminPaymentError::AlreadySettled => {
            ApiError::conflict("payment is already settled", None)
        }
        AdminPaymentError::Repo(err) => ApiError::repo(Some(err.to_string())),
    }
}
