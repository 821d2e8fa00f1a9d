//! Handlers for `/payments`. Listing lives under
//! `/entitlements/{id}/payments`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/payments` | Admin only; a successful payment activates a pending entitlement |
//! | `POST` | `/payments/{id}/status` | Body: `{"status":"failed"}`; admin only |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use entitle_core::{
  payment::{NewPayment, PaymentStatus, SupportPayment},
  store::SupportStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

/// `POST /payments`
pub async fn record<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewPayment>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let payment = store
    .record_payment(body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(payment)))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: PaymentStatus,
}

/// `POST /payments/{id}/status`
pub async fn change_status<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<SupportPayment>, ApiError> {
  caller.require_admin()?;
  let payment = store
    .change_payment_status(id, body.status, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(payment))
}
