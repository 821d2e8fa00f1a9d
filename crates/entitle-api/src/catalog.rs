//! Handlers for the catalog: support types, plans and plan subscriptions.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/support-types` | `?include_inactive=true` for admins |
//! | `POST` | `/support-types` | Admin only |
//! | `GET`  | `/support-types/{id}` | 404 if not found |
//! | `PATCH` | `/support-types/{id}` | Partial edit; admin only |
//! | `POST` | `/support-types/{id}/active` | Body: `{"active":false}`; admin only |
//! | `GET`  | `/plans` | |
//! | `POST` | `/plans` | Admin only |
//! | `GET`  | `/plans/{id}` | |
//! | `GET`  | `/subscriptions` | `?company_id=`; tenants see their own |
//! | `POST` | `/subscriptions` | Admin only |
//! | `GET`  | `/subscriptions/{id}` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use entitle_core::{
  catalog::{NewSupportType, SupportType, SupportTypePatch},
  store::SupportStore,
  subscription::{NewPlan, NewSubscription, Plan, PlanSubscription},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

// ─── Support types ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct TypeListParams {
  #[serde(default)]
  pub include_inactive: bool,
}

/// `GET /support-types`
pub async fn list_types<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(params): Query<TypeListParams>,
) -> Result<Json<Vec<SupportType>>, ApiError> {
  let include_inactive = params.include_inactive && caller.is_admin();
  let types = store
    .list_support_types(include_inactive)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(types))
}

/// `POST /support-types`
pub async fn create_type<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewSupportType>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let created = store
    .create_support_type(body)
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /support-types/{id}`
pub async fn get_type<S: SupportStore>(
  State(store): State<Arc<S>>,
  _caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportType>, ApiError> {
  store
    .get_support_type(id)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("support type {id}")))
}

/// `PATCH /support-types/{id}`
pub async fn update_type<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<SupportTypePatch>,
) -> Result<Json<SupportType>, ApiError> {
  caller.require_admin()?;
  let updated = store
    .update_support_type(id, body)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub active: bool,
}

/// `POST /support-types/{id}/active`
pub async fn set_type_active<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<ActiveBody>,
) -> Result<Json<SupportType>, ApiError> {
  caller.require_admin()?;
  let updated = store
    .set_support_type_active(id, body.active)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(updated))
}

// ─── Plans ───────────────────────────────────────────────────────────────────

/// `GET /plans`
pub async fn list_plans<S: SupportStore>(
  State(store): State<Arc<S>>,
  _caller: Caller,
) -> Result<Json<Vec<Plan>>, ApiError> {
  let plans = store.list_plans().await.map_err(ApiError::from_store)?;
  Ok(Json(plans))
}

/// `POST /plans`
pub async fn create_plan<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewPlan>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let plan = store.create_plan(body).await.map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(plan)))
}

/// `GET /plans/{id}`
pub async fn get_plan<S: SupportStore>(
  State(store): State<Arc<S>>,
  _caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Plan>, ApiError> {
  store
    .get_plan(id)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("plan {id}")))
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionListParams {
  pub company_id: Option<Uuid>,
}

/// `GET /subscriptions[?company_id=<uuid>]`
pub async fn list_subscriptions<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(params): Query<SubscriptionListParams>,
) -> Result<Json<Vec<PlanSubscription>>, ApiError> {
  let subs = store
    .list_subscriptions(caller.scope(params.company_id))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(subs))
}

/// `POST /subscriptions`
pub async fn create_subscription<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewSubscription>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let sub = store
    .create_subscription(body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(sub)))
}

/// `GET /subscriptions/{id}`
pub async fn get_subscription<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<PlanSubscription>, ApiError> {
  let sub = store
    .get_subscription(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("subscription {id}")))?;
  caller.ensure_company(sub.company_id)?;
  Ok(Json(sub))
}
