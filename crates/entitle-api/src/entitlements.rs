//! Handlers for `/entitlements` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entitlements` | `?company_id=&status=`; tenants see their own |
//! | `POST` | `/entitlements` | Admin only |
//! | `GET`  | `/entitlements/{id}` | |
//! | `PATCH` | `/entitlements/{id}` | Body: `{"auto_renew":false}`; also `notes`, `end_date`; admin only |
//! | `GET`  | `/entitlements/{id}/availability` | |
//! | `POST` | `/entitlements/{id}/status` | Body: `{"status":"canceled","reason":".."}`; admin only |
//! | `POST` | `/entitlements/{id}/renew` | Body: `{}` or `{"reset_counters":true}`; admin only |
//! | `GET`  | `/entitlements/{id}/history` | |
//! | `GET`  | `/entitlements/{id}/payments` | |
//! | `GET`  | `/companies/{id}/entitlement` | The active, in-force one; 404 if none |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use entitle_core::{
  audit::StatusEvent,
  availability::AvailabilityResult,
  entitlement::{
    EntitlementPatch, EntitlementQuery, EntitlementStatus, NewEntitlement,
    RenewEntitlement, SupportEntitlement,
  },
  payment::PaymentLedger,
  store::SupportStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, error::ApiError};

/// Load an entitlement the caller is allowed to see.
pub(crate) async fn visible<S: SupportStore>(
  store: &S,
  caller: &Caller,
  id: Uuid,
) -> Result<SupportEntitlement, ApiError> {
  let ent = store
    .get_entitlement(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("entitlement {id}")))?;
  caller.ensure_company(ent.company_id)?;
  Ok(ent)
}

/// `GET /entitlements`
pub async fn list<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(mut query): Query<EntitlementQuery>,
) -> Result<Json<Vec<SupportEntitlement>>, ApiError> {
  query.company_id = caller.scope(query.company_id);
  let ents = store
    .list_entitlements(&query)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ents))
}

/// `POST /entitlements`
pub async fn create<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewEntitlement>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let ent = store
    .create_entitlement(body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(ent)))
}

/// `GET /entitlements/{id}`
pub async fn get<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportEntitlement>, ApiError> {
  visible(store.as_ref(), &caller, id).await.map(Json)
}

/// `PATCH /entitlements/{id}`
pub async fn update<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<EntitlementPatch>,
) -> Result<Json<SupportEntitlement>, ApiError> {
  caller.require_admin()?;
  let ent = store
    .update_entitlement(id, body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ent))
}

/// `GET /entitlements/{id}/availability`
pub async fn availability<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<AvailabilityResult>, ApiError> {
  visible(store.as_ref(), &caller, id).await?;
  let result = store.availability(id).await.map_err(ApiError::from_store)?;
  Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: EntitlementStatus,
  pub reason: Option<String>,
}

/// `POST /entitlements/{id}/status`
pub async fn change_status<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<SupportEntitlement>, ApiError> {
  caller.require_admin()?;
  let ent = store
    .change_entitlement_status(id, body.status, caller.actor(), body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ent))
}

/// `POST /entitlements/{id}/renew`
pub async fn renew<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<RenewEntitlement>,
) -> Result<impl IntoResponse, ApiError> {
  caller.require_admin()?;
  let ent = store
    .renew_entitlement(id, body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(ent)))
}

/// `GET /entitlements/{id}/history`
pub async fn history<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusEvent>>, ApiError> {
  visible(store.as_ref(), &caller, id).await?;
  let events = store
    .entitlement_history(id)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(events))
}

/// `GET /entitlements/{id}/payments`
pub async fn payments<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<PaymentLedger>, ApiError> {
  visible(store.as_ref(), &caller, id).await?;
  let ledger = store.list_payments(id).await.map_err(ApiError::from_store)?;
  Ok(Json(ledger))
}

/// `GET /companies/{id}/entitlement`
pub async fn active_for_company<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(company_id): Path<Uuid>,
) -> Result<Json<SupportEntitlement>, ApiError> {
  caller.ensure_company(company_id)?;
  store
    .active_entitlement(company_id)
    .await
    .map_err(ApiError::from_store)?
    .map(Json)
    .ok_or_else(|| {
      ApiError::NotFound(format!("no active entitlement for company {company_id}"))
    })
}
