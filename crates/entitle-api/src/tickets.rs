//! Handlers for `/tickets` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/tickets` | Filters: `entitlement_id`, `company_id`, `status`, `priority`, `assignee`, `limit`, `offset` |
//! | `POST` | `/tickets` | 409 with the availability body when refused |
//! | `GET`  | `/tickets/stats` | `?company_id=` |
//! | `GET`  | `/tickets/{id}` | |
//! | `POST` | `/tickets/{id}/close` | Admin only |
//! | `POST` | `/tickets/{id}/reopen` | Admin only |
//! | `POST` | `/tickets/{id}/cancel` | |
//! | `POST` | `/tickets/{id}/status` | Body: `{"status":"in_progress"}`; admin only unless canceling |
//! | `POST` | `/tickets/{id}/priority` | Body: `{"priority":"high"}` |
//! | `POST` | `/tickets/{id}/assign` | Body: `{"assignee":null}`; admin only |
//! | `GET`  | `/tickets/{id}/comments` | Chronological |
//! | `POST` | `/tickets/{id}/comments` | Body: `{"body":"..","attachments":[]}` |
//! | `GET`  | `/tickets/{id}/history` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use entitle_core::{
  audit::StatusEvent,
  store::SupportStore,
  ticket::{
    NewComment, NewTicket, Priority, SupportTicket, TicketComment,
    TicketQuery, TicketStats, TicketStatus,
  },
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{caller::Caller, entitlements, error::ApiError};

async fn visible<S: SupportStore>(
  store: &S,
  caller: &Caller,
  id: Uuid,
) -> Result<SupportTicket, ApiError> {
  let ticket = store
    .get_ticket(id)
    .await
    .map_err(ApiError::from_store)?
    .ok_or_else(|| ApiError::NotFound(format!("ticket {id}")))?;
  caller.ensure_company(ticket.company_id)?;
  Ok(ticket)
}

// ─── Queries ─────────────────────────────────────────────────────────────────

/// `GET /tickets`
pub async fn list<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(mut query): Query<TicketQuery>,
) -> Result<Json<Vec<SupportTicket>>, ApiError> {
  query.company_id = caller.scope(query.company_id);
  let tickets = store
    .list_tickets(&query)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(tickets))
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
  pub company_id: Option<Uuid>,
}

/// `GET /tickets/stats`
pub async fn stats<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Query(params): Query<StatsParams>,
) -> Result<Json<TicketStats>, ApiError> {
  let stats = store
    .ticket_stats(caller.scope(params.company_id))
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(stats))
}

/// `GET /tickets/{id}`
pub async fn get<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportTicket>, ApiError> {
  visible(store.as_ref(), &caller, id).await.map(Json)
}

/// `GET /tickets/{id}/history`
pub async fn history<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<StatusEvent>>, ApiError> {
  visible(store.as_ref(), &caller, id).await?;
  let events = store.ticket_history(id).await.map_err(ApiError::from_store)?;
  Ok(Json(events))
}

// ─── Create ──────────────────────────────────────────────────────────────────

/// `POST /tickets`
pub async fn create<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Json(body): Json<NewTicket>,
) -> Result<impl IntoResponse, ApiError> {
  entitlements::visible(store.as_ref(), &caller, body.entitlement_id).await?;
  let ticket = store
    .create_ticket(body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(ticket)))
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// `POST /tickets/{id}/close`
pub async fn close<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportTicket>, ApiError> {
  caller.require_admin()?;
  let ticket = store
    .close_ticket(id, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

/// `POST /tickets/{id}/reopen`
pub async fn reopen<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportTicket>, ApiError> {
  caller.require_admin()?;
  let ticket = store
    .reopen_ticket(id, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

/// `POST /tickets/{id}/cancel`
pub async fn cancel<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SupportTicket>, ApiError> {
  let ticket = store
    .cancel_ticket(id, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: TicketStatus,
  pub reason: Option<String>,
}

/// `POST /tickets/{id}/status`
pub async fn change_status<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<Json<SupportTicket>, ApiError> {
  if body.status != TicketStatus::Canceled {
    caller.require_admin()?;
  }
  let ticket = store
    .change_ticket_status(id, body.status, caller.actor(), body.reason)
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct PriorityBody {
  pub priority: Priority,
}

/// `POST /tickets/{id}/priority`
pub async fn set_priority<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<PriorityBody>,
) -> Result<Json<SupportTicket>, ApiError> {
  let ticket = store
    .set_ticket_priority(id, body.priority, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
  pub assignee: Option<Uuid>,
}

/// `POST /tickets/{id}/assign`
pub async fn assign<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<AssignBody>,
) -> Result<Json<SupportTicket>, ApiError> {
  caller.require_admin()?;
  let ticket = store
    .assign_ticket(id, body.assignee, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok(Json(ticket))
}

// ─── Comments ────────────────────────────────────────────────────────────────

/// `GET /tickets/{id}/comments`
pub async fn list_comments<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketComment>>, ApiError> {
  visible(store.as_ref(), &caller, id).await?;
  let comments = store.list_comments(id).await.map_err(ApiError::from_store)?;
  Ok(Json(comments))
}

/// `POST /tickets/{id}/comments`
pub async fn add_comment<S: SupportStore>(
  State(store): State<Arc<S>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<NewComment>,
) -> Result<impl IntoResponse, ApiError> {
  let comment = store
    .add_comment(id, body, caller.actor())
    .await
    .map_err(ApiError::from_store)?;
  Ok((StatusCode::CREATED, Json(comment)))
}
