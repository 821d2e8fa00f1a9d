//! Append-only status history.
//!
//! Every state change of an entitlement, ticket or plan subscription is
//! recorded as one immutable [`StatusEvent`]. Events are never updated or
//! deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSubject {
  Entitlement,
  Ticket,
  Subscription,
}

impl AuditSubject {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Entitlement => "entitlement",
      Self::Ticket => "ticket",
      Self::Subscription => "subscription",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
  pub event_id:   Uuid,
  pub subject:    AuditSubject,
  pub subject_id: Uuid,
  pub at:         DateTime<Utc>,
  pub actor:      Actor,
  /// `None` for the event that records creation.
  pub old_status: Option<String>,
  pub new_status: String,
  pub reason:     Option<String>,
}
