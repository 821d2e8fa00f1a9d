//! Support tickets and their comments.
//!
//! A ticket's consumption is attributed to its entitlement exactly once, at
//! the moment it enters [`TicketStatus::Closed`]. Every status change goes
//! through [`TicketStatus::transition`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

const MAX_TITLE_LEN: usize = 255;

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Open,
  InProgress,
  AwaitingReply,
  Closed,
  Canceled,
}

impl TicketStatus {
  pub const ALL: [TicketStatus; 5] = [
    TicketStatus::Open,
    TicketStatus::InProgress,
    TicketStatus::AwaitingReply,
    TicketStatus::Closed,
    TicketStatus::Canceled,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "open",
      Self::InProgress => "in_progress",
      Self::AwaitingReply => "awaiting_reply",
      Self::Closed => "closed",
      Self::Canceled => "canceled",
    }
  }

  /// The single transition table shared by every mutation path.
  ///
  /// `Closed -> Open` is the administrative reopen. `Canceled` is terminal.
  pub fn can_transition_to(self, next: Self) -> bool {
    use TicketStatus::*;
    matches!(
      (self, next),
      (Open, InProgress | AwaitingReply | Closed | Canceled)
        | (InProgress, AwaitingReply | Closed | Canceled)
        | (AwaitingReply, InProgress | Closed | Canceled)
        | (Closed, Open)
    )
  }

  pub fn transition(self, next: Self) -> Result<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition {
        entity: "ticket",
        from:   self.as_str(),
        to:     next.as_str(),
      })
    }
  }

  /// Where a new comment moves the ticket, if anywhere.
  pub fn after_comment(self) -> Option<Self> {
    match self {
      Self::Open | Self::InProgress => Some(Self::AwaitingReply),
      _ => None,
    }
  }

  /// Whether tickets in this status count against a ticket allowance.
  pub fn counts_against_allowance(self) -> bool { self != Self::Canceled }
}

// ─── Priority ────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  Low,
  #[default]
  Medium,
  High,
  Critical,
}

impl Priority {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

// ─── Ticket ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportTicket {
  pub ticket_id:      Uuid,
  pub entitlement_id: Uuid,
  /// Denormalised from the entitlement.
  pub company_id:     Uuid,
  pub created_by:     Option<Uuid>,
  pub title:          String,
  pub description:    Option<String>,
  pub status:         TicketStatus,
  pub priority:       Priority,
  pub assignee:       Option<Uuid>,
  pub created_at:     DateTime<Utc>,
  pub updated_at:     DateTime<Utc>,
  pub closed_at:      Option<DateTime<Utc>>,
  /// Set by the first closure. A reopened ticket that closes again is not
  /// counted a second time.
  pub consumption_applied: bool,
  /// Open attribute bag: origin, client version, attachments…
  pub metadata:       serde_json::Value,
}

/// Input to [`crate::store::SupportStore::create_ticket`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
  pub entitlement_id: Uuid,
  pub title:          String,
  pub description:    Option<String>,
  #[serde(default)]
  pub priority:       Priority,
  #[serde(default)]
  pub metadata:       serde_json::Value,
}

impl NewTicket {
  pub fn new(entitlement_id: Uuid, title: impl Into<String>) -> Self {
    Self {
      entitlement_id,
      title: title.into(),
      description: None,
      priority: Priority::default(),
      metadata: serde_json::Value::Null,
    }
  }

  pub fn validate(&self) -> Result<()> {
    let title = self.title.trim();
    if title.is_empty() {
      return Err(Error::Validation("ticket title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
      return Err(Error::Validation(format!(
        "ticket title exceeds {MAX_TITLE_LEN} characters"
      )));
    }
    if !(self.metadata.is_null() || self.metadata.is_object()) {
      return Err(Error::Validation("ticket metadata must be an object".into()));
    }
    Ok(())
  }
}

/// Parameters for [`crate::store::SupportStore::list_tickets`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TicketQuery {
  pub entitlement_id: Option<Uuid>,
  pub company_id:     Option<Uuid>,
  pub status:         Option<TicketStatus>,
  pub priority:       Option<Priority>,
  pub assignee:       Option<Uuid>,
  pub limit:          Option<usize>,
  pub offset:         Option<usize>,
}

/// Per-status ticket counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketStats {
  pub open:           u32,
  pub in_progress:    u32,
  pub awaiting_reply: u32,
  pub closed:         u32,
  pub canceled:       u32,
  /// Critical tickets that are neither closed nor canceled.
  pub critical_open:  u32,
}

impl TicketStats {
  pub fn tally(
    tickets: impl IntoIterator<Item = (TicketStatus, Priority)>,
  ) -> Self {
    let mut stats = Self::default();
    for (status, priority) in tickets {
      match status {
        TicketStatus::Open => stats.open += 1,
        TicketStatus::InProgress => stats.in_progress += 1,
        TicketStatus::AwaitingReply => stats.awaiting_reply += 1,
        TicketStatus::Closed => stats.closed += 1,
        TicketStatus::Canceled => stats.canceled += 1,
      }
      if priority == Priority::Critical
        && !matches!(status, TicketStatus::Closed | TicketStatus::Canceled)
      {
        stats.critical_open += 1;
      }
    }
    stats
  }
}

// ─── Comments ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
  /// Internal support staff.
  Staff,
  /// A user of the customer company.
  Tenant,
  /// Generated by the engine to record a change.
  System,
}

impl AuthorKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Staff => "staff",
      Self::Tenant => "tenant",
      Self::System => "system",
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketComment {
  pub comment_id:  Uuid,
  pub ticket_id:   Uuid,
  pub author_kind: AuthorKind,
  pub author_id:   Option<Uuid>,
  pub body:        String,
  /// Opaque references into external attachment storage.
  pub attachments: Vec<String>,
  pub created_at:  DateTime<Utc>,
}

impl TicketComment {
  pub fn is_staff(&self) -> bool { self.author_kind != AuthorKind::Tenant }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
  pub body:        String,
  #[serde(default)]
  pub attachments: Vec<String>,
}

impl NewComment {
  pub fn new(body: impl Into<String>) -> Self {
    Self { body: body.into(), attachments: Vec::new() }
  }

  pub fn validate(&self) -> Result<()> {
    if self.body.trim().is_empty() {
      return Err(Error::Validation("comment body is required".into()));
    }
    Ok(())
  }
}
