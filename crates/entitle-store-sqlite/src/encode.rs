//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Each `Raw*` struct holds a row exactly as read; `into_*` turns it into the
//! domain type, surfacing any malformed column as an [`Error`].

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use entitle_core::{
  audit::StatusEvent,
  catalog::SupportType,
  entitlement::SupportEntitlement,
  payment::SupportPayment,
  subscription::{Plan, PlanSubscription},
  ticket::{SupportTicket, TicketComment},
};
use rusqlite::Row;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

/// Fixed-width so that lexical order in SQL equals chronological order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

/// Decode a unit-variant enum from its serde name (`"in_progress"` etc.).
pub fn decode_enum<T: DeserializeOwned>(s: &str) -> Result<T> {
  serde_json::from_value(serde_json::Value::String(s.to_owned()))
    .map_err(|_| Error::Decode(format!("unknown enum value {s:?}")))
}

fn decode_count(n: Option<i64>) -> Result<Option<u32>> {
  n.map(|n| {
    u32::try_from(n).map_err(|_| Error::Decode(format!("count out of range: {n}")))
  })
  .transpose()
}

// ─── Support types ───────────────────────────────────────────────────────────

pub struct RawSupportType {
  pub support_type_id: String,
  pub name:            String,
  pub description:     Option<String>,
  pub modality:        String,
  pub tier:            String,
  pub price:           String,
  pub max_tickets:     Option<i64>,
  pub max_hours:       Option<i64>,
  pub active:          bool,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawSupportType {
  pub const COLUMNS: &'static str = "support_type_id, name, description, modality, tier, \
     price, max_tickets, max_hours, active, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      support_type_id: row.get(0)?,
      name:            row.get(1)?,
      description:     row.get(2)?,
      modality:        row.get(3)?,
      tier:            row.get(4)?,
      price:           row.get(5)?,
      max_tickets:     row.get(6)?,
      max_hours:       row.get(7)?,
      active:          row.get(8)?,
      created_at:      row.get(9)?,
      updated_at:      row.get(10)?,
    })
  }

  pub fn into_support_type(self) -> Result<SupportType> {
    Ok(SupportType {
      support_type_id: decode_uuid(&self.support_type_id)?,
      name:            self.name,
      description:     self.description,
      modality:        decode_enum(&self.modality)?,
      tier:            decode_enum(&self.tier)?,
      price:           decode_decimal(&self.price)?,
      max_tickets:     decode_count(self.max_tickets)?,
      max_hours:       decode_count(self.max_hours)?,
      active:          self.active,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Plans and subscriptions ─────────────────────────────────────────────────

pub struct RawPlan {
  pub plan_id:       String,
  pub name:          String,
  pub description:   Option<String>,
  pub monthly_price: String,
  pub yearly_price:  String,
  pub created_at:    String,
}

impl RawPlan {
  pub const COLUMNS: &'static str =
    "plan_id, name, description, monthly_price, yearly_price, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      plan_id:       row.get(0)?,
      name:          row.get(1)?,
      description:   row.get(2)?,
      monthly_price: row.get(3)?,
      yearly_price:  row.get(4)?,
      created_at:    row.get(5)?,
    })
  }

  pub fn into_plan(self) -> Result<Plan> {
    Ok(Plan {
      plan_id:       decode_uuid(&self.plan_id)?,
      name:          self.name,
      description:   self.description,
      monthly_price: decode_decimal(&self.monthly_price)?,
      yearly_price:  decode_decimal(&self.yearly_price)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawSubscription {
  pub subscription_id:  String,
  pub company_id:       String,
  pub plan_id:          String,
  pub period:           String,
  pub price_paid:       String,
  pub discount_percent: String,
  pub status:           String,
  pub start_date:       String,
  pub end_date:         Option<String>,
  pub auto_renew:       bool,
  pub predecessor_id:   Option<String>,
  pub notes:            Option<String>,
  pub created_by:       Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawSubscription {
  pub const COLUMNS: &'static str = "subscription_id, company_id, plan_id, period, \
     price_paid, discount_percent, status, start_date, end_date, auto_renew, \
     predecessor_id, notes, created_by, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subscription_id:  row.get(0)?,
      company_id:       row.get(1)?,
      plan_id:          row.get(2)?,
      period:           row.get(3)?,
      price_paid:       row.get(4)?,
      discount_percent: row.get(5)?,
      status:           row.get(6)?,
      start_date:       row.get(7)?,
      end_date:         row.get(8)?,
      auto_renew:       row.get(9)?,
      predecessor_id:   row.get(10)?,
      notes:            row.get(11)?,
      created_by:       row.get(12)?,
      created_at:       row.get(13)?,
      updated_at:       row.get(14)?,
    })
  }

  pub fn into_subscription(self) -> Result<PlanSubscription> {
    Ok(PlanSubscription {
      subscription_id:  decode_uuid(&self.subscription_id)?,
      company_id:       decode_uuid(&self.company_id)?,
      plan_id:          decode_uuid(&self.plan_id)?,
      period:           decode_enum(&self.period)?,
      price_paid:       decode_decimal(&self.price_paid)?,
      discount_percent: decode_decimal(&self.discount_percent)?,
      status:           decode_enum(&self.status)?,
      start_date:       decode_date(&self.start_date)?,
      end_date:         self.end_date.as_deref().map(decode_date).transpose()?,
      auto_renew:       self.auto_renew,
      predecessor_id:   decode_opt_uuid(self.predecessor_id)?,
      notes:            self.notes,
      created_by:       decode_opt_uuid(self.created_by)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Entitlements ────────────────────────────────────────────────────────────

pub struct RawEntitlement {
  pub entitlement_id:   String,
  pub company_id:       String,
  pub subscription_id:  String,
  pub support_type_id:  String,
  pub start_date:       String,
  pub end_date:         Option<String>,
  pub status:           String,
  pub current_price:    String,
  pub tickets_consumed: i64,
  pub hours_consumed:   String,
  pub auto_renew:       bool,
  pub notes:            Option<String>,
  pub created_by:       Option<String>,
  pub predecessor_id:   Option<String>,
  pub created_at:       String,
  pub updated_at:       String,
}

impl RawEntitlement {
  pub const COLUMNS: &'static str = "entitlement_id, company_id, subscription_id, \
     support_type_id, start_date, end_date, status, current_price, \
     tickets_consumed, hours_consumed, auto_renew, notes, created_by, \
     predecessor_id, created_at, updated_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entitlement_id:   row.get(0)?,
      company_id:       row.get(1)?,
      subscription_id:  row.get(2)?,
      support_type_id:  row.get(3)?,
      start_date:       row.get(4)?,
      end_date:         row.get(5)?,
      status:           row.get(6)?,
      current_price:    row.get(7)?,
      tickets_consumed: row.get(8)?,
      hours_consumed:   row.get(9)?,
      auto_renew:       row.get(10)?,
      notes:            row.get(11)?,
      created_by:       row.get(12)?,
      predecessor_id:   row.get(13)?,
      created_at:       row.get(14)?,
      updated_at:       row.get(15)?,
    })
  }

  pub fn into_entitlement(self) -> Result<SupportEntitlement> {
    Ok(SupportEntitlement {
      entitlement_id:   decode_uuid(&self.entitlement_id)?,
      company_id:       decode_uuid(&self.company_id)?,
      subscription_id:  decode_uuid(&self.subscription_id)?,
      support_type_id:  decode_uuid(&self.support_type_id)?,
      start_date:       decode_date(&self.start_date)?,
      end_date:         self.end_date.as_deref().map(decode_date).transpose()?,
      status:           decode_enum(&self.status)?,
      current_price:    decode_decimal(&self.current_price)?,
      tickets_consumed: decode_count(Some(self.tickets_consumed))?.unwrap_or(0),
      hours_consumed:   decode_decimal(&self.hours_consumed)?,
      auto_renew:       self.auto_renew,
      notes:            self.notes,
      created_by:       decode_opt_uuid(self.created_by)?,
      predecessor_id:   decode_opt_uuid(self.predecessor_id)?,
      created_at:       decode_dt(&self.created_at)?,
      updated_at:       decode_dt(&self.updated_at)?,
    })
  }
}

// ─── Tickets and comments ────────────────────────────────────────────────────

pub struct RawTicket {
  pub ticket_id:      String,
  pub entitlement_id: String,
  pub company_id:     String,
  pub created_by:     Option<String>,
  pub title:          String,
  pub description:    Option<String>,
  pub status:         String,
  pub priority:       String,
  pub assignee:       Option<String>,
  pub created_at:     String,
  pub updated_at:     String,
  pub closed_at:      Option<String>,
  pub consumed:       bool,
  pub metadata:       String,
}

impl RawTicket {
  pub const COLUMNS: &'static str = "ticket_id, entitlement_id, company_id, created_by, \
     title, description, status, priority, assignee, created_at, updated_at, \
     closed_at, consumption_applied, metadata";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      ticket_id:      row.get(0)?,
      entitlement_id: row.get(1)?,
      company_id:     row.get(2)?,
      created_by:     row.get(3)?,
      title:          row.get(4)?,
      description:    row.get(5)?,
      status:         row.get(6)?,
      priority:       row.get(7)?,
      assignee:       row.get(8)?,
      created_at:     row.get(9)?,
      updated_at:     row.get(10)?,
      closed_at:      row.get(11)?,
      consumed:       row.get(12)?,
      metadata:       row.get(13)?,
    })
  }

  pub fn into_ticket(self) -> Result<SupportTicket> {
    Ok(SupportTicket {
      ticket_id:      decode_uuid(&self.ticket_id)?,
      entitlement_id: decode_uuid(&self.entitlement_id)?,
      company_id:     decode_uuid(&self.company_id)?,
      created_by:     decode_opt_uuid(self.created_by)?,
      title:          self.title,
      description:    self.description,
      status:         decode_enum(&self.status)?,
      priority:       decode_enum(&self.priority)?,
      assignee:       decode_opt_uuid(self.assignee)?,
      created_at:     decode_dt(&self.created_at)?,
      updated_at:     decode_dt(&self.updated_at)?,
      closed_at:      self.closed_at.as_deref().map(decode_dt).transpose()?,
      consumption_applied: self.consumed,
      metadata:       serde_json::from_str(&self.metadata)?,
    })
  }
}

pub struct RawComment {
  pub comment_id:  String,
  pub ticket_id:   String,
  pub author_kind: String,
  pub author_id:   Option<String>,
  pub body:        String,
  pub attachments: String,
  pub created_at:  String,
}

impl RawComment {
  pub const COLUMNS: &'static str =
    "comment_id, ticket_id, author_kind, author_id, body, attachments, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      comment_id:  row.get(0)?,
      ticket_id:   row.get(1)?,
      author_kind: row.get(2)?,
      author_id:   row.get(3)?,
      body:        row.get(4)?,
      attachments: row.get(5)?,
      created_at:  row.get(6)?,
    })
  }

  pub fn into_comment(self) -> Result<TicketComment> {
    Ok(TicketComment {
      comment_id:  decode_uuid(&self.comment_id)?,
      ticket_id:   decode_uuid(&self.ticket_id)?,
      author_kind: decode_enum(&self.author_kind)?,
      author_id:   decode_opt_uuid(self.author_id)?,
      body:        self.body,
      attachments: serde_json::from_str(&self.attachments)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

// ─── Payments ────────────────────────────────────────────────────────────────

pub struct RawPayment {
  pub payment_id:     String,
  pub entitlement_id: String,
  pub amount:         String,
  pub paid_at:        String,
  pub method:         String,
  pub reference:      Option<String>,
  pub status:         String,
  pub details:        String,
  pub recorded_by:    Option<String>,
  pub created_at:     String,
}

impl RawPayment {
  pub const COLUMNS: &'static str = "payment_id, entitlement_id, amount, paid_at, method, \
     reference, status, details, recorded_by, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      payment_id:     row.get(0)?,
      entitlement_id: row.get(1)?,
      amount:         row.get(2)?,
      paid_at:        row.get(3)?,
      method:         row.get(4)?,
      reference:      row.get(5)?,
      status:         row.get(6)?,
      details:        row.get(7)?,
      recorded_by:    row.get(8)?,
      created_at:     row.get(9)?,
    })
  }

  pub fn into_payment(self) -> Result<SupportPayment> {
    Ok(SupportPayment {
      payment_id:     decode_uuid(&self.payment_id)?,
      entitlement_id: decode_uuid(&self.entitlement_id)?,
      amount:         decode_decimal(&self.amount)?,
      paid_at:        decode_dt(&self.paid_at)?,
      method:         self.method,
      reference:      self.reference,
      status:         decode_enum(&self.status)?,
      details:        serde_json::from_str(&self.details)?,
      recorded_by:    decode_opt_uuid(self.recorded_by)?,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

// ─── Status events ───────────────────────────────────────────────────────────

pub struct RawEvent {
  pub event_id:     String,
  pub subject_kind: String,
  pub subject_id:   String,
  pub at:           String,
  pub actor:        String,
  pub old_status:   Option<String>,
  pub new_status:   String,
  pub reason:       Option<String>,
}

impl RawEvent {
  pub const COLUMNS: &'static str =
    "event_id, subject_kind, subject_id, at, actor, old_status, new_status, reason";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      event_id:     row.get(0)?,
      subject_kind: row.get(1)?,
      subject_id:   row.get(2)?,
      at:           row.get(3)?,
      actor:        row.get(4)?,
      old_status:   row.get(5)?,
      new_status:   row.get(6)?,
      reason:       row.get(7)?,
    })
  }

  pub fn into_event(self) -> Result<StatusEvent> {
    Ok(StatusEvent {
      event_id:   decode_uuid(&self.event_id)?,
      subject:    decode_enum(&self.subject_kind)?,
      subject_id: decode_uuid(&self.subject_id)?,
      at:         decode_dt(&self.at)?,
      actor:      serde_json::from_str(&self.actor)?,
      old_status: self.old_status,
      new_status: self.new_status,
      reason:     self.reason,
    })
  }
}
