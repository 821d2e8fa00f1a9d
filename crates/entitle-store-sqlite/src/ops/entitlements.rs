//! Support entitlements: creation, the one-active rule, status changes,
//! renewal and availability.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use entitle_core::{
  Error as CoreError,
  actor::Actor,
  audit::AuditSubject,
  availability::{AvailabilityResult, calculate_availability, tickets_in_period},
  entitlement::{
    EntitlementPatch, EntitlementQuery, EntitlementStatus, NewEntitlement,
    RenewEntitlement, SupportEntitlement,
  },
  renewal::next_support_period,
  ticket::TicketStatus,
};
use rust_decimal::Decimal;
use rusqlite::{Connection, OptionalExtension as _, params};
use tracing::info;
use uuid::Uuid;

use super::{
  audit::{self, EventDraft},
  catalog, query_all, query_one,
};
use crate::{
  Result,
  encode::{
    RawEntitlement, decode_dt, decode_enum, decode_uuid, encode_date, encode_decimal,
    encode_dt, encode_uuid,
  },
};

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<SupportEntitlement>> {
  query_one(
    conn,
    &format!(
      "SELECT {} FROM entitlements WHERE entitlement_id = ?1",
      RawEntitlement::COLUMNS
    ),
    params![encode_uuid(id)],
    RawEntitlement::from_row,
    RawEntitlement::into_entitlement,
  )
}

pub fn require(conn: &Connection, id: Uuid) -> Result<SupportEntitlement> {
  get(conn, id)?.ok_or_else(|| CoreError::not_found("entitlement", id).into())
}

pub fn list(conn: &Connection, query: &EntitlementQuery) -> Result<Vec<SupportEntitlement>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM entitlements
       WHERE (?1 IS NULL OR company_id = ?1)
         AND (?2 IS NULL OR status = ?2)
       ORDER BY start_date DESC, created_at DESC",
      RawEntitlement::COLUMNS
    ),
    params![
      query.company_id.map(encode_uuid),
      query.status.map(EntitlementStatus::as_str),
    ],
    RawEntitlement::from_row,
    RawEntitlement::into_entitlement,
  )
}

/// The company's active entitlement covering `today`.
pub fn active_for_company(
  conn: &Connection,
  company_id: Uuid,
  today: NaiveDate,
) -> Result<Option<SupportEntitlement>> {
  let query = EntitlementQuery {
    company_id: Some(company_id),
    status:     Some(EntitlementStatus::Active),
  };
  Ok(list(conn, &query)?.into_iter().find(|e| e.covers(today)))
}

/// Active entitlements whose term ends on or before `cutoff`.
pub fn expiring(conn: &Connection, cutoff: NaiveDate) -> Result<Vec<SupportEntitlement>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM entitlements
       WHERE status = 'active' AND end_date IS NOT NULL AND end_date <= ?1
       ORDER BY end_date, created_at",
      RawEntitlement::COLUMNS
    ),
    params![encode_date(cutoff)],
    RawEntitlement::from_row,
    RawEntitlement::into_entitlement,
  )
}

/// Refuse if `company_id` already has an active entitlement other than
/// `except`.
fn ensure_single_active(
  conn: &Connection,
  company_id: Uuid,
  except: Option<Uuid>,
) -> Result<()> {
  let existing: Option<String> = conn
    .query_row(
      "SELECT entitlement_id FROM entitlements
       WHERE company_id = ?1 AND status = 'active'
         AND (?2 IS NULL OR entitlement_id != ?2)
       LIMIT 1",
      params![encode_uuid(company_id), except.map(encode_uuid)],
      |row| row.get(0),
    )
    .optional()?;

  match existing {
    Some(existing) => Err(
      CoreError::ActiveEntitlementExists {
        company_id,
        existing: decode_uuid(&existing)?,
      }
      .into(),
    ),
    None => Ok(()),
  }
}

// ─── Writes ──────────────────────────────────────────────────────────────────

fn insert(conn: &Connection, ent: &SupportEntitlement) -> Result<()> {
  conn.execute(
    "INSERT INTO entitlements (
       entitlement_id, company_id, subscription_id, support_type_id,
       start_date, end_date, status, current_price, tickets_consumed,
       hours_consumed, auto_renew, notes, created_by, predecessor_id,
       created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    params![
      encode_uuid(ent.entitlement_id),
      encode_uuid(ent.company_id),
      encode_uuid(ent.subscription_id),
      encode_uuid(ent.support_type_id),
      encode_date(ent.start_date),
      ent.end_date.map(encode_date),
      ent.status.as_str(),
      encode_decimal(ent.current_price),
      ent.tickets_consumed,
      encode_decimal(ent.hours_consumed),
      ent.auto_renew,
      ent.notes,
      ent.created_by.map(encode_uuid),
      ent.predecessor_id.map(encode_uuid),
      encode_dt(ent.created_at),
      encode_dt(ent.updated_at),
    ],
  )?;
  Ok(())
}

fn record_creation(
  conn: &Connection,
  ent: &SupportEntitlement,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<()> {
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Entitlement,
      subject_id: ent.entitlement_id,
      actor,
      old_status: None,
      new_status: ent.status.as_str(),
      reason,
    },
    now,
  )?;
  Ok(())
}

pub fn create(
  conn: &Connection,
  input: NewEntitlement,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  actor.require_staff()?;
  input.validate()?;

  let ty = catalog::require_support_type(conn, input.support_type_id)?;
  if !ty.active {
    return Err(
      CoreError::Precondition(format!("support type {} is disabled", ty.support_type_id))
        .into(),
    );
  }
  let sub = catalog::require_subscription(conn, input.subscription_id)?;
  if sub.company_id != input.company_id {
    return Err(
      CoreError::Validation(format!(
        "subscription {} belongs to another company",
        sub.subscription_id
      ))
      .into(),
    );
  }

  let status = input.initial_status();
  if status == EntitlementStatus::Active {
    ensure_single_active(conn, input.company_id, None)?;
  }

  let ent = SupportEntitlement {
    entitlement_id: Uuid::new_v4(),
    company_id: input.company_id,
    subscription_id: sub.subscription_id,
    support_type_id: ty.support_type_id,
    start_date: input.start_date,
    end_date: input.end_date,
    status,
    current_price: ty.price,
    tickets_consumed: 0,
    hours_consumed: Decimal::ZERO,
    auto_renew: input.auto_renew,
    notes: input.notes,
    created_by: actor.id,
    predecessor_id: None,
    created_at: now,
    updated_at: now,
  };
  insert(conn, &ent)?;
  record_creation(conn, &ent, actor, None, now)?;
  info!(
    entitlement_id = %ent.entitlement_id,
    company_id = %ent.company_id,
    status = ent.status.as_str(),
    "entitlement created"
  );
  Ok(ent)
}

/// The shared status mutation path: transition table, one-active rule,
/// audit event.
pub fn set_status(
  conn: &Connection,
  ent: &SupportEntitlement,
  next: EntitlementStatus,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  let next = ent.status.transition(next)?;
  if next == EntitlementStatus::Active {
    ensure_single_active(conn, ent.company_id, Some(ent.entitlement_id))?;
  }
  conn.execute(
    "UPDATE entitlements SET status = ?1, updated_at = ?2 WHERE entitlement_id = ?3",
    params![next.as_str(), encode_dt(now), encode_uuid(ent.entitlement_id)],
  )?;
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Entitlement,
      subject_id: ent.entitlement_id,
      actor,
      old_status: Some(ent.status.as_str()),
      new_status: next.as_str(),
      reason,
    },
    now,
  )?;
  info!(
    entitlement_id = %ent.entitlement_id,
    from = ent.status.as_str(),
    to = next.as_str(),
    "entitlement status changed"
  );
  Ok(SupportEntitlement { status: next, updated_at: now, ..ent.clone() })
}

pub fn change_status(
  conn: &Connection,
  id: Uuid,
  next: EntitlementStatus,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  actor.require_staff()?;
  let ent = require(conn, id)?;
  set_status(conn, &ent, next, actor, reason, now)
}

/// Edit the administrative fields. Status moves only via [`set_status`].
pub fn update(
  conn: &Connection,
  id: Uuid,
  patch: EntitlementPatch,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  actor.require_staff()?;
  let current = require(conn, id)?;
  if patch.is_empty() {
    return Ok(current);
  }
  let ent = SupportEntitlement { updated_at: now, ..patch.apply(&current)? };
  conn.execute(
    "UPDATE entitlements SET auto_renew = ?1, notes = ?2, end_date = ?3, updated_at = ?4
     WHERE entitlement_id = ?5",
    params![
      ent.auto_renew,
      ent.notes,
      ent.end_date.map(encode_date),
      encode_dt(now),
      encode_uuid(id),
    ],
  )?;
  info!(
    entitlement_id = %id,
    auto_renew = ent.auto_renew,
    end = ?ent.end_date,
    "entitlement updated"
  );
  Ok(ent)
}

/// Retire `ent` (if still active) and insert its successor.
fn supersede(
  conn: &Connection,
  ent: &SupportEntitlement,
  successor: SupportEntitlement,
  actor: &Actor,
  reason: &str,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  if ent.status == EntitlementStatus::Active {
    set_status(conn, ent, EntitlementStatus::Expired, actor, Some(reason), now)?;
  }
  ensure_single_active(conn, successor.company_id, None)?;
  insert(conn, &successor)?;
  let note = format!("renewal of {}", ent.entitlement_id);
  record_creation(conn, &successor, actor, Some(&note), now)?;
  info!(
    entitlement_id = %ent.entitlement_id,
    successor_id = %successor.entitlement_id,
    start = %successor.start_date,
    end = ?successor.end_date,
    "entitlement renewed"
  );
  Ok(successor)
}

/// Administrative renewal.
pub fn renew(
  conn: &Connection,
  id: Uuid,
  input: RenewEntitlement,
  actor: &Actor,
  today: NaiveDate,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  actor.require_staff()?;
  let ent = require(conn, id)?;
  if ent.status == EntitlementStatus::PendingPayment {
    return Err(
      CoreError::Precondition(format!(
        "entitlement {id} is awaiting payment and cannot be renewed"
      ))
      .into(),
    );
  }
  let ty = catalog::require_support_type(conn, ent.support_type_id)?;

  let (start, computed_end) = next_support_period(ent.start_date, ent.end_date, today);
  let end = input.end_date.unwrap_or(computed_end);
  if end < start {
    return Err(
      CoreError::Validation(format!("end_date {end} is before start_date {start}")).into(),
    );
  }

  // Ticket allowances are counted within the successor's own period, so
  // only hours carry over.
  let hours_consumed =
    if input.reset_counters { Decimal::ZERO } else { ent.hours_consumed };

  let successor = SupportEntitlement {
    entitlement_id: Uuid::new_v4(),
    start_date: start,
    end_date: Some(end),
    status: EntitlementStatus::Active,
    current_price: ty.price,
    tickets_consumed: 0,
    hours_consumed,
    notes: None,
    created_by: actor.id,
    predecessor_id: Some(ent.entitlement_id),
    created_at: now,
    updated_at: now,
    ..ent.clone()
  };
  supersede(conn, &ent, successor, actor, "renewed", now)
}

/// Batch renewal: current catalog price, counters reset, predecessor
/// expired.
pub fn auto_renew(
  conn: &Connection,
  id: Uuid,
  today: NaiveDate,
  now: DateTime<Utc>,
) -> Result<SupportEntitlement> {
  let ent = require(conn, id)?;
  if ent.status != EntitlementStatus::Active {
    return Err(
      CoreError::Precondition(format!(
        "entitlement {id} is {}, not active",
        ent.status.as_str()
      ))
      .into(),
    );
  }
  let ty = catalog::require_support_type(conn, ent.support_type_id)?;
  let (start, end) = next_support_period(ent.start_date, ent.end_date, today);

  let successor = SupportEntitlement {
    entitlement_id: Uuid::new_v4(),
    start_date: start,
    end_date: Some(end),
    status: EntitlementStatus::Active,
    current_price: ty.price,
    tickets_consumed: 0,
    hours_consumed: Decimal::ZERO,
    notes: None,
    created_by: None,
    predecessor_id: Some(ent.entitlement_id),
    created_at: now,
    updated_at: now,
    ..ent.clone()
  };
  supersede(conn, &ent, successor, &Actor::system(), "auto-renewed", now)
}

pub fn lapse(conn: &Connection, id: Uuid, now: DateTime<Utc>) -> Result<SupportEntitlement> {
  let ent = require(conn, id)?;
  set_status(
    conn,
    &ent,
    EntitlementStatus::Expired,
    &Actor::system(),
    Some("term ended without auto-renew"),
    now,
  )
}

// ─── Availability ────────────────────────────────────────────────────────────

pub fn availability(
  conn: &Connection,
  id: Uuid,
  now: DateTime<Tz>,
) -> Result<AvailabilityResult> {
  let ent = require(conn, id)?;
  let ty = catalog::require_support_type(conn, ent.support_type_id)?;

  let mut stmt =
    conn.prepare("SELECT created_at, status FROM tickets WHERE entitlement_id = ?1")?;
  let rows = stmt
    .query_map(params![encode_uuid(id)], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let tickets = rows
    .iter()
    .map(|(at, status)| Ok((decode_dt(at)?, decode_enum::<TicketStatus>(status)?)))
    .collect::<Result<Vec<_>>>()?;

  let count = tickets_in_period(tickets, ent.start_date, ent.end_date, &now);
  Ok(calculate_availability(&ent, &ty, count, &now))
}
