//! Tickets and comments.
//!
//! [`transition`] is the only path that changes a ticket's status. Entering
//! `closed` applies consumption to the entitlement in the same transaction,
//! which is what makes "count exactly once" hold: a second close is
//! rejected by the transition table before anything is counted.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use entitle_core::{
  Error as CoreError,
  actor::{Actor, Role},
  audit::AuditSubject,
  consumption::consumption_for_closure,
  ticket::{
    AuthorKind, NewComment, NewTicket, Priority, SupportTicket, TicketComment,
    TicketQuery, TicketStats, TicketStatus,
  },
};
use rusqlite::{Connection, params};
use tracing::{info, warn};
use uuid::Uuid;

use super::{
  audit::{self, EventDraft},
  catalog, entitlements, query_all, query_one,
};
use crate::{
  Result,
  encode::{
    RawComment, RawTicket, decode_decimal, decode_enum, encode_decimal,
    encode_dt, encode_uuid,
  },
};

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<SupportTicket>> {
  query_one(
    conn,
    &format!("SELECT {} FROM tickets WHERE ticket_id = ?1", RawTicket::COLUMNS),
    params![encode_uuid(id)],
    RawTicket::from_row,
    RawTicket::into_ticket,
  )
}

pub fn require(conn: &Connection, id: Uuid) -> Result<SupportTicket> {
  get(conn, id)?.ok_or_else(|| CoreError::not_found("ticket", id).into())
}

/// Newest first.
pub fn list(conn: &Connection, query: &TicketQuery) -> Result<Vec<SupportTicket>> {
  let limit = query.limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
  let offset = query.offset.map_or(0, |n| i64::try_from(n).unwrap_or(i64::MAX));
  query_all(
    conn,
    &format!(
      "SELECT {} FROM tickets
       WHERE (?1 IS NULL OR entitlement_id = ?1)
         AND (?2 IS NULL OR company_id = ?2)
         AND (?3 IS NULL OR status = ?3)
         AND (?4 IS NULL OR priority = ?4)
         AND (?5 IS NULL OR assignee = ?5)
       ORDER BY created_at DESC
       LIMIT ?6 OFFSET ?7",
      RawTicket::COLUMNS
    ),
    params![
      query.entitlement_id.map(encode_uuid),
      query.company_id.map(encode_uuid),
      query.status.map(TicketStatus::as_str),
      query.priority.map(Priority::as_str),
      query.assignee.map(encode_uuid),
      limit,
      offset,
    ],
    RawTicket::from_row,
    RawTicket::into_ticket,
  )
}

pub fn stats(conn: &Connection, company_id: Option<Uuid>) -> Result<TicketStats> {
  let mut stmt = conn.prepare(
    "SELECT status, priority FROM tickets WHERE (?1 IS NULL OR company_id = ?1)",
  )?;
  let rows = stmt
    .query_map(params![company_id.map(encode_uuid)], |row| {
      Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let decoded = rows
    .iter()
    .map(|(s, p)| Ok((decode_enum::<TicketStatus>(s)?, decode_enum::<Priority>(p)?)))
    .collect::<Result<Vec<_>>>()?;
  Ok(TicketStats::tally(decoded))
}

pub fn list_comments(conn: &Connection, ticket_id: Uuid) -> Result<Vec<TicketComment>> {
  require(conn, ticket_id)?;
  query_all(
    conn,
    &format!(
      "SELECT {} FROM ticket_comments WHERE ticket_id = ?1 ORDER BY created_at, rowid",
      RawComment::COLUMNS
    ),
    params![encode_uuid(ticket_id)],
    RawComment::from_row,
    RawComment::into_comment,
  )
}

// ─── Comments ────────────────────────────────────────────────────────────────

fn insert_comment(conn: &Connection, comment: &TicketComment) -> Result<()> {
  conn.execute(
    "INSERT INTO ticket_comments (
       comment_id, ticket_id, author_kind, author_id, body, attachments, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    params![
      encode_uuid(comment.comment_id),
      encode_uuid(comment.ticket_id),
      comment.author_kind.as_str(),
      comment.author_id.map(encode_uuid),
      comment.body,
      serde_json::to_string(&comment.attachments)?,
      encode_dt(comment.created_at),
    ],
  )?;
  Ok(())
}

/// Engine-authored note describing a change, e.g. `[System] Status: a → b`.
fn system_comment(
  conn: &Connection,
  ticket_id: Uuid,
  field: &str,
  from: &str,
  to: &str,
  now: DateTime<Utc>,
) -> Result<()> {
  insert_comment(
    conn,
    &TicketComment {
      comment_id: Uuid::new_v4(),
      ticket_id,
      author_kind: AuthorKind::System,
      author_id: None,
      body: format!("[System] {field}: {from} → {to}"),
      attachments: Vec::new(),
      created_at: now,
    },
  )
}

fn author_kind(actor: &Actor) -> AuthorKind {
  match actor.role {
    Role::Admin => AuthorKind::Staff,
    Role::Tenant => AuthorKind::Tenant,
    Role::System => AuthorKind::System,
  }
}

// ─── Creation ────────────────────────────────────────────────────────────────

pub fn create(
  conn: &Connection,
  input: NewTicket,
  actor: &Actor,
  now: DateTime<Utc>,
  zone: Tz,
) -> Result<SupportTicket> {
  input.validate()?;
  let ent = entitlements::require(conn, input.entitlement_id)?;
  actor.ensure_company(ent.company_id)?;

  let availability =
    entitlements::availability(conn, ent.entitlement_id, now.with_timezone(&zone))?;
  if !availability.can_open {
    warn!(
      entitlement_id = %ent.entitlement_id,
      reason = %availability.reason,
      "ticket creation refused"
    );
    return Err(CoreError::Unavailable(Box::new(availability)).into());
  }

  let ticket = SupportTicket {
    ticket_id:      Uuid::new_v4(),
    entitlement_id: ent.entitlement_id,
    company_id:     ent.company_id,
    created_by:     actor.id,
    title:          input.title.trim().to_owned(),
    description:    input.description,
    status:         TicketStatus::Open,
    priority:       input.priority,
    assignee:       None,
    created_at:     now,
    updated_at:     now,
    closed_at:      None,
    consumption_applied: false,
    metadata:       input.metadata,
  };
  conn.execute(
    "INSERT INTO tickets (
       ticket_id, entitlement_id, company_id, created_by, title, description,
       status, priority, assignee, created_at, updated_at, closed_at,
       consumption_applied, metadata
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    params![
      encode_uuid(ticket.ticket_id),
      encode_uuid(ticket.entitlement_id),
      encode_uuid(ticket.company_id),
      ticket.created_by.map(encode_uuid),
      ticket.title,
      ticket.description,
      ticket.status.as_str(),
      ticket.priority.as_str(),
      ticket.assignee.map(encode_uuid),
      encode_dt(ticket.created_at),
      encode_dt(ticket.updated_at),
      ticket.closed_at.map(encode_dt),
      ticket.consumption_applied,
      serde_json::to_string(&ticket.metadata)?,
    ],
  )?;
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Ticket,
      subject_id: ticket.ticket_id,
      actor,
      old_status: None,
      new_status: ticket.status.as_str(),
      reason:     None,
    },
    now,
  )?;
  info!(ticket_id = %ticket.ticket_id, entitlement_id = %ent.entitlement_id, "ticket opened");
  Ok(ticket)
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// Add the closure's consumption to the owning entitlement. The ticket
/// counter is bumped in SQL; the hour counter is read and rewritten, which
/// is safe because the caller holds the write lock.
fn apply_consumption(
  conn: &Connection,
  ticket: &SupportTicket,
  closed_at: DateTime<Utc>,
) -> Result<()> {
  let ent = entitlements::require(conn, ticket.entitlement_id)?;
  let ty = catalog::require_support_type(conn, ent.support_type_id)?;
  let consumption = consumption_for_closure(ty.modality, ticket.created_at, closed_at);
  if consumption.is_empty() {
    return Ok(());
  }
  let id = encode_uuid(ent.entitlement_id);

  if consumption.tickets > 0 {
    conn.execute(
      "UPDATE entitlements
       SET tickets_consumed = tickets_consumed + ?1, updated_at = ?2
       WHERE entitlement_id = ?3",
      params![consumption.tickets, encode_dt(closed_at), id],
    )?;
  }
  if !consumption.hours.is_zero() {
    let current: String = conn.query_row(
      "SELECT hours_consumed FROM entitlements WHERE entitlement_id = ?1",
      params![id],
      |row| row.get(0),
    )?;
    let total = decode_decimal(&current)? + consumption.hours;
    conn.execute(
      "UPDATE entitlements SET hours_consumed = ?1, updated_at = ?2
       WHERE entitlement_id = ?3",
      params![encode_decimal(total), encode_dt(closed_at), id],
    )?;
  }
  info!(
    ticket_id = %ticket.ticket_id,
    entitlement_id = %ent.entitlement_id,
    tickets = consumption.tickets,
    hours = %consumption.hours,
    "consumption applied"
  );
  Ok(())
}

/// Move `ticket` to `next`, leaving a system comment and an audit event.
fn apply_transition(
  conn: &Connection,
  ticket: &SupportTicket,
  next: TicketStatus,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SupportTicket> {
  if ticket.status == TicketStatus::Closed && next == TicketStatus::Open {
    actor.require_staff()?;
  }
  let next = ticket.status.transition(next)?;
  let closed_at = match next {
    TicketStatus::Closed => Some(now),
    _ => None,
  };
  let consume = next == TicketStatus::Closed && !ticket.consumption_applied;

  conn.execute(
    "UPDATE tickets
     SET status = ?1, closed_at = ?2, updated_at = ?3,
         consumption_applied = consumption_applied OR ?4
     WHERE ticket_id = ?5",
    params![
      next.as_str(),
      closed_at.map(encode_dt),
      encode_dt(now),
      consume,
      encode_uuid(ticket.ticket_id),
    ],
  )?;
  if consume {
    apply_consumption(conn, ticket, now)?;
  }

  system_comment(conn, ticket.ticket_id, "Status", ticket.status.as_str(), next.as_str(), now)?;
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Ticket,
      subject_id: ticket.ticket_id,
      actor,
      old_status: Some(ticket.status.as_str()),
      new_status: next.as_str(),
      reason,
    },
    now,
  )?;
  info!(
    ticket_id = %ticket.ticket_id,
    from = ticket.status.as_str(),
    to = next.as_str(),
    "ticket status changed"
  );
  Ok(SupportTicket {
    status: next,
    closed_at,
    updated_at: now,
    consumption_applied: ticket.consumption_applied || consume,
    ..ticket.clone()
  })
}

pub fn transition(
  conn: &Connection,
  id: Uuid,
  next: TicketStatus,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SupportTicket> {
  let ticket = require(conn, id)?;
  actor.ensure_company(ticket.company_id)?;
  apply_transition(conn, &ticket, next, actor, reason, now)
}

pub fn set_priority(
  conn: &Connection,
  id: Uuid,
  priority: Priority,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportTicket> {
  let ticket = require(conn, id)?;
  actor.ensure_company(ticket.company_id)?;
  if ticket.priority == priority {
    return Ok(ticket);
  }
  conn.execute(
    "UPDATE tickets SET priority = ?1, updated_at = ?2 WHERE ticket_id = ?3",
    params![priority.as_str(), encode_dt(now), encode_uuid(id)],
  )?;
  system_comment(conn, id, "Priority", ticket.priority.as_str(), priority.as_str(), now)?;
  info!(ticket_id = %id, priority = priority.as_str(), "ticket priority changed");
  Ok(SupportTicket { priority, updated_at: now, ..ticket })
}

pub fn assign(
  conn: &Connection,
  id: Uuid,
  assignee: Option<Uuid>,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportTicket> {
  actor.require_staff()?;
  let ticket = require(conn, id)?;
  conn.execute(
    "UPDATE tickets SET assignee = ?1, updated_at = ?2 WHERE ticket_id = ?3",
    params![assignee.map(encode_uuid), encode_dt(now), encode_uuid(id)],
  )?;
  let show = |a: Option<Uuid>| a.map_or_else(|| "unassigned".to_owned(), |a| a.to_string());
  system_comment(conn, id, "Assignee", &show(ticket.assignee), &show(assignee), now)?;
  info!(ticket_id = %id, assignee = ?assignee, "ticket assigned");
  Ok(SupportTicket { assignee, updated_at: now, ..ticket })
}

pub fn add_comment(
  conn: &Connection,
  ticket_id: Uuid,
  input: NewComment,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<TicketComment> {
  input.validate()?;
  let ticket = require(conn, ticket_id)?;
  actor.ensure_company(ticket.company_id)?;
  if ticket.status == TicketStatus::Canceled {
    return Err(
      CoreError::Precondition(format!("ticket {ticket_id} is canceled")).into(),
    );
  }

  let comment = TicketComment {
    comment_id:  Uuid::new_v4(),
    ticket_id,
    author_kind: author_kind(actor),
    author_id:   actor.id,
    body:        input.body,
    attachments: input.attachments,
    created_at:  now,
  };
  insert_comment(conn, &comment)?;

  if let Some(next) = ticket.status.after_comment() {
    apply_transition(conn, &ticket, next, actor, Some("comment added"), now)?;
  }
  Ok(comment)
}
