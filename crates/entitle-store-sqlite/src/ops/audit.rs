//! The append-only `status_events` log.

use chrono::{DateTime, Utc};
use entitle_core::{
  actor::Actor,
  audit::{AuditSubject, StatusEvent},
};
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::query_all;
use crate::{
  Result,
  encode::{RawEvent, encode_dt, encode_uuid},
};

pub struct EventDraft<'a> {
  pub subject:    AuditSubject,
  pub subject_id: Uuid,
  pub actor:      &'a Actor,
  pub old_status: Option<&'a str>,
  pub new_status: &'a str,
  pub reason:     Option<&'a str>,
}

pub fn record(
  conn: &Connection,
  draft: EventDraft<'_>,
  at: DateTime<Utc>,
) -> Result<StatusEvent> {
  let event = StatusEvent {
    event_id:   Uuid::new_v4(),
    subject:    draft.subject,
    subject_id: draft.subject_id,
    at,
    actor:      *draft.actor,
    old_status: draft.old_status.map(str::to_owned),
    new_status: draft.new_status.to_owned(),
    reason:     draft.reason.map(str::to_owned),
  };
  conn.execute(
    "INSERT INTO status_events (
       event_id, subject_kind, subject_id, at, actor,
       old_status, new_status, reason
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    params![
      encode_uuid(event.event_id),
      event.subject.as_str(),
      encode_uuid(event.subject_id),
      encode_dt(event.at),
      serde_json::to_string(&event.actor)?,
      event.old_status,
      event.new_status,
      event.reason,
    ],
  )?;
  Ok(event)
}

/// Events for one subject, oldest first.
pub fn history(
  conn: &Connection,
  subject: AuditSubject,
  subject_id: Uuid,
) -> Result<Vec<StatusEvent>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM status_events
       WHERE subject_kind = ?1 AND subject_id = ?2
       ORDER BY at, rowid",
      RawEvent::COLUMNS
    ),
    params![subject.as_str(), encode_uuid(subject_id)],
    RawEvent::from_row,
    RawEvent::into_event,
  )
}
