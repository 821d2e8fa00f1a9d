//! Entitlement payments.

use chrono::{DateTime, Utc};
use entitle_core::{
  Error as CoreError,
  actor::Actor,
  entitlement::{EntitlementStatus, SupportEntitlement},
  payment::{NewPayment, PaymentLedger, PaymentStatus, SupportPayment},
};
use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

use super::{entitlements, query_all, query_one};
use crate::{
  Result,
  encode::{RawPayment, encode_decimal, encode_dt, encode_uuid},
};

pub fn get(conn: &Connection, id: Uuid) -> Result<Option<SupportPayment>> {
  query_one(
    conn,
    &format!("SELECT {} FROM payments WHERE payment_id = ?1", RawPayment::COLUMNS),
    params![encode_uuid(id)],
    RawPayment::from_row,
    RawPayment::into_payment,
  )
}

pub fn list(conn: &Connection, entitlement_id: Uuid) -> Result<PaymentLedger> {
  entitlements::require(conn, entitlement_id)?;
  let payments = query_all(
    conn,
    &format!(
      "SELECT {} FROM payments WHERE entitlement_id = ?1 ORDER BY paid_at, rowid",
      RawPayment::COLUMNS
    ),
    params![encode_uuid(entitlement_id)],
    RawPayment::from_row,
    RawPayment::into_payment,
  )?;
  Ok(PaymentLedger::new(payments))
}

/// A successful payment is the only automatic way out of
/// `pending_payment`.
fn activate_if_pending(
  conn: &Connection,
  ent: &SupportEntitlement,
  payment_id: Uuid,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<()> {
  if ent.status == EntitlementStatus::PendingPayment {
    let reason = format!("payment {payment_id} successful");
    entitlements::set_status(conn, ent, EntitlementStatus::Active, actor, Some(&reason), now)?;
  }
  Ok(())
}

pub fn record(
  conn: &Connection,
  input: NewPayment,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportPayment> {
  actor.require_staff()?;
  input.validate()?;
  let ent = entitlements::require(conn, input.entitlement_id)?;

  let payment = SupportPayment {
    payment_id:     Uuid::new_v4(),
    entitlement_id: ent.entitlement_id,
    amount:         input.amount,
    paid_at:        input.paid_at.unwrap_or(now),
    method:         input.method.trim().to_owned(),
    reference:      input.reference,
    status:         input.status,
    details:        input.details,
    recorded_by:    actor.id,
    created_at:     now,
  };
  conn.execute(
    "INSERT INTO payments (
       payment_id, entitlement_id, amount, paid_at, method, reference,
       status, details, recorded_by, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(payment.payment_id),
      encode_uuid(payment.entitlement_id),
      encode_decimal(payment.amount),
      encode_dt(payment.paid_at),
      payment.method,
      payment.reference,
      payment.status.as_str(),
      serde_json::to_string(&payment.details)?,
      payment.recorded_by.map(encode_uuid),
      encode_dt(payment.created_at),
    ],
  )?;
  info!(
    payment_id = %payment.payment_id,
    entitlement_id = %ent.entitlement_id,
    status = payment.status.as_str(),
    "payment recorded"
  );

  if payment.status == PaymentStatus::Successful {
    activate_if_pending(conn, &ent, payment.payment_id, actor, now)?;
  }
  Ok(payment)
}

pub fn change_status(
  conn: &Connection,
  id: Uuid,
  status: PaymentStatus,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<SupportPayment> {
  actor.require_staff()?;
  let payment = get(conn, id)?.ok_or_else(|| CoreError::not_found("payment", id))?;
  let next = payment.status.transition(status)?;
  conn.execute(
    "UPDATE payments SET status = ?1 WHERE payment_id = ?2",
    params![next.as_str(), encode_uuid(id)],
  )?;
  info!(payment_id = %id, from = payment.status.as_str(), to = next.as_str(), "payment status changed");

  if next == PaymentStatus::Successful {
    let ent = entitlements::require(conn, payment.entitlement_id)?;
    activate_if_pending(conn, &ent, id, actor, now)?;
  }
  Ok(SupportPayment { status: next, ..payment })
}
