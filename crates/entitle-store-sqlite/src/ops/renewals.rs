//! Renewal of plan subscriptions and the batch job lock.
//!
//! Entitlement renewal lives with the rest of the entitlement lifecycle in
//! [`super::entitlements`].

use chrono::{DateTime, Duration, NaiveDate, Utc};
use entitle_core::{
  Error as CoreError,
  actor::Actor,
  audit::AuditSubject,
  renewal::next_plan_period,
  subscription::{PlanSubscription, SubscriptionStatus},
};
use rusqlite::{Connection, OptionalExtension as _, params};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
  audit::{self, EventDraft},
  catalog, query_all,
};
use crate::{
  Result,
  encode::{RawSubscription, decode_dt, encode_date, encode_dt, encode_uuid},
};

/// Active subscriptions whose term ends on or before `cutoff`.
pub fn expiring_subscriptions(
  conn: &Connection,
  cutoff: NaiveDate,
) -> Result<Vec<PlanSubscription>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM plan_subscriptions
       WHERE status = 'active' AND end_date IS NOT NULL AND end_date <= ?1
       ORDER BY end_date, created_at",
      RawSubscription::COLUMNS
    ),
    params![encode_date(cutoff)],
    RawSubscription::from_row,
    RawSubscription::into_subscription,
  )
}

/// Successor at the plan's current price for the same period; discount and
/// auto-renew carry over. The predecessor becomes `inactive`.
pub fn renew_subscription(
  conn: &Connection,
  id: Uuid,
  today: NaiveDate,
  now: DateTime<Utc>,
) -> Result<PlanSubscription> {
  let sub = catalog::require_subscription(conn, id)?;
  if sub.status != SubscriptionStatus::Active {
    return Err(
      CoreError::Precondition(format!(
        "subscription {id} is {}, not active",
        sub.status.as_str()
      ))
      .into(),
    );
  }
  let plan = catalog::require_plan(conn, sub.plan_id)?;
  let (start, end) = next_plan_period(sub.end_date, today, sub.period);
  let actor = Actor::system();

  catalog::set_subscription_status(
    conn,
    &sub,
    SubscriptionStatus::Inactive,
    &actor,
    Some("auto-renewed"),
    now,
  )?;

  let successor = PlanSubscription {
    subscription_id: Uuid::new_v4(),
    price_paid: plan.price_for(sub.period),
    status: SubscriptionStatus::Active,
    start_date: start,
    end_date: Some(end),
    predecessor_id: Some(sub.subscription_id),
    notes: None,
    created_by: None,
    created_at: now,
    updated_at: now,
    ..sub.clone()
  };
  catalog::insert_subscription(conn, &successor)?;
  let note = format!("renewal of {}", sub.subscription_id);
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Subscription,
      subject_id: successor.subscription_id,
      actor:      &actor,
      old_status: None,
      new_status: successor.status.as_str(),
      reason:     Some(&note),
    },
    now,
  )?;
  info!(
    subscription_id = %sub.subscription_id,
    successor_id = %successor.subscription_id,
    price = %successor.price_paid,
    "subscription renewed"
  );
  Ok(successor)
}

pub fn lapse_subscription(
  conn: &Connection,
  id: Uuid,
  now: DateTime<Utc>,
) -> Result<PlanSubscription> {
  let sub = catalog::require_subscription(conn, id)?;
  catalog::set_subscription_status(
    conn,
    &sub,
    SubscriptionStatus::Inactive,
    &Actor::system(),
    Some("term ended without auto-renew"),
    now,
  )
}

// ─── Job lock ────────────────────────────────────────────────────────────────

/// Take `name` for `holder` unless someone else holds an unexpired lock.
pub fn acquire_lock(
  conn: &Connection,
  name: &str,
  holder: Uuid,
  ttl: Duration,
  now: DateTime<Utc>,
) -> Result<()> {
  let existing: Option<(String, String)> = conn
    .query_row(
      "SELECT holder, expires_at FROM job_locks WHERE name = ?1",
      params![name],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?;

  if let Some((current, expires_at)) = existing
    && current != encode_uuid(holder)
    && decode_dt(&expires_at)? > now
  {
    return Err(CoreError::JobLocked(name.to_owned()).into());
  }

  conn.execute(
    "INSERT INTO job_locks (name, holder, acquired_at, expires_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(name) DO UPDATE SET
       holder = excluded.holder,
       acquired_at = excluded.acquired_at,
       expires_at = excluded.expires_at",
    params![name, encode_uuid(holder), encode_dt(now), encode_dt(now + ttl)],
  )?;
  debug!(name, %holder, "job lock acquired");
  Ok(())
}

pub fn release_lock(conn: &Connection, name: &str, holder: Uuid) -> Result<()> {
  conn.execute(
    "DELETE FROM job_locks WHERE name = ?1 AND holder = ?2",
    params![name, encode_uuid(holder)],
  )?;
  debug!(name, %holder, "job lock released");
  Ok(())
}
