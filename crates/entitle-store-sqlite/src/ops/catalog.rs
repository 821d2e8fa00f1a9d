//! Support types, plans and plan subscriptions.

use chrono::{DateTime, Utc};
use entitle_core::{
  Error as CoreError,
  actor::Actor,
  audit::AuditSubject,
  catalog::{NewSupportType, SupportType, SupportTypePatch},
  subscription::{
    NewPlan, NewSubscription, Plan, PlanSubscription, SubscriptionStatus,
  },
};
use rusqlite::{Connection, params};
use tracing::info;
use uuid::Uuid;

use super::{
  audit::{self, EventDraft},
  query_all, query_one,
};
use crate::{
  Result,
  encode::{
    RawPlan, RawSubscription, RawSupportType, encode_date, encode_decimal,
    encode_dt, encode_uuid,
  },
};

// ─── Support types ───────────────────────────────────────────────────────────

pub fn create_support_type(
  conn: &Connection,
  input: NewSupportType,
  now: DateTime<Utc>,
) -> Result<SupportType> {
  input.validate()?;
  let ty = SupportType {
    support_type_id: Uuid::new_v4(),
    name:            input.name.trim().to_owned(),
    description:     input.description,
    modality:        input.modality,
    tier:            input.tier,
    price:           input.price,
    max_tickets:     input.max_tickets,
    max_hours:       input.max_hours,
    active:          true,
    created_at:      now,
    updated_at:      now,
  };
  conn.execute(
    "INSERT INTO support_types (
       support_type_id, name, description, modality, tier, price,
       max_tickets, max_hours, active, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    params![
      encode_uuid(ty.support_type_id),
      ty.name,
      ty.description,
      ty.modality.as_str(),
      ty.tier.as_str(),
      encode_decimal(ty.price),
      ty.max_tickets,
      ty.max_hours,
      ty.active,
      encode_dt(ty.created_at),
      encode_dt(ty.updated_at),
    ],
  )?;
  info!(support_type_id = %ty.support_type_id, modality = ty.modality.as_str(), "support type created");
  Ok(ty)
}

pub fn get_support_type(conn: &Connection, id: Uuid) -> Result<Option<SupportType>> {
  query_one(
    conn,
    &format!(
      "SELECT {} FROM support_types WHERE support_type_id = ?1",
      RawSupportType::COLUMNS
    ),
    params![encode_uuid(id)],
    RawSupportType::from_row,
    RawSupportType::into_support_type,
  )
}

pub fn require_support_type(conn: &Connection, id: Uuid) -> Result<SupportType> {
  get_support_type(conn, id)?
    .ok_or_else(|| CoreError::not_found("support type", id).into())
}

pub fn list_support_types(
  conn: &Connection,
  include_inactive: bool,
) -> Result<Vec<SupportType>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM support_types WHERE active = 1 OR ?1 ORDER BY name",
      RawSupportType::COLUMNS
    ),
    params![include_inactive],
    RawSupportType::from_row,
    RawSupportType::into_support_type,
  )
}

/// Edit a type. Entitlements keep their `current_price` snapshot.
pub fn update_support_type(
  conn: &Connection,
  id: Uuid,
  patch: SupportTypePatch,
  now: DateTime<Utc>,
) -> Result<SupportType> {
  let current = require_support_type(conn, id)?;
  let merged = patch.apply(&current)?;
  let ty = SupportType {
    name: merged.name.trim().to_owned(),
    description: merged.description,
    modality: merged.modality,
    tier: merged.tier,
    price: merged.price,
    max_tickets: merged.max_tickets,
    max_hours: merged.max_hours,
    updated_at: now,
    ..current
  };
  conn.execute(
    "UPDATE support_types
     SET name = ?1, description = ?2, modality = ?3, tier = ?4, price = ?5,
         max_tickets = ?6, max_hours = ?7, updated_at = ?8
     WHERE support_type_id = ?9",
    params![
      ty.name,
      ty.description,
      ty.modality.as_str(),
      ty.tier.as_str(),
      encode_decimal(ty.price),
      ty.max_tickets,
      ty.max_hours,
      encode_dt(now),
      encode_uuid(id),
    ],
  )?;
  info!(
    support_type_id = %id,
    modality = ty.modality.as_str(),
    price = %ty.price,
    "support type updated"
  );
  Ok(ty)
}

pub fn set_support_type_active(
  conn: &Connection,
  id: Uuid,
  active: bool,
  now: DateTime<Utc>,
) -> Result<SupportType> {
  let changed = conn.execute(
    "UPDATE support_types SET active = ?1, updated_at = ?2
     WHERE support_type_id = ?3",
    params![active, encode_dt(now), encode_uuid(id)],
  )?;
  if changed == 0 {
    return Err(CoreError::not_found("support type", id).into());
  }
  info!(support_type_id = %id, active, "support type availability changed");
  require_support_type(conn, id)
}

// ─── Plans ───────────────────────────────────────────────────────────────────

pub fn create_plan(conn: &Connection, input: NewPlan, now: DateTime<Utc>) -> Result<Plan> {
  input.validate()?;
  let plan = Plan {
    plan_id:       Uuid::new_v4(),
    name:          input.name.trim().to_owned(),
    description:   input.description,
    monthly_price: input.monthly_price,
    yearly_price:  input.yearly_price,
    created_at:    now,
  };
  conn.execute(
    "INSERT INTO plans (plan_id, name, description, monthly_price, yearly_price, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      encode_uuid(plan.plan_id),
      plan.name,
      plan.description,
      encode_decimal(plan.monthly_price),
      encode_decimal(plan.yearly_price),
      encode_dt(plan.created_at),
    ],
  )?;
  Ok(plan)
}

pub fn get_plan(conn: &Connection, id: Uuid) -> Result<Option<Plan>> {
  query_one(
    conn,
    &format!("SELECT {} FROM plans WHERE plan_id = ?1", RawPlan::COLUMNS),
    params![encode_uuid(id)],
    RawPlan::from_row,
    RawPlan::into_plan,
  )
}

pub fn require_plan(conn: &Connection, id: Uuid) -> Result<Plan> {
  get_plan(conn, id)?.ok_or_else(|| CoreError::not_found("plan", id).into())
}

pub fn list_plans(conn: &Connection) -> Result<Vec<Plan>> {
  query_all(
    conn,
    &format!("SELECT {} FROM plans ORDER BY name", RawPlan::COLUMNS),
    [],
    RawPlan::from_row,
    RawPlan::into_plan,
  )
}

// ─── Subscriptions ───────────────────────────────────────────────────────────

pub fn insert_subscription(conn: &Connection, sub: &PlanSubscription) -> Result<()> {
  conn.execute(
    "INSERT INTO plan_subscriptions (
       subscription_id, company_id, plan_id, period, price_paid,
       discount_percent, status, start_date, end_date, auto_renew,
       predecessor_id, notes, created_by, created_at, updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    params![
      encode_uuid(sub.subscription_id),
      encode_uuid(sub.company_id),
      encode_uuid(sub.plan_id),
      sub.period.as_str(),
      encode_decimal(sub.price_paid),
      encode_decimal(sub.discount_percent),
      sub.status.as_str(),
      encode_date(sub.start_date),
      sub.end_date.map(encode_date),
      sub.auto_renew,
      sub.predecessor_id.map(encode_uuid),
      sub.notes,
      sub.created_by.map(encode_uuid),
      encode_dt(sub.created_at),
      encode_dt(sub.updated_at),
    ],
  )?;
  Ok(())
}

pub fn create_subscription(
  conn: &Connection,
  input: NewSubscription,
  actor: &Actor,
  now: DateTime<Utc>,
) -> Result<PlanSubscription> {
  actor.require_staff()?;
  input.validate()?;
  let plan = require_plan(conn, input.plan_id)?;

  let sub = PlanSubscription {
    subscription_id:  Uuid::new_v4(),
    company_id:       input.company_id,
    plan_id:          plan.plan_id,
    period:           input.period,
    price_paid:       plan.price_for(input.period),
    discount_percent: input.discount_percent,
    status:           SubscriptionStatus::Active,
    start_date:       input.start_date,
    end_date:         Some(input.effective_end()),
    auto_renew:       input.auto_renew,
    predecessor_id:   None,
    notes:            input.notes,
    created_by:       actor.id,
    created_at:       now,
    updated_at:       now,
  };
  insert_subscription(conn, &sub)?;
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Subscription,
      subject_id: sub.subscription_id,
      actor,
      old_status: None,
      new_status: sub.status.as_str(),
      reason:     None,
    },
    now,
  )?;
  info!(subscription_id = %sub.subscription_id, company_id = %sub.company_id, "subscription created");
  Ok(sub)
}

pub fn get_subscription(conn: &Connection, id: Uuid) -> Result<Option<PlanSubscription>> {
  query_one(
    conn,
    &format!(
      "SELECT {} FROM plan_subscriptions WHERE subscription_id = ?1",
      RawSubscription::COLUMNS
    ),
    params![encode_uuid(id)],
    RawSubscription::from_row,
    RawSubscription::into_subscription,
  )
}

pub fn require_subscription(conn: &Connection, id: Uuid) -> Result<PlanSubscription> {
  get_subscription(conn, id)?
    .ok_or_else(|| CoreError::not_found("subscription", id).into())
}

pub fn list_subscriptions(
  conn: &Connection,
  company_id: Option<Uuid>,
) -> Result<Vec<PlanSubscription>> {
  query_all(
    conn,
    &format!(
      "SELECT {} FROM plan_subscriptions
       WHERE (?1 IS NULL OR company_id = ?1)
       ORDER BY start_date DESC, created_at DESC",
      RawSubscription::COLUMNS
    ),
    params![company_id.map(encode_uuid)],
    RawSubscription::from_row,
    RawSubscription::into_subscription,
  )
}

/// Move a subscription through its transition table and audit the change.
pub fn set_subscription_status(
  conn: &Connection,
  sub: &PlanSubscription,
  next: SubscriptionStatus,
  actor: &Actor,
  reason: Option<&str>,
  now: DateTime<Utc>,
) -> Result<PlanSubscription> {
  let next = sub.status.transition(next)?;
  conn.execute(
    "UPDATE plan_subscriptions SET status = ?1, updated_at = ?2
     WHERE subscription_id = ?3",
    params![next.as_str(), encode_dt(now), encode_uuid(sub.subscription_id)],
  )?;
  audit::record(
    conn,
    EventDraft {
      subject:    AuditSubject::Subscription,
      subject_id: sub.subscription_id,
      actor,
      old_status: Some(sub.status.as_str()),
      new_status: next.as_str(),
      reason,
    },
    now,
  )?;
  info!(
    subscription_id = %sub.subscription_id,
    from = sub.status.as_str(),
    to = next.as_str(),
    "subscription status changed"
  );
  Ok(PlanSubscription { status: next, updated_at: now, ..sub.clone() })
}
