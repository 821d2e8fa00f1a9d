//! Renewal period math and the renewal batch runner.
//!
//! The runner is backend-agnostic: it asks the store which records expire
//! by the cutoff, then renews or lapses each one in its own transaction.
//! A failing record is logged and reported; it never aborts the run.

use chrono::{Days, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{store::SupportStore, subscription::BillingPeriod};

/// Advisory lock taken by non-dry runs.
pub const RENEWAL_JOB: &str = "renewals";

/// A lock older than this is considered abandoned.
pub fn renewal_lock_ttl() -> Duration { Duration::hours(6) }

const DEFAULT_TERM_DAYS: u64 = 365;

/// Last `end_date` that is picked up by a run on `today`.
pub fn cutoff(today: NaiveDate, lead_days: u32) -> NaiveDate {
  today
    .checked_add_days(Days::new(u64::from(lead_days)))
    .unwrap_or(NaiveDate::MAX)
}

fn add_days(day: NaiveDate, days: u64) -> NaiveDate {
  day.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX)
}

/// Successor period of a support entitlement: starts where the old one
/// ended and lasts as long (at least one day). Without both dates the
/// successor runs one year from `today`.
pub fn next_support_period(
  start: NaiveDate,
  end: Option<NaiveDate>,
  today: NaiveDate,
) -> (NaiveDate, NaiveDate) {
  match end {
    Some(end) => {
      let length = (end - start).num_days().max(1).unsigned_abs();
      (end, add_days(end, length))
    }
    None => (today, add_days(today, DEFAULT_TERM_DAYS)),
  }
}

/// Successor period of a plan subscription.
pub fn next_plan_period(
  end: Option<NaiveDate>,
  today: NaiveDate,
  period: BillingPeriod,
) -> (NaiveDate, NaiveDate) {
  let start = end.unwrap_or(today);
  (start, add_days(start, period.days().unsigned_abs()))
}

// ─── Report ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RenewalOptions {
  #[serde(default)]
  pub dry_run:   bool,
  #[serde(default)]
  pub lead_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
  Subscription,
  Entitlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalAction {
  Renewed,
  Lapsed,
  WouldRenew,
  WouldLapse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalOutcome {
  pub kind:         RecordKind,
  pub record_id:    Uuid,
  pub company_id:   Uuid,
  pub action:       RenewalAction,
  pub successor_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalFailure {
  pub kind:      RecordKind,
  pub record_id: Uuid,
  pub message:   String,
}

/// Summary of one batch run. In a dry run the counters describe what
/// would have happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalReport {
  pub dry_run:              bool,
  pub lead_days:            u32,
  pub cutoff:               NaiveDate,
  pub plans_renewed:        u32,
  pub plans_lapsed:         u32,
  pub entitlements_renewed: u32,
  pub entitlements_lapsed:  u32,
  pub outcomes:             Vec<RenewalOutcome>,
  pub errors:               Vec<RenewalFailure>,
}

impl RenewalReport {
  fn new(options: RenewalOptions, cutoff: NaiveDate) -> Self {
    Self {
      dry_run: options.dry_run,
      lead_days: options.lead_days,
      cutoff,
      plans_renewed: 0,
      plans_lapsed: 0,
      entitlements_renewed: 0,
      entitlements_lapsed: 0,
      outcomes: Vec::new(),
      errors: Vec::new(),
    }
  }

  fn record(&mut self, outcome: RenewalOutcome) {
    let renewed =
      matches!(outcome.action, RenewalAction::Renewed | RenewalAction::WouldRenew);
    let counter = match (outcome.kind, renewed) {
      (RecordKind::Subscription, true) => &mut self.plans_renewed,
      (RecordKind::Subscription, false) => &mut self.plans_lapsed,
      (RecordKind::Entitlement, true) => &mut self.entitlements_renewed,
      (RecordKind::Entitlement, false) => &mut self.entitlements_lapsed,
    };
    *counter += 1;
    self.outcomes.push(outcome);
  }

  fn fail(&mut self, kind: RecordKind, record_id: Uuid, error: &dyn std::error::Error) {
    warn!(?kind, %record_id, error = %error, "renewal of record failed");
    self.errors.push(RenewalFailure {
      kind,
      record_id,
      message: error.to_string(),
    });
  }

  pub fn is_clean(&self) -> bool { self.errors.is_empty() }
}

// ─── Runner ──────────────────────────────────────────────────────────────────

/// Run one renewal batch as of `today`.
///
/// Only listing failures and lock contention are returned as errors;
/// per-record failures land in [`RenewalReport::errors`].
pub async fn run_renewals<S: SupportStore>(
  store: &S,
  today: NaiveDate,
  options: RenewalOptions,
) -> Result<RenewalReport, S::Error> {
  let cutoff = cutoff(today, options.lead_days);
  let mut report = RenewalReport::new(options, cutoff);
  info!(%today, %cutoff, dry_run = options.dry_run, "renewal run starting");

  if options.dry_run {
    process(store, today, &mut report).await?;
  } else {
    let holder = Uuid::new_v4();
    store
      .acquire_job_lock(RENEWAL_JOB, holder, renewal_lock_ttl())
      .await?;
    let result = process(store, today, &mut report).await;
    if let Err(e) = store.release_job_lock(RENEWAL_JOB, holder).await {
      warn!(error = %e, "failed to release renewal lock");
    }
    result?;
  }

  info!(
    plans_renewed = report.plans_renewed,
    plans_lapsed = report.plans_lapsed,
    entitlements_renewed = report.entitlements_renewed,
    entitlements_lapsed = report.entitlements_lapsed,
    errors = report.errors.len(),
    "renewal run finished"
  );
  Ok(report)
}

async fn process<S: SupportStore>(
  store: &S,
  today: NaiveDate,
  report: &mut RenewalReport,
) -> Result<(), S::Error> {
  let dry_run = report.dry_run;

  for sub in store.expiring_subscriptions(report.cutoff).await? {
    let kind = RecordKind::Subscription;
    let outcome = |action, successor_id| RenewalOutcome {
      kind,
      record_id: sub.subscription_id,
      company_id: sub.company_id,
      action,
      successor_id,
    };
    if dry_run {
      let action = if sub.auto_renew {
        RenewalAction::WouldRenew
      } else {
        RenewalAction::WouldLapse
      };
      info!(subscription_id = %sub.subscription_id, ?action, "dry run");
      report.record(outcome(action, None));
    } else if sub.auto_renew {
      match store.renew_subscription(sub.subscription_id, today).await {
        Ok(next) => {
          report.record(outcome(RenewalAction::Renewed, Some(next.subscription_id)))
        }
        Err(e) => report.fail(kind, sub.subscription_id, &e),
      }
    } else {
      match store.lapse_subscription(sub.subscription_id).await {
        Ok(_) => report.record(outcome(RenewalAction::Lapsed, None)),
        Err(e) => report.fail(kind, sub.subscription_id, &e),
      }
    }
  }

  for ent in store.expiring_entitlements(report.cutoff).await? {
    let kind = RecordKind::Entitlement;
    let outcome = |action, successor_id| RenewalOutcome {
      kind,
      record_id: ent.entitlement_id,
      company_id: ent.company_id,
      action,
      successor_id,
    };
    if dry_run {
      let action = if ent.auto_renew {
        RenewalAction::WouldRenew
      } else {
        RenewalAction::WouldLapse
      };
      info!(entitlement_id = %ent.entitlement_id, ?action, "dry run");
      report.record(outcome(action, None));
    } else if ent.auto_renew {
      match store.auto_renew_entitlement(ent.entitlement_id, today).await {
        Ok(next) => {
          report.record(outcome(RenewalAction::Renewed, Some(next.entitlement_id)))
        }
        Err(e) => report.fail(kind, ent.entitlement_id, &e),
      }
    } else {
      match store.lapse_entitlement(ent.entitlement_id).await {
        Ok(_) => report.record(outcome(RenewalAction::Lapsed, None)),
        Err(e) => report.fail(kind, ent.entitlement_id, &e),
      }
    }
  }

  Ok(())
}
