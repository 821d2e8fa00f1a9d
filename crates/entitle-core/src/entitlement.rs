//! Support entitlements: one row per company per contracted period.
//!
//! Rows are never deleted; superseded periods stay behind as history with a
//! terminal status. At most one entitlement per company is `active` at a
//! time; the store enforces this on every path that produces an active row.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
  Active,
  Expired,
  Canceled,
  PendingPayment,
}

impl EntitlementStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Expired => "expired",
      Self::Canceled => "canceled",
      Self::PendingPayment => "pending_payment",
    }
  }

  /// The single transition table shared by every mutation path.
  pub fn can_transition_to(self, next: Self) -> bool {
    use EntitlementStatus::*;
    matches!(
      (self, next),
      (PendingPayment, Active)
        | (PendingPayment, Canceled)
        | (Active, PendingPayment)
        | (Active, Expired)
        | (Active, Canceled)
        | (Expired, Canceled)
    )
  }

  pub fn transition(self, next: Self) -> Result<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition {
        entity: "entitlement",
        from:   self.as_str(),
        to:     next.as_str(),
      })
    }
  }
}

// ─── SupportEntitlement ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportEntitlement {
  pub entitlement_id:   Uuid,
  pub company_id:       Uuid,
  pub subscription_id:  Uuid,
  pub support_type_id:  Uuid,
  pub start_date:       NaiveDate,
  pub end_date:         Option<NaiveDate>,
  pub status:           EntitlementStatus,
  /// Price captured when the period was contracted; never recomputed.
  pub current_price:    Decimal,
  pub tickets_consumed: u32,
  pub hours_consumed:   Decimal,
  pub auto_renew:       bool,
  /// Free-form human annotations. Status history lives in the audit log.
  pub notes:            Option<String>,
  pub created_by:       Option<Uuid>,
  /// The entitlement this one renewed, if any.
  pub predecessor_id:   Option<Uuid>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl SupportEntitlement {
  /// Whether `day` falls inside `[start_date, end_date]`.
  pub fn covers(&self, day: NaiveDate) -> bool {
    day >= self.start_date && self.end_date.is_none_or(|end| day <= end)
  }

  pub fn is_in_force(&self, day: NaiveDate) -> bool {
    self.status == EntitlementStatus::Active && self.covers(day)
  }
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Input to [`crate::store::SupportStore::create_entitlement`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewEntitlement {
  pub company_id:      Uuid,
  pub subscription_id: Uuid,
  pub support_type_id: Uuid,
  pub start_date:      NaiveDate,
  pub end_date:        Option<NaiveDate>,
  #[serde(default)]
  pub auto_renew:      bool,
  /// Start in `pending_payment` instead of `active`.
  #[serde(default)]
  pub pending_payment: bool,
  pub notes:           Option<String>,
}

impl NewEntitlement {
  pub fn validate(&self) -> Result<()> {
    if let Some(end) = self.end_date
      && end < self.start_date
    {
      return Err(Error::Validation(format!(
        "end_date {end} is before start_date {}",
        self.start_date
      )));
    }
    Ok(())
  }

  pub fn initial_status(&self) -> EntitlementStatus {
    if self.pending_payment {
      EntitlementStatus::PendingPayment
    } else {
      EntitlementStatus::Active
    }
  }
}

/// Options for an administrative, on-demand renewal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenewEntitlement {
  /// Also zero `hours_consumed` on the successor. `tickets_consumed`
  /// always restarts at zero: ticket allowances are counted per period.
  #[serde(default)]
  pub reset_counters: bool,
  /// Override the computed end date of the successor.
  pub end_date:       Option<NaiveDate>,
}

/// Administrative edit of an existing entitlement. Status is not editable
/// here; it only moves through the transition table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitlementPatch {
  pub auto_renew: Option<bool>,
  pub notes:      Option<String>,
  pub end_date:   Option<NaiveDate>,
}

impl EntitlementPatch {
  pub fn is_empty(&self) -> bool {
    self.auto_renew.is_none() && self.notes.is_none() && self.end_date.is_none()
  }

  /// Merge onto `current`, keeping `end_date >= start_date`.
  pub fn apply(self, current: &SupportEntitlement) -> Result<SupportEntitlement> {
    if let Some(end) = self.end_date
      && end < current.start_date
    {
      return Err(Error::Validation(format!(
        "end_date {end} is before start_date {}",
        current.start_date
      )));
    }
    Ok(SupportEntitlement {
      auto_renew: self.auto_renew.unwrap_or(current.auto_renew),
      notes: self.notes.or_else(|| current.notes.clone()),
      end_date: self.end_date.or(current.end_date),
      ..current.clone()
    })
  }
}

/// Parameters for [`crate::store::SupportStore::list_entitlements`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntitlementQuery {
  pub company_id: Option<Uuid>,
  pub status:     Option<EntitlementStatus>,
}
