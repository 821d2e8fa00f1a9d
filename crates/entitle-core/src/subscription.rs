//! Paid plans and company plan subscriptions.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
  Monthly,
  Yearly,
}

impl BillingPeriod {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Monthly => "monthly",
      Self::Yearly => "yearly",
    }
  }

  /// Fixed period lengths; calendar months are not used.
  pub fn days(self) -> i64 {
    match self {
      Self::Monthly => 30,
      Self::Yearly => 365,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
  pub plan_id:       Uuid,
  pub name:          String,
  pub description:   Option<String>,
  pub monthly_price: Decimal,
  pub yearly_price:  Decimal,
  pub created_at:    DateTime<Utc>,
}

impl Plan {
  pub fn price_for(&self, period: BillingPeriod) -> Decimal {
    match period {
      BillingPeriod::Monthly => self.monthly_price,
      BillingPeriod::Yearly => self.yearly_price,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlan {
  pub name:          String,
  pub description:   Option<String>,
  pub monthly_price: Decimal,
  pub yearly_price:  Decimal,
}

impl NewPlan {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("plan name is required".into()));
    }
    if self.monthly_price.is_sign_negative()
      || self.yearly_price.is_sign_negative()
    {
      return Err(Error::Validation("plan prices must not be negative".into()));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
  Active,
  Inactive,
  Suspended,
  Canceled,
}

impl SubscriptionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Inactive => "inactive",
      Self::Suspended => "suspended",
      Self::Canceled => "canceled",
    }
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    use SubscriptionStatus::*;
    matches!(
      (self, next),
      (Active, Inactive | Suspended | Canceled)
        | (Suspended, Active | Inactive | Canceled)
        | (Inactive, Canceled)
    )
  }

  pub fn transition(self, next: Self) -> Result<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition {
        entity: "subscription",
        from:   self.as_str(),
        to:     next.as_str(),
      })
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSubscription {
  pub subscription_id:  Uuid,
  pub company_id:       Uuid,
  pub plan_id:          Uuid,
  pub period:           BillingPeriod,
  pub price_paid:       Decimal,
  pub discount_percent: Decimal,
  pub status:           SubscriptionStatus,
  pub start_date:       NaiveDate,
  pub end_date:         Option<NaiveDate>,
  pub auto_renew:       bool,
  pub predecessor_id:   Option<Uuid>,
  pub notes:            Option<String>,
  pub created_by:       Option<Uuid>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSubscription {
  pub company_id:       Uuid,
  pub plan_id:          Uuid,
  pub period:           BillingPeriod,
  #[serde(default)]
  pub discount_percent: Decimal,
  pub start_date:       NaiveDate,
  /// Defaults to `start_date` plus one billing period.
  pub end_date:         Option<NaiveDate>,
  #[serde(default)]
  pub auto_renew:       bool,
  pub notes:            Option<String>,
}

impl NewSubscription {
  pub fn validate(&self) -> Result<()> {
    if self.discount_percent.is_sign_negative()
      || self.discount_percent > Decimal::ONE_HUNDRED
    {
      return Err(Error::Validation(
        "discount_percent must be between 0 and 100".into(),
      ));
    }
    if let Some(end) = self.end_date
      && end < self.start_date
    {
      return Err(Error::Validation("end_date precedes start_date".into()));
    }
    Ok(())
  }

  pub fn effective_end(&self) -> NaiveDate {
    self.end_date.unwrap_or(
      self.start_date + chrono::Duration::days(self.period.days()),
    )
  }
}
