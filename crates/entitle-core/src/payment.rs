//! Entitlement payments.
//!
//! Capture happens elsewhere; the engine only records outcomes and reacts to
//! a payment becoming [`PaymentStatus::Successful`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  #[default]
  Successful,
  Failed,
  Pending,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Successful => "successful",
      Self::Failed => "failed",
      Self::Pending => "pending",
    }
  }

  /// Confirm, decline, or revert a captured payment.
  pub fn can_transition_to(self, next: Self) -> bool {
    use PaymentStatus::*;
    matches!(
      (self, next),
      (Pending, Successful) | (Pending, Failed) | (Successful, Failed)
    )
  }

  pub fn transition(self, next: Self) -> Result<Self> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition {
        entity: "payment",
        from:   self.as_str(),
        to:     next.as_str(),
      })
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportPayment {
  pub payment_id:     Uuid,
  pub entitlement_id: Uuid,
  pub amount:         Decimal,
  pub paid_at:        DateTime<Utc>,
  pub method:         String,
  pub reference:      Option<String>,
  pub status:         PaymentStatus,
  pub details:        serde_json::Value,
  pub recorded_by:    Option<Uuid>,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPayment {
  pub entitlement_id: Uuid,
  pub amount:         Decimal,
  /// Defaults to the time of recording.
  pub paid_at:        Option<DateTime<Utc>>,
  pub method:         String,
  pub reference:      Option<String>,
  #[serde(default)]
  pub status:         PaymentStatus,
  #[serde(default)]
  pub details:        serde_json::Value,
}

impl NewPayment {
  pub fn validate(&self) -> Result<()> {
    if self.amount <= Decimal::ZERO {
      return Err(Error::Validation("payment amount must be positive".into()));
    }
    if self.method.trim().is_empty() {
      return Err(Error::Validation("payment method is required".into()));
    }
    Ok(())
  }
}

/// Payments of one entitlement plus the sum of the successful ones.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLedger {
  pub payments:         Vec<SupportPayment>,
  pub successful_total: Decimal,
}

impl PaymentLedger {
  pub fn new(payments: Vec<SupportPayment>) -> Self {
    let successful_total = payments
      .iter()
      .filter(|p| p.status == PaymentStatus::Successful)
      .map(|p| p.amount)
      .sum();
    Self { payments, successful_total }
  }
}
