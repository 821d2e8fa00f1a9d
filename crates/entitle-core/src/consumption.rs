//! Consumption applied to an entitlement when one of its tickets closes.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::catalog::Modality;

/// Counter deltas for a single ticket closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Consumption {
  pub tickets: u32,
  pub hours:   Decimal,
}

impl Consumption {
  pub fn is_empty(&self) -> bool {
    self.tickets == 0 && self.hours.is_zero()
  }
}

/// Elapsed wall-clock time in hours, rounded half-up to two decimals.
/// Negative spans (clock skew) count as zero.
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
  let seconds = (to - from).num_seconds().max(0);
  (Decimal::from(seconds) / Decimal::from(3600))
    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn consumption_for_closure(
  modality: Modality,
  created_at: DateTime<Utc>,
  closed_at: DateTime<Utc>,
) -> Consumption {
  match modality {
    Modality::ByTicketCount => Consumption { tickets: 1, hours: Decimal::ZERO },
    Modality::ByHourCount => Consumption {
      tickets: 0,
      hours:   elapsed_hours(created_at, closed_at),
    },
    Modality::Monthly | Modality::Yearly => Consumption::default(),
  }
}
