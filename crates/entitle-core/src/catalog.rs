//! Support-type catalog.
//!
//! A support type describes what a company buys: the unit of allowance
//! (its [`Modality`]), the cap for capped modalities, the list price and the
//! SLA tier. Types are soft-disabled, never deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Modality ────────────────────────────────────────────────────────────────

/// The unit in which an entitlement's allowance is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
  /// Unlimited tickets for a monthly period.
  Monthly,
  /// Unlimited tickets for a yearly period.
  Yearly,
  /// At most `max_tickets` tickets per period.
  ByTicketCount,
  /// At most `max_hours` hours of ticket time per period.
  ByHourCount,
}

impl Modality {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Monthly => "monthly",
      Self::Yearly => "yearly",
      Self::ByTicketCount => "by_ticket_count",
      Self::ByHourCount => "by_hour_count",
    }
  }

  pub fn is_unlimited(self) -> bool { matches!(self, Self::Monthly | Self::Yearly) }
}

// ─── Tier ────────────────────────────────────────────────────────────────────

/// Service level attached to a support type.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceTier {
  /// Responses during business hours only.
  Basic,
  #[default]
  Standard,
  /// Around-the-clock, immediate response.
  Premium,
}

impl ServiceTier {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Standard => "standard",
      Self::Premium => "premium",
    }
  }
}

// ─── SupportType ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportType {
  pub support_type_id: Uuid,
  pub name:            String,
  pub description:     Option<String>,
  pub modality:        Modality,
  pub tier:            ServiceTier,
  pub price:           Decimal,
  /// Present iff `modality == ByTicketCount`.
  pub max_tickets:     Option<u32>,
  /// Present iff `modality == ByHourCount`.
  pub max_hours:       Option<u32>,
  pub active:          bool,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

impl SupportType {
  /// The allowance cap expressed in the modality's unit, `None` if unlimited.
  pub fn maximum(&self) -> Option<Decimal> {
    match self.modality {
      Modality::ByTicketCount => Some(Decimal::from(self.max_tickets.unwrap_or(0))),
      Modality::ByHourCount => Some(Decimal::from(self.max_hours.unwrap_or(0))),
      Modality::Monthly | Modality::Yearly => None,
    }
  }
}

/// Input to [`crate::store::SupportStore::create_support_type`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSupportType {
  pub name:        String,
  pub description: Option<String>,
  pub modality:    Modality,
  #[serde(default)]
  pub tier:        ServiceTier,
  pub price:       Decimal,
  pub max_tickets: Option<u32>,
  pub max_hours:   Option<u32>,
}

impl NewSupportType {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::Validation("support type name is required".into()));
    }
    if self.price.is_sign_negative() {
      return Err(Error::Validation("price cannot be negative".into()));
    }

    match (self.modality, self.max_tickets, self.max_hours) {
      (Modality::ByTicketCount, Some(n), None) if n > 0 => Ok(()),
      (Modality::ByTicketCount, ..) => Err(Error::Validation(
        "by_ticket_count requires a positive max_tickets and no max_hours".into(),
      )),
      (Modality::ByHourCount, None, Some(h)) if h > 0 => Ok(()),
      (Modality::ByHourCount, ..) => Err(Error::Validation(
        "by_hour_count requires a positive max_hours and no max_tickets".into(),
      )),
      (Modality::Monthly | Modality::Yearly, None, None) => Ok(()),
      (m, ..) => Err(Error::Validation(format!(
        "{} support types take neither max_tickets nor max_hours",
        m.as_str()
      ))),
    }
  }
}

/// Input to [`crate::store::SupportStore::update_support_type`]. Absent
/// fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SupportTypePatch {
  pub name:        Option<String>,
  pub description: Option<String>,
  pub modality:    Option<Modality>,
  pub tier:        Option<ServiceTier>,
  pub price:       Option<Decimal>,
  pub max_tickets: Option<u32>,
  pub max_hours:   Option<u32>,
}

impl SupportTypePatch {
  /// Merge onto `current` and validate the result as a new type would be.
  /// Changing the modality drops the old caps; only the patch's count.
  pub fn apply(self, current: &SupportType) -> Result<NewSupportType> {
    let modality = self.modality.unwrap_or(current.modality);
    let (max_tickets, max_hours) = if modality == current.modality {
      (
        self.max_tickets.or(current.max_tickets),
        self.max_hours.or(current.max_hours),
      )
    } else {
      (self.max_tickets, self.max_hours)
    };
    let merged = NewSupportType {
      name: self.name.unwrap_or_else(|| current.name.clone()),
      description: self.description.or_else(|| current.description.clone()),
      modality,
      tier: self.tier.unwrap_or(current.tier),
      price: self.price.unwrap_or(current.price),
      max_tickets,
      max_hours,
    };
    merged.validate()?;
    Ok(merged)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn input(modality: Modality) -> NewSupportType {
    NewSupportType {
      name: "Bolsa de tickets".into(),
      description: None,
      modality,
      tier: ServiceTier::Standard,
      price: Decimal::from(100),
      max_tickets: None,
      max_hours: None,
    }
  }

  #[test]
  fn ticket_count_requires_max_tickets() {
    let mut t = input(Modality::ByTicketCount);
    assert!(t.validate().is_err());
    t.max_tickets = Some(0);
    assert!(t.validate().is_err());
    t.max_tickets = Some(5);
    assert!(t.validate().is_ok());
    t.max_hours = Some(3);
    assert!(t.validate().is_err());
  }

  #[test]
  fn hour_count_requires_max_hours() {
    let mut t = input(Modality::ByHourCount);
    assert!(t.validate().is_err());
    t.max_hours = Some(10);
    assert!(t.validate().is_ok());
  }

  #[test]
  fn unlimited_rejects_caps() {
    let mut t = input(Modality::Monthly);
    assert!(t.validate().is_ok());
    t.max_tickets = Some(1);
    assert!(matches!(t.validate(), Err(Error::Validation(_))));
  }

  fn stored(modality: Modality, max_tickets: Option<u32>) -> SupportType {
    let now = Utc::now();
    SupportType {
      support_type_id: Uuid::new_v4(),
      name: "Bolsa".into(),
      description: None,
      modality,
      tier: ServiceTier::Basic,
      price: Decimal::from(100),
      max_tickets,
      max_hours: None,
      active: true,
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn patch_keeps_unset_fields() {
    let ty = stored(Modality::ByTicketCount, Some(5));
    let merged = SupportTypePatch { price: Some(Decimal::from(120)), ..Default::default() }
      .apply(&ty)
      .unwrap();
    assert_eq!(merged.price, Decimal::from(120));
    assert_eq!(merged.max_tickets, Some(5));
    assert_eq!(merged.tier, ServiceTier::Basic);
  }

  #[test]
  fn modality_change_needs_matching_caps() {
    let ty = stored(Modality::ByTicketCount, Some(5));
    let to_hours = SupportTypePatch {
      modality: Some(Modality::ByHourCount),
      ..Default::default()
    };
    assert!(to_hours.clone().apply(&ty).is_err());

    let merged = SupportTypePatch { max_hours: Some(8), ..to_hours }.apply(&ty).unwrap();
    assert_eq!((merged.max_tickets, merged.max_hours), (None, Some(8)));

    let to_monthly = SupportTypePatch {
      modality: Some(Modality::Monthly),
      ..Default::default()
    };
    assert_eq!(to_monthly.apply(&ty).unwrap().max_tickets, None);
  }

  #[test]
  fn negative_price_rejected() {
    let mut t = input(Modality::Yearly);
    t.price = Decimal::from(-1);
    assert!(t.validate().is_err());
  }
}
