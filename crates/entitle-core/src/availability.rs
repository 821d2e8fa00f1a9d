//! Availability calculator.
//!
//! Answers "can this entitlement open one more ticket right now". Pure: the
//! caller supplies the tenant-local `now` and the number of tickets that
//! count against the allowance, so the same function serves the query
//! endpoint and the precondition inside ticket creation.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
  catalog::{Modality, ServiceTier, SupportType},
  entitlement::{EntitlementStatus, SupportEntitlement},
  ticket::TicketStatus,
};

/// First and last-exclusive business hour, tenant local.
pub const BUSINESS_HOURS: (u32, u32) = (8, 18);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityResult {
  /// The only field callers may branch on.
  pub can_open:                bool,
  pub reason:                  String,
  pub consumed:                Decimal,
  /// `None` for unlimited modalities.
  pub maximum:                 Option<Decimal>,
  /// `None` for unlimited modalities; never negative.
  pub available:               Option<Decimal>,
  pub modality:                Modality,
  pub period_start:            NaiveDate,
  pub period_end:              Option<NaiveDate>,
  pub requires_business_hours: bool,
  pub sla_description:         String,
}

/// Whether `now` is inside Monday–Friday business hours.
pub fn within_business_hours(now: &DateTime<Tz>) -> bool {
  let weekday = !matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
  let (open, close) = BUSINESS_HOURS;
  weekday && (open..close).contains(&now.hour())
}

/// Counts tickets created inside `[start, end]` (tenant-local calendar days)
/// whose status still counts against the allowance. An open-ended period
/// ends today.
pub fn tickets_in_period(
  tickets: impl IntoIterator<Item = (DateTime<Utc>, TicketStatus)>,
  start: NaiveDate,
  end: Option<NaiveDate>,
  now: &DateTime<Tz>,
) -> u32 {
  let zone = now.timezone();
  let end = end.unwrap_or_else(|| now.date_naive());
  let count = tickets
    .into_iter()
    .filter(|(_, status)| status.counts_against_allowance())
    .filter(|(created_at, _)| {
      let day = created_at.with_timezone(&zone).date_naive();
      day >= start && day <= end
    })
    .count();
  u32::try_from(count).unwrap_or(u32::MAX)
}

fn sla_description(tier: ServiceTier, zone: Tz) -> String {
  let (open, close) = BUSINESS_HOURS;
  match tier {
    ServiceTier::Basic => format!(
      "business hours only: Monday to Friday, {open:02}:00-{close:02}:00 ({})",
      zone.name()
    ),
    ServiceTier::Premium => "24/7 support with immediate response".into(),
    ServiceTier::Standard => "standard response times".into(),
  }
}

pub fn calculate_availability(
  entitlement: &SupportEntitlement,
  support_type: &SupportType,
  tickets_in_period: u32,
  now: &DateTime<Tz>,
) -> AvailabilityResult {
  let today = now.date_naive();
  let modality = support_type.modality;
  let maximum = support_type.maximum();

  let consumed = match modality {
    Modality::ByHourCount => entitlement.hours_consumed,
    _ => Decimal::from(tickets_in_period),
  };
  let available =
    maximum.map(|max| (max - consumed).max(Decimal::ZERO));

  let mut result = AvailabilityResult {
    can_open: false,
    reason: String::new(),
    consumed,
    maximum,
    available,
    modality,
    period_start: entitlement.start_date,
    period_end: entitlement.end_date,
    requires_business_hours: support_type.tier == ServiceTier::Basic,
    sla_description: sla_description(support_type.tier, now.timezone()),
  };

  if entitlement.status != EntitlementStatus::Active {
    result.reason =
      format!("entitlement is {}", entitlement.status.as_str());
  } else if !entitlement.covers(today) {
    result.reason = "entitlement not currently in force".into();
  } else {
    match (maximum, available) {
      (Some(max), Some(available)) => {
        let unit = match modality {
          Modality::ByHourCount => "hours",
          _ => "tickets",
        };
        result.can_open = available > Decimal::ZERO;
        result.reason = if result.can_open {
          format!("{available} of {max} {unit} available ({consumed} used)")
        } else {
          format!("allowance exhausted: {consumed} of {max} {unit} used")
        };
      }
      _ => {
        result.can_open = true;
        result.reason = format!(
          "unlimited {} support ({tickets_in_period} tickets this period)",
          modality.as_str()
        );
      }
    }

    if result.can_open
      && result.requires_business_hours
      && !within_business_hours(now)
    {
      result.reason.push_str(
        "; received outside business hours, will be handled on the next \
         business day",
      );
    }
  }

  debug!(
    entitlement_id = %entitlement.entitlement_id,
    can_open = result.can_open,
    consumed = %result.consumed,
    "availability computed"
  );
  result
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;
  use crate::clock::DEFAULT_ZONE;

  fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
    DEFAULT_ZONE.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
  }

  fn support_type(modality: Modality, tier: ServiceTier) -> SupportType {
    SupportType {
      support_type_id: Uuid::new_v4(),
      name: "t".into(),
      description: None,
      modality,
      tier,
      price: Decimal::from(100),
      max_tickets: (modality == Modality::ByTicketCount).then_some(2),
      max_hours: (modality == Modality::ByHourCount).then_some(5),
      active: true,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn entitlement(support_type: &SupportType) -> SupportEntitlement {
    SupportEntitlement {
      entitlement_id:   Uuid::new_v4(),
      company_id:       Uuid::new_v4(),
      subscription_id:  Uuid::new_v4(),
      support_type_id:  support_type.support_type_id,
      start_date:       day(2025, 3, 1),
      end_date:         Some(day(2025, 3, 31)),
      status:           EntitlementStatus::Active,
      current_price:    support_type.price,
      tickets_consumed: 0,
      hours_consumed:   Decimal::ZERO,
      auto_renew:       false,
      notes:            None,
      created_by:       None,
      predecessor_id:   None,
      created_at:       Utc::now(),
      updated_at:       Utc::now(),
    }
  }

  #[test]
  fn ticket_allowance_exhausts() {
    let ty = support_type(Modality::ByTicketCount, ServiceTier::Standard);
    let ent = entitlement(&ty);
    let now = at(2025, 3, 3, 10);

    let r = calculate_availability(&ent, &ty, 1, &now);
    assert!(r.can_open);
    assert_eq!(r.available, Some(Decimal::ONE));

    let r = calculate_availability(&ent, &ty, 2, &now);
    assert!(!r.can_open);
    assert_eq!(r.available, Some(Decimal::ZERO));
    assert_eq!(r.maximum, Some(Decimal::from(2)));
  }

  #[test]
  fn hour_allowance_uses_counter() {
    let ty = support_type(Modality::ByHourCount, ServiceTier::Standard);
    let mut ent = entitlement(&ty);
    ent.hours_consumed = Decimal::new(200, 2);
    let r = calculate_availability(&ent, &ty, 7, &at(2025, 3, 3, 10));
    assert!(r.can_open);
    assert_eq!(r.available, Some(Decimal::from(3)));
    assert_eq!(r.consumed, Decimal::from(2));

    ent.hours_consumed = Decimal::from(6);
    let r = calculate_availability(&ent, &ty, 0, &at(2025, 3, 3, 10));
    assert!(!r.can_open);
    assert_eq!(r.available, Some(Decimal::ZERO));
  }

  #[test]
  fn out_of_period_short_circuits() {
    let ty = support_type(Modality::Monthly, ServiceTier::Standard);
    let ent = entitlement(&ty);
    let r = calculate_availability(&ent, &ty, 0, &at(2025, 4, 1, 10));
    assert!(!r.can_open);
    assert_eq!(r.reason, "entitlement not currently in force");

    let r = calculate_availability(&ent, &ty, 0, &at(2025, 2, 28, 10));
    assert!(!r.can_open);
  }

  #[test]
  fn inactive_entitlement_cannot_open() {
    let ty = support_type(Modality::Yearly, ServiceTier::Premium);
    let mut ent = entitlement(&ty);
    ent.status = EntitlementStatus::PendingPayment;
    let r = calculate_availability(&ent, &ty, 0, &at(2025, 3, 3, 10));
    assert!(!r.can_open);
  }

  #[test]
  fn basic_tier_defers_outside_hours() {
    let ty = support_type(Modality::Monthly, ServiceTier::Basic);
    let ent = entitlement(&ty);

    // Saturday
    let r = calculate_availability(&ent, &ty, 0, &at(2025, 3, 8, 10));
    assert!(r.can_open);
    assert!(r.requires_business_hours);
    assert!(r.reason.contains("outside business hours"));

    let r = calculate_availability(&ent, &ty, 0, &at(2025, 3, 3, 9));
    assert!(r.can_open);
    assert!(!r.reason.contains("outside business hours"));
  }

  #[test]
  fn premium_is_always_on() {
    let ty = support_type(Modality::Monthly, ServiceTier::Premium);
    let ent = entitlement(&ty);
    let r = calculate_availability(&ent, &ty, 0, &at(2025, 3, 8, 23));
    assert!(r.can_open);
    assert!(!r.requires_business_hours);
    assert!(r.sla_description.starts_with("24/7"));
    assert_eq!(r.maximum, None);
  }

  #[test]
  fn business_hour_edges() {
    assert!(within_business_hours(&at(2025, 3, 3, 8)));
    assert!(within_business_hours(&at(2025, 3, 7, 17)));
    assert!(!within_business_hours(&at(2025, 3, 3, 18)));
    assert!(!within_business_hours(&at(2025, 3, 3, 7)));
  }

  #[test]
  fn canceled_and_out_of_period_tickets_are_free() {
    let now = at(2025, 3, 10, 10);
    let in_period = Utc.with_ymd_and_hms(2025, 3, 5, 15, 0, 0).unwrap();
    // 2025-03-01 02:00 UTC is still February 28th in Bogota.
    let before = Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap();
    let count = tickets_in_period(
      [
        (in_period, TicketStatus::Open),
        (in_period, TicketStatus::Closed),
        (in_period, TicketStatus::Canceled),
        (before, TicketStatus::Closed),
      ],
      day(2025, 3, 1),
      Some(day(2025, 3, 31)),
      &now,
    );
    assert_eq!(count, 2);
  }
}
