//! Time source for the engine.
//!
//! All timestamps are handled timezone-aware. The tenant zone is only used
//! to answer calendar questions ("what day is it", "is it business hours").

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Colombia time: fixed UTC-5, no DST.
pub const DEFAULT_ZONE: Tz = chrono_tz::America::Bogota;

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  fn zone(&self) -> Tz;

  fn local_now(&self) -> DateTime<Tz> { self.now().with_timezone(&self.zone()) }

  fn today(&self) -> NaiveDate { self.local_now().date_naive() }
}

/// Wall-clock time in a configured tenant zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
  zone: Tz,
}

impl SystemClock {
  pub fn new(zone: Tz) -> Self { Self { zone } }
}

impl Default for SystemClock {
  fn default() -> Self { Self::new(DEFAULT_ZONE) }
}

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }

  fn zone(&self) -> Tz { self.zone }
}

/// A clock that only moves when told to. Used by tests and dry-run tooling.
#[derive(Debug)]
pub struct ManualClock {
  zone: Tz,
  now:  Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(zone: Tz, now: DateTime<Utc>) -> Self {
    Self { zone, now: Mutex::new(now) }
  }

  pub fn set(&self, now: DateTime<Utc>) {
    *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
  }

  pub fn advance(&self, by: Duration) {
    let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *guard += by;
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn zone(&self) -> Tz { self.zone }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn today_follows_tenant_zone() {
    // 03:00 UTC is still the previous evening in Bogota.
    let utc = Utc.with_ymd_and_hms(2025, 3, 4, 3, 0, 0).unwrap();
    let clock = ManualClock::new(DEFAULT_ZONE, utc);
    assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 3, 3).unwrap());
  }

  #[test]
  fn manual_clock_advances() {
    let utc = Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).unwrap();
    let clock = ManualClock::new(DEFAULT_ZONE, utc);
    clock.advance(Duration::hours(2));
    assert_eq!(clock.now(), utc + Duration::hours(2));
  }
}
