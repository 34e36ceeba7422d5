//! Wall-clock access, injectable so phase gating and timestamps are testable.

use chrono::{DateTime, NaiveDate, Utc};

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;

  /// The calendar day used for phase gating and age checks.
  fn today(&self) -> NaiveDate { self.now().date_naive() }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
  /// Noon UTC on `date`.
  pub fn on(date: NaiveDate) -> Self {
    Self(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> { self.0 }
}
