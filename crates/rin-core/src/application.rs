//! The application aggregate: identity, status lifecycle and per-section
//! completion with its derived progress percentage.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  section::{Section, SectionRegistry},
};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle of an application.
///
/// ```text
/// draft ──▶ in_progress ──▶ submitted ──▶ approved
///                                    └──▶ rejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
  Draft,
  InProgress,
  Submitted,
  Approved,
  Rejected,
}

impl Status {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::InProgress => "in_progress",
      Self::Submitted => "submitted",
      Self::Approved => "approved",
      Self::Rejected => "rejected",
    }
  }

  /// Whether applicant-side section edits are still accepted.
  pub fn is_editable(self) -> bool { matches!(self, Self::Draft | Self::InProgress) }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Approved | Self::Rejected) }

  /// The legal edges of the lifecycle graph.
  pub fn can_transition_to(self, next: Status) -> bool {
    matches!(
      (self, next),
      (Self::Draft, Self::InProgress)
        | (Self::Draft | Self::InProgress, Self::Submitted)
        | (Self::Submitted, Self::Approved | Self::Rejected)
    )
  }

  /// Return `next` if the edge exists, otherwise an
  /// [`Error::InvalidTransition`].
  pub fn transition_to(self, next: Status) -> Result<Status> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(Error::InvalidTransition { from: self, to: next })
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Status {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "draft" => Ok(Self::Draft),
      "in_progress" => Ok(Self::InProgress),
      "submitted" => Ok(Self::Submitted),
      "approved" => Ok(Self::Approved),
      "rejected" => Ok(Self::Rejected),
      other => Err(format!("unknown application status: {other:?}")),
    }
  }
}

/// An administrator's verdict on a submitted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
  Approved,
  Rejected,
}

impl Decision {
  pub fn status(self) -> Status {
    match self {
      Self::Approved => Status::Approved,
      Self::Rejected => Status::Rejected,
    }
  }
}

// ─── Application code ────────────────────────────────────────────────────────

/// Human-facing identifier `RIN-<year>-<5-digit sequence>`.
///
/// Persisted and printed on admit cards; the format must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationCode {
  year:     u16,
  sequence: u32,
}

impl ApplicationCode {
  pub const PREFIX: &'static str = "RIN";
  pub const MAX_SEQUENCE: u32 = 99_999;

  pub fn new(year: i32, sequence: u32) -> Result<Self> {
    let year = u16::try_from(year)
      .ok()
      .filter(|y| (1000..=9999).contains(y))
      .ok_or_else(|| Error::InvariantViolation(format!("year {year} is not four digits")))?;
    if sequence == 0 || sequence > Self::MAX_SEQUENCE {
      return Err(Error::InvariantViolation(format!(
        "application sequence {sequence} out of range for {year}"
      )));
    }
    Ok(Self { year, sequence })
  }

  pub fn year(&self) -> u16 { self.year }

  pub fn sequence(&self) -> u32 { self.sequence }
}

impl fmt::Display for ApplicationCode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{:04}-{:05}", Self::PREFIX, self.year, self.sequence)
  }
}

impl FromStr for ApplicationCode {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    let bad = || format!("malformed application code: {s:?}");
    let mut parts = s.split('-');
    let (Some(prefix), Some(year), Some(seq), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err(bad());
    };
    if prefix != Self::PREFIX
      || year.len() != 4
      || seq.len() != 5
      || !year.chars().chain(seq.chars()).all(|c| c.is_ascii_digit())
    {
      return Err(bad());
    }
    let year: i32 = year.parse().map_err(|_| bad())?;
    let seq: u32 = seq.parse().map_err(|_| bad())?;
    Self::new(year, seq).map_err(|_| bad())
  }
}

impl TryFrom<String> for ApplicationCode {
  type Error = String;

  fn try_from(s: String) -> std::result::Result<Self, Self::Error> { s.parse() }
}

impl From<ApplicationCode> for String {
  fn from(code: ApplicationCode) -> Self { code.to_string() }
}

// ─── Sections ────────────────────────────────────────────────────────────────

/// One row of `application_sections`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStatus {
  pub section:      Section,
  pub is_completed: bool,
  pub updated_at:   Option<DateTime<Utc>>,
}

// ─── Application ─────────────────────────────────────────────────────────────

/// A persisted application as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
  pub application_id: i64,
  pub code:           ApplicationCode,
  pub user_id:        i64,
  pub status:         Status,
  /// Always `round(100 × completed / total)`.
  pub progress:       u8,
  pub created_at:     DateTime<Utc>,
  pub last_updated:   DateTime<Utc>,
  pub submitted_at:   Option<DateTime<Utc>>,
  /// Optimistic-concurrency token; bumped by every committed unit of work.
  pub version:        u64,
  /// One entry per catalog section, ordered by section id.
  pub sections:       Vec<SectionStatus>,
}

impl Application {
  /// Rebuild the pure completion aggregate from the persisted rows.
  pub fn state(&self, registry: &SectionRegistry) -> Result<ApplicationState> {
    let mut state = ApplicationState::new(registry);
    if self.sections.len() != state.total_count() {
      return Err(Error::InvariantViolation(format!(
        "application {} has {} section rows, expected {}",
        self.application_id,
        self.sections.len(),
        state.total_count(),
      )));
    }
    for row in &self.sections {
      if row.is_completed {
        state.mark_section_complete(row.section.id())?;
      }
    }
    Ok(state)
  }
}

/// Summary row for the admin listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationSummary {
  pub application_id: i64,
  pub code:           ApplicationCode,
  pub user_id:        i64,
  pub status:         Status,
  pub progress:       u8,
  pub last_updated:   DateTime<Utc>,
  pub submitted_at:   Option<DateTime<Utc>>,
}

impl From<&Application> for ApplicationSummary {
  fn from(a: &Application) -> Self {
    Self {
      application_id: a.application_id,
      code:           a.code.clone(),
      user_id:        a.user_id,
      status:         a.status,
      progress:       a.progress,
      last_updated:   a.last_updated,
      submitted_at:   a.submitted_at,
    }
  }
}

// ─── ApplicationState ────────────────────────────────────────────────────────

/// Section completion for one application, and the progress derived from it.
///
/// This is the only place progress is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationState {
  completed: BTreeMap<Section, bool>,
}

impl ApplicationState {
  /// Every catalog section, all incomplete.
  pub fn new(registry: &SectionRegistry) -> Self {
    Self {
      completed: registry.sections().iter().map(|s| (*s, false)).collect(),
    }
  }

  pub fn mark_section_complete(&mut self, section_id: u8) -> Result<()> {
    self.set(section_id, true)
  }

  pub fn mark_section_incomplete(&mut self, section_id: u8) -> Result<()> {
    self.set(section_id, false)
  }

  fn set(&mut self, section_id: u8, done: bool) -> Result<()> {
    let section = Section::from_id(section_id)?;
    let slot = self
      .completed
      .get_mut(&section)
      .ok_or(Error::UnknownSection(section_id))?;
    *slot = done;
    Ok(())
  }

  pub fn is_complete(&self, section: Section) -> bool {
    self.completed.get(&section).copied().unwrap_or(false)
  }

  pub fn completed_count(&self) -> usize { self.completed.values().filter(|d| **d).count() }

  pub fn total_count(&self) -> usize { self.completed.len() }

  /// `round(100 × completed / total)`, rounding halves up.
  pub fn compute_progress(&self) -> Result<u8> {
    let total = self.total_count();
    if total == 0 {
      return Err(Error::InvariantViolation("application has no sections".into()));
    }
    let completed = self.completed_count();
    // Integer round-half-up of 100c/t.
    let pct = (200 * completed + total) / (2 * total);
    u8::try_from(pct)
      .map_err(|_| Error::InvariantViolation(format!("progress {pct} out of range")))
  }

  pub fn is_fully_complete(&self) -> Result<bool> { Ok(self.compute_progress()? == 100) }

  /// Sections not yet complete, in form order.
  pub fn incomplete_sections(&self) -> Vec<Section> {
    self
      .completed
      .iter()
      .filter(|(_, done)| !**done)
      .map(|(s, _)| *s)
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn state() -> ApplicationState { ApplicationState::new(&SectionRegistry::new()) }

  #[test]
  fn code_formats_with_padding() {
    let code = ApplicationCode::new(2024, 1).unwrap();
    assert_eq!(code.to_string(), "RIN-2024-00001");
    assert_eq!("RIN-2024-00001".parse::<ApplicationCode>().unwrap(), code);
  }

  #[test]
  fn code_rejects_malformed_input() {
    for bad in ["RIN-2024-1", "ABC-2024-00001", "RIN-24-00001", "RIN-2024-00000", "RIN-2024-00001-x"] {
      assert!(bad.parse::<ApplicationCode>().is_err(), "{bad} should not parse");
    }
    assert!(ApplicationCode::new(2024, 100_000).is_err());
  }

  #[test]
  fn code_serializes_as_string() {
    let code = ApplicationCode::new(2025, 42).unwrap();
    assert_eq!(serde_json::to_value(&code).unwrap(), serde_json::json!("RIN-2025-00042"));
  }

  #[test]
  fn progress_rounds_half_up() {
    let mut s = state();
    assert_eq!(s.compute_progress().unwrap(), 0);
    s.mark_section_complete(1).unwrap();
    assert_eq!(s.compute_progress().unwrap(), 11);
    // 5/9 = 55.55…
    for id in 2..=5 {
      s.mark_section_complete(id).unwrap();
    }
    assert_eq!(s.compute_progress().unwrap(), 56);
    for id in 6..=9 {
      s.mark_section_complete(id).unwrap();
    }
    assert_eq!(s.compute_progress().unwrap(), 100);
    assert!(s.is_fully_complete().unwrap());
  }

  #[test]
  fn progress_matches_formula_for_every_count() {
    let mut s = state();
    for (n, id) in (1..=9u8).enumerate() {
      s.mark_section_complete(id).unwrap();
      let expected = (100.0 * (n + 1) as f64 / 9.0).round() as u8;
      assert_eq!(s.compute_progress().unwrap(), expected);
    }
  }

  #[test]
  fn marking_is_idempotent_and_reversible() {
    let mut s = state();
    s.mark_section_complete(8).unwrap();
    s.mark_section_complete(8).unwrap();
    assert_eq!(s.completed_count(), 1);
    s.mark_section_incomplete(8).unwrap();
    assert_eq!(s.completed_count(), 0);
  }

  #[test]
  fn unknown_section_is_rejected() {
    let mut s = state();
    assert!(matches!(s.mark_section_complete(12), Err(Error::UnknownSection(12))));
    assert!(matches!(s.mark_section_incomplete(0), Err(Error::UnknownSection(0))));
  }

  #[test]
  fn status_graph() {
    use Status::*;
    assert!(Draft.can_transition_to(InProgress));
    assert!(InProgress.can_transition_to(Submitted));
    assert!(Submitted.can_transition_to(Approved));
    assert!(Submitted.can_transition_to(Rejected));
    assert!(!InProgress.can_transition_to(Approved));
    assert!(!Approved.can_transition_to(Rejected));
    assert!(!Submitted.can_transition_to(InProgress));
    assert!(matches!(
      Approved.transition_to(Approved),
      Err(Error::InvalidTransition { from: Approved, to: Approved })
    ));
  }
}
