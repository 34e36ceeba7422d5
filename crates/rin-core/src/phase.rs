//! Admission calendar: which phase is active on a given day and which
//! applicant actions that phase permits.
//!
//! Phases are delimited by named milestones. There are no transition events;
//! the phase is a pure function of the date and the configured calendar, so a
//! [`PhaseClock`] is cheap to rebuild on every request.

use std::{collections::BTreeMap, fmt};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Milestones ──────────────────────────────────────────────────────────────

pub const APPLICATION_START: &str = "Application Start";
pub const APPLICATION_DEADLINE: &str = "Application Deadline";
pub const APPLICATION_PAYMENT: &str = "Application Payment";
pub const DOCUMENT_VERIFICATION: &str = "Document Verification";
pub const ENTRANCE_EXAMINATION: &str = "Entrance Examination";
pub const RESULT_DECLARATION: &str = "Result Declaration";
pub const ADMISSION_CONFIRMATION: &str = "Admission Confirmation";

/// A named calendar date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
  pub title: String,
  pub date:  NaiveDate,
}

/// The calendar the institute ships with: June to September of `year`.
pub fn default_calendar(year: i32) -> Vec<Milestone> {
  [
    (APPLICATION_START, 6, 1),
    (APPLICATION_DEADLINE, 7, 31),
    (APPLICATION_PAYMENT, 8, 7),
    (DOCUMENT_VERIFICATION, 8, 15),
    (ENTRANCE_EXAMINATION, 8, 30),
    (RESULT_DECLARATION, 9, 15),
    (ADMISSION_CONFIRMATION, 9, 30),
  ]
  .into_iter()
  .filter_map(|(title, m, d)| {
    NaiveDate::from_ymd_opt(year, m, d).map(|date| Milestone { title: title.to_owned(), date })
  })
  .collect()
}

// ─── Phase ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  NotStarted,
  ApplicationSubmission,
  Payment,
  DocumentVerification,
  PreExamination,
  AwaitingResults,
  AdmissionConfirmation,
  Closed,
}

/// Each bounded phase and the milestone that closes it, in calendar order.
/// A phase lasts until its closing milestone, inclusive.
const BOUNDARIES: [(Phase, &str); 6] = [
  (Phase::ApplicationSubmission, APPLICATION_DEADLINE),
  (Phase::Payment, APPLICATION_PAYMENT),
  (Phase::DocumentVerification, DOCUMENT_VERIFICATION),
  (Phase::PreExamination, ENTRANCE_EXAMINATION),
  (Phase::AwaitingResults, RESULT_DECLARATION),
  (Phase::AdmissionConfirmation, ADMISSION_CONFIRMATION),
];

impl Phase {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::NotStarted => "not_started",
      Self::ApplicationSubmission => "application_submission",
      Self::Payment => "payment",
      Self::DocumentVerification => "document_verification",
      Self::PreExamination => "pre_examination",
      Self::AwaitingResults => "awaiting_results",
      Self::AdmissionConfirmation => "admission_confirmation",
      Self::Closed => "closed",
    }
  }

  /// The milestone that bounds this phase: its end, or for the two open-ended
  /// phases the edge they sit against.
  pub fn bounding_milestone(self) -> &'static str {
    match self {
      Self::NotStarted => APPLICATION_START,
      Self::Closed => ADMISSION_CONFIRMATION,
      bounded => BOUNDARIES
        .iter()
        .find(|(p, _)| *p == bounded)
        .map_or(ADMISSION_CONFIRMATION, |(_, m)| m),
    }
  }

  fn description(self) -> &'static str {
    match self {
      Self::NotStarted => "Applications are not yet open; they start on",
      Self::ApplicationSubmission => "Application submission is open until",
      Self::Payment => "Only payment submission is allowed until",
      Self::DocumentVerification => "Document verification is ongoing until",
      Self::PreExamination => "The entrance examination is scheduled for",
      Self::AwaitingResults => "Results will be declared on",
      Self::AdmissionConfirmation => "Admission confirmation is open until",
      Self::Closed => "The admission process closed after",
    }
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Actions ─────────────────────────────────────────────────────────────────

/// Applicant-facing actions gated by the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
  EditApplication,
  SubmitApplication,
  MakePayment,
  UploadDocuments,
  DownloadAdmitCard,
  ConfirmAdmission,
  ViewApplication,
}

impl Action {
  pub const ALL: [Action; 7] = [
    Self::EditApplication,
    Self::SubmitApplication,
    Self::MakePayment,
    Self::UploadDocuments,
    Self::DownloadAdmitCard,
    Self::ConfirmAdmission,
    Self::ViewApplication,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::EditApplication => "edit_application",
      Self::SubmitApplication => "submit_application",
      Self::MakePayment => "make_payment",
      Self::UploadDocuments => "upload_documents",
      Self::DownloadAdmitCard => "download_admit_card",
      Self::ConfirmAdmission => "confirm_admission",
      Self::ViewApplication => "view_application",
    }
  }

  /// The fixed action → phase permission table.
  pub fn allowed_in(self, phase: Phase) -> bool {
    match self {
      Self::EditApplication | Self::SubmitApplication => {
        phase == Phase::ApplicationSubmission
      }
      Self::MakePayment => phase == Phase::Payment,
      Self::UploadDocuments => phase == Phase::DocumentVerification,
      Self::DownloadAdmitCard => phase == Phase::PreExamination,
      Self::ConfirmAdmission => phase == Phase::AdmissionConfirmation,
      Self::ViewApplication => phase != Phase::NotStarted,
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Clock ───────────────────────────────────────────────────────────────────

/// The nearest upcoming milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextDeadline {
  pub title:          String,
  pub date:           NaiveDate,
  pub days_remaining: i64,
}

/// Phase computation over a fixed milestone table.
#[derive(Debug, Clone, Default)]
pub struct PhaseClock {
  milestones: BTreeMap<String, NaiveDate>,
}

impl PhaseClock {
  pub fn new(milestones: BTreeMap<String, NaiveDate>) -> Self { Self { milestones } }

  pub fn from_milestones(milestones: impl IntoIterator<Item = Milestone>) -> Self {
    Self::new(milestones.into_iter().map(|m| (m.title, m.date)).collect())
  }

  pub fn milestones(&self) -> &BTreeMap<String, NaiveDate> { &self.milestones }

  fn milestone(&self, title: &str) -> Result<NaiveDate> {
    self
      .milestones
      .get(title)
      .copied()
      .ok_or_else(|| Error::MissingMilestone(title.to_owned()))
  }

  /// Walk the boundaries in order. A milestone is only required once the
  /// walk reaches it, so a calendar that stops after "Application Payment"
  /// still answers for dates up to that milestone.
  pub fn current_phase(&self, today: NaiveDate) -> Result<Phase> {
    if today < self.milestone(APPLICATION_START)? {
      return Ok(Phase::NotStarted);
    }
    for (phase, closing) in BOUNDARIES {
      if today <= self.milestone(closing)? {
        return Ok(phase);
      }
    }
    Ok(Phase::Closed)
  }

  pub fn is_action_allowed(&self, action: Action, today: NaiveDate) -> Result<bool> {
    Ok(action.allowed_in(self.current_phase(today)?))
  }

  pub fn allowed_actions(&self, today: NaiveDate) -> Result<Vec<Action>> {
    let phase = self.current_phase(today)?;
    Ok(Action::ALL.into_iter().filter(|a| a.allowed_in(phase)).collect())
  }

  /// Explanation shown when `action` is refused, naming the current phase
  /// and the milestone date that bounds it.
  pub fn restricted_message(&self, action: Action, today: NaiveDate) -> Result<String> {
    let phase = self.current_phase(today)?;
    let title = phase.bounding_milestone();
    let date = self.milestone(title)?;
    Ok(format!(
      "{action} is not available during the {phase} phase. {} {} ({title}).",
      phase.description(),
      date.format("%Y-%m-%d"),
    ))
  }

  /// The nearest milestone strictly after `today`; ties go to the
  /// alphabetically first title.
  pub fn days_to_next_deadline(&self, today: NaiveDate) -> Option<NextDeadline> {
    self
      .milestones
      .iter()
      .filter(|(_, date)| **date > today)
      .min_by_key(|(title, date)| (**date, title.as_str()))
      .map(|(title, date)| NextDeadline {
        title:          title.clone(),
        date:           *date,
        days_remaining: (*date - today).num_days(),
      })
  }

  /// Milestones on or after `today`, soonest first, at most `limit`.
  pub fn upcoming(&self, today: NaiveDate, limit: usize) -> Vec<Milestone> {
    let mut dates: Vec<Milestone> = self
      .milestones
      .iter()
      .filter(|(_, date)| **date >= today)
      .map(|(title, date)| Milestone { title: title.clone(), date: *date })
      .collect();
    dates.sort_by(|a, b| (a.date, &a.title).cmp(&(b.date, &b.title)));
    dates.truncate(limit);
    dates
  }
}
