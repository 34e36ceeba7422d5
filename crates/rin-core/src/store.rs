//! Collaborator traits consumed by the state machine, and the write model
//! they accept.
//!
//! Backends (e.g. `rin-store-sqlite`) implement these; the state machine and
//! the HTTP layer only ever see the traits.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  application::{Application, ApplicationCode, ApplicationSummary, Status},
  section::{Section, SectionPayload},
};

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Request to create the single application a user may own.
///
/// The store allocates the next code sequence for `year` inside the same
/// transaction that inserts the application and its section rows.
#[derive(Debug, Clone)]
pub struct NewApplication {
  pub user_id:    i64,
  pub year:       i32,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CreateOutcome {
  Created(Application),
  /// The user already owns an application (the uniqueness constraint fired).
  AlreadyExists(Application),
}

/// One write inside a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
  SaveSectionPayload {
    section: Section,
    payload: SectionPayload,
  },
  SetSectionCompleted {
    section:   Section,
    completed: bool,
  },
  UpdateProgress(u8),
  SetStatus {
    status:       Status,
    submitted_at: Option<DateTime<Utc>>,
  },
  /// Delete one stored document and drop it from the section 8 payload.
  RemoveDocument { document_type: String },
}

/// Writes applied atomically to one application.
///
/// The store must reject the whole unit if the application's current version
/// differs from `expected_version`, and bump the version on success.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
  pub application_id:   i64,
  pub expected_version: u64,
  /// Stamped onto `last_updated` and any touched section rows.
  pub at:               DateTime<Utc>,
  pub writes:           Vec<Write>,
}

impl UnitOfWork {
  pub fn for_application(app: &Application, at: DateTime<Utc>) -> Self {
    Self {
      application_id: app.application_id,
      expected_version: app.version,
      at,
      writes: Vec::new(),
    }
  }

  pub fn push(&mut self, write: Write) -> &mut Self {
    self.writes.push(write);
    self
  }
}

#[derive(Debug, Clone)]
pub enum CommitOutcome {
  /// The application as it stands after the commit.
  Committed(Application),
  /// Another writer got there first; nothing was applied.
  Stale,
}

/// Filter for the admin listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApplicationFilter {
  pub status: Option<Status>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

/// Number of applications in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
  pub total:       u64,
  pub draft:       u64,
  pub in_progress: u64,
  pub submitted:   u64,
  pub approved:    u64,
  pub rejected:    u64,
}

impl StatusCounts {
  /// Add `n` applications in `status`.
  pub fn add(&mut self, status: Status, n: u64) {
    let slot = match status {
      Status::Draft => &mut self.draft,
      Status::InProgress => &mut self.in_progress,
      Status::Submitted => &mut self.submitted,
      Status::Approved => &mut self.approved,
      Status::Rejected => &mut self.rejected,
    };
    *slot += n;
    self.total += n;
  }
}

/// A user-visible dashboard notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub notification_id: i64,
  pub user_id:         i64,
  pub title:           String,
  pub message:         String,
  pub is_read:         bool,
  pub created_at:      DateTime<Utc>,
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Persistence for applications, their section rows and section payloads.
pub trait ApplicationStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn application_by_user(
    &self,
    user_id: i64,
  ) -> impl Future<Output = Result<Option<Application>, Self::Error>> + Send + '_;

  fn application(
    &self,
    application_id: i64,
  ) -> impl Future<Output = Result<Option<Application>, Self::Error>> + Send + '_;

  /// Insert the application and one incomplete row per section, atomically.
  fn create_application(
    &self,
    input: NewApplication,
  ) -> impl Future<Output = Result<CreateOutcome, Self::Error>> + Send + '_;

  /// Apply every write in order inside one transaction.
  fn commit(
    &self,
    unit: UnitOfWork,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  /// The last saved payload of every section that has one.
  fn section_payloads(
    &self,
    application_id: i64,
  ) -> impl Future<Output = Result<BTreeMap<Section, SectionPayload>, Self::Error>> + Send + '_;

  fn list_applications(
    &self,
    filter: ApplicationFilter,
  ) -> impl Future<Output = Result<Vec<ApplicationSummary>, Self::Error>> + Send + '_;

  fn status_counts(&self) -> impl Future<Output = Result<StatusCounts, Self::Error>> + Send + '_;
}

/// User notifications and outbound administrator mail.
pub trait Notifier: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn notify(
    &self,
    user_id: i64,
    title: &str,
    message: &str,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  /// Queue the approval email. Delivery happens outside this process.
  fn send_approval_email(
    &self,
    user_id: i64,
    code: &ApplicationCode,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send;

  fn recent_notifications(
    &self,
    user_id: i64,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;
}

/// The admission calendar for a given year.
pub trait MilestoneSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn list_milestones(
    &self,
    year: i32,
  ) -> impl Future<Output = Result<BTreeMap<String, NaiveDate>, Self::Error>> + Send + '_;
}
