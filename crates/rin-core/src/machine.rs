//! The application state machine: the only component that mutates
//! applications.
//!
//! Every mutating operation follows the same shape: take the per-application
//! lock, load the application, decide on the writes with
//! [`ApplicationState`](crate::application::ApplicationState),
//! commit them as one [`UnitOfWork`], then notify. Progress is never computed
//! anywhere else.

use std::{
  collections::{BTreeMap, HashMap},
  sync::{Arc, Mutex, PoisonError},
};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};

use crate::{
  Error, Result,
  application::{Application, ApplicationSummary, Decision, Status},
  clock::{Clock, SystemClock},
  phase::{Action, Milestone, NextDeadline, Phase, PhaseClock},
  section::{Section, SectionInfo, SectionPayload, SectionRegistry},
  store::{
    ApplicationFilter, ApplicationStore, CommitOutcome, CreateOutcome, MilestoneSource,
    NewApplication, Notification, Notifier, StatusCounts, UnitOfWork, Write,
  },
  validate::ValidationError,
};

pub const SUBMITTED_TITLE: &str = "Application Submitted";
pub const SUBMITTED_MESSAGE: &str = "Your application has been successfully submitted. You will \
                                     be notified once it is reviewed.";
pub const DECISION_TITLE: &str = "Application Status Update";
pub const APPROVED_MESSAGE: &str = "Your application has been approved! Please check your email \
                                    for further instructions.";
pub const REJECTED_MESSAGE: &str = "Your application has been rejected. Please contact the \
                                    administration for more information.";

/// How many notifications the dashboard shows.
pub const RECENT_NOTIFICATIONS: usize = 10;

/// How many important dates the dashboard lists.
pub const UPCOMING_DATES: usize = 5;

// ─── Results ─────────────────────────────────────────────────────────────────

/// Result of a save or submit. Validation problems are an expected outcome,
/// not an error, and leave the application untouched.
#[derive(Debug, Clone)]
pub enum SaveOutcome {
  Saved(Application),
  Invalid(ValidationError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionProgress {
  pub section_id:   u8,
  pub section_name: &'static str,
  pub completed:    bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
  pub application_id: i64,
  pub code:           String,
  pub status:         Status,
  pub progress:       u8,
  pub sections:       Vec<SectionProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
  pub today:           NaiveDate,
  pub phase:           Phase,
  pub allowed_actions: Vec<Action>,
  pub next_deadline:   Option<NextDeadline>,
  /// Milestones from today on, soonest first.
  pub upcoming:        Vec<Milestone>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MachineConfig {
  /// Refuse edits and submission outside the application-submission phase.
  pub enforce_phase_gating: bool,
}

// ─── Machine ─────────────────────────────────────────────────────────────────

pub struct ApplicationStateMachine<S, N> {
  store:    S,
  notifier: N,
  clock:    Arc<dyn Clock>,
  registry: SectionRegistry,
  config:   MachineConfig,
  locks:    Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S, N> ApplicationStateMachine<S, N>
where
  S: ApplicationStore + MilestoneSource,
  N: Notifier,
{
  pub fn new(store: S, notifier: N, config: MachineConfig) -> Self {
    Self::with_clock(store, notifier, config, Arc::new(SystemClock))
  }

  pub fn with_clock(
    store: S,
    notifier: N,
    config: MachineConfig,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self {
      store,
      notifier,
      clock,
      registry: SectionRegistry::new(),
      config,
      locks: Mutex::new(HashMap::new()),
    }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn registry(&self) -> &SectionRegistry { &self.registry }

  pub fn sections(&self) -> Vec<SectionInfo> { self.registry.list_sections() }

  // ── Locking ───────────────────────────────────────────────────────────

  /// Serialise mutations of one application. Different applications never
  /// share a lock.
  async fn lock(&self, application_id: i64) -> OwnedMutexGuard<()> {
    let slot = {
      let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
      // Drop slots nobody is waiting on so the map tracks only live work.
      locks.retain(|_, m| Arc::strong_count(m) > 1);
      locks.entry(application_id).or_default().clone()
    };
    slot.lock_owned().await
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn application(&self, application_id: i64) -> Result<Application> {
    self
      .store
      .application(application_id)
      .await
      .map_err(Error::persistence)?
      .ok_or(Error::ApplicationNotFound(application_id))
  }

  pub async fn application_for_user(&self, user_id: i64) -> Result<Option<Application>> {
    self
      .store
      .application_by_user(user_id)
      .await
      .map_err(Error::persistence)
  }

  pub async fn progress(&self, application_id: i64) -> Result<ProgressReport> {
    let app = self.application(application_id).await?;
    let state = app.state(&self.registry)?;
    // Reported progress comes from the aggregate, not the stored column.
    let progress = state.compute_progress()?;
    if progress != app.progress {
      warn!(application_id, stored = app.progress, computed = progress, "progress drift");
    }
    Ok(ProgressReport {
      application_id,
      code: app.code.to_string(),
      status: app.status,
      progress,
      sections: self
        .registry
        .sections()
        .iter()
        .map(|s| SectionProgress {
          section_id:   s.id(),
          section_name: s.name(),
          completed:    state.is_complete(*s),
        })
        .collect(),
    })
  }

  pub async fn section_payloads(
    &self,
    application_id: i64,
  ) -> Result<BTreeMap<Section, SectionPayload>> {
    self.application(application_id).await?;
    self
      .store
      .section_payloads(application_id)
      .await
      .map_err(Error::persistence)
  }

  pub async fn list_applications(
    &self,
    filter: ApplicationFilter,
  ) -> Result<Vec<ApplicationSummary>> {
    self
      .store
      .list_applications(filter)
      .await
      .map_err(Error::persistence)
  }

  /// Applications per status, for the admin dashboard.
  pub async fn status_counts(&self) -> Result<StatusCounts> {
    self.store.status_counts().await.map_err(Error::persistence)
  }

  pub async fn notifications(&self, user_id: i64) -> Result<Vec<Notification>> {
    self
      .notifier
      .recent_notifications(user_id, RECENT_NOTIFICATIONS)
      .await
      .map_err(Error::persistence)
  }

  // ── Phase ─────────────────────────────────────────────────────────────

  async fn phase_clock(&self, today: NaiveDate) -> Result<PhaseClock> {
    let milestones = self
      .store
      .list_milestones(today.year())
      .await
      .map_err(Error::persistence)?;
    Ok(PhaseClock::new(milestones))
  }

  pub async fn phase(&self) -> Result<PhaseReport> {
    let today = self.clock.today();
    let clock = self.phase_clock(today).await?;
    Ok(PhaseReport {
      today,
      phase: clock.current_phase(today)?,
      allowed_actions: clock.allowed_actions(today)?,
      next_deadline: clock.days_to_next_deadline(today),
      upcoming: clock.upcoming(today, UPCOMING_DATES),
    })
  }

  async fn gate(&self, action: Action, today: NaiveDate) -> Result<()> {
    if !self.config.enforce_phase_gating {
      return Ok(());
    }
    let clock = self.phase_clock(today).await?;
    if clock.is_action_allowed(action, today)? {
      return Ok(());
    }
    let message = clock.restricted_message(action, today)?;
    debug!(%action, %message, "action refused by calendar");
    Err(Error::ActionNotAllowed { action, message })
  }

  // ── Mutations ─────────────────────────────────────────────────────────

  async fn commit(&self, unit: UnitOfWork) -> Result<Application> {
    let application_id = unit.application_id;
    match self.store.commit(unit).await.map_err(Error::persistence)? {
      CommitOutcome::Committed(app) => Ok(app),
      CommitOutcome::Stale => Err(Error::StaleApplication(application_id)),
    }
  }

  /// Return the user's application, creating it with every section
  /// incomplete if they have none.
  #[instrument(skip(self))]
  pub async fn get_or_create_application(&self, user_id: i64) -> Result<Application> {
    if let Some(app) = self.application_for_user(user_id).await? {
      return Ok(app);
    }

    let now = self.clock.now();
    let input = NewApplication { user_id, year: now.year(), created_at: now };
    match self
      .store
      .create_application(input)
      .await
      .map_err(Error::persistence)?
    {
      CreateOutcome::Created(app) => {
        info!(application_id = app.application_id, code = %app.code, "application created");
        Ok(app)
      }
      CreateOutcome::AlreadyExists(_) => Err(Error::DuplicateApplication(user_id)),
    }
  }

  /// Validate and store one section. Completing the last section submits
  /// the application.
  #[instrument(skip(self, payload))]
  pub async fn save_section(
    &self,
    application_id: i64,
    section_id: u8,
    payload: SectionPayload,
  ) -> Result<SaveOutcome> {
    let section = self.registry.section(section_id)?;
    let _guard = self.lock(application_id).await;

    let app = self.application(application_id).await?;
    if !app.status.is_editable() {
      return Err(Error::InvalidTransition { from: app.status, to: Status::InProgress });
    }

    let now = self.clock.now();
    let today = self.clock.today();
    self.gate(Action::EditApplication, today).await?;

    let payload = match self.registry.validate(section_id, &payload, today)? {
      Ok(p) => p,
      Err(e) => {
        debug!(field = %e.field, "section rejected");
        return Ok(SaveOutcome::Invalid(e.in_section(section)));
      }
    };

    let mut state = app.state(&self.registry)?;
    state.mark_section_complete(section_id)?;

    let mut unit = UnitOfWork::for_application(&app, now);
    unit
      .push(Write::SaveSectionPayload { section, payload })
      .push(Write::SetSectionCompleted { section, completed: true })
      .push(Write::UpdateProgress(state.compute_progress()?));

    let submitting = state.is_fully_complete()?;
    if submitting {
      app.status.transition_to(Status::Submitted)?;
      unit.push(Write::SetStatus { status: Status::Submitted, submitted_at: Some(now) });
    } else if app.status == Status::Draft {
      unit.push(Write::SetStatus { status: Status::InProgress, submitted_at: None });
    }

    let app = self.commit(unit).await?;
    info!(progress = app.progress, status = %app.status, "section saved");
    if submitting {
      self.announce_submission(&app).await;
    }
    Ok(SaveOutcome::Saved(app))
  }

  /// Explicit final submit. Every section must be complete and its stored
  /// payload must still validate.
  ///
  /// Saving the last section already submits, so the success path is only
  /// reached for rows completed by another process writing the store.
  #[instrument(skip(self))]
  pub async fn submit(&self, application_id: i64) -> Result<SaveOutcome> {
    let _guard = self.lock(application_id).await;

    let app = self.application(application_id).await?;
    if app.status != Status::InProgress {
      return Err(Error::InvalidTransition { from: app.status, to: Status::Submitted });
    }

    let now = self.clock.now();
    let today = self.clock.today();
    self.gate(Action::SubmitApplication, today).await?;

    let state = app.state(&self.registry)?;
    let payloads = self
      .store
      .section_payloads(application_id)
      .await
      .map_err(Error::persistence)?;
    for section in self.registry.sections() {
      let stored = payloads.get(section).filter(|_| state.is_complete(*section));
      let Some(payload) = stored else {
        return Ok(SaveOutcome::Invalid(ValidationError::incomplete(*section)));
      };
      if let Err(e) = self.registry.validate(section.id(), payload, today)? {
        return Ok(SaveOutcome::Invalid(e.in_section(*section)));
      }
    }
    if !state.is_fully_complete()? {
      return Err(Error::InvariantViolation(format!(
        "application {application_id} has every payload but progress below 100"
      )));
    }

    let mut unit = UnitOfWork::for_application(&app, now);
    unit
      .push(Write::UpdateProgress(state.compute_progress()?))
      .push(Write::SetStatus { status: Status::Submitted, submitted_at: Some(now) });
    let app = self.commit(unit).await?;
    info!("application submitted");
    self.announce_submission(&app).await;
    Ok(SaveOutcome::Saved(app))
  }

  /// Flip a section back to incomplete. Status is left as it is, even for a
  /// submitted application.
  #[instrument(skip(self))]
  pub async fn unmark_section(&self, application_id: i64, section_id: u8) -> Result<Application> {
    let section = self.registry.section(section_id)?;
    let _guard = self.lock(application_id).await;

    let app = self.application(application_id).await?;
    let mut state = app.state(&self.registry)?;
    state.mark_section_incomplete(section_id)?;

    let mut unit = UnitOfWork::for_application(&app, self.clock.now());
    unit
      .push(Write::SetSectionCompleted { section, completed: false })
      .push(Write::UpdateProgress(state.compute_progress()?));
    let app = self.commit(unit).await?;
    info!(progress = app.progress, "section unmarked");
    Ok(app)
  }

  /// Delete one uploaded document. Removing the last one unmarks the
  /// documents section in the same commit.
  #[instrument(skip(self))]
  pub async fn remove_document(
    &self,
    application_id: i64,
    document_type: &str,
  ) -> Result<Application> {
    let _guard = self.lock(application_id).await;

    let app = self.application(application_id).await?;
    let payloads = self
      .store
      .section_payloads(application_id)
      .await
      .map_err(Error::persistence)?;
    let documents = match payloads.get(&Section::Documents) {
      Some(SectionPayload::Documents(info)) => info.documents.as_slice(),
      _ => &[][..],
    };
    if !documents.iter().any(|d| d.document_type == document_type) {
      return Err(Error::DocumentNotFound {
        application_id,
        document_type: document_type.to_owned(),
      });
    }
    let remaining = documents.len() - 1;

    let mut unit = UnitOfWork::for_application(&app, self.clock.now());
    unit.push(Write::RemoveDocument { document_type: document_type.to_owned() });
    if remaining == 0 {
      let mut state = app.state(&self.registry)?;
      state.mark_section_incomplete(Section::Documents.id())?;
      unit
        .push(Write::SetSectionCompleted { section: Section::Documents, completed: false })
        .push(Write::UpdateProgress(state.compute_progress()?));
    }
    let app = self.commit(unit).await?;
    info!(remaining, progress = app.progress, "document removed");
    Ok(app)
  }

  /// Record an administrator's decision on a submitted application.
  #[instrument(skip(self))]
  pub async fn decide(&self, application_id: i64, decision: Decision) -> Result<Application> {
    let _guard = self.lock(application_id).await;

    let app = self.application(application_id).await?;
    let status = app.status.transition_to(decision.status())?;

    let mut unit = UnitOfWork::for_application(&app, self.clock.now());
    unit.push(Write::SetStatus { status, submitted_at: app.submitted_at });
    let app = self.commit(unit).await?;
    info!(%status, "decision recorded");

    let message = match decision {
      Decision::Approved => APPROVED_MESSAGE,
      Decision::Rejected => REJECTED_MESSAGE,
    };
    if let Err(e) = self.notifier.notify(app.user_id, DECISION_TITLE, message).await {
      warn!(error = %e, "failed to record decision notification");
    }
    if decision == Decision::Approved {
      if let Err(e) = self.notifier.send_approval_email(app.user_id, &app.code).await {
        warn!(error = %e, "failed to queue approval email");
      }
    }
    Ok(app)
  }

  /// Notification failures are logged; the submission itself stands.
  async fn announce_submission(&self, app: &Application) {
    if let Err(e) = self
      .notifier
      .notify(app.user_id, SUBMITTED_TITLE, SUBMITTED_MESSAGE)
      .await
    {
      warn!(error = %e, application_id = app.application_id, "failed to record submission notification");
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex as StdMutex;

  use chrono::{DateTime, Utc};
  use serde_json::json;

  use super::*;
  use crate::{
    application::{ApplicationCode, SectionStatus},
    clock::FixedClock,
    phase::default_calendar,
    section::{DocumentRef, DocumentsInfo},
    validate::ValidationErrorKind,
  };

  // ── In-memory collaborators ───────────────────────────────────────────

  #[derive(Debug, thiserror::Error)]
  #[error("memory store failure")]
  struct MemoryError;

  #[derive(Default)]
  struct Inner {
    apps:          Vec<Application>,
    payloads:      HashMap<i64, BTreeMap<Section, SectionPayload>>,
    milestones:    BTreeMap<String, NaiveDate>,
    notifications: Vec<(i64, String, String)>,
    emails:        Vec<(i64, String)>,
    /// Hide existing applications from the by-user lookup, as a concurrent
    /// creator would see them.
    blind_lookup:  bool,
  }

  #[derive(Default, Clone)]
  struct Memory(Arc<StdMutex<Inner>>);

  impl Memory {
    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> { self.0.lock().unwrap() }

    fn with_calendar(year: i32) -> Self {
      let m = Self::default();
      m.inner().milestones = default_calendar(year).into_iter().map(|m| (m.title, m.date)).collect();
      m
    }

    fn notifications(&self) -> Vec<(i64, String, String)> { self.inner().notifications.clone() }
  }

  impl ApplicationStore for Memory {
    type Error = MemoryError;

    async fn application_by_user(&self, user_id: i64) -> Result<Option<Application>, MemoryError> {
      let inner = self.inner();
      if inner.blind_lookup {
        return Ok(None);
      }
      Ok(inner.apps.iter().find(|a| a.user_id == user_id).cloned())
    }

    async fn application(&self, id: i64) -> Result<Option<Application>, MemoryError> {
      Ok(self.inner().apps.iter().find(|a| a.application_id == id).cloned())
    }

    async fn create_application(&self, input: NewApplication) -> Result<CreateOutcome, MemoryError> {
      let mut inner = self.inner();
      if let Some(a) = inner.apps.iter().find(|a| a.user_id == input.user_id) {
        return Ok(CreateOutcome::AlreadyExists(a.clone()));
      }
      let seq = inner.apps.iter().filter(|a| i32::from(a.code.year()) == input.year).count() as u32 + 1;
      let app = Application {
        application_id: inner.apps.len() as i64 + 1,
        code:           ApplicationCode::new(input.year, seq).map_err(|_| MemoryError)?,
        user_id:        input.user_id,
        status:         Status::Draft,
        progress:       0,
        created_at:     input.created_at,
        last_updated:   input.created_at,
        submitted_at:   None,
        version:        0,
        sections:       Section::ALL
          .iter()
          .map(|s| SectionStatus { section: *s, is_completed: false, updated_at: None })
          .collect(),
      };
      inner.apps.push(app.clone());
      Ok(CreateOutcome::Created(app))
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<CommitOutcome, MemoryError> {
      let mut inner = self.inner();
      let Some(idx) = inner.apps.iter().position(|a| a.application_id == unit.application_id) else {
        return Err(MemoryError);
      };
      if inner.apps[idx].version != unit.expected_version {
        return Ok(CommitOutcome::Stale);
      }
      let mut app = inner.apps[idx].clone();
      let payloads = inner.payloads.entry(unit.application_id).or_default();
      for write in unit.writes {
        match write {
          Write::SaveSectionPayload { section, payload } => {
            payloads.insert(section, payload);
          }
          Write::SetSectionCompleted { section, completed } => {
            let row = app.sections.iter_mut().find(|r| r.section == section).ok_or(MemoryError)?;
            row.is_completed = completed;
            row.updated_at = Some(unit.at);
          }
          Write::UpdateProgress(p) => app.progress = p,
          Write::SetStatus { status, submitted_at } => {
            app.status = status;
            app.submitted_at = submitted_at;
          }
          Write::RemoveDocument { document_type } => {
            if let Some(SectionPayload::Documents(info)) = payloads.get_mut(&Section::Documents) {
              info.documents.retain(|d| d.document_type != document_type);
            }
          }
        }
      }
      app.version += 1;
      app.last_updated = unit.at;
      inner.apps[idx] = app.clone();
      Ok(CommitOutcome::Committed(app))
    }

    async fn section_payloads(
      &self,
      id: i64,
    ) -> Result<BTreeMap<Section, SectionPayload>, MemoryError> {
      Ok(self.inner().payloads.get(&id).cloned().unwrap_or_default())
    }

    async fn list_applications(
      &self,
      filter: ApplicationFilter,
    ) -> Result<Vec<ApplicationSummary>, MemoryError> {
      Ok(
        self
          .inner()
          .apps
          .iter()
          .filter(|a| filter.status.is_none_or(|s| a.status == s))
          .map(ApplicationSummary::from)
          .collect(),
      )
    }

    async fn status_counts(&self) -> Result<StatusCounts, MemoryError> {
      let mut counts = StatusCounts::default();
      for app in &self.inner().apps {
        counts.add(app.status, 1);
      }
      Ok(counts)
    }
  }

  impl MilestoneSource for Memory {
    type Error = MemoryError;

    async fn list_milestones(&self, _year: i32) -> Result<BTreeMap<String, NaiveDate>, MemoryError> {
      Ok(self.inner().milestones.clone())
    }
  }

  impl Notifier for Memory {
    type Error = MemoryError;

    async fn notify(&self, user_id: i64, title: &str, message: &str) -> Result<(), MemoryError> {
      self.inner().notifications.push((user_id, title.to_owned(), message.to_owned()));
      Ok(())
    }

    async fn send_approval_email(&self, user_id: i64, code: &ApplicationCode) -> Result<(), MemoryError> {
      self.inner().emails.push((user_id, code.to_string()));
      Ok(())
    }

    async fn recent_notifications(
      &self,
      user_id: i64,
      limit: usize,
    ) -> Result<Vec<Notification>, MemoryError> {
      Ok(
        self
          .inner()
          .notifications
          .iter()
          .rev()
          .filter(|(u, ..)| *u == user_id)
          .take(limit)
          .enumerate()
          .map(|(i, (u, title, message))| Notification {
            notification_id: i as i64 + 1,
            user_id:         *u,
            title:           title.clone(),
            message:         message.clone(),
            is_read:         false,
            created_at:      DateTime::<Utc>::UNIX_EPOCH,
          })
          .collect(),
      )
    }
  }

  // ── Fixtures ──────────────────────────────────────────────────────────

  fn day(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  fn machine_at(
    memory: &Memory,
    today: NaiveDate,
    gating: bool,
  ) -> ApplicationStateMachine<Memory, Memory> {
    ApplicationStateMachine::with_clock(
      memory.clone(),
      memory.clone(),
      MachineConfig { enforce_phase_gating: gating },
      Arc::new(FixedClock::on(today)),
    )
  }

  fn machine(memory: &Memory) -> ApplicationStateMachine<Memory, Memory> {
    machine_at(memory, day(2024, 6, 10), false)
  }

  fn education(extra: serde_json::Value) -> serde_json::Value {
    let mut base = json!({
      "schoolName": "St. Mary's", "board": "State Board", "totalMarks": "500",
      "marksObtained": "420", "percentage": "84", "yearOfPassing": "2019", "mode": "regular",
    });
    if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
      base.extend(extra.clone());
    }
    base
  }

  fn valid_form(section: Section) -> serde_json::Value {
    match section {
      Section::BasicInformation => json!({ "dob": "2001-05-01", "sex": "female" }),
      Section::Guardians => json!({
        "fatherName": "Ravi", "fatherOccupation": "Farmer", "fatherMobile": "9876543210",
        "motherName": "Lata", "motherOccupation": "Nurse", "motherMobile": "9876543211",
      }),
      Section::Addresses => json!({
        "permanentAddress": "12 Lake Road", "presentAddress": "12 Lake Road",
      }),
      Section::PersonalDetails => json!({
        "nationality": "Indian", "religion": "Hindu", "caste": "General",
        "maritalStatus": "single", "motherTongue": "Marathi", "annualIncome": "250000",
      }),
      Section::TenthStandard => education(json!({})),
      Section::TwelfthStandard => education(json!({
        "yearOfPassing": "2021",
        "subjects": [{ "subject": "Biology", "totalMarks": "100", "marksObtained": "88" }],
      })),
      Section::OtherQualifications => education(json!({ "qualification": "Diploma" })),
      Section::Documents => json!({ "documents": [
        { "documentType": "photo", "fileName": "photo.jpg", "mimeType": "image/jpeg", "fileSize": 1024 },
        { "documentType": "marksheet", "fileName": "10th.pdf", "mimeType": "application/pdf", "fileSize": 2048 },
      ]}),
      Section::Declaration => json!({ "agreeTerms": "yes", "place": "Pune" }),
    }
  }

  fn payload(section: Section) -> SectionPayload {
    SectionPayload::from_form(section, valid_form(section)).unwrap().unwrap()
  }

  async fn save(m: &ApplicationStateMachine<Memory, Memory>, app: i64, section: Section) -> Application {
    match m.save_section(app, section.id(), payload(section)).await.unwrap() {
      SaveOutcome::Saved(app) => app,
      SaveOutcome::Invalid(e) => panic!("{section} rejected: {e}"),
    }
  }

  async fn submitted(m: &ApplicationStateMachine<Memory, Memory>, user_id: i64) -> Application {
    let app = m.get_or_create_application(user_id).await.unwrap();
    let mut last = app.clone();
    for s in Section::ALL {
      last = save(m, app.application_id, s).await;
    }
    assert_eq!(last.status, Status::Submitted);
    last
  }

  // ── Scenarios ─────────────────────────────────────────────────────────

  #[tokio::test]
  async fn new_application_starts_empty() {
    let memory = Memory::default();
    let m = machine(&memory);

    let app = m.get_or_create_application(42).await.unwrap();
    assert_eq!(app.code.to_string(), "RIN-2024-00001");
    assert_eq!(app.status, Status::Draft);
    assert_eq!(app.progress, 0);
    assert_eq!(app.sections.len(), 9);
    assert!(app.sections.iter().all(|s| !s.is_completed));

    let again = m.get_or_create_application(42).await.unwrap();
    assert_eq!(again.application_id, app.application_id);

    let other = m.get_or_create_application(43).await.unwrap();
    assert_eq!(other.code.to_string(), "RIN-2024-00002");
  }

  #[tokio::test]
  async fn first_save_moves_to_in_progress() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();

    let app = save(&m, app.application_id, Section::BasicInformation).await;
    assert_eq!(app.progress, 11);
    assert_eq!(app.status, Status::InProgress);
    assert!(app.submitted_at.is_none());
  }

  #[tokio::test]
  async fn completing_every_section_submits_once() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();

    // Out of form order on purpose.
    let order = [9, 3, 1, 8, 5, 7, 2, 6, 4];
    let mut last = app;
    for (i, id) in order.into_iter().enumerate() {
      let section = Section::from_id(id).unwrap();
      last = save(&m, last.application_id, section).await;
      let expected = ((200 * (i + 1) + 9) / 18) as u8;
      assert_eq!(last.progress, expected);
      if i < order.len() - 1 {
        assert_eq!(last.status, Status::InProgress);
      }
    }
    assert_eq!(last.status, Status::Submitted);
    assert_eq!(last.progress, 100);
    assert!(last.submitted_at.is_some());

    let sent: Vec<_> = memory
      .notifications()
      .into_iter()
      .filter(|(u, title, _)| *u == 42 && title == SUBMITTED_TITLE)
      .collect();
    assert_eq!(sent.len(), 1);
  }

  #[tokio::test]
  async fn invalid_save_changes_nothing() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();
    save(&m, app.application_id, Section::Addresses).await;
    let before = m.application(app.application_id).await.unwrap();

    let bad = SectionPayload::from_form(
      Section::BasicInformation,
      json!({ "dob": "", "sex": "female" }),
    )
    .unwrap()
    .unwrap();
    let outcome = m.save_section(app.application_id, 1, bad).await.unwrap();
    let SaveOutcome::Invalid(e) = outcome else { panic!("expected a validation failure") };
    assert_eq!(e.field, "dob");
    assert_eq!(e.kind, ValidationErrorKind::Missing);
    assert_eq!(e.section, Some(Section::BasicInformation));

    let after = m.application(app.application_id).await.unwrap();
    assert_eq!(before, after);
    assert!(!m.section_payloads(app.application_id).await.unwrap().contains_key(&Section::BasicInformation));
  }

  #[tokio::test]
  async fn caller_mistakes_are_errors() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();

    let r = m.save_section(app.application_id, 10, payload(Section::Declaration)).await;
    assert!(matches!(r, Err(Error::UnknownSection(10))));

    let r = m.save_section(app.application_id, 1, payload(Section::Declaration)).await;
    assert!(matches!(r, Err(Error::PayloadMismatch { section: 1, .. })));

    let r = m.save_section(999, 1, payload(Section::BasicInformation)).await;
    assert!(matches!(r, Err(Error::ApplicationNotFound(999))));
  }

  #[tokio::test]
  async fn submitted_application_refuses_edits() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = submitted(&m, 42).await;

    let r = m.save_section(app.application_id, 1, payload(Section::BasicInformation)).await;
    assert!(matches!(
      r,
      Err(Error::InvalidTransition { from: Status::Submitted, to: Status::InProgress })
    ));
  }

  #[tokio::test]
  async fn removing_last_document_unmarks_without_reverting() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = submitted(&m, 42).await;
    let id = app.application_id;

    let app = m.remove_document(id, "photo").await.unwrap();
    assert_eq!(app.progress, 100);
    assert!(app.sections.iter().all(|s| s.is_completed));

    let app = m.remove_document(id, "marksheet").await.unwrap();
    assert_eq!(app.progress, 89);
    assert_eq!(app.status, Status::Submitted);
    let docs = app.sections.iter().find(|s| s.section == Section::Documents).unwrap();
    assert!(!docs.is_completed);

    let r = m.remove_document(id, "marksheet").await;
    assert!(matches!(r, Err(Error::DocumentNotFound { .. })));
  }

  #[tokio::test]
  async fn unmark_recomputes_progress() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();
    save(&m, app.application_id, Section::BasicInformation).await;
    save(&m, app.application_id, Section::Guardians).await;

    let app = m.unmark_section(app.application_id, 2).await.unwrap();
    assert_eq!(app.progress, 11);
    assert_eq!(app.status, Status::InProgress);

    let report = m.progress(app.application_id).await.unwrap();
    assert_eq!(report.progress, 11);
    assert_eq!(report.sections.len(), 9);
    assert!(report.sections[0].completed);
    assert!(!report.sections[1].completed);
    assert_eq!(report.sections[1].section_name, "Parent/Guardian Details");
  }

  #[tokio::test]
  async fn explicit_submit_reports_first_gap() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();

    let r = m.submit(app.application_id).await;
    assert!(matches!(r, Err(Error::InvalidTransition { from: Status::Draft, .. })));

    save(&m, app.application_id, Section::BasicInformation).await;
    let SaveOutcome::Invalid(e) = m.submit(app.application_id).await.unwrap() else {
      panic!("incomplete application must not submit");
    };
    assert_eq!(e.kind, ValidationErrorKind::Incomplete);
    assert_eq!(e.section, Some(Section::Guardians));
  }

  #[tokio::test]
  async fn decision_guard() {
    let memory = Memory::default();
    let m = machine(&memory);
    let draft = m.get_or_create_application(7).await.unwrap();
    assert!(matches!(
      m.decide(draft.application_id, Decision::Approved).await,
      Err(Error::InvalidTransition { from: Status::Draft, to: Status::Approved })
    ));

    let app = submitted(&m, 42).await;
    let app = m.decide(app.application_id, Decision::Approved).await.unwrap();
    assert_eq!(app.status, Status::Approved);
    assert!(matches!(
      m.decide(app.application_id, Decision::Approved).await,
      Err(Error::InvalidTransition { from: Status::Approved, .. })
    ));

    assert!(memory.notifications().iter().any(|(u, _, msg)| *u == 42 && msg == APPROVED_MESSAGE));
    assert_eq!(memory.inner().emails, vec![(42, app.code.to_string())]);
  }

  #[tokio::test]
  async fn rejection_sends_no_email() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = submitted(&m, 42).await;
    let app = m.decide(app.application_id, Decision::Rejected).await.unwrap();
    assert_eq!(app.status, Status::Rejected);
    assert!(memory.inner().emails.is_empty());

    let recent = m.notifications(42).await.unwrap();
    assert_eq!(recent[0].message, REJECTED_MESSAGE);
  }

  #[tokio::test]
  async fn stale_commit_is_reported() {
    let memory = Memory::default();
    let m = machine(&memory);
    let app = m.get_or_create_application(42).await.unwrap();
    // Simulate a writer in another process.
    memory.inner().apps[0].version += 1;

    let mut unit = UnitOfWork::for_application(&app, Utc::now());
    unit.push(Write::UpdateProgress(0));
    assert!(matches!(m.commit(unit).await, Err(Error::StaleApplication(id)) if id == app.application_id));
  }

  #[tokio::test]
  async fn concurrent_saves_keep_progress_consistent() {
    let memory = Memory::default();
    let m = Arc::new(machine(&memory));
    let id = m.get_or_create_application(42).await.unwrap().application_id;

    let tasks: Vec<_> = Section::ALL
      .into_iter()
      .map(|s| {
        let m = Arc::clone(&m);
        tokio::spawn(async move { m.save_section(id, s.id(), payload(s)).await })
      })
      .collect();
    for t in tasks {
      assert!(matches!(t.await.unwrap().unwrap(), SaveOutcome::Saved(_)));
    }

    let app = m.application(id).await.unwrap();
    assert_eq!(app.progress, 100);
    assert_eq!(app.status, Status::Submitted);
    assert_eq!(memory.notifications().len(), 1);
  }

  #[tokio::test]
  async fn phase_gate_blocks_edits_outside_submission_window() {
    let memory = Memory::with_calendar(2024);
    let open = machine_at(&memory, day(2024, 6, 10), true);
    let app = open.get_or_create_application(42).await.unwrap();
    save(&open, app.application_id, Section::BasicInformation).await;

    let late = machine_at(&memory, day(2024, 8, 3), true);
    let r = late.save_section(app.application_id, 2, payload(Section::Guardians)).await;
    let Err(Error::ActionNotAllowed { action, message }) = r else {
      panic!("expected the calendar to refuse the edit");
    };
    assert_eq!(action, Action::EditApplication);
    assert!(message.contains("2024-08-07"), "{message}");

    let report = late.phase().await.unwrap();
    assert_eq!(report.phase, Phase::Payment);
    assert_eq!(report.allowed_actions, vec![Action::MakePayment, Action::ViewApplication]);
    assert_eq!(report.next_deadline.unwrap().days_remaining, 4);
    let upcoming: Vec<_> = report.upcoming.iter().map(|m| m.title.as_str()).collect();
    assert_eq!(upcoming, [
      "Application Payment",
      "Document Verification",
      "Entrance Examination",
      "Result Declaration",
      "Admission Confirmation",
    ]);
  }

  #[tokio::test]
  async fn gating_without_calendar_surfaces_missing_milestone() {
    let memory = Memory::default();
    let m = machine_at(&memory, day(2024, 6, 10), true);
    let app = m.get_or_create_application(42).await.unwrap();
    let r = m.save_section(app.application_id, 1, payload(Section::BasicInformation)).await;
    assert!(matches!(r, Err(Error::MissingMilestone(_))));
  }

  #[tokio::test]
  async fn listing_filters_by_status() {
    let memory = Memory::default();
    let m = machine(&memory);
    submitted(&m, 1).await;
    m.get_or_create_application(2).await.unwrap();

    let all = m.list_applications(ApplicationFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    let filter = ApplicationFilter { status: Some(Status::Submitted), ..Default::default() };
    let submitted = m.list_applications(filter).await.unwrap();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].user_id, 1);

    let counts = m.status_counts().await.unwrap();
    assert_eq!(counts, StatusCounts { total: 2, draft: 1, submitted: 1, ..Default::default() });
  }

  #[tokio::test]
  async fn losing_a_creation_race_is_a_duplicate() {
    let memory = Memory::default();
    let m = machine(&memory);
    m.get_or_create_application(42).await.unwrap();

    memory.inner().blind_lookup = true;
    let r = m.get_or_create_application(42).await;
    assert!(matches!(r, Err(Error::DuplicateApplication(42))), "{r:?}");
    assert_eq!(memory.inner().apps.len(), 1);
  }

  #[test]
  fn documents_payload_shape() {
    let SectionPayload::Documents(DocumentsInfo { documents }) = payload(Section::Documents) else {
      panic!("wrong variant");
    };
    assert_eq!(documents[0], DocumentRef {
      document_type: "photo".into(),
      file_name:     "photo.jpg".into(),
      mime_type:     "image/jpeg".into(),
      file_size:     1024,
    });
  }
}
