//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{NaiveDate, TimeZone, Utc};
use rin_core::{
  application::{Application, Status},
  phase::{APPLICATION_DEADLINE, APPLICATION_START},
  section::{
    DocumentRef, DocumentsInfo, EducationInfo, GuardianInfo, Section, SectionPayload, SubjectMark,
  },
  store::{
    ApplicationFilter, ApplicationStore, CommitOutcome, CreateOutcome, MilestoneSource,
    NewApplication, Notifier, StatusCounts, UnitOfWork, Write,
  },
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn new_app(user_id: i64) -> NewApplication {
  NewApplication {
    user_id,
    year: 2024,
    created_at: Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap(),
  }
}

async fn create(s: &SqliteStore, user_id: i64) -> Application {
  match s.create_application(new_app(user_id)).await.unwrap() {
    CreateOutcome::Created(app) => app,
    CreateOutcome::AlreadyExists(_) => panic!("user {user_id} already had an application"),
  }
}

async fn commit(s: &SqliteStore, app: &Application, writes: Vec<Write>) -> Application {
  let mut unit = UnitOfWork::for_application(app, Utc::now());
  unit.writes = writes;
  match s.commit(unit).await.unwrap() {
    CommitOutcome::Committed(app) => app,
    CommitOutcome::Stale => panic!("unexpected stale commit"),
  }
}

fn doc(document_type: &str) -> DocumentRef {
  DocumentRef {
    document_type: document_type.into(),
    file_name:     format!("{document_type}.pdf"),
    mime_type:     "application/pdf".into(),
    file_size:     4096,
  }
}

fn twelfth(subjects: &[(&str, &str)]) -> SectionPayload {
  SectionPayload::Education(EducationInfo {
    school_name: "City College".into(),
    board: "CBSE".into(),
    total_marks: "500".into(),
    marks_obtained: "410".into(),
    percentage: "82".into(),
    year_of_passing: "2021".into(),
    mode: "regular".into(),
    subjects: subjects
      .iter()
      .map(|(subject, obtained)| SubjectMark {
        subject:        (*subject).into(),
        total_marks:    "100".into(),
        marks_obtained: (*obtained).into(),
      })
      .collect(),
    ..Default::default()
  })
}

// ─── Creation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_allocates_sequential_codes_per_year() {
  let s = store().await;
  let a = create(&s, 42).await;
  let b = create(&s, 43).await;
  assert_eq!(a.code.to_string(), "RIN-2024-00001");
  assert_eq!(b.code.to_string(), "RIN-2024-00002");

  let next_year = NewApplication { year: 2025, ..new_app(44) };
  let CreateOutcome::Created(c) = s.create_application(next_year).await.unwrap() else {
    panic!("expected a new application");
  };
  assert_eq!(c.code.to_string(), "RIN-2025-00001");
}

#[tokio::test]
async fn create_inserts_every_section_incomplete() {
  let s = store().await;
  let app = create(&s, 42).await;
  assert_eq!(app.status, Status::Draft);
  assert_eq!(app.progress, 0);
  assert_eq!(app.version, 0);
  assert!(app.submitted_at.is_none());
  let ids: Vec<u8> = app.sections.iter().map(|s| s.section.id()).collect();
  assert_eq!(ids, (1..=9).collect::<Vec<_>>());
  assert!(app.sections.iter().all(|s| !s.is_completed));
}

#[tokio::test]
async fn second_create_for_user_reports_existing() {
  let s = store().await;
  let first = create(&s, 42).await;
  match s.create_application(new_app(42)).await.unwrap() {
    CreateOutcome::AlreadyExists(existing) => {
      assert_eq!(existing.application_id, first.application_id)
    }
    CreateOutcome::Created(_) => panic!("a user may only own one application"),
  }
}

#[tokio::test]
async fn lookups_by_id_and_user() {
  let s = store().await;
  let app = create(&s, 42).await;
  assert_eq!(s.application(app.application_id).await.unwrap(), Some(app.clone()));
  assert_eq!(s.application_by_user(42).await.unwrap(), Some(app));
  assert!(s.application(999).await.unwrap().is_none());
  assert!(s.application_by_user(7).await.unwrap().is_none());
}

// ─── Commit ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn commit_applies_writes_and_bumps_version() {
  let s = store().await;
  let app = create(&s, 42).await;
  let submitted_at = Utc.with_ymd_and_hms(2024, 6, 11, 8, 30, 0).unwrap();

  let app = commit(&s, &app, vec![
    Write::SetSectionCompleted { section: Section::Addresses, completed: true },
    Write::UpdateProgress(11),
    Write::SetStatus { status: Status::Submitted, submitted_at: Some(submitted_at) },
  ])
  .await;

  assert_eq!(app.version, 1);
  assert_eq!(app.progress, 11);
  assert_eq!(app.status, Status::Submitted);
  assert_eq!(app.submitted_at, Some(submitted_at));
  let row = &app.sections[Section::Addresses.id() as usize - 1];
  assert!(row.is_completed);
  assert!(row.updated_at.is_some());
}

#[tokio::test]
async fn stale_version_applies_nothing() {
  let s = store().await;
  let original = create(&s, 42).await;
  commit(&s, &original, vec![Write::UpdateProgress(11)]).await;

  // Built from the pre-commit snapshot.
  let mut unit = UnitOfWork::for_application(&original, Utc::now());
  unit.push(Write::UpdateProgress(22));
  assert!(matches!(s.commit(unit).await.unwrap(), CommitOutcome::Stale));

  let current = s.application(original.application_id).await.unwrap().unwrap();
  assert_eq!(current.progress, 11);
  assert_eq!(current.version, 1);
}

#[tokio::test]
async fn commit_to_missing_application_fails() {
  let s = store().await;
  let mut app = create(&s, 42).await;
  app.application_id = 999;
  let unit = UnitOfWork::for_application(&app, Utc::now());
  assert!(matches!(s.commit(unit).await, Err(Error::ApplicationNotFound(999))));
}

// ─── Payloads ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn payloads_round_trip_through_section_rows() {
  let s = store().await;
  let app = create(&s, 42).await;
  let guardians = SectionPayload::Guardians(GuardianInfo {
    father_name: "Ravi".into(),
    father_occupation: "Farmer".into(),
    father_mobile: "9876543210".into(),
    mother_name: "Lata".into(),
    mother_occupation: "Nurse".into(),
    mother_mobile: "9876543211".into(),
    ..Default::default()
  });
  commit(&s, &app, vec![Write::SaveSectionPayload {
    section: Section::Guardians,
    payload: guardians.clone(),
  }])
  .await;

  let payloads = s.section_payloads(app.application_id).await.unwrap();
  assert_eq!(payloads.len(), 1);
  assert_eq!(payloads.get(&Section::Guardians), Some(&guardians));
}

#[tokio::test]
async fn subject_marks_upsert_by_subject() {
  let s = store().await;
  let app = create(&s, 42).await;
  let app = commit(&s, &app, vec![Write::SaveSectionPayload {
    section: Section::TwelfthStandard,
    payload: twelfth(&[("Physics", "70"), ("Biology", "80")]),
  }])
  .await;
  // Reordered, one updated, one dropped, one added.
  commit(&s, &app, vec![Write::SaveSectionPayload {
    section: Section::TwelfthStandard,
    payload: twelfth(&[("Chemistry", "75"), ("biology", "90")]),
  }])
  .await;

  let rows = s
    .conn
    .call(move |conn| {
      let mut stmt = conn.prepare(
        "SELECT subject_key, marks_obtained FROM subject_marks ORDER BY subject_key",
      )?;
      let rows = stmt
        .query_map(rusqlite::params![], |r| {
          Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap();
  assert_eq!(rows, vec![("biology".to_owned(), 90.0), ("chemistry".to_owned(), 75.0)]);
}

#[tokio::test]
async fn documents_are_read_from_their_table() {
  let s = store().await;
  let app = create(&s, 42).await;
  let app = commit(&s, &app, vec![
    Write::SaveSectionPayload {
      section: Section::Documents,
      payload: SectionPayload::Documents(DocumentsInfo { documents: vec![doc("photo"), doc("marksheet")] }),
    },
    Write::SetSectionCompleted { section: Section::Documents, completed: true },
  ])
  .await;

  let commit_removal = commit(&s, &app, vec![Write::RemoveDocument {
    document_type: "photo".into(),
  }])
  .await;
  assert_eq!(commit_removal.version, 2);

  let payloads = s.section_payloads(app.application_id).await.unwrap();
  assert_eq!(
    payloads.get(&Section::Documents),
    Some(&SectionPayload::Documents(DocumentsInfo { documents: vec![doc("marksheet")] }))
  );

  commit(&s, &commit_removal, vec![Write::RemoveDocument {
    document_type: "marksheet".into(),
  }])
  .await;
  let payloads = s.section_payloads(app.application_id).await.unwrap();
  assert!(!payloads.contains_key(&Section::Documents));
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filters_and_pages() {
  let s = store().await;
  let a = create(&s, 1).await;
  create(&s, 2).await;
  create(&s, 3).await;
  commit(&s, &a, vec![Write::SetStatus {
    status:       Status::Submitted,
    submitted_at: Some(Utc::now()),
  }])
  .await;

  let all = s.list_applications(ApplicationFilter::default()).await.unwrap();
  assert_eq!(all.len(), 3);

  let submitted = s
    .list_applications(ApplicationFilter { status: Some(Status::Submitted), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(submitted.len(), 1);
  assert_eq!(submitted[0].user_id, 1);

  let page = s
    .list_applications(ApplicationFilter { limit: Some(2), offset: Some(2), ..Default::default() })
    .await
    .unwrap();
  assert_eq!(page.len(), 1);
}

#[tokio::test]
async fn status_counts_group_by_status() {
  let s = store().await;
  assert_eq!(s.status_counts().await.unwrap(), StatusCounts::default());

  let a = create(&s, 1).await;
  let b = create(&s, 2).await;
  create(&s, 3).await;
  commit(&s, &a, vec![Write::SetStatus { status: Status::InProgress, submitted_at: None }]).await;
  commit(&s, &b, vec![Write::SetStatus {
    status:       Status::Approved,
    submitted_at: Some(Utc::now()),
  }])
  .await;

  let counts = s.status_counts().await.unwrap();
  assert_eq!(counts, StatusCounts {
    total: 3,
    draft: 1,
    in_progress: 1,
    approved: 1,
    ..Default::default()
  });
}

// ─── Notifier ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn notifications_newest_first_and_limited() {
  let s = store().await;
  for i in 0..12 {
    s.notify(42, "Title", &format!("message {i}")).await.unwrap();
  }
  s.notify(7, "Other", "not for 42").await.unwrap();

  let recent = s.recent_notifications(42, 10).await.unwrap();
  assert_eq!(recent.len(), 10);
  assert_eq!(recent[0].message, "message 11");
  assert!(recent.iter().all(|n| n.user_id == 42 && !n.is_read));
}

#[tokio::test]
async fn approval_email_is_queued_until_marked_sent() {
  let s = store().await;
  let app = create(&s, 42).await;
  s.send_approval_email(42, &app.code).await.unwrap();

  let pending = s.pending_emails().await.unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].kind, "approval");
  assert_eq!(pending[0].application_code, "RIN-2024-00001");

  assert!(s.mark_email_sent(pending[0].email_id).await.unwrap());
  assert!(!s.mark_email_sent(pending[0].email_id).await.unwrap());
  assert!(s.pending_emails().await.unwrap().is_empty());
}

// ─── Milestones ──────────────────────────────────────────────────────────────

fn d(y: i32, m: u32, day: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, day).unwrap() }

#[tokio::test]
async fn seeding_keeps_existing_dates() {
  let s = store().await;
  s.set_milestone(APPLICATION_DEADLINE, d(2024, 7, 15)).await.unwrap();

  let added = s.seed_default_calendar(2024).await.unwrap();
  assert_eq!(added, 6);
  assert_eq!(s.seed_default_calendar(2024).await.unwrap(), 0);

  let milestones = s.list_milestones(2024).await.unwrap();
  assert_eq!(milestones.len(), 7);
  assert_eq!(milestones[APPLICATION_START], d(2024, 6, 1));
  assert_eq!(milestones[APPLICATION_DEADLINE], d(2024, 7, 15));
  assert!(s.list_milestones(2025).await.unwrap().is_empty());
}

#[tokio::test]
async fn set_milestone_replaces_same_year_only() {
  let s = store().await;
  s.set_milestone(APPLICATION_START, d(2023, 6, 1)).await.unwrap();
  s.set_milestone(APPLICATION_START, d(2024, 6, 1)).await.unwrap();
  s.set_milestone(APPLICATION_START, d(2024, 6, 5)).await.unwrap();

  assert_eq!(s.list_milestones(2024).await.unwrap()[APPLICATION_START], d(2024, 6, 5));
  assert_eq!(s.list_milestones(2023).await.unwrap()[APPLICATION_START], d(2023, 6, 1));
}
