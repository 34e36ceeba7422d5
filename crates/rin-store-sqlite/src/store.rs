//! [`SqliteStore`]: the SQLite implementation of the application store,
//! notifier and milestone source.

use std::{
  collections::{BTreeMap, HashSet},
  path::Path,
};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rin_core::{
  application::{Application, ApplicationCode, ApplicationSummary},
  phase::default_calendar,
  section::{
    AddressInfo, BasicInfo, DeclarationInfo, DocumentRef, DocumentsInfo, EducationInfo,
    GuardianInfo, PersonalInfo, Section, SectionPayload,
  },
  store::{
    ApplicationFilter, ApplicationStore, CommitOutcome, CreateOutcome, MilestoneSource,
    NewApplication, Notification, Notifier, StatusCounts, UnitOfWork, Write,
  },
};
use rusqlite::{OptionalExtension as _, Transaction, TransactionBehavior, params};

use crate::{
  Error, Result,
  encode::{
    RawApplication, RawDocument, RawNotification, RawSection, decode_date, decode_dt,
    decode_payload, decode_section, decode_status, encode_date, encode_dt, encode_payload,
  },
  schema::SCHEMA,
};

// ─── Raw results ─────────────────────────────────────────────────────────────

type RawFull = (RawApplication, Vec<RawSection>);

enum RawCreate {
  Created(RawFull),
  Existing(RawFull),
  Exhausted,
}

enum RawCommit {
  Committed(RawFull),
  Stale,
  Missing,
}

/// A [`Write`] with its JSON already rendered, ready to move onto the
/// database thread.
enum PreparedWrite {
  Payload {
    section: Section,
    kind:    String,
    json:    String,
    payload: SectionPayload,
  },
  Completed {
    section:   Section,
    completed: bool,
  },
  Progress(u8),
  Status {
    status:       &'static str,
    submitted_at: Option<String>,
  },
  RemoveDocument(String),
}

impl PreparedWrite {
  fn prepare(write: Write) -> Result<Self> {
    Ok(match write {
      Write::SaveSectionPayload { section, payload } => {
        let (kind, json) = encode_payload(&payload)?;
        Self::Payload { section, kind, json, payload }
      }
      Write::SetSectionCompleted { section, completed } => Self::Completed { section, completed },
      Write::UpdateProgress(p) => Self::Progress(p),
      Write::SetStatus { status, submitted_at } => Self::Status {
        status:       status.as_str(),
        submitted_at: submitted_at.map(encode_dt),
      },
      Write::RemoveDocument { document_type } => Self::RemoveDocument(document_type),
    })
  }
}

/// A queued outbound email awaiting the external mailer.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedEmail {
  pub email_id:         i64,
  pub user_id:          i64,
  pub kind:             String,
  pub application_code: String,
  pub created_at:       DateTime<Utc>,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// An admission store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn load(&self, column: &'static str, key: i64) -> Result<Option<Application>> {
    let raw = self
      .conn
      .call(move |conn| Ok(read_application(conn, column, key)?))
      .await?;
    raw.map(|(app, sections)| app.into_application(sections)).transpose()
  }

  // ── Calendar ──────────────────────────────────────────────────────────

  /// Set the date of a milestone, replacing any date it had in that year.
  pub async fn set_milestone(&self, title: &str, date: NaiveDate) -> Result<()> {
    let title = title.to_owned();
    let year = format!("{:04}", date.year());
    let date = encode_date(date);
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM important_dates WHERE title = ?1 AND substr(event_date, 1, 4) = ?2",
          params![title, year],
        )?;
        tx.execute(
          "INSERT INTO important_dates (title, event_date) VALUES (?1, ?2)",
          params![title, date],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert the default calendar for `year`, leaving any milestone that is
  /// already set for that year alone. Returns how many dates were added.
  pub async fn seed_default_calendar(&self, year: i32) -> Result<usize> {
    let rows: Vec<(String, String)> = default_calendar(year)
      .into_iter()
      .map(|m| (m.title, encode_date(m.date)))
      .collect();
    let year = format!("{year:04}");
    let added = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut added = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO important_dates (title, event_date)
             SELECT ?1, ?2
             WHERE NOT EXISTS (
               SELECT 1 FROM important_dates
               WHERE title = ?1 AND substr(event_date, 1, 4) = ?3
             )",
          )?;
          for (title, date) in &rows {
            added += stmt.execute(params![title, date, year])?;
          }
        }
        tx.commit()?;
        Ok(added)
      })
      .await?;
    Ok(added)
  }

  // ── Outbox ────────────────────────────────────────────────────────────

  /// Emails not yet marked as sent, oldest first.
  pub async fn pending_emails(&self) -> Result<Vec<QueuedEmail>> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT email_id, user_id, kind, application_code, created_at
           FROM email_outbox WHERE sent_at IS NULL ORDER BY email_id",
        )?;
        let rows = stmt
          .query_map(params![], |r| {
            Ok((
              r.get::<_, i64>(0)?,
              r.get::<_, i64>(1)?,
              r.get::<_, String>(2)?,
              r.get::<_, String>(3)?,
              r.get::<_, String>(4)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(email_id, user_id, kind, application_code, created_at)| {
        Ok(QueuedEmail {
          email_id,
          user_id,
          kind,
          application_code,
          created_at: decode_dt(&created_at)?,
        })
      })
      .collect()
  }

  pub async fn mark_email_sent(&self, email_id: i64) -> Result<bool> {
    let at = encode_dt(Utc::now());
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE email_outbox SET sent_at = ?2 WHERE email_id = ?1 AND sent_at IS NULL",
          params![email_id, at],
        )?)
      })
      .await?;
    Ok(changed == 1)
  }
}

// ─── Row access (database thread) ────────────────────────────────────────────

fn read_application(
  conn: &rusqlite::Connection,
  column: &'static str,
  key: i64,
) -> rusqlite::Result<Option<RawFull>> {
  let sql = format!(
    "SELECT {} FROM applications WHERE {column} = ?1",
    RawApplication::COLUMNS
  );
  let Some(app) = conn
    .query_row(&sql, params![key], RawApplication::from_row)
    .optional()?
  else {
    return Ok(None);
  };

  let mut stmt = conn.prepare(
    "SELECT section_id, is_completed, updated_at
     FROM application_sections WHERE application_id = ?1 ORDER BY section_id",
  )?;
  let sections = stmt
    .query_map(params![app.application_id], |r| {
      Ok(RawSection {
        section_id:   r.get(0)?,
        is_completed: r.get(1)?,
        updated_at:   r.get(2)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(Some((app, sections)))
}

fn apply_write(
  tx: &Transaction<'_>,
  application_id: i64,
  at: &str,
  write: &PreparedWrite,
) -> rusqlite::Result<()> {
  match write {
    PreparedWrite::Payload { section, kind, json, payload } => {
      // Documents are read back from their own table.
      let (kind, json) = match section {
        Section::Documents => (None, None),
        _ => (Some(kind.as_str()), Some(json.as_str())),
      };
      tx.execute(
        "UPDATE application_sections
         SET payload_kind = ?3, payload_json = ?4, updated_at = ?5
         WHERE application_id = ?1 AND section_id = ?2",
        params![application_id, section.id(), kind, json, at],
      )?;
      write_typed(tx, application_id, *section, payload, at)?;
    }
    PreparedWrite::Completed { section, completed } => {
      tx.execute(
        "UPDATE application_sections SET is_completed = ?3, updated_at = ?4
         WHERE application_id = ?1 AND section_id = ?2",
        params![application_id, section.id(), completed, at],
      )?;
    }
    PreparedWrite::Progress(p) => {
      tx.execute(
        "UPDATE applications SET progress = ?2 WHERE application_id = ?1",
        params![application_id, p],
      )?;
    }
    PreparedWrite::Status { status, submitted_at } => {
      tx.execute(
        "UPDATE applications SET status = ?2, submitted_at = ?3 WHERE application_id = ?1",
        params![application_id, status, submitted_at],
      )?;
    }
    PreparedWrite::RemoveDocument(document_type) => {
      tx.execute(
        "DELETE FROM documents WHERE application_id = ?1 AND document_type = ?2",
        params![application_id, document_type],
      )?;
    }
  }
  Ok(())
}

/// Mirror a payload into the typed per-section tables used by reporting.
fn write_typed(
  tx: &Transaction<'_>,
  application_id: i64,
  section: Section,
  payload: &SectionPayload,
  at: &str,
) -> rusqlite::Result<()> {
  match payload {
    SectionPayload::BasicInfo(p) => write_basic(tx, application_id, p),
    SectionPayload::Guardians(p) => write_guardians(tx, application_id, p),
    SectionPayload::Addresses(p) => write_addresses(tx, application_id, p),
    SectionPayload::PersonalDetails(p) => write_personal(tx, application_id, p),
    SectionPayload::Education(p) => match section.education_level() {
      Some(level) => write_education(tx, application_id, level.as_str(), p),
      None => Ok(()),
    },
    SectionPayload::Documents(p) => write_documents(tx, application_id, p, at),
    SectionPayload::Declaration(p) => write_declaration(tx, application_id, p, at),
  }
}

fn number(s: &str) -> Option<f64> { s.trim().parse().ok() }

fn write_basic(tx: &Transaction<'_>, application_id: i64, p: &BasicInfo) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO personal_details (application_id, full_name, dob, sex)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (application_id) DO UPDATE
     SET full_name = excluded.full_name, dob = excluded.dob, sex = excluded.sex",
    params![application_id, p.full_name, p.dob, p.sex],
  )?;
  Ok(())
}

fn write_personal(
  tx: &Transaction<'_>,
  application_id: i64,
  p: &PersonalInfo,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO personal_details (
       application_id, nationality, religion, caste, marital_status, mother_tongue, annual_income
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (application_id) DO UPDATE
     SET nationality = excluded.nationality,
         religion = excluded.religion,
         caste = excluded.caste,
         marital_status = excluded.marital_status,
         mother_tongue = excluded.mother_tongue,
         annual_income = excluded.annual_income",
    params![
      application_id,
      p.nationality,
      p.religion,
      p.caste,
      p.marital_status,
      p.mother_tongue,
      number(&p.annual_income),
    ],
  )?;
  Ok(())
}

fn write_guardians(
  tx: &Transaction<'_>,
  application_id: i64,
  p: &GuardianInfo,
) -> rusqlite::Result<()> {
  let mut upsert = tx.prepare(
    "INSERT INTO guardians (application_id, relationship, name, occupation, mobile, email)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (application_id, relationship) DO UPDATE
     SET name = excluded.name, occupation = excluded.occupation,
         mobile = excluded.mobile, email = excluded.email",
  )?;
  upsert.execute(params![
    application_id,
    "father",
    p.father_name,
    p.father_occupation,
    p.father_mobile,
    p.father_email,
  ])?;
  upsert.execute(params![
    application_id,
    "mother",
    p.mother_name,
    p.mother_occupation,
    p.mother_mobile,
    p.mother_email,
  ])?;
  match &p.guardian_name {
    Some(name) => {
      upsert.execute(params![
        application_id,
        "guardian",
        name,
        p.guardian_occupation,
        p.guardian_mobile,
        p.guardian_email,
      ])?;
    }
    None => {
      tx.execute(
        "DELETE FROM guardians WHERE application_id = ?1 AND relationship = 'guardian'",
        params![application_id],
      )?;
    }
  }
  Ok(())
}

fn write_addresses(
  tx: &Transaction<'_>,
  application_id: i64,
  p: &AddressInfo,
) -> rusqlite::Result<()> {
  let mut upsert = tx.prepare(
    "INSERT INTO addresses (application_id, address_type, address) VALUES (?1, ?2, ?3)
     ON CONFLICT (application_id, address_type) DO UPDATE SET address = excluded.address",
  )?;
  upsert.execute(params![application_id, "permanent", p.permanent_address])?;
  upsert.execute(params![application_id, "present", p.present_address])?;
  Ok(())
}

fn write_education(
  tx: &Transaction<'_>,
  application_id: i64,
  level: &str,
  p: &EducationInfo,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO education (
       application_id, level, qualification, school_name, board, total_marks,
       marks_obtained, percentage, year_of_passing, mode, remarks
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
     ON CONFLICT (application_id, level) DO UPDATE
     SET qualification = excluded.qualification,
         school_name = excluded.school_name,
         board = excluded.board,
         total_marks = excluded.total_marks,
         marks_obtained = excluded.marks_obtained,
         percentage = excluded.percentage,
         year_of_passing = excluded.year_of_passing,
         mode = excluded.mode,
         remarks = excluded.remarks",
    params![
      application_id,
      level,
      p.qualification,
      p.school_name,
      p.board,
      number(&p.total_marks),
      number(&p.marks_obtained),
      number(&p.percentage),
      p.year_of_passing.trim().parse::<i64>().ok(),
      p.mode,
      p.remarks,
    ],
  )?;
  let education_id: i64 = tx.query_row(
    "SELECT education_id FROM education WHERE application_id = ?1 AND level = ?2",
    params![application_id, level],
    |r| r.get(0),
  )?;

  // Upsert by subject, then drop subjects no longer listed.
  let keep: HashSet<String> = p.subjects.iter().map(|s| s.key()).collect();
  {
    let mut upsert = tx.prepare(
      "INSERT INTO subject_marks (
         education_id, subject_key, subject, total_marks, marks_obtained, percentage
       ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
       ON CONFLICT (education_id, subject_key) DO UPDATE
       SET subject = excluded.subject,
           total_marks = excluded.total_marks,
           marks_obtained = excluded.marks_obtained,
           percentage = excluded.percentage",
    )?;
    for s in &p.subjects {
      upsert.execute(params![
        education_id,
        s.key(),
        s.subject,
        number(&s.total_marks).unwrap_or_default(),
        number(&s.marks_obtained).unwrap_or_default(),
        s.percentage(),
      ])?;
    }
  }
  let existing = {
    let mut stmt = tx.prepare("SELECT subject_key FROM subject_marks WHERE education_id = ?1")?;
    stmt
      .query_map(params![education_id], |r| r.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };
  for key in existing.into_iter().filter(|k| !keep.contains(k)) {
    tx.execute(
      "DELETE FROM subject_marks WHERE education_id = ?1 AND subject_key = ?2",
      params![education_id, key],
    )?;
  }
  Ok(())
}

fn write_documents(
  tx: &Transaction<'_>,
  application_id: i64,
  p: &DocumentsInfo,
  at: &str,
) -> rusqlite::Result<()> {
  let keep: HashSet<&str> = p.documents.iter().map(|d| d.document_type.as_str()).collect();
  let existing = {
    let mut stmt = tx.prepare("SELECT document_type FROM documents WHERE application_id = ?1")?;
    stmt
      .query_map(params![application_id], |r| r.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?
  };
  for document_type in existing.iter().filter(|t| !keep.contains(t.as_str())) {
    tx.execute(
      "DELETE FROM documents WHERE application_id = ?1 AND document_type = ?2",
      params![application_id, document_type],
    )?;
  }

  let mut upsert = tx.prepare(
    "INSERT INTO documents (
       application_id, document_type, file_name, mime_type, file_size, uploaded_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (application_id, document_type) DO UPDATE
     SET file_name = excluded.file_name,
         mime_type = excluded.mime_type,
         file_size = excluded.file_size,
         uploaded_at = excluded.uploaded_at",
  )?;
  for d in &p.documents {
    upsert.execute(params![
      application_id,
      d.document_type,
      d.file_name,
      d.mime_type,
      i64::try_from(d.file_size).unwrap_or(i64::MAX),
      at,
    ])?;
  }
  Ok(())
}

fn write_declaration(
  tx: &Transaction<'_>,
  application_id: i64,
  p: &DeclarationInfo,
  at: &str,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO declarations (application_id, agree_terms, place, declared_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (application_id) DO UPDATE
     SET agree_terms = excluded.agree_terms, place = excluded.place,
         declared_at = excluded.declared_at",
    params![application_id, p.agree_terms, p.place, at],
  )?;
  Ok(())
}

// ─── ApplicationStore impl ───────────────────────────────────────────────────

impl ApplicationStore for SqliteStore {
  type Error = Error;

  async fn application_by_user(&self, user_id: i64) -> Result<Option<Application>> {
    self.load("user_id", user_id).await
  }

  async fn application(&self, application_id: i64) -> Result<Option<Application>> {
    self.load("application_id", application_id).await
  }

  async fn create_application(&self, input: NewApplication) -> Result<CreateOutcome> {
    let NewApplication { user_id, year, created_at } = input;
    let at = encode_dt(created_at);

    let raw = self
      .conn
      .call(move |conn| {
        // IMMEDIATE takes the write lock up front so sequence allocation
        // cannot interleave with another writer.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(existing) = read_application(&tx, "user_id", user_id)? {
          return Ok(RawCreate::Existing(existing));
        }

        let next: i64 = tx.query_row(
          "SELECT COALESCE(MAX(code_sequence), 0) + 1 FROM applications WHERE code_year = ?1",
          params![year],
          |r| r.get(0),
        )?;
        let Some(code) = u32::try_from(next)
          .ok()
          .and_then(|seq| ApplicationCode::new(year, seq).ok())
        else {
          return Ok(RawCreate::Exhausted);
        };

        let inserted = tx.execute(
          "INSERT INTO applications (
             code, code_year, code_sequence, user_id, created_at, last_updated
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
          params![code.to_string(), year, next, user_id, at],
        );
        match inserted {
          Ok(_) => {}
          Err(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            return match read_application(&tx, "user_id", user_id)? {
              Some(existing) => Ok(RawCreate::Existing(existing)),
              None => Err(rusqlite::Error::SqliteFailure(e, msg).into()),
            };
          }
          Err(e) => return Err(e.into()),
        }
        let application_id = tx.last_insert_rowid();

        {
          let mut stmt = tx.prepare(
            "INSERT INTO application_sections (application_id, section_id, section_name)
             VALUES (?1, ?2, ?3)",
          )?;
          for section in Section::ALL {
            stmt.execute(params![application_id, section.id(), section.name()])?;
          }
        }

        let created = read_application(&tx, "application_id", application_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(RawCreate::Created(created))
      })
      .await?;

    Ok(match raw {
      RawCreate::Created((app, sections)) => {
        CreateOutcome::Created(app.into_application(sections)?)
      }
      RawCreate::Existing((app, sections)) => {
        CreateOutcome::AlreadyExists(app.into_application(sections)?)
      }
      RawCreate::Exhausted => return Err(Error::SequenceExhausted(year)),
    })
  }

  async fn commit(&self, unit: UnitOfWork) -> Result<CommitOutcome> {
    let UnitOfWork { application_id, expected_version, at, writes } = unit;
    let at = encode_dt(at);
    let version = i64::try_from(expected_version)
      .map_err(|_| Error::Decode(format!("version {expected_version} out of range")))?;
    let writes = writes
      .into_iter()
      .map(PreparedWrite::prepare)
      .collect::<Result<Vec<_>>>()?;

    let raw = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let bumped = tx.execute(
          "UPDATE applications SET version = version + 1, last_updated = ?3
           WHERE application_id = ?1 AND version = ?2",
          params![application_id, version, at],
        )?;
        if bumped == 0 {
          let exists = tx
            .query_row(
              "SELECT 1 FROM applications WHERE application_id = ?1",
              params![application_id],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          return Ok(if exists { RawCommit::Stale } else { RawCommit::Missing });
        }

        for write in &writes {
          apply_write(&tx, application_id, &at, write)?;
        }

        let app = read_application(&tx, "application_id", application_id)?
          .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(RawCommit::Committed(app))
      })
      .await?;

    match raw {
      RawCommit::Committed((app, sections)) => {
        Ok(CommitOutcome::Committed(app.into_application(sections)?))
      }
      RawCommit::Stale => Ok(CommitOutcome::Stale),
      RawCommit::Missing => Err(Error::ApplicationNotFound(application_id)),
    }
  }

  async fn section_payloads(
    &self,
    application_id: i64,
  ) -> Result<BTreeMap<Section, SectionPayload>> {
    let (rows, documents) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT section_id, payload_kind, payload_json FROM application_sections
           WHERE application_id = ?1 AND payload_kind IS NOT NULL AND payload_json IS NOT NULL
           ORDER BY section_id",
        )?;
        let rows = stmt
          .query_map(params![application_id], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT document_type, file_name, mime_type, file_size FROM documents
           WHERE application_id = ?1 ORDER BY rowid",
        )?;
        let documents = stmt
          .query_map(params![application_id], |r| {
            Ok(RawDocument {
              document_type: r.get(0)?,
              file_name:     r.get(1)?,
              mime_type:     r.get(2)?,
              file_size:     r.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((rows, documents))
      })
      .await?;

    let mut out = BTreeMap::new();
    for (section_id, kind, json) in rows {
      let section = decode_section(section_id)?;
      out.insert(section, decode_payload(&kind, &json)?);
    }
    if !documents.is_empty() {
      let documents = documents
        .into_iter()
        .map(RawDocument::into_document)
        .collect::<Result<Vec<DocumentRef>>>()?;
      out.insert(Section::Documents, SectionPayload::Documents(DocumentsInfo { documents }));
    }
    Ok(out)
  }

  async fn list_applications(&self, filter: ApplicationFilter) -> Result<Vec<ApplicationSummary>> {
    let status = filter.status.map(|s| s.as_str());
    let limit = filter
      .limit
      .map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
    let offset = filter
      .offset
      .map_or(0, |o| i64::try_from(o).unwrap_or(i64::MAX));

    let rows = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {} FROM applications
           WHERE (?1 IS NULL OR status = ?1)
           ORDER BY last_updated DESC, application_id DESC
           LIMIT ?2 OFFSET ?3",
          RawApplication::COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params![status, limit, offset], RawApplication::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawApplication::into_summary).collect()
  }

  async fn status_counts(&self) -> Result<StatusCounts> {
    let rows = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare("SELECT status, COUNT(*) FROM applications GROUP BY status")?;
        let rows = stmt
          .query_map(params![], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut counts = StatusCounts::default();
    for (status, n) in rows {
      counts.add(decode_status(&status)?, u64::try_from(n).unwrap_or_default());
    }
    Ok(counts)
  }
}

// ─── Notifier impl ───────────────────────────────────────────────────────────

impl Notifier for SqliteStore {
  type Error = Error;

  async fn notify(&self, user_id: i64, title: &str, message: &str) -> Result<()> {
    let title = title.to_owned();
    let message = message.to_owned();
    let at = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO notifications (user_id, title, message, created_at)
           VALUES (?1, ?2, ?3, ?4)",
          params![user_id, title, message, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn send_approval_email(&self, user_id: i64, code: &ApplicationCode) -> Result<()> {
    let code = code.to_string();
    let at = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO email_outbox (user_id, kind, application_code, created_at)
           VALUES (?1, 'approval', ?2, ?3)",
          params![user_id, code, at],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn recent_notifications(&self, user_id: i64, limit: usize) -> Result<Vec<Notification>> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT notification_id, user_id, title, message, is_read, created_at
           FROM notifications WHERE user_id = ?1
           ORDER BY created_at DESC, notification_id DESC LIMIT ?2",
        )?;
        let rows = stmt
          .query_map(params![user_id, limit], |r| {
            Ok(RawNotification {
              notification_id: r.get(0)?,
              user_id:         r.get(1)?,
              title:           r.get(2)?,
              message:         r.get(3)?,
              is_read:         r.get(4)?,
              created_at:      r.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.into_iter().map(RawNotification::into_notification).collect()
  }
}

// ─── MilestoneSource impl ────────────────────────────────────────────────────

impl MilestoneSource for SqliteStore {
  type Error = Error;

  async fn list_milestones(&self, year: i32) -> Result<BTreeMap<String, NaiveDate>> {
    let year = format!("{year:04}");
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT title, event_date FROM important_dates
           WHERE substr(event_date, 1, 4) = ?1 ORDER BY event_date",
        )?;
        let rows = stmt
          .query_map(params![year], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(title, date)| Ok((title, decode_date(&date)?)))
      .collect()
  }
}
