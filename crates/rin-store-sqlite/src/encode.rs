//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates are `YYYY-MM-DD`, section
//! payloads are compact JSON tagged with their kind.

use chrono::{DateTime, NaiveDate, Utc};
use rin_core::{
  application::{Application, ApplicationCode, ApplicationSummary, SectionStatus, Status},
  section::{DocumentRef, Section, SectionPayload},
  store::Notification,
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums and codes ─────────────────────────────────────────────────────────

pub fn decode_status(s: &str) -> Result<Status> { s.parse().map_err(Error::Decode) }

pub fn decode_code(s: &str) -> Result<ApplicationCode> { s.parse().map_err(Error::Decode) }

pub fn decode_section(id: i64) -> Result<Section> {
  u8::try_from(id)
    .ok()
    .and_then(|id| Section::from_id(id).ok())
    .ok_or_else(|| Error::Decode(format!("unknown section id {id}")))
}

/// Rebuild a stored section payload from its kind and JSON columns.
pub fn decode_payload(kind: &str, json: &str) -> Result<SectionPayload> {
  let data: serde_json::Value = serde_json::from_str(json)?;
  let tagged = serde_json::json!({ "kind": kind, "data": data });
  Ok(serde_json::from_value(tagged)?)
}

/// Split a payload into the `(kind, data)` column pair.
pub fn encode_payload(payload: &SectionPayload) -> Result<(String, String)> {
  let mut tagged = serde_json::to_value(payload)?;
  let data = tagged
    .get_mut("data")
    .map(serde_json::Value::take)
    .unwrap_or_default();
  Ok((payload.discriminant().to_owned(), data.to_string()))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from an `applications` row.
#[derive(Debug)]
pub struct RawApplication {
  pub application_id: i64,
  pub code:           String,
  pub user_id:        i64,
  pub status:         String,
  pub progress:       i64,
  pub created_at:     String,
  pub last_updated:   String,
  pub submitted_at:   Option<String>,
  pub version:        i64,
}

impl RawApplication {
  pub const COLUMNS: &'static str = "application_id, code, user_id, status, progress, \
                                     created_at, last_updated, submitted_at, version";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      application_id: row.get(0)?,
      code:           row.get(1)?,
      user_id:        row.get(2)?,
      status:         row.get(3)?,
      progress:       row.get(4)?,
      created_at:     row.get(5)?,
      last_updated:   row.get(6)?,
      submitted_at:   row.get(7)?,
      version:        row.get(8)?,
    })
  }

  fn progress(&self) -> Result<u8> {
    u8::try_from(self.progress)
      .map_err(|_| Error::Decode(format!("progress {} out of range", self.progress)))
  }

  pub fn into_application(self, sections: Vec<RawSection>) -> Result<Application> {
    let progress = self.progress()?;
    Ok(Application {
      application_id: self.application_id,
      code: decode_code(&self.code)?,
      user_id: self.user_id,
      status: decode_status(&self.status)?,
      progress,
      created_at: decode_dt(&self.created_at)?,
      last_updated: decode_dt(&self.last_updated)?,
      submitted_at: self.submitted_at.as_deref().map(decode_dt).transpose()?,
      version: u64::try_from(self.version)
        .map_err(|_| Error::Decode(format!("negative version {}", self.version)))?,
      sections: sections
        .into_iter()
        .map(RawSection::into_status)
        .collect::<Result<_>>()?,
    })
  }

  pub fn into_summary(self) -> Result<ApplicationSummary> {
    let progress = self.progress()?;
    Ok(ApplicationSummary {
      application_id: self.application_id,
      code: decode_code(&self.code)?,
      user_id: self.user_id,
      status: decode_status(&self.status)?,
      progress,
      last_updated: decode_dt(&self.last_updated)?,
      submitted_at: self.submitted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

/// Raw values read from an `application_sections` row.
#[derive(Debug)]
pub struct RawSection {
  pub section_id:   i64,
  pub is_completed: bool,
  pub updated_at:   Option<String>,
}

impl RawSection {
  pub fn into_status(self) -> Result<SectionStatus> {
    Ok(SectionStatus {
      section:      decode_section(self.section_id)?,
      is_completed: self.is_completed,
      updated_at:   self.updated_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

#[derive(Debug)]
pub struct RawDocument {
  pub document_type: String,
  pub file_name:     String,
  pub mime_type:     String,
  pub file_size:     i64,
}

impl RawDocument {
  pub fn into_document(self) -> Result<DocumentRef> {
    Ok(DocumentRef {
      document_type: self.document_type,
      file_name:     self.file_name,
      mime_type:     self.mime_type,
      file_size:     u64::try_from(self.file_size)
        .map_err(|_| Error::Decode(format!("negative file size {}", self.file_size)))?,
    })
  }
}

#[derive(Debug)]
pub struct RawNotification {
  pub notification_id: i64,
  pub user_id:         i64,
  pub title:           String,
  pub message:         String,
  pub is_read:         bool,
  pub created_at:      String,
}

impl RawNotification {
  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      notification_id: self.notification_id,
      user_id:         self.user_id,
      title:           self.title,
      message:         self.message,
      is_read:         self.is_read,
      created_at:      decode_dt(&self.created_at)?,
    })
  }
}
