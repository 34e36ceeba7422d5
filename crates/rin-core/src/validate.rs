//! Field- and section-level validation.
//!
//! Every check is fail-fast: the first problem, in the registry's field
//! order, is reported and nothing else is examined. Successful checks return
//! the normalised value so persisted data is canonical (trimmed strings,
//! lowercase enums, plain decimal income).

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::section::{
  AddressInfo, BasicInfo, DeclarationInfo, DocumentRef, DocumentsInfo,
  EducationInfo, EducationLevel, GuardianInfo, PersonalInfo, Section,
  SubjectMark,
};

/// Largest accepted upload.
pub const MAX_DOCUMENT_BYTES: u64 = 5 * 1024 * 1024;

/// MIME types accepted for uploaded documents.
pub const ALLOWED_MIME_TYPES: &[&str] =
  &["image/jpeg", "image/jpg", "image/png", "application/pdf"];

pub const MIN_APPLICANT_AGE: u32 = 16;
pub const MAX_APPLICANT_AGE: u32 = 100;

/// How far back a passing year may lie.
pub const MAX_YEARS_SINCE_PASSING: i32 = 50;

// ─── Error ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum ValidationErrorKind {
  /// Absent or blank.
  Missing,
  /// Present but unacceptable.
  Invalid(String),
  /// The whole section has not been completed (explicit submit only).
  Incomplete,
}

/// A user-correctable problem with a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
  /// Section the field belongs to, once known.
  pub section: Option<Section>,
  /// Form key of the offending field, e.g. `"dob"` or `"subjects[2].subject"`.
  pub field:   String,
  pub kind:    ValidationErrorKind,
}

impl ValidationError {
  pub fn missing(field: impl Into<String>) -> Self {
    Self { section: None, field: field.into(), kind: ValidationErrorKind::Missing }
  }

  pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
    Self {
      section: None,
      field:   field.into(),
      kind:    ValidationErrorKind::Invalid(reason.into()),
    }
  }

  pub fn incomplete(section: Section) -> Self {
    Self {
      section: Some(section),
      field:   "section".to_owned(),
      kind:    ValidationErrorKind::Incomplete,
    }
  }

  pub fn in_section(mut self, section: Section) -> Self {
    self.section = Some(section);
    self
  }
}

impl std::fmt::Display for ValidationError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match (&self.kind, self.section) {
      (ValidationErrorKind::Missing, _) => {
        write!(f, "Missing required field: {}", self.field)
      }
      (ValidationErrorKind::Invalid(reason), _) => {
        write!(f, "Invalid {}: {reason}", self.field)
      }
      (ValidationErrorKind::Incomplete, Some(section)) => {
        write!(f, "Section {} is not complete", section.name())
      }
      (ValidationErrorKind::Incomplete, None) => {
        write!(f, "Application is not complete")
      }
    }
  }
}

impl std::error::Error for ValidationError {}

/// Result of a user-facing check.
pub type Checked<T> = std::result::Result<T, ValidationError>;

// ─── Field validators ────────────────────────────────────────────────────────

/// Present and non-blank; returns the trimmed value.
pub fn required<'a>(field: &str, value: &'a str) -> Checked<&'a str> {
  let trimmed = value.trim();
  if trimmed.is_empty() {
    return Err(ValidationError::missing(field));
  }
  Ok(trimmed)
}

fn optional(value: Option<&str>) -> Option<String> {
  value
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned)
}

/// ISO date of birth giving an age in `[16, 100]` on `today`.
pub fn date_of_birth(field: &str, value: &str, today: NaiveDate) -> Checked<NaiveDate> {
  let raw = required(field, value)?;
  let dob = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map_err(|_| ValidationError::invalid(field, "Please enter a valid date"))?;

  if dob > today {
    return Err(ValidationError::invalid(field, "Date of birth must be in the past"));
  }

  let age = today.years_since(dob).unwrap_or(0);
  if age < MIN_APPLICANT_AGE {
    return Err(ValidationError::invalid(
      field,
      format!("You must be at least {MIN_APPLICANT_AGE} years old"),
    ));
  }
  if age > MAX_APPLICANT_AGE {
    return Err(ValidationError::invalid(field, "Please enter a valid date of birth"));
  }
  Ok(dob)
}

/// Digits, spaces, dashes and parentheses; 10–15 digits in total.
pub fn phone(field: &str, value: &str) -> Checked<String> {
  let raw = required(field, value)?;
  if !raw
    .chars()
    .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')'))
  {
    return Err(ValidationError::invalid(field, "Please enter a valid phone number"));
  }
  let digits = raw.chars().filter(char::is_ascii_digit).count();
  if !(10..=15).contains(&digits) {
    return Err(ValidationError::invalid(field, "Phone number should be 10-15 digits"));
  }
  Ok(raw.to_owned())
}

/// Absent is fine; present must look like `local@domain.tld`.
pub fn optional_email(field: &str, value: Option<&str>) -> Checked<Option<String>> {
  let Some(raw) = optional(value) else { return Ok(None) };
  let valid = raw.split_once('@').is_some_and(|(local, domain)| {
    !local.is_empty()
      && !domain.contains('@')
      && domain
        .rsplit_once('.')
        .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
      && !raw.contains(char::is_whitespace)
  });
  if !valid {
    return Err(ValidationError::invalid(field, "Please enter a valid email address"));
  }
  Ok(Some(raw))
}

fn number(field: &str, value: &str) -> Checked<f64> {
  let raw = required(field, value)?;
  raw
    .parse::<f64>()
    .ok()
    .filter(|n| n.is_finite())
    .ok_or_else(|| ValidationError::invalid(field, "Please enter a valid number"))
}

/// A non-negative number.
pub fn marks(field: &str, value: &str) -> Checked<f64> {
  let n = number(field, value)?;
  if n < 0.0 {
    return Err(ValidationError::invalid(field, "Marks cannot be negative"));
  }
  Ok(n)
}

/// A number in `[0, 100]`.
pub fn percentage(field: &str, value: &str) -> Checked<f64> {
  let n = number(field, value)?;
  if !(0.0..=100.0).contains(&n) {
    return Err(ValidationError::invalid(field, "Percentage must be between 0 and 100"));
  }
  Ok(n)
}

/// Exactly four digits, no later than this year and at most fifty years ago.
pub fn year(field: &str, value: &str, today: NaiveDate) -> Checked<i32> {
  let raw = required(field, value)?;
  if raw.len() != 4 || !raw.chars().all(|c| c.is_ascii_digit()) {
    return Err(ValidationError::invalid(field, "Please enter a valid 4-digit year"));
  }
  let y: i32 = raw
    .parse()
    .map_err(|_| ValidationError::invalid(field, "Please enter a valid 4-digit year"))?;
  let current = today.year();
  if y < current - MAX_YEARS_SINCE_PASSING || y > current {
    return Err(ValidationError::invalid(field, "Please enter a reasonable year"));
  }
  Ok(y)
}

/// Income typed as e.g. `"₹ 2,50,000"`; returns the plain amount.
pub fn annual_income(field: &str, value: &str) -> Checked<f64> {
  let raw = required(field, value)?;
  let cleaned: String = raw
    .chars()
    .filter(|c| !matches!(c, '₹' | ',') && !c.is_whitespace())
    .collect();
  let n = cleaned
    .parse::<f64>()
    .ok()
    .filter(|n| n.is_finite() && *n >= 0.0)
    .ok_or_else(|| ValidationError::invalid(field, "Please enter a valid amount"))?;
  Ok(n)
}

/// Case-insensitive membership; returns the lowercase value.
pub fn one_of(field: &str, value: &str, allowed: &[&str]) -> Checked<String> {
  let lowered = required(field, value)?.to_lowercase();
  if !allowed.contains(&lowered.as_str()) {
    return Err(ValidationError::invalid(
      field,
      format!("Must be one of: {}", allowed.join(", ")),
    ));
  }
  Ok(lowered)
}

// ─── Section validators ──────────────────────────────────────────────────────

pub fn basic_info(p: &BasicInfo, today: NaiveDate) -> Checked<BasicInfo> {
  let dob = date_of_birth("dob", &p.dob, today)?;
  let sex = one_of("sex", &p.sex, &["male", "female", "other"])?;
  Ok(BasicInfo {
    full_name: optional(p.full_name.as_deref()),
    dob:       dob.format("%Y-%m-%d").to_string(),
    sex,
  })
}

pub fn guardians(p: &GuardianInfo) -> Checked<GuardianInfo> {
  let father_name = required("fatherName", &p.father_name)?.to_owned();
  let father_occupation = required("fatherOccupation", &p.father_occupation)?.to_owned();
  let father_mobile = phone("fatherMobile", &p.father_mobile)?;
  let mother_name = required("motherName", &p.mother_name)?.to_owned();
  let mother_occupation = required("motherOccupation", &p.mother_occupation)?.to_owned();
  let mother_mobile = phone("motherMobile", &p.mother_mobile)?;

  let father_email = optional_email("fatherEmail", p.father_email.as_deref())?;
  let mother_email = optional_email("motherEmail", p.mother_email.as_deref())?;

  // The other-guardian block is only looked at when a name is given.
  let guardian_name = optional(p.guardian_name.as_deref());
  let (guardian_occupation, guardian_mobile, guardian_email) = if guardian_name.is_some() {
    let mobile = optional(p.guardian_mobile.as_deref())
      .map(|m| phone("guardianMobile", &m))
      .transpose()?;
    (
      optional(p.guardian_occupation.as_deref()),
      mobile,
      optional_email("guardianEmail", p.guardian_email.as_deref())?,
    )
  } else {
    (None, None, None)
  };

  Ok(GuardianInfo {
    father_name,
    father_occupation,
    father_mobile,
    father_email,
    mother_name,
    mother_occupation,
    mother_mobile,
    mother_email,
    guardian_name,
    guardian_occupation,
    guardian_mobile,
    guardian_email,
  })
}

pub fn addresses(p: &AddressInfo) -> Checked<AddressInfo> {
  Ok(AddressInfo {
    permanent_address: required("permanentAddress", &p.permanent_address)?.to_owned(),
    present_address:   required("presentAddress", &p.present_address)?.to_owned(),
  })
}

pub fn personal(p: &PersonalInfo) -> Checked<PersonalInfo> {
  let nationality = required("nationality", &p.nationality)?.to_owned();
  let religion = required("religion", &p.religion)?.to_owned();
  let caste = required("caste", &p.caste)?.to_owned();
  let marital_status = required("maritalStatus", &p.marital_status)?.to_lowercase();
  let mother_tongue = required("motherTongue", &p.mother_tongue)?.to_owned();
  let income = annual_income("annualIncome", &p.annual_income)?;
  Ok(PersonalInfo {
    nationality,
    religion,
    caste,
    marital_status,
    mother_tongue,
    annual_income: income.to_string(),
  })
}

pub fn education(
  level: EducationLevel,
  p: &EducationInfo,
  today: NaiveDate,
) -> Checked<EducationInfo> {
  let qualification = match level {
    EducationLevel::Other => Some(
      required("qualification", p.qualification.as_deref().unwrap_or_default())?
        .to_owned(),
    ),
    EducationLevel::Tenth | EducationLevel::Twelfth => None,
  };

  let school_name = required("schoolName", &p.school_name)?.to_owned();
  let board = required("board", &p.board)?.to_owned();
  let total = marks("totalMarks", &p.total_marks)?;
  let obtained = marks("marksObtained", &p.marks_obtained)?;
  if obtained > total {
    return Err(ValidationError::invalid(
      "marksObtained",
      "Marks obtained cannot exceed total marks",
    ));
  }
  let pct = percentage("percentage", &p.percentage)?;
  let passed = year("yearOfPassing", &p.year_of_passing, today)?;
  let mode = required("mode", &p.mode)?.to_lowercase();

  let subjects = match level {
    EducationLevel::Twelfth => subject_marks(&p.subjects)?,
    EducationLevel::Tenth | EducationLevel::Other => Vec::new(),
  };

  Ok(EducationInfo {
    qualification,
    school_name,
    board,
    total_marks: total.to_string(),
    marks_obtained: obtained.to_string(),
    percentage: pct.to_string(),
    year_of_passing: passed.to_string(),
    mode,
    remarks: optional(p.remarks.as_deref()),
    subjects,
  })
}

/// Blank rows are dropped, as the form always renders a few empty ones.
fn subject_marks(rows: &[SubjectMark]) -> Checked<Vec<SubjectMark>> {
  let mut seen = HashSet::new();
  let mut out = Vec::new();

  for (i, row) in rows.iter().enumerate() {
    if row.subject.trim().is_empty() {
      continue;
    }
    let field = |name: &str| format!("subjects[{i}].{name}");

    let total = marks(&field("totalMarks"), &row.total_marks)?;
    let obtained = marks(&field("marksObtained"), &row.marks_obtained)?;
    if obtained > total {
      return Err(ValidationError::invalid(
        field("marksObtained"),
        "Marks obtained cannot exceed total marks",
      ));
    }
    if !seen.insert(row.key()) {
      return Err(ValidationError::invalid(field("subject"), "Duplicate subject"));
    }

    out.push(SubjectMark {
      subject:        row.subject.trim().to_owned(),
      total_marks:    total.to_string(),
      marks_obtained: obtained.to_string(),
    });
  }
  Ok(out)
}

pub fn documents(p: &DocumentsInfo) -> Checked<DocumentsInfo> {
  if p.documents.is_empty() {
    return Err(ValidationError::missing("documents"));
  }

  let mut seen = HashSet::new();
  let mut out = Vec::with_capacity(p.documents.len());
  for (i, doc) in p.documents.iter().enumerate() {
    let field = |name: &str| format!("documents[{i}].{name}");

    let document_type = required(&field("documentType"), &doc.document_type)?.to_owned();
    let file_name = required(&field("fileName"), &doc.file_name)?.to_owned();
    let mime_type = one_of(&field("mimeType"), &doc.mime_type, ALLOWED_MIME_TYPES)
      .map_err(|_| {
        ValidationError::invalid(
          field("mimeType"),
          "Only JPG, PNG and PDF files are allowed",
        )
      })?;
    if doc.file_size == 0 {
      return Err(ValidationError::invalid(field("fileSize"), "File is empty"));
    }
    if doc.file_size > MAX_DOCUMENT_BYTES {
      return Err(ValidationError::invalid(
        field("fileSize"),
        "File size exceeds 5MB limit",
      ));
    }
    if !seen.insert(document_type.clone()) {
      return Err(ValidationError::invalid(
        field("documentType"),
        "Duplicate document type",
      ));
    }

    out.push(DocumentRef {
      document_type,
      file_name,
      mime_type,
      file_size: doc.file_size,
    });
  }
  Ok(DocumentsInfo { documents: out })
}

pub fn declaration(p: &DeclarationInfo) -> Checked<DeclarationInfo> {
  let agreed = required("agreeTerms", &p.agree_terms)?;
  if agreed != "yes" {
    return Err(ValidationError::invalid(
      "agreeTerms",
      "You must agree to the terms and conditions",
    ));
  }
  Ok(DeclarationInfo {
    agree_terms: "yes".to_owned(),
    place:       optional(p.place.as_deref()),
  })
}
