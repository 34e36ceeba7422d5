//! The section catalog and the typed payload of each section.
//!
//! An application form is split into nine fixed sections. Each section has a
//! payload variant in [`SectionPayload`]; the UI/API layer builds the variant
//! from the submitted form and the [`SectionRegistry`] checks it before
//! anything is persisted.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
  Error, Result,
  validate::{self, Checked},
};

// ─── Section ─────────────────────────────────────────────────────────────────

/// One of the nine fixed sections of the application form.
///
/// The discriminant is the persisted `section_id`; it must never change.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Section {
  BasicInformation     = 1,
  Guardians            = 2,
  Addresses            = 3,
  PersonalDetails      = 4,
  TenthStandard        = 5,
  TwelfthStandard      = 6,
  OtherQualifications  = 7,
  Documents            = 8,
  Declaration          = 9,
}

impl Section {
  /// Every section, in form order.
  pub const ALL: [Section; 9] = [
    Self::BasicInformation,
    Self::Guardians,
    Self::Addresses,
    Self::PersonalDetails,
    Self::TenthStandard,
    Self::TwelfthStandard,
    Self::OtherQualifications,
    Self::Documents,
    Self::Declaration,
  ];

  pub fn id(self) -> u8 { self as u8 }

  pub fn from_id(id: u8) -> Result<Self> {
    Self::ALL
      .into_iter()
      .find(|s| s.id() == id)
      .ok_or(Error::UnknownSection(id))
  }

  /// Display name stored alongside the section row.
  pub fn name(self) -> &'static str {
    match self {
      Self::BasicInformation => "Basic Information",
      Self::Guardians => "Parent/Guardian Details",
      Self::Addresses => "Address Details",
      Self::PersonalDetails => "Personal Details",
      Self::TenthStandard => "Academic Information (10th)",
      Self::TwelfthStandard => "Academic Information (12th)",
      Self::OtherQualifications => "Other Qualifications",
      Self::Documents => "Documents Upload",
      Self::Declaration => "Declaration",
    }
  }

  /// The education level for the three academic sections.
  pub fn education_level(self) -> Option<EducationLevel> {
    match self {
      Self::TenthStandard => Some(EducationLevel::Tenth),
      Self::TwelfthStandard => Some(EducationLevel::Twelfth),
      Self::OtherQualifications => Some(EducationLevel::Other),
      _ => None,
    }
  }
}

impl std::fmt::Display for Section {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} ({})", self.id(), self.name())
  }
}

/// `{section_id, section_name}` as listed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionInfo {
  pub section_id:   u8,
  pub section_name: &'static str,
}

/// Discriminator for rows in the `education` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
  Tenth,
  Twelfth,
  Other,
}

impl EducationLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Tenth => "10th",
      Self::Twelfth => "12th",
      Self::Other => "other",
    }
  }
}

// ─── Lenient scalars ─────────────────────────────────────────────────────────

/// Browsers post numbers as strings and strings as numbers; accept either and
/// keep the textual form. Absent and `null` both become the empty string so
/// the validator reports them as missing.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<serde_json::Value>::deserialize(deserializer)?;
  Ok(match value {
    None | Some(serde_json::Value::Null) => String::new(),
    Some(serde_json::Value::String(s)) => s,
    Some(other) => other.to_string(),
  })
}

fn lenient_opt_string<'de, D>(
  deserializer: D,
) -> std::result::Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let s = lenient_string(deserializer)?;
  Ok(if s.trim().is_empty() { None } else { Some(s) })
}

/// A byte count posted as a number or a numeric string. Blank counts as zero
/// so the validator reports an empty file.
fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = lenient_string(deserializer)?;
  let raw = raw.trim();
  if raw.is_empty() {
    return Ok(0);
  }
  raw.parse().map_err(serde::de::Error::custom)
}

/// A list that may be absent or `null`.
fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn parses_as_size(value: &serde_json::Value) -> bool {
  match value {
    serde_json::Value::Null => true,
    serde_json::Value::Number(n) => n.as_u64().is_some(),
    serde_json::Value::String(s) => s.trim().is_empty() || s.trim().parse::<u64>().is_ok(),
    _ => false,
  }
}

/// Structural problems serde would only report without a field name: a
/// list that is not a list, a row that is not an object, a size that is not
/// a count.
fn check_form_shape(form: &serde_json::Value) -> Checked<()> {
  let Some(object) = form.as_object() else {
    return Err(validate::ValidationError::invalid("form", "Expected a form object"));
  };

  for key in ["subjects", "documents"] {
    let rows = match object.get(key) {
      None | Some(serde_json::Value::Null) => continue,
      Some(serde_json::Value::Array(rows)) => rows,
      Some(_) => return Err(validate::ValidationError::invalid(key, "Expected a list")),
    };
    for (i, row) in rows.iter().enumerate() {
      let Some(row) = row.as_object() else {
        return Err(validate::ValidationError::invalid(format!("{key}[{i}]"), "Expected an object"));
      };
      if key == "documents" && !row.get("fileSize").is_none_or(parses_as_size) {
        return Err(validate::ValidationError::invalid(
          format!("documents[{i}].fileSize"),
          "Please enter a valid file size",
        ));
      }
    }
  }
  Ok(())
}

// ─── Section payloads ────────────────────────────────────────────────────────

/// Section 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicInfo {
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub full_name: Option<String>,
  /// ISO 8601 calendar date.
  #[serde(default, deserialize_with = "lenient_string")]
  pub dob:       String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub sex:       String,
}

/// Section 2. Father and mother are mandatory; the "other guardian" block is
/// optional and only stored when a name is given.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianInfo {
  #[serde(default, deserialize_with = "lenient_string")]
  pub father_name:         String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub father_occupation:   String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub father_mobile:       String,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub father_email:        Option<String>,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mother_name:         String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mother_occupation:   String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mother_mobile:       String,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub mother_email:        Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub guardian_name:       Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub guardian_occupation: Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub guardian_mobile:     Option<String>,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub guardian_email:      Option<String>,
}

/// Section 3.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInfo {
  #[serde(default, deserialize_with = "lenient_string")]
  pub permanent_address: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub present_address:   String,
}

/// Section 4.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
  #[serde(default, deserialize_with = "lenient_string")]
  pub nationality:    String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub religion:       String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub caste:          String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub marital_status: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mother_tongue:  String,
  /// Free text as typed; normalised to a plain decimal by validation.
  #[serde(default, deserialize_with = "lenient_string")]
  pub annual_income:  String,
}

/// Marks for one subject of the 12th standard.
///
/// `subject` is the row identifier: updates match existing rows by subject,
/// never by position in the list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectMark {
  #[serde(default, deserialize_with = "lenient_string")]
  pub subject:        String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub total_marks:    String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub marks_obtained: String,
}

impl SubjectMark {
  /// Case-insensitive identity used for upserts.
  pub fn key(&self) -> String { self.subject.trim().to_lowercase() }

  /// Percentage rounded to two decimals; `None` when the total is not a
  /// positive number.
  pub fn percentage(&self) -> Option<f64> {
    let total: f64 = self.total_marks.trim().parse().ok()?;
    let obtained: f64 = self.marks_obtained.trim().parse().ok()?;
    if total <= 0.0 {
      return None;
    }
    Some((obtained / total * 10_000.0).round() / 100.0)
  }
}

/// Sections 5, 6 and 7.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EducationInfo {
  /// Name of the qualification; required for "Other Qualifications" only.
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub qualification:   Option<String>,
  #[serde(default, deserialize_with = "lenient_string")]
  pub school_name:     String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub board:           String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub total_marks:     String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub marks_obtained:  String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub percentage:      String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub year_of_passing: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mode:            String,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub remarks:         Option<String>,
  /// Subject-wise marks; only kept for the 12th standard.
  #[serde(default, deserialize_with = "lenient_list")]
  pub subjects:        Vec<SubjectMark>,
}

/// Metadata for an uploaded file. The bytes live in upload storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRef {
  #[serde(default, deserialize_with = "lenient_string")]
  pub document_type: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub file_name:     String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub mime_type:     String,
  #[serde(default, deserialize_with = "lenient_u64")]
  pub file_size:     u64,
}

/// Section 8.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentsInfo {
  #[serde(default, deserialize_with = "lenient_list")]
  pub documents: Vec<DocumentRef>,
}

/// Section 9.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationInfo {
  /// Must be exactly `"yes"`.
  #[serde(default, deserialize_with = "lenient_string")]
  pub agree_terms: String,
  #[serde(default, deserialize_with = "lenient_opt_string")]
  pub place:       Option<String>,
}

/// The typed answers for one section. The variant name is the `kind`
/// discriminant stored with the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum SectionPayload {
  BasicInfo(BasicInfo),
  Guardians(GuardianInfo),
  Addresses(AddressInfo),
  PersonalDetails(PersonalInfo),
  Education(EducationInfo),
  Documents(DocumentsInfo),
  Declaration(DeclarationInfo),
}

impl SectionPayload {
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::BasicInfo(_) => "basic_info",
      Self::Guardians(_) => "guardians",
      Self::Addresses(_) => "addresses",
      Self::PersonalDetails(_) => "personal_details",
      Self::Education(_) => "education",
      Self::Documents(_) => "documents",
      Self::Declaration(_) => "declaration",
    }
  }

  /// Whether this variant is the one `section` expects.
  pub fn fits(&self, section: Section) -> bool {
    matches!(
      (self, section),
      (Self::BasicInfo(_), Section::BasicInformation)
        | (Self::Guardians(_), Section::Guardians)
        | (Self::Addresses(_), Section::Addresses)
        | (Self::PersonalDetails(_), Section::PersonalDetails)
        | (
          Self::Education(_),
          Section::TenthStandard
            | Section::TwelfthStandard
            | Section::OtherQualifications
        )
        | (Self::Documents(_), Section::Documents)
        | (Self::Declaration(_), Section::Declaration)
    )
  }

  /// Build the variant for `section` from the bare form object posted by a
  /// client (no `kind` tag). A malformed form is a user-correctable problem
  /// and comes back as the inner `Err`.
  pub fn from_form(section: Section, form: serde_json::Value) -> Result<Checked<Self>> {
    if let Err(e) = check_form_shape(&form) {
      return Ok(Err(e.in_section(section)));
    }
    Ok(Ok(match section {
      Section::BasicInformation => Self::BasicInfo(serde_json::from_value(form)?),
      Section::Guardians => Self::Guardians(serde_json::from_value(form)?),
      Section::Addresses => Self::Addresses(serde_json::from_value(form)?),
      Section::PersonalDetails => {
        Self::PersonalDetails(serde_json::from_value(form)?)
      }
      Section::TenthStandard
      | Section::TwelfthStandard
      | Section::OtherQualifications => {
        Self::Education(serde_json::from_value(form)?)
      }
      Section::Documents => Self::Documents(serde_json::from_value(form)?),
      Section::Declaration => Self::Declaration(serde_json::from_value(form)?),
    }))
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

const BASIC_FIELDS: &[&str] = &["dob", "sex"];
const GUARDIAN_FIELDS: &[&str] = &[
  "fatherName",
  "fatherOccupation",
  "fatherMobile",
  "motherName",
  "motherOccupation",
  "motherMobile",
];
const ADDRESS_FIELDS: &[&str] = &["permanentAddress", "presentAddress"];
const PERSONAL_FIELDS: &[&str] = &[
  "nationality",
  "religion",
  "caste",
  "maritalStatus",
  "motherTongue",
  "annualIncome",
];
const SCHOOL_FIELDS: &[&str] = &[
  "schoolName",
  "board",
  "totalMarks",
  "marksObtained",
  "percentage",
  "yearOfPassing",
  "mode",
];
const OTHER_QUALIFICATION_FIELDS: &[&str] = &[
  "qualification",
  "schoolName",
  "board",
  "totalMarks",
  "marksObtained",
  "percentage",
  "yearOfPassing",
  "mode",
];
const DOCUMENT_FIELDS: &[&str] = &["documents"];
const DECLARATION_FIELDS: &[&str] = &["agreeTerms"];

/// The fixed, ordered catalog of sections and their required-field contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectionRegistry;

impl SectionRegistry {
  pub fn new() -> Self { Self }

  /// Resolve a raw section id against the catalog.
  pub fn section(&self, section_id: u8) -> Result<Section> {
    Section::from_id(section_id)
  }

  pub fn sections(&self) -> &'static [Section] { &Section::ALL }

  pub fn list_sections(&self) -> Vec<SectionInfo> {
    Section::ALL
      .iter()
      .map(|s| SectionInfo { section_id: s.id(), section_name: s.name() })
      .collect()
  }

  pub fn total_count(&self) -> usize { Section::ALL.len() }

  /// Field keys checked, in this order, before a section may be saved.
  pub fn required_fields(&self, section_id: u8) -> Result<&'static [&'static str]> {
    Ok(match self.section(section_id)? {
      Section::BasicInformation => BASIC_FIELDS,
      Section::Guardians => GUARDIAN_FIELDS,
      Section::Addresses => ADDRESS_FIELDS,
      Section::PersonalDetails => PERSONAL_FIELDS,
      Section::TenthStandard | Section::TwelfthStandard => SCHOOL_FIELDS,
      Section::OtherQualifications => OTHER_QUALIFICATION_FIELDS,
      Section::Documents => DOCUMENT_FIELDS,
      Section::Declaration => DECLARATION_FIELDS,
    })
  }

  /// Check `payload` for `section_id` and return its normalised form.
  ///
  /// The outer error is for caller mistakes (unknown id, wrong variant); the
  /// inner one is the first user-correctable problem found.
  pub fn validate(
    &self,
    section_id: u8,
    payload: &SectionPayload,
    today: NaiveDate,
  ) -> Result<Checked<SectionPayload>> {
    let section = self.section(section_id)?;
    if !payload.fits(section) {
      return Err(Error::PayloadMismatch {
        section: section_id,
        payload: payload.discriminant(),
      });
    }

    Ok(match payload {
      SectionPayload::BasicInfo(p) => {
        validate::basic_info(p, today).map(SectionPayload::BasicInfo)
      }
      SectionPayload::Guardians(p) => {
        validate::guardians(p).map(SectionPayload::Guardians)
      }
      SectionPayload::Addresses(p) => {
        validate::addresses(p).map(SectionPayload::Addresses)
      }
      SectionPayload::PersonalDetails(p) => {
        validate::personal(p).map(SectionPayload::PersonalDetails)
      }
      SectionPayload::Education(p) => {
        // `fits` guarantees an academic section here.
        let level = section.education_level().ok_or_else(|| {
          Error::InvariantViolation(format!("{section} has no education level"))
        })?;
        validate::education(level, p, today).map(SectionPayload::Education)
      }
      SectionPayload::Documents(p) => {
        validate::documents(p).map(SectionPayload::Documents)
      }
      SectionPayload::Declaration(p) => {
        validate::declaration(p).map(SectionPayload::Declaration)
      }
    })
  }
}
