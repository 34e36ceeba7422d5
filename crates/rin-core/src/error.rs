//! Error types for `rin-core`.
//!
//! Validation failures are deliberately absent: they are returned as
//! [`crate::validate::ValidationError`] inside a successful result so callers
//! can render them next to the offending field.

use thiserror::Error;

use crate::{application::Status, phase::Action};

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown section id: {0}")]
  UnknownSection(u8),

  #[error("section {section} does not accept a {payload} payload")]
  PayloadMismatch {
    section: u8,
    payload: &'static str,
  },

  #[error("invalid status transition: {from} -> {to}")]
  InvalidTransition { from: Status, to: Status },

  #[error("invariant violated: {0}")]
  InvariantViolation(String),

  #[error("milestone {0:?} is not configured")]
  MissingMilestone(String),

  #[error("user {0} already has an application")]
  DuplicateApplication(i64),

  #[error("application {0} was modified concurrently")]
  StaleApplication(i64),

  #[error("application not found: {0}")]
  ApplicationNotFound(i64),

  #[error("document {document_type:?} not found on application {application_id}")]
  DocumentNotFound {
    application_id: i64,
    document_type:  String,
  },

  #[error("{action} is not allowed: {message}")]
  ActionNotAllowed { action: Action, message: String },

  #[error("persistence error: {0}")]
  Persistence(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// Box a collaborator failure. Used at every store/notifier call site.
  pub fn persistence<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Persistence(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
