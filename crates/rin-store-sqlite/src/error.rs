//! Error type for `rin-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rin_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value the domain types do not recognise.
  #[error("corrupt row: {0}")]
  Decode(String),

  #[error("application not found: {0}")]
  ApplicationNotFound(i64),

  #[error("no application codes left for {0}")]
  SequenceExhausted(i32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
