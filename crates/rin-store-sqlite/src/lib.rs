//! SQLite backend for the admission application store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements every
//! collaborator trait the state machine needs.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{QueuedEmail, SqliteStore};

#[cfg(test)]
mod tests;
