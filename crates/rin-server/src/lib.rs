//! HTTP server for the admission portal.
//!
//! Mounts the applicant API under `/api` and the administrator API under
//! `/api/admin`, the latter behind HTTP Basic auth.

pub mod auth;
pub mod error;
pub mod outbox;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, middleware, routing::get};
use rin_api::{Backend, Machine};
use rin_core::store::Notifier;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::{AuthConfig, require_admin};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  pub admin_username:        String,
  pub admin_password_hash:   String,
  /// Refuse edits and submission outside the application window.
  #[serde(default = "default_true")]
  pub enforce_phase_gating:  bool,
  /// Insert the default calendar for the current year at startup, keeping
  /// any milestone already configured.
  #[serde(default)]
  pub seed_default_calendar: bool,
  #[serde(default = "default_outbox_interval")]
  pub outbox_interval_secs:  u64,
}

fn default_true() -> bool { true }

fn default_outbox_interval() -> u64 { 30 }

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S, N>(machine: Arc<Machine<S, N>>, auth: Arc<AuthConfig>) -> Router
where
  S: Backend,
  N: Notifier + 'static,
{
  let admin = rin_api::admin_router(machine.clone())
    .layer(middleware::from_fn_with_state(auth, require_admin));

  Router::new()
    .route("/health", get(|| async { "ok" }))
    .nest("/api", rin_api::api_router(machine))
    .nest("/api/admin", admin)
    .layer(TraceLayer::new_for_http())
}
