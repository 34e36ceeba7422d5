//! JSON API for the admission portal.
//!
//! Exposes axum [`Router`]s over an [`ApplicationStateMachine`]. Auth, TLS
//! and transport concerns are the caller's responsibility; the admin router
//! in particular must be mounted behind authentication.
//!
//! # Mounting
//!
//! ```rust,ignore
//! Router::new()
//!   .nest("/api", rin_api::api_router(machine.clone()))
//!   .nest("/api/admin", rin_api::admin_router(machine))
//! ```

pub mod admin;
pub mod applications;
pub mod calendar;
pub mod error;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use rin_core::{
  machine::ApplicationStateMachine,
  store::{ApplicationStore, MilestoneSource, Notifier},
};

pub use error::ApiError;

pub type Machine<S, N> = ApplicationStateMachine<S, N>;

/// Storage the routers can be built over.
pub trait Backend: ApplicationStore + MilestoneSource + 'static {}

impl<T> Backend for T where T: ApplicationStore + MilestoneSource + 'static {}

/// Applicant-facing routes.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N>(machine: Arc<Machine<S, N>>) -> Router<()>
where
  S: Backend,
  N: Notifier + 'static,
{
  Router::new()
    // Users
    .route(
      "/users/{user_id}/application",
      get(applications::for_user::<S, N>).post(applications::get_or_create::<S, N>),
    )
    .route("/users/{user_id}/notifications", get(applications::notifications::<S, N>))
    // Applications
    .route("/applications/{id}", get(applications::get_one::<S, N>))
    .route("/applications/{id}/progress", get(applications::progress::<S, N>))
    .route("/applications/{id}/sections", get(applications::saved_sections::<S, N>))
    .route(
      "/applications/{id}/sections/{section_id}",
      put(applications::save_section::<S, N>).delete(applications::unmark_section::<S, N>),
    )
    .route(
      "/applications/{id}/documents/{document_type}",
      delete(applications::remove_document::<S, N>),
    )
    .route("/applications/{id}/submit", post(applications::submit::<S, N>))
    // Catalog
    .route("/phase", get(calendar::phase::<S, N>))
    .route("/sections", get(calendar::sections::<S, N>))
    .with_state(machine)
}

/// Administrator routes: the review listing, status counts and decisions.
pub fn admin_router<S, N>(machine: Arc<Machine<S, N>>) -> Router<()>
where
  S: Backend,
  N: Notifier + 'static,
{
  Router::new()
    .route("/applications", get(admin::list::<S, N>))
    .route("/applications/stats", get(admin::stats::<S, N>))
    .route("/applications/{id}/decision", post(admin::decide::<S, N>))
    .with_state(machine)
}
