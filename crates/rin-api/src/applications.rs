//! Handlers for `/applications` and `/users/{user_id}` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/users/{user_id}/application` | Get or create; 201 when created |
//! | `GET`    | `/users/{user_id}/application` | 404 if the user has none |
//! | `GET`    | `/users/{user_id}/notifications` | Ten most recent |
//! | `GET`    | `/applications/{id}` | |
//! | `GET`    | `/applications/{id}/progress` | |
//! | `GET`    | `/applications/{id}/sections` | Saved answers per section |
//! | `PUT`    | `/applications/{id}/sections/{section_id}` | Body: the section's form object |
//! | `DELETE` | `/applications/{id}/sections/{section_id}` | Mark incomplete |
//! | `DELETE` | `/applications/{id}/documents/{document_type}` | |
//! | `POST`   | `/applications/{id}/submit` | Final submit |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use rin_core::{
  application::Application,
  machine::{ProgressReport, SaveOutcome},
  section::{Section, SectionPayload},
  store::{Notification, Notifier},
};
use serde::Serialize;

use crate::{Backend, Machine, error::ApiError};

/// Body returned by a successful save or submit.
#[derive(Debug, Serialize)]
pub struct SaveResponse {
  pub status:      &'static str,
  pub application: Application,
}

impl SaveResponse {
  fn from_outcome(outcome: SaveOutcome) -> Result<Json<Self>, ApiError> {
    match outcome {
      SaveOutcome::Saved(application) => Ok(Json(Self { status: "success", application })),
      SaveOutcome::Invalid(e) => Err(ApiError::Validation(e)),
    }
  }
}

#[derive(Debug, Serialize)]
pub struct SavedSection {
  pub section_id:   u8,
  pub section_name: &'static str,
  pub payload:      SectionPayload,
}

// ─── Users ───────────────────────────────────────────────────────────────────

/// `POST /users/{user_id}/application`
pub async fn get_or_create<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  let existed = machine.application_for_user(user_id).await?.is_some();
  let app = machine.get_or_create_application(user_id).await?;
  let status = if existed { StatusCode::OK } else { StatusCode::CREATED };
  Ok((status, Json(app)))
}

/// `GET /users/{user_id}/application`
pub async fn for_user<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(user_id): Path<i64>,
) -> Result<Json<Application>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  machine
    .application_for_user(user_id)
    .await?
    .map(Json)
    .ok_or_else(|| ApiError::NotFound(format!("user {user_id} has no application")))
}

/// `GET /users/{user_id}/notifications`
pub async fn notifications<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(user_id): Path<i64>,
) -> Result<Json<Vec<Notification>>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.notifications(user_id).await?))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /applications/{id}`
pub async fn get_one<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(id): Path<i64>,
) -> Result<Json<Application>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.application(id).await?))
}

/// `GET /applications/{id}/progress`
pub async fn progress<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(id): Path<i64>,
) -> Result<Json<ProgressReport>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.progress(id).await?))
}

/// `GET /applications/{id}/sections`
pub async fn saved_sections<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(id): Path<i64>,
) -> Result<Json<Vec<SavedSection>>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  let payloads = machine.section_payloads(id).await?;
  Ok(Json(
    payloads
      .into_iter()
      .map(|(section, payload)| SavedSection {
        section_id: section.id(),
        section_name: section.name(),
        payload,
      })
      .collect(),
  ))
}

// ─── Mutations ───────────────────────────────────────────────────────────────

/// `PUT /applications/{id}/sections/{section_id}`
///
/// The body is the bare form object for the section, e.g.
/// `{"dob":"2001-05-01","sex":"female"}` for section 1.
pub async fn save_section<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path((id, section_id)): Path<(i64, u8)>,
  Json(form): Json<serde_json::Value>,
) -> Result<Json<SaveResponse>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  let section = Section::from_id(section_id)?;
  let outcome = match SectionPayload::from_form(section, form)? {
    Ok(payload) => machine.save_section(id, section_id, payload).await?,
    Err(e) => SaveOutcome::Invalid(e),
  };
  SaveResponse::from_outcome(outcome)
}

/// `DELETE /applications/{id}/sections/{section_id}`
pub async fn unmark_section<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path((id, section_id)): Path<(i64, u8)>,
) -> Result<Json<Application>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.unmark_section(id, section_id).await?))
}

/// `DELETE /applications/{id}/documents/{document_type}`
pub async fn remove_document<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path((id, document_type)): Path<(i64, String)>,
) -> Result<Json<Application>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.remove_document(id, &document_type).await?))
}

/// `POST /applications/{id}/submit`
pub async fn submit<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(id): Path<i64>,
) -> Result<Json<SaveResponse>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  SaveResponse::from_outcome(machine.submit(id).await?)
}
