//! Administrator endpoints. Mounted behind authentication by the server.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/applications` | Optional `?status=&limit=&offset=` |
//! | `GET`  | `/applications/stats` | Count per status |
//! | `POST` | `/applications/{id}/decision` | Body: `{"decision":"approved"}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rin_core::{
  application::{Application, ApplicationSummary, Decision},
  store::{ApplicationFilter, Notifier, StatusCounts},
};
use serde::Deserialize;

use crate::{Backend, Machine, error::ApiError};

/// `GET /applications`
pub async fn list<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Query(filter): Query<ApplicationFilter>,
) -> Result<Json<Vec<ApplicationSummary>>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.list_applications(filter).await?))
}

/// `GET /applications/stats`
pub async fn stats<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
) -> Result<Json<StatusCounts>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.status_counts().await?))
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  pub decision: Decision,
}

/// `POST /applications/{id}/decision`
pub async fn decide<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
  Path(id): Path<i64>,
  Json(body): Json<DecisionBody>,
) -> Result<Json<Application>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.decide(id, body.decision).await?))
}
