//! Read-only catalog endpoints: the current admission phase and the list of
//! form sections.

use std::sync::Arc;

use axum::{Json, extract::State};
use rin_core::{machine::PhaseReport, section::SectionInfo, store::Notifier};

use crate::{Backend, Machine, error::ApiError};

/// `GET /phase`
pub async fn phase<S, N>(
  State(machine): State<Arc<Machine<S, N>>>,
) -> Result<Json<PhaseReport>, ApiError>
where
  S: Backend,
  N: Notifier + 'static,
{
  Ok(Json(machine.phase().await?))
}

/// `GET /sections`
pub async fn sections<S, N>(State(machine): State<Arc<Machine<S, N>>>) -> Json<Vec<SectionInfo>>
where
  S: Backend,
  N: Notifier + 'static,
{
  Json(machine.sections())
}
