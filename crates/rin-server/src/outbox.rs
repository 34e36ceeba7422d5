//! Background drain for the approval-email outbox.
//!
//! Approval emails are queued by the store in the same place as in-app
//! notifications. This worker hands each one to the mail log and marks it
//! sent; a real SMTP relay would slot in at [`deliver`].

use std::time::Duration;

use rin_store_sqlite::{QueuedEmail, SqliteStore};
use tokio::time::interval;
use tracing::{info, warn};

/// Drain the outbox every `period` until the task is dropped.
pub async fn run(store: SqliteStore, period: Duration) {
  let mut ticker = interval(period);
  loop {
    ticker.tick().await;
    match dispatch(&store).await {
      Ok(0) => {}
      Ok(sent) => info!(sent, "outbox drained"),
      Err(e) => warn!(error = %e, "outbox drain failed"),
    }
  }
}

/// Deliver every pending email once. Returns how many were marked sent.
pub async fn dispatch(store: &SqliteStore) -> rin_store_sqlite::Result<usize> {
  let mut sent = 0;
  for email in store.pending_emails().await? {
    deliver(&email);
    if store.mark_email_sent(email.email_id).await? {
      sent += 1;
    }
  }
  Ok(sent)
}

fn deliver(email: &QueuedEmail) {
  info!(
    email_id = email.email_id,
    user_id = email.user_id,
    kind = %email.kind,
    code = %email.application_code,
    "email dispatched"
  );
}
