// service/src/reconciliation/scheduler.rs

use crate::reconciliation::{ReconcileError, Reconciler};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Periodic trigger for [`Reconciler::run_pass`], independent of request
/// handling.
pub struct ReconciliationScheduler {
  reconciler: Arc<Reconciler>,
  interval: Duration,
  shutdown: CancellationToken,
}

impl ReconciliationScheduler {
  pub fn new(reconciler: Arc<Reconciler>, interval: Duration, shutdown: CancellationToken) -> Self {
    Self {
      reconciler,
      interval,
      shutdown,
    }
  }

  pub fn spawn(self) -> JoinHandle<()> {
    tokio::spawn(self.run())
  }

  pub async fn run(self) {
    tracing::info!(interval_secs = self.interval.as_secs(), "Reconciliation scheduler started");
    loop {
      tokio::select! {
        _ = self.shutdown.cancelled() => break,
        _ = tokio::time::sleep(self.interval) => {}
      }
      match self.reconciler.run_pass().await {
        Ok(_) => {}
        Err(ReconcileError::AlreadyRunning) => {
          tracing::info!("Previous reconciliation pass still running; tick skipped");
        }
        Err(e) => tracing::error!(error = %e, "Reconciliation pass failed"),
      }
    }
    tracing::info!("Reconciliation scheduler stopped");
  }
}
