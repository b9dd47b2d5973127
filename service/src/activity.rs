// service/src/activity.rs

//! Fire-and-forget activity log.
//!
//! Callers hand records to [`ActivityLog::record`], which never blocks and
//! never fails; [`ActivityLogWorker`] drains the channel into an
//! [`ActivitySink`] on its own task. Sink errors are logged and dropped.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
  pub actor: String,
  pub action: String,
  pub description: String,
  pub metadata: Value,
}

impl ActivityRecord {
  pub fn new(actor: impl Into<String>, action: impl Into<String>, description: impl Into<String>) -> Self {
    Self {
      actor: actor.into(),
      action: action.into(),
      description: description.into(),
      metadata: Value::Object(Default::default()),
    }
  }

  pub fn with_metadata(mut self, metadata: Value) -> Self {
    self.metadata = metadata;
    self
  }
}

/// Sending half, cheap to clone into every handler.
#[derive(Clone)]
pub struct ActivityLog {
  tx: mpsc::Sender<ActivityRecord>,
}

impl ActivityLog {
  pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ActivityRecord>) {
    let (tx, rx) = mpsc::channel(capacity);
    (Self { tx }, rx)
  }

  /// Queues `record`. A full or closed channel drops it with a warning.
  pub fn record(&self, record: ActivityRecord) {
    if let Err(e) = self.tx.try_send(record) {
      let (reason, dropped) = match e {
        mpsc::error::TrySendError::Full(r) => ("channel full", r),
        mpsc::error::TrySendError::Closed(r) => ("channel closed", r),
      };
      tracing::warn!(reason, action = %dropped.action, "Activity record dropped.");
    }
  }
}

#[async_trait]
pub trait ActivitySink: Send + Sync {
  async fn write(&self, record: &ActivityRecord) -> anyhow::Result<()>;
}

pub struct ActivityLogWorker {
  sink: Arc<dyn ActivitySink>,
}

impl ActivityLogWorker {
  pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
    Self { sink }
  }

  /// Runs until every sender is dropped.
  pub async fn run(self, mut rx: mpsc::Receiver<ActivityRecord>) {
    tracing::info!("Activity log worker started");
    while let Some(record) = rx.recv().await {
      match self.sink.write(&record).await {
        Ok(()) => tracing::debug!(action = %record.action, actor = %record.actor, "Activity recorded"),
        Err(e) => tracing::error!(error = %e, action = %record.action, "Failed to write activity record"),
      }
    }
    tracing::info!("Activity log channel closed, worker stopping");
  }
}

pub struct PgActivitySink {
  pool: PgPool,
}

impl PgActivitySink {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl ActivitySink for PgActivitySink {
  async fn write(&self, record: &ActivityRecord) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO activity_logs (actor, action, description, metadata) VALUES ($1, $2, $3, $4)")
      .bind(&record.actor)
      .bind(&record.action)
      .bind(&record.description)
      .bind(&record.metadata)
      .execute(&self.pool)
      .await?;
    Ok(())
  }
}

/// Writes records as structured log events. Used when no database is configured.
pub struct TracingActivitySink;

#[async_trait]
impl ActivitySink for TracingActivitySink {
  async fn write(&self, record: &ActivityRecord) -> anyhow::Result<()> {
    tracing::info!(
      target: "activity",
      actor = %record.actor,
      action = %record.action,
      metadata = %record.metadata,
      "{}",
      record.description
    );
    Ok(())
  }
}

#[derive(Clone, Default)]
pub struct MemoryActivitySink {
  records: Arc<Mutex<Vec<ActivityRecord>>>,
}

impl MemoryActivitySink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> Vec<ActivityRecord> {
    self.records.lock().clone()
  }

  pub fn actions(&self) -> Vec<String> {
    self.records.lock().iter().map(|r| r.action.clone()).collect()
  }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
  async fn write(&self, record: &ActivityRecord) -> anyhow::Result<()> {
    self.records.lock().push(record.clone());
    Ok(())
  }
}
