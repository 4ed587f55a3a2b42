//! Async `Database` trait — the persistence seam for automation runs.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::session::AutomationRun;

/// Backend-agnostic store for run snapshots.
///
/// The store mirrors in-memory sessions for audit and crash recovery; it
/// is never consulted for live control flow.
#[async_trait]
pub trait Database: Send + Sync {
    /// Insert or replace the snapshot for a decision id.
    async fn upsert_run(&self, run: &AutomationRun) -> Result<(), DatabaseError>;

    /// Fetch one run by decision id.
    async fn get_run(&self, decision_id: &str) -> Result<Option<AutomationRun>, DatabaseError>;

    /// Most recently updated runs first, up to `limit`.
    async fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>, DatabaseError>;

    /// Runs whose persisted status is non-terminal.
    async fn list_active_runs(&self) -> Result<Vec<AutomationRun>, DatabaseError>;

    /// Force a run to the error status with a reason. Used at startup to
    /// reconcile runs orphaned by a crash.
    async fn mark_run_error(&self, decision_id: &str, reason: &str) -> Result<(), DatabaseError>;
}
