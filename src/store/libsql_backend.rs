//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::info;

use crate::error::DatabaseError;
use crate::fields::FieldRequest;
use crate::session::{AutomationRun, SessionStatus};
use crate::store::migrations;
use crate::store::traits::Database;

const RUN_COLUMNS: &str = "decision_id, email_id, status, session_url, debug_url, \
                           pending_field, summary, error, context, updated_at";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(&backend.conn).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn status_to_str(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Running => "running",
        SessionStatus::WaitingUser => "waiting_user",
        SessionStatus::Completed => "completed",
        SessionStatus::Error => "error",
        SessionStatus::Cancelled => "cancelled",
    }
}

fn str_to_status(s: &str) -> SessionStatus {
    match s {
        "waiting_user" => SessionStatus::WaitingUser,
        "completed" => SessionStatus::Completed,
        "error" => SessionStatus::Error,
        "cancelled" => SessionStatus::Cancelled,
        _ => SessionStatus::Running,
    }
}

/// Map a libsql row to an AutomationRun. Column order matches RUN_COLUMNS.
fn row_to_run(row: &libsql::Row) -> Result<AutomationRun, DatabaseError> {
    let decision_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(format!("Failed to read decision_id: {e}")))?;
    let email_id: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(format!("Failed to read email_id: {e}")))?;
    let status_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(format!("Failed to read status: {e}")))?;
    let session_url: Option<String> = row.get(3).ok();
    let debug_url: Option<String> = row.get(4).ok();
    let pending_field_str: Option<String> = row.get(5).ok();
    let summary: Option<String> = row.get(6).ok();
    let error: Option<String> = row.get(7).ok();
    let context_str: String = row.get(8).unwrap_or_else(|_| "{}".into());
    let updated_str: String = row
        .get(9)
        .map_err(|e| DatabaseError::Query(format!("Failed to read updated_at: {e}")))?;

    let pending_field: Option<FieldRequest> = match pending_field_str {
        Some(json) => Some(
            serde_json::from_str(&json)
                .map_err(|e| DatabaseError::Serialization(format!("bad pending_field: {e}")))?,
        ),
        None => None,
    };
    let context: HashMap<String, String> = serde_json::from_str(&context_str)
        .map_err(|e| DatabaseError::Serialization(format!("bad context: {e}")))?;

    Ok(AutomationRun {
        decision_id,
        email_id,
        status: str_to_status(&status_str),
        session_url: session_url.flatten_empty(),
        debug_url: debug_url.flatten_empty(),
        pending_field,
        summary,
        error,
        context,
        updated_at: parse_datetime(&updated_str),
    })
}

/// Treat a stored empty string like NULL.
trait FlattenEmpty {
    fn flatten_empty(self) -> Option<String>;
}

impl FlattenEmpty for Option<String> {
    fn flatten_empty(self) -> Option<String> {
        self.filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl Database for LibSqlBackend {
    async fn upsert_run(&self, run: &AutomationRun) -> Result<(), DatabaseError> {
        let pending_field = match &run.pending_field {
            Some(field) => Some(serde_json::to_string(field).map_err(|e| {
                DatabaseError::Serialization(format!("pending_field encode: {e}"))
            })?),
            None => None,
        };
        let context = serde_json::to_string(&run.context)
            .map_err(|e| DatabaseError::Serialization(format!("context encode: {e}")))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO automation_runs ({RUN_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(decision_id) DO UPDATE SET
                        email_id = excluded.email_id,
                        status = excluded.status,
                        session_url = COALESCE(excluded.session_url, automation_runs.session_url),
                        debug_url = COALESCE(excluded.debug_url, automation_runs.debug_url),
                        pending_field = excluded.pending_field,
                        summary = excluded.summary,
                        error = excluded.error,
                        context = excluded.context,
                        updated_at = excluded.updated_at"
                ),
                params![
                    run.decision_id.clone(),
                    run.email_id.clone(),
                    status_to_str(run.status),
                    run.session_url.clone(),
                    run.debug_url.clone(),
                    pending_field,
                    run.summary.clone(),
                    run.error.clone(),
                    context,
                    run.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to upsert run: {e}")))?;
        Ok(())
    }

    async fn get_run(&self, decision_id: &str) -> Result<Option<AutomationRun>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM automation_runs WHERE decision_id = ?1"),
                params![decision_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to query run: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read run row: {e}")))?;

        match row {
            Some(row) => Ok(Some(row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<AutomationRun>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM automation_runs
                     ORDER BY updated_at DESC LIMIT ?1"
                ),
                params![limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to list runs: {e}")))?;

        let mut runs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read run row: {e}")))?
        {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }

    async fn list_active_runs(&self) -> Result<Vec<AutomationRun>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM automation_runs
                     WHERE status IN ('running', 'waiting_user')
                     ORDER BY updated_at DESC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to list active runs: {e}")))?;

        let mut runs = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to read run row: {e}")))?
        {
            runs.push(row_to_run(&row)?);
        }
        Ok(runs)
    }

    async fn mark_run_error(&self, decision_id: &str, reason: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE automation_runs
                 SET status = 'error', error = ?2, updated_at = ?3
                 WHERE decision_id = ?1",
                params![decision_id, reason, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("Failed to mark run errored: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(decision_id: &str, status: SessionStatus) -> AutomationRun {
        AutomationRun {
            decision_id: decision_id.to_string(),
            email_id: "e1".into(),
            status,
            session_url: Some("https://browser.example/s/1".into()),
            debug_url: None,
            pending_field: None,
            summary: None,
            error: None,
            context: HashMap::from([("email".to_string(), "a@b.com".to_string())]),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_run(&run("d1", SessionStatus::Running)).await.unwrap();

        let fetched = db.get_run("d1").await.unwrap().unwrap();
        assert_eq!(fetched.decision_id, "d1");
        assert_eq!(fetched.status, SessionStatus::Running);
        assert_eq!(fetched.session_url.as_deref(), Some("https://browser.example/s/1"));
        assert_eq!(fetched.context["email"], "a@b.com");
        assert!(fetched.debug_url.is_none());
    }

    #[tokio::test]
    async fn get_missing_run_is_none() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        assert!(db.get_run("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_and_keeps_urls() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_run(&run("d1", SessionStatus::Running)).await.unwrap();

        // A terminal snapshot carries no URLs once the driver is gone;
        // the store keeps the ones it already saw.
        let mut done = run("d1", SessionStatus::Completed);
        done.session_url = None;
        done.summary = Some("Checked in".into());
        db.upsert_run(&done).await.unwrap();

        let fetched = db.get_run("d1").await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Completed);
        assert_eq!(fetched.summary.as_deref(), Some("Checked in"));
        assert_eq!(fetched.session_url.as_deref(), Some("https://browser.example/s/1"));
    }

    #[tokio::test]
    async fn pending_field_round_trips() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let mut waiting = run("d1", SessionStatus::WaitingUser);
        waiting.pending_field = Some(FieldRequest {
            key: "email".into(),
            label: "Email".into(),
            placeholder: String::new(),
            name: String::new(),
            field_type: "email".into(),
            question: "What should I enter for \"Email\"?".into(),
        });
        db.upsert_run(&waiting).await.unwrap();

        let fetched = db.get_run("d1").await.unwrap().unwrap();
        assert_eq!(fetched.pending_field.unwrap().key, "email");
    }

    #[tokio::test]
    async fn list_active_filters_terminal_runs() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_run(&run("d1", SessionStatus::Running)).await.unwrap();
        db.upsert_run(&run("d2", SessionStatus::WaitingUser)).await.unwrap();
        db.upsert_run(&run("d3", SessionStatus::Completed)).await.unwrap();
        db.upsert_run(&run("d4", SessionStatus::Cancelled)).await.unwrap();

        let active = db.list_active_runs().await.unwrap();
        let ids: Vec<_> = active.iter().map(|r| r.decision_id.as_str()).collect();
        assert_eq!(active.len(), 2);
        assert!(ids.contains(&"d1"));
        assert!(ids.contains(&"d2"));
    }

    #[tokio::test]
    async fn list_runs_honors_limit() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        for i in 0..5 {
            db.upsert_run(&run(&format!("d{i}"), SessionStatus::Completed))
                .await
                .unwrap();
        }
        let runs = db.list_runs(3).await.unwrap();
        assert_eq!(runs.len(), 3);
    }

    #[tokio::test]
    async fn mark_run_error_flips_status() {
        let db = LibSqlBackend::new_memory().await.unwrap();
        db.upsert_run(&run("d1", SessionStatus::WaitingUser)).await.unwrap();
        db.mark_run_error("d1", "orphaned by restart").await.unwrap();

        let fetched = db.get_run("d1").await.unwrap().unwrap();
        assert_eq!(fetched.status, SessionStatus::Error);
        assert_eq!(fetched.error.as_deref(), Some("orphaned by restart"));
    }

    #[tokio::test]
    async fn new_local_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("runs.db");
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        db.upsert_run(&run("d1", SessionStatus::Running)).await.unwrap();
        assert!(path.exists());
    }
}
