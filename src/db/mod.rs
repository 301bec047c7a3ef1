pub mod migrations;
pub mod schema;

use crate::error::{MemoryError, Result};
use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the mnema database at the given path, with pragmas set
/// and schema initialized.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| MemoryError::BackendUnavailable {
            message: format!("failed to create directory {}", parent.display()),
            source: Some(Box::new(e)),
        })?;
    }

    let conn = Connection::open(path).map_err(|e| MemoryError::BackendUnavailable {
        message: format!(
            "failed to open database at {}. If the file is corrupt, \
             restore from a backup or start fresh with `mnema wipe`.",
            path.display()
        ),
        source: Some(Box::new(e)),
    })?;

    // WAL for concurrent readers; wait for locks instead of failing fast.
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", "5000")?;

    schema::init_schema(&conn)?;
    migrations::run_migrations(&conn)?;

    // Quick integrity check after schema init
    let integrity: String = conn.pragma_query_value(None, "quick_check", |row| row.get(0))?;
    if integrity != "ok" {
        return Err(MemoryError::Internal(format!(
            "database integrity check failed: {integrity}"
        )));
    }

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
/// Used by tests and by ephemeral tooling runs.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn)?;
    migrations::run_migrations(&conn)?;
    Ok(conn)
}

/// Result of a full database health check.
#[derive(Debug)]
pub struct HealthReport {
    pub schema_version: u32,
    pub embedding_provider: Option<String>,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub memory_count: i64,
    pub vector_count: i64,
    pub waypoint_count: i64,
    pub fact_count: i64,
    pub pending_jobs: i64,
    pub failed_jobs: i64,
}

/// Run a comprehensive health check on the database.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let embedding_provider = migrations::get_embedding_provider(conn)?;

    let integrity_details: String =
        conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    let integrity_ok = integrity_details == "ok";

    let count = |sql: &str| -> i64 {
        conn.query_row(sql, [], |row| row.get(0)).unwrap_or(0)
    };

    Ok(HealthReport {
        schema_version,
        embedding_provider,
        integrity_ok,
        integrity_details,
        memory_count: count("SELECT COUNT(*) FROM memories"),
        vector_count: count("SELECT COUNT(*) FROM vectors"),
        waypoint_count: count("SELECT COUNT(*) FROM waypoints"),
        fact_count: count("SELECT COUNT(*) FROM temporal_facts"),
        pending_jobs: count("SELECT COUNT(*) FROM coactivation_jobs WHERE status = 'pending'"),
        failed_jobs: count("SELECT COUNT(*) FROM coactivation_jobs WHERE status = 'failed'"),
    })
}

/// Current wall-clock time as epoch milliseconds — the timestamp format of
/// every persisted table.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
