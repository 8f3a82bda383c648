//! Database Connection Management
//!
//! This module provides connection setup and schema initialization for the
//! content tree using libsql (embedded SQLite).
//!
//! # Architecture
//!
//! - **WAL mode**: Write-Ahead Logging so readers never block the writer
//! - **Foreign keys**: Enabled on every connection handed out
//! - **Busy timeout**: 5 seconds, so overlapping writers queue instead of
//!   failing with `SQLITE_BUSY`
//! - **Single writer**: Every mutation runs in a [`UnitOfWork`]
//!   (`BEGIN IMMEDIATE`), which serializes writers at the SQLite lock
//!
//! # Schema
//!
//! - `nodes`: id, internal tree-path, sibling position
//! - `paths`: one user-facing path per (node, language), `(language, path)` unique
//! - `content`: content records, at most one per (node, language)
//! - `content_relations`: many-to-many related content
//! - `content_unique_values`: values of fields a content type declares unique

use crate::db::error::DatabaseError;
use crate::db::unit_of_work::UnitOfWork;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use libsql::{Builder, Database};
use std::path::PathBuf;
use std::sync::Arc;

/// Busy timeout applied to every connection (milliseconds)
const BUSY_TIMEOUT_MS: u32 = 5000;

const SCHEMA: &[(&str, &str)] = &[
    (
        "nodes table",
        "CREATE TABLE IF NOT EXISTS nodes (
            id TEXT PRIMARY KEY,
            tree_path TEXT NOT NULL UNIQUE,
            position INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
    ),
    (
        "paths table",
        "CREATE TABLE IF NOT EXISTS paths (
            node_id TEXT NOT NULL,
            language TEXT NOT NULL,
            path TEXT NOT NULL,
            PRIMARY KEY (node_id, language),
            FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
        )",
    ),
    (
        "idx_paths_language_path",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_paths_language_path ON paths(language, path)",
    ),
    (
        "content table",
        "CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            node_id TEXT,
            language TEXT NOT NULL,
            content_type TEXT NOT NULL,
            title TEXT NOT NULL,
            state TEXT NOT NULL,
            publication TEXT,
            expire TEXT,
            navigation INTEGER NOT NULL DEFAULT 1,
            owner TEXT,
            template TEXT NOT NULL DEFAULT '',
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE SET NULL
        )",
    ),
    (
        "idx_content_node_language",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_content_node_language
            ON content(node_id, language) WHERE node_id IS NOT NULL",
    ),
    (
        "idx_content_state",
        "CREATE INDEX IF NOT EXISTS idx_content_state ON content(state)",
    ),
    (
        "content_relations table",
        "CREATE TABLE IF NOT EXISTS content_relations (
            content_id TEXT NOT NULL,
            related_id TEXT NOT NULL,
            PRIMARY KEY (content_id, related_id),
            FOREIGN KEY (content_id) REFERENCES content(id) ON DELETE CASCADE,
            FOREIGN KEY (related_id) REFERENCES content(id) ON DELETE CASCADE
        )",
    ),
    (
        "content_unique_values table",
        "CREATE TABLE IF NOT EXISTS content_unique_values (
            content_id TEXT NOT NULL,
            content_type TEXT NOT NULL,
            field TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (content_id, field),
            UNIQUE (content_type, field, value),
            FOREIGN KEY (content_id) REFERENCES content(id) ON DELETE CASCADE
        )",
    ),
];

/// Database service for managing the libsql database and schema
///
/// # Examples
///
/// ```no_run
/// use slugtree_core::db::DatabaseService;
/// use std::path::PathBuf;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db_service = DatabaseService::new(PathBuf::from("./data/site.db")).await?;
///     let uow = db_service.begin().await?;
///     uow.commit().await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseService {
    /// libsql database (wrapped in Arc for sharing)
    pub db: Arc<Database>,

    /// Path to the database file
    pub db_path: PathBuf,
}

impl DatabaseService {
    /// Open (or create) the database file and initialize the schema
    ///
    /// Creates missing parent directories. Schema creation is idempotent.
    pub async fn new(db_path: PathBuf) -> Result<Self, DatabaseError> {
        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let service = Self {
            db: Arc::new(db),
            db_path,
        };

        service.initialize_schema(is_new_database).await?;

        Ok(service)
    }

    /// Execute a PRAGMA statement
    ///
    /// PRAGMA statements return rows, so they go through query() instead of execute().
    async fn execute_pragma(
        &self,
        conn: &libsql::Connection,
        pragma: &str,
    ) -> Result<(), DatabaseError> {
        let mut stmt = conn.prepare(pragma).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        let _ = stmt.query(()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
        })?;
        Ok(())
    }

    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;

        self.execute_pragma(&conn, "PRAGMA journal_mode = WAL")
            .await?;

        for (name, sql) in SCHEMA {
            conn.execute(sql, ()).await.map_err(|e| {
                DatabaseError::initialization_failed(format!("Failed to create {}: {}", name, e))
            })?;
        }

        // Flush schema out of the WAL so a fresh file is immediately usable
        if is_new_database {
            self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
                .await?;
        }

        tracing::debug!("Schema ready at {}", self.db_path.display());
        Ok(())
    }

    /// Get a raw connection
    ///
    /// Prefer `connect_with_timeout()`: a raw connection has no busy timeout
    /// and foreign keys disabled.
    pub fn connect(&self) -> Result<libsql::Connection, DatabaseError> {
        self.db.connect().map_err(DatabaseError::LibsqlError)
    }

    /// Get a connection with busy timeout and foreign keys configured
    pub async fn connect_with_timeout(&self) -> Result<libsql::Connection, DatabaseError> {
        let conn = self.connect()?;

        self.execute_pragma(&conn, &format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
            .await?;
        self.execute_pragma(&conn, "PRAGMA foreign_keys = ON")
            .await?;

        Ok(conn)
    }

    /// Start a write transaction on a fresh connection
    pub async fn begin(&self) -> Result<UnitOfWork, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        UnitOfWork::begin(conn).await
    }

    /// Checkpoint the WAL before shutdown
    pub async fn db_close(&self) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        self.execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)")
            .await?;
        Ok(())
    }
}

/// Format a timestamp for storage
///
/// Fixed-width UTC RFC3339 (microseconds, `Z`), so stored values compare
/// correctly as text.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp - accepts RFC3339 and SQLite's `YYYY-MM-DD HH:MM:SS`
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    Err(DatabaseError::corrupt_row(format!(
        "Unable to parse timestamp '{}' as RFC3339 or SQLite format",
        s
    )))
}
