// Chat-history database bootstrap (users, threads, steps, elements, feedbacks)
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Failed to apply schema statement '{statement}': {source}")]
    Statement {
        statement: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Database error: {0}")]
    Query(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, SchemaError>;

pub const TABLES: &[&str] = &["users", "threads", "steps", "elements", "feedbacks"];

const CREATE_TABLES: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        identifier TEXT NOT NULL UNIQUE,
        metadata TEXT NOT NULL,
        createdAt TEXT
    )"#,
    r#"CREATE TABLE IF NOT EXISTS threads (
        id TEXT PRIMARY KEY,
        createdAt TEXT,
        name TEXT,
        userId TEXT,
        userIdentifier TEXT,
        tags TEXT,
        metadata TEXT,
        FOREIGN KEY (userId) REFERENCES users(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS steps (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        type TEXT NOT NULL,
        threadId TEXT NOT NULL,
        parentId TEXT,
        streaming INTEGER NOT NULL,
        waitForAnswer INTEGER,
        isError INTEGER,
        metadata TEXT,
        tags TEXT,
        input TEXT,
        output TEXT,
        createdAt TEXT,
        command TEXT,
        "start" TEXT,
        "end" TEXT,
        generation TEXT,
        showInput TEXT,
        language TEXT,
        indent INTEGER,
        defaultOpen INTEGER,
        FOREIGN KEY (threadId) REFERENCES threads(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS elements (
        id TEXT PRIMARY KEY,
        threadId TEXT,
        type TEXT,
        url TEXT,
        chainlitKey TEXT,
        name TEXT NOT NULL,
        display TEXT,
        objectKey TEXT,
        size TEXT,
        page INTEGER,
        language TEXT,
        forId TEXT,
        mime TEXT,
        props TEXT,
        FOREIGN KEY (threadId) REFERENCES threads(id) ON DELETE CASCADE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS feedbacks (
        id TEXT PRIMARY KEY,
        forId TEXT NOT NULL,
        threadId TEXT NOT NULL,
        value INTEGER NOT NULL,
        comment TEXT,
        FOREIGN KEY (threadId) REFERENCES threads(id) ON DELETE CASCADE
    )"#,
];

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_identifier ON users(identifier)",
    "CREATE INDEX IF NOT EXISTS idx_threads_userId ON threads(userId)",
    "CREATE INDEX IF NOT EXISTS idx_threads_userIdentifier ON threads(userIdentifier)",
    "CREATE INDEX IF NOT EXISTS idx_steps_threadId ON steps(threadId)",
    "CREATE INDEX IF NOT EXISTS idx_steps_parentId ON steps(parentId)",
    "CREATE INDEX IF NOT EXISTS idx_elements_threadId ON elements(threadId)",
    "CREATE INDEX IF NOT EXISTS idx_elements_forId ON elements(forId)",
    "CREATE INDEX IF NOT EXISTS idx_feedbacks_threadId ON feedbacks(threadId)",
    "CREATE INDEX IF NOT EXISTS idx_feedbacks_forId ON feedbacks(forId)",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub name: String,
    pub exists: bool,
    pub columns: usize,
    pub rows: i64,
}

/// Open (creating if needed) the SQLite file at `path` with foreign keys on.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to open database {}: {}", path.display(), e);
            SchemaError::Connection(e)
        })
}

/// Create every table and index. Safe to run against an existing database.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for statement in CREATE_TABLES.iter().chain(CREATE_INDEXES) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|source| SchemaError::Statement {
                statement: first_line(statement),
                source,
            })?;
    }
    info!(
        tables = CREATE_TABLES.len(),
        indexes = CREATE_INDEXES.len(),
        "schema applied"
    );
    Ok(())
}

pub async fn inspect(pool: &SqlitePool) -> Result<Vec<TableReport>> {
    let mut reports = Vec::with_capacity(TABLES.len());
    for table in TABLES {
        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(*table)
        .fetch_one(pool)
        .await?;
        if exists == 0 {
            reports.push(TableReport {
                name: table.to_string(),
                exists: false,
                columns: 0,
                rows: 0,
            });
            continue;
        }

        // Names come from TABLES, never from input.
        let columns = sqlx::query(&format!("PRAGMA table_info({})", table))
            .fetch_all(pool)
            .await?
            .len();
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await?;

        reports.push(TableReport {
            name: table.to_string(),
            exists: true,
            columns,
            rows,
        });
    }
    Ok(reports)
}

fn first_line(statement: &str) -> String {
    statement.lines().next().unwrap_or_default().trim().to_string()
}

pub fn render_report(reports: &[TableReport]) -> String {
    let mut out = String::new();
    for r in reports {
        if r.exists {
            out.push_str(&format!("{}: {} columns, {} rows\n", r.name, r.columns, r.rows));
        } else {
            out.push_str(&format!("{}: missing\n", r.name));
        }
    }
    out
}
