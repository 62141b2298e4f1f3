use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};

use super::record::{NewTaskRecord, TaskLookup, TaskOption, TaskRecord};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS midjourney_tasks (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  owner_id TEXT NOT NULL,
  remote_job_id TEXT NOT NULL,
  content_hash TEXT NOT NULL,
  flags INTEGER NOT NULL DEFAULT 0,
  prompt TEXT NOT NULL,
  options TEXT NOT NULL DEFAULT '[]',
  created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_midjourney_tasks_remote ON midjourney_tasks(remote_job_id);
"#;

const SELECT_COLUMNS: &str =
    "id, owner_id, remote_job_id, content_hash, flags, prompt, options, created_at";

/// Append-only table of remote jobs and the follow-up options they expose.
///
/// Rows are inserted once and never updated; the only destructive operation is
/// [`TaskStore::clear`]. The connection sits behind a mutex so the store can be
/// shared between command handlers on different threads.
#[derive(Debug)]
pub struct TaskStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl TaskStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open task store {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn, Some(path))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory task store")?;
        Self::init(conn, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("failed to create midjourney_tasks table")?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn append(&self, record: &NewTaskRecord) -> Result<i64> {
        let options = serde_json::to_string(&record.options)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO midjourney_tasks (owner_id, remote_job_id, content_hash, flags, prompt, options, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.owner_id,
                record.remote_job_id,
                record.content_hash,
                record.flags,
                record.prompt,
                options,
                now_utc_iso(),
            ],
        )
        .with_context(|| format!("failed to insert task {}", record.remote_job_id))?;
        Ok(conn.last_insert_rowid())
    }

    /// All rows recorded for `remote_job_id`, oldest first.
    pub fn find_by_remote_job_id(&self, remote_job_id: &str) -> Result<Vec<TaskRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM midjourney_tasks WHERE remote_job_id = ?1 ORDER BY id ASC"
        ))?;
        let rows = stmt
            .query_map(params![remote_job_id], row_to_record)?
            .collect::<rusqlite::Result<Vec<TaskRecord>>>()
            .with_context(|| format!("failed to read tasks for {remote_job_id}"))?;
        Ok(rows)
    }

    pub fn resolve(&self, remote_job_id: &str) -> Result<TaskLookup> {
        Ok(TaskLookup::from_rows(
            self.find_by_remote_job_id(remote_job_id)?,
        ))
    }

    /// Newest rows first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<TaskRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM midjourney_tasks ORDER BY id DESC LIMIT ?1"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], row_to_record)?
            .collect::<rusqlite::Result<Vec<TaskRecord>>>()?;
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM midjourney_tasks", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Removes every row. Returns how many were deleted.
    pub fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM midjourney_tasks", [])
            .context("failed to clear midjourney_tasks")?;
        Ok(removed)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("task store lock poisoned"))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TaskRecord> {
    let raw_options: String = row.get("options")?;
    let options = serde_json::from_str::<Vec<TaskOption>>(&raw_options).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(TaskRecord {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        remote_job_id: row.get("remote_job_id")?,
        content_hash: row.get("content_hash")?,
        flags: row.get("flags")?,
        prompt: row.get("prompt")?,
        options,
        created_at: row.get("created_at")?,
    })
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
