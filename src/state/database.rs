//! SQLite database wrapper with WAL mode.

use crate::state::schema;
use crate::types::*;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::info;

/// The newsbrief state database: run history and stage hand-off values.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the database at the given path and create the schema if needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open SQLite database")?;

        // WAL lets `newsbrief status` read while the daemon writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let mut db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create the schema on first open.
    fn init_schema(&mut self) -> Result<()> {
        let version = self.schema_version();

        if version == 0 {
            info!("Creating database schema v{}", schema::SCHEMA_VERSION);
            self.conn
                .execute_batch(schema::CREATE_SCHEMA)
                .context("Failed to create schema")?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    /// Get the current schema version (0 if uninitialized).
    fn schema_version(&self) -> u32 {
        self.conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Key-value store
    // -----------------------------------------------------------------------

    /// Get a value from the KV store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the KV store (upsert).
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Record a new run in the `running` state and return its id.
    pub fn start_run(&self) -> Result<String> {
        let id = ulid::Ulid::new().to_string();
        self.conn.execute(
            "INSERT INTO runs (id, status, stage, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                id,
                RunStatus::Running.to_string(),
                PipelineStage::FetchNews.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    /// Note the stage a run has reached.
    pub fn set_stage(&self, run_id: &str, stage: PipelineStage) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET stage = ?2 WHERE id = ?1",
            params![run_id, stage.to_string()],
        )?;
        Ok(())
    }

    /// Close a run with its final status.
    pub fn finish_run(&self, run_id: &str, status: RunStatus, error: Option<&str>) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?2, error = ?3, finished_at = ?4 WHERE id = ?1",
            params![run_id, status.to_string(), error, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, status, stage, error, started_at, finished_at
             FROM runs ORDER BY started_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let status: String = row.get(1)?;
            Ok(RunRecord {
                id: row.get(0)?,
                status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
                stage: row.get(2)?,
                error: row.get(3)?,
                started_at: row.get(4)?,
                finished_at: row.get(5)?,
            })
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    // -----------------------------------------------------------------------
    // Artifacts
    // -----------------------------------------------------------------------

    /// Store a named stage output for a run (upsert).
    pub fn save_artifact(&self, run_id: &str, name: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO artifacts (run_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_id, name) DO UPDATE SET value = ?3",
            params![run_id, name, value],
        )?;
        Ok(())
    }

    /// Load a named stage output for a run.
    pub fn load_artifact(&self, run_id: &str, name: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM artifacts WHERE run_id = ?1 AND name = ?2",
                params![run_id, name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    // -----------------------------------------------------------------------
    // Tool calls
    // -----------------------------------------------------------------------

    /// Persist one model-issued tool call and its result.
    pub fn log_tool_call(
        &self,
        run_id: &str,
        call: &ToolCallRequest,
        result: &ToolResult,
    ) -> Result<()> {
        let id = call
            .id
            .clone()
            .unwrap_or_else(|| ulid::Ulid::new().to_string());
        // Model-supplied ids are only unique within one reply.
        let id = format!("{run_id}:{id}");
        self.conn.execute(
            "INSERT OR REPLACE INTO tool_calls (id, run_id, tool_name, arguments_json, output, success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                run_id,
                call.name,
                call.arguments.to_encoded(),
                result.to_json_string(),
                (!result.is_error()) as i32,
            ],
        )?;
        Ok(())
    }

    /// Number of tool calls recorded for a run.
    pub fn tool_call_count(&self, run_id: &str) -> Result<u64> {
        let count: u64 = self.conn.query_row(
            "SELECT COUNT(*) FROM tool_calls WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
