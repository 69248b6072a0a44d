//! Pipeline run rows.
//!
//! The in-memory queue is ephemeral; these rows are the durable source of
//! truth for observability. Terminal states are sticky: `mark_run_failed`
//! and `mark_run_success` only touch non-terminal rows, which also makes
//! `mark_run_failed` idempotent.

use rusqlite::{params, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::store::{epoch_secs, Store};
use crate::types::{PipelineRun, RunState, RunStep};

const RUN_COLUMNS: &str = "id, site_id, trigger_comment_id, state, step, error_message, \
                           created_at, started_at, finished_at";

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<PipelineRun> {
    let state: String = row.get(3)?;
    let step: Option<String> = row.get(4)?;
    Ok(PipelineRun {
        id: row.get(0)?,
        site_id: row.get(1)?,
        trigger_comment_id: row.get(2)?,
        state: RunState::parse(&state).unwrap_or(RunState::Failed),
        step: step.as_deref().and_then(RunStep::parse),
        error_message: row.get(5)?,
        created_at: row.get(6)?,
        started_at: row.get(7)?,
        finished_at: row.get(8)?,
    })
}

impl Store {
    /// Insert a new run in `queued` and return its id.
    pub fn create_run(&self, site_id: i64, trigger_comment_id: Option<&str>) -> StoreResult<i64> {
        if site_id <= 0 {
            return Err(StoreError::InvalidInput("site_id must be > 0"));
        }
        let trigger = trigger_comment_id.map(str::trim).filter(|s| !s.is_empty());
        let conn = self.lock();
        conn.execute(
            "INSERT INTO pipeline_runs (site_id, trigger_comment_id, state, created_at) \
             VALUES (?1, ?2, 'queued', ?3)",
            params![site_id, trigger, epoch_secs()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// `queued → running`; records `started_at` and clears any stale step
    /// or error annotation.
    pub fn mark_run_running(&self, run_id: i64) -> StoreResult<()> {
        self.lock().execute(
            "UPDATE pipeline_runs \
             SET state = 'running', started_at = ?1, step = NULL, error_message = NULL \
             WHERE id = ?2 AND state = 'queued'",
            params![epoch_secs(), run_id],
        )?;
        Ok(())
    }

    /// Advance the step annotation of a running run.
    pub fn mark_run_step(&self, run_id: i64, step: RunStep) -> StoreResult<()> {
        self.lock().execute(
            "UPDATE pipeline_runs SET step = ?1 WHERE id = ?2 AND state = 'running'",
            params![step.as_str(), run_id],
        )?;
        Ok(())
    }

    /// Terminal success; clears the step annotation.
    pub fn mark_run_success(&self, run_id: i64) -> StoreResult<()> {
        self.lock().execute(
            "UPDATE pipeline_runs SET state = 'success', finished_at = ?1, step = NULL \
             WHERE id = ?2 AND state IN ('queued', 'running')",
            params![epoch_secs(), run_id],
        )?;
        Ok(())
    }

    /// Terminal failure with the failing step and a (redacted) message.
    /// No-op on runs that already reached a terminal state, so the step
    /// recorded by the first failure is preserved.
    pub fn mark_run_failed(&self, run_id: i64, step: RunStep, message: &str) -> StoreResult<()> {
        self.lock().execute(
            "UPDATE pipeline_runs \
             SET state = 'failed', finished_at = ?1, step = ?2, error_message = ?3 \
             WHERE id = ?4 AND state IN ('queued', 'running')",
            params![epoch_secs(), step.as_str(), message, run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: i64) -> StoreResult<Option<PipelineRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE id = ?1 LIMIT 1");
        Ok(self
            .lock()
            .query_row(&sql, params![run_id], row_to_run)
            .optional()?)
    }

    /// Recent runs, newest first, optionally scoped to one site.
    pub fn list_runs(&self, site_id: Option<i64>, limit: u32) -> StoreResult<Vec<PipelineRun>> {
        let limit = if limit == 0 { 50 } else { limit };
        let conn = self.lock();
        let mut out = Vec::new();
        match site_id {
            Some(site_id) => {
                let sql = format!(
                    "SELECT {RUN_COLUMNS} FROM pipeline_runs WHERE site_id = ?1 \
                     ORDER BY created_at DESC, id DESC LIMIT ?2"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![site_id, limit], row_to_run)?;
                for row in rows {
                    out.push(row?);
                }
            }
            None => {
                let sql = format!(
                    "SELECT {RUN_COLUMNS} FROM pipeline_runs \
                     ORDER BY created_at DESC, id DESC LIMIT ?1"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![limit], row_to_run)?;
                for row in rows {
                    out.push(row?);
                }
            }
        }
        Ok(out)
    }
}
