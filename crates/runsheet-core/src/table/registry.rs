//! Run registry: lookups and config resolution over a snapshot.

use tracing::info;

use crate::app::status::StatusCounts;
use crate::domain::{Result, RunConfig, RunId, RunsheetError};
use crate::ports::TableBackend;

use super::snapshot::{RunRow, TableSnapshot};

/// Read-only view over a snapshot. Everything here is pure: no I/O.
#[derive(Debug, Clone, Copy)]
pub struct RunRegistry<'a> {
    snapshot: &'a TableSnapshot,
}

impl<'a> RunRegistry<'a> {
    pub fn new(snapshot: &'a TableSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn run(&self, run_id: RunId) -> Result<&'a RunRow> {
        self.snapshot
            .run(run_id)
            .ok_or(RunsheetError::RunNotFound(run_id))
    }

    pub fn run_count(&self) -> usize {
        self.snapshot.run_count()
    }

    /// Overlay the run's non-empty config cells onto the default row.
    pub fn resolve_config(&self, run_id: RunId) -> Result<RunConfig> {
        let run = self.run(run_id)?;
        let defaults = self.snapshot.defaults();
        Ok(self
            .snapshot
            .config_keys()
            .iter()
            .map(|key| {
                let cell = run.cell(key);
                let value = if cell.is_empty() {
                    defaults.get(key).cloned().unwrap_or(cell)
                } else {
                    cell
                };
                (key.clone(), value)
            })
            .collect())
    }

    /// First claimable run in increasing id order.
    pub fn find_ready_run(&self) -> Option<RunId> {
        self.snapshot
            .runs()
            .iter()
            .find(|run| run.is_claimable())
            .map(|run| run.run_id)
    }

    pub fn status_counts(&self) -> StatusCounts {
        StatusCounts::from_runs(self.snapshot.runs())
    }
}

/// 1-based column for `key`, appending a new column at the end of row 1 if the
/// table does not have it yet.
///
/// Not race-protected: two workers creating the same key at once may end up
/// with two columns.
pub async fn ensure_column(
    backend: &dyn TableBackend,
    snapshot: &mut TableSnapshot,
    key: &str,
) -> Result<usize> {
    if let Some(col) = snapshot.key_column(key) {
        return Ok(col);
    }

    let col = backend
        .append_column(key)
        .await
        .map_err(|e| RunsheetError::backend("append_column", e))?;
    snapshot.add_column(key, col - 1);
    info!(key, column = col, "created config column");
    Ok(col)
}
