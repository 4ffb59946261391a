//! Worker session: the explicit per-worker context every operation runs against.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::app::status::StatusCounts;
use crate::claim::ClaimPolicy;
use crate::domain::{
    DecimalFormat, Result, RunConfig, RunId, RunsheetError, WorkerToken,
};
use crate::ports::{CellFormat, CellRange, Clock, TableBackend};
use crate::table::{RunRegistry, TableSnapshot, ensure_column};

/// The run a session currently owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveRun {
    pub run_id: RunId,
    pub run_name: String,
    /// Last resolved config seen by this worker (baseline for `reconcile_config`).
    pub config: RunConfig,
    pub claimed_at: DateTime<Utc>,
}

/// One worker's view of the shared table.
///
/// Holds the latest snapshot, the worker token, and the active run (if any).
/// Several sessions can share one backend; each behaves as an independent worker.
///
/// Build with [`crate::app::SessionBuilder`].
pub struct WorkerSession {
    pub(crate) backend: Arc<dyn TableBackend>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) policy: ClaimPolicy,
    pub(crate) format: DecimalFormat,
    pub(crate) highlight: bool,
    pub(crate) token: WorkerToken,
    pub(crate) snapshot: TableSnapshot,
    pub(crate) active: Option<ActiveRun>,
}

impl WorkerSession {
    pub(crate) fn new(
        backend: Arc<dyn TableBackend>,
        clock: Arc<dyn Clock>,
        policy: ClaimPolicy,
        format: DecimalFormat,
        highlight: bool,
        token: WorkerToken,
        snapshot: TableSnapshot,
    ) -> Self {
        Self {
            backend,
            clock,
            policy,
            format,
            highlight,
            token,
            snapshot,
            active: None,
        }
    }

    pub fn worker_token(&self) -> &WorkerToken {
        &self.token
    }

    pub fn policy(&self) -> &ClaimPolicy {
        &self.policy
    }

    /// Snapshot from the last refresh. May be stale; decisions refresh first.
    pub fn snapshot(&self) -> &TableSnapshot {
        &self.snapshot
    }

    pub fn registry(&self) -> RunRegistry<'_> {
        RunRegistry::new(&self.snapshot)
    }

    pub fn active_run(&self) -> Option<&ActiveRun> {
        self.active.as_ref()
    }

    /// Download the whole table and replace the snapshot.
    pub async fn refresh(&mut self) -> Result<&TableSnapshot> {
        let rows = self
            .backend
            .read_table()
            .await
            .map_err(|e| RunsheetError::backend("read_table", e))?;
        self.snapshot = TableSnapshot::from_rows(rows, self.format)?;
        debug!(worker = %self.token, runs = self.snapshot.run_count(), "table refreshed");
        Ok(&self.snapshot)
    }

    /// Refresh, then return the first claimable run and its resolved config.
    ///
    /// Read-only: nothing is claimed.
    pub async fn find_ready_run(&mut self) -> Result<Option<(RunId, RunConfig)>> {
        self.refresh().await?;
        let registry = self.registry();
        match registry.find_ready_run() {
            Some(run_id) => Ok(Some((run_id, registry.resolve_config(run_id)?))),
            None => Ok(None),
        }
    }

    /// Resolved config of any run, from the current snapshot (no I/O).
    pub fn resolve_config(&self, run_id: RunId) -> Result<RunConfig> {
        self.registry().resolve_config(run_id)
    }

    /// 1-based column for `key`, creating the column if the table lacks it.
    ///
    /// Refreshes first so a column another writer added is reused rather
    /// than appended a second time.
    pub async fn key_column(&mut self, key: &str) -> Result<usize> {
        self.refresh().await?;
        ensure_column(self.backend.as_ref(), &mut self.snapshot, key).await
    }

    /// Refresh and count runs per status.
    pub async fn status_counts(&mut self) -> Result<StatusCounts> {
        self.refresh().await?;
        Ok(self.registry().status_counts())
    }

    pub(crate) fn ensure_idle(&self, action: &str) -> Result<()> {
        match &self.active {
            Some(active) => Err(RunsheetError::InvalidState(format!(
                "cannot {action}: run {} ({}) is still active",
                active.run_id, active.run_name
            ))),
            None => Ok(()),
        }
    }

    pub(crate) fn active_run_id(&self, action: &str) -> Result<RunId> {
        self.active
            .as_ref()
            .map(|active| active.run_id)
            .ok_or_else(|| RunsheetError::InvalidState(format!("cannot {action}: no active run")))
    }

    /// 1-based column of a key that must exist (reserved columns always do).
    pub(crate) fn column(&self, key: &str) -> Result<usize> {
        self.snapshot.key_column(key).ok_or_else(|| {
            RunsheetError::MalformedTable(format!("column '{key}' disappeared from the table"))
        })
    }

    pub(crate) async fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<()> {
        debug!(worker = %self.token, row, col, value, "write cell");
        self.backend
            .write_cell(row, col, value)
            .await
            .map_err(|e| RunsheetError::backend("write_cell", e))
    }

    /// Best-effort cosmetic hint; failures are logged and ignored.
    pub(crate) async fn highlight(&self, range: CellRange, format: CellFormat) {
        if !self.highlight {
            return;
        }
        if let Err(e) = self.backend.format_cells(range, format).await {
            warn!(error = %e, ?format, "failed to apply cell format");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::app::SessionBuilder;
    use crate::domain::CellValue;
    use crate::impls::InMemoryTable;
    use crate::ports::FixedClock;
    use chrono::TimeZone;

    pub(crate) fn fixed_clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    /// Columns [run_name, status, worker_name, lr], default lr = 0.1.
    pub(crate) fn lr_table(runs: &[&[&str]]) -> InMemoryTable {
        let mut rows: Vec<&[&str]> = vec![
            &["run_name", "status", "worker_name", "lr"][..],
            &["", "", "", "0.1"][..],
        ];
        rows.extend_from_slice(runs);
        InMemoryTable::from_rows(&rows)
    }

    pub(crate) async fn session_with_clock(
        table: &InMemoryTable,
        token: &str,
        clock: Arc<dyn Clock>,
    ) -> WorkerSession {
        SessionBuilder::new(Arc::new(table.clone()))
            .clock(clock)
            .worker_token(WorkerToken::new(token))
            .build()
            .await
            .unwrap()
    }

    pub(crate) async fn session(table: &InMemoryTable, token: &str) -> WorkerSession {
        session_with_clock(table, token, fixed_clock()).await
    }

    #[tokio::test]
    async fn find_ready_run_returns_first_ready_run_with_defaults() {
        let table = lr_table(&[&["first", "running", "AAAAAA", ""], &["second", "ready", "", ""]]);
        let mut session = session(&table, "W1").await;

        let (run_id, config) = session.find_ready_run().await.unwrap().unwrap();

        assert_eq!(run_id, RunId::new(1));
        assert_eq!(config.get("lr"), Some(&CellValue::Float(0.1)));
        assert_eq!(config.len(), 1);
    }

    #[tokio::test]
    async fn find_ready_run_is_none_without_ready_rows() {
        let table = lr_table(&[&["draft", "", "", ""]]);
        let mut session = session(&table, "W1").await;
        assert!(session.find_ready_run().await.unwrap().is_none());
        assert_eq!(table.write_count().await, 0);
    }

    #[tokio::test]
    async fn refresh_sees_external_edits() {
        let table = lr_table(&[&["a", "", "", ""]]);
        let mut session = session(&table, "W1").await;
        assert!(session.find_ready_run().await.unwrap().is_none());

        table.edit_cell(3, 2, "ready").await;

        assert!(session.find_ready_run().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn refresh_failure_is_backend_unavailable() {
        let table = lr_table(&[]);
        let mut session = session(&table, "W1").await;
        table.set_offline(true).await;

        let err = session.refresh().await.unwrap_err();

        assert!(matches!(
            err,
            RunsheetError::BackendUnavailable { op: "read_table", .. }
        ));
    }

    #[tokio::test]
    async fn key_column_creates_missing_columns() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = session(&table, "W1").await;

        assert_eq!(session.key_column("status").await.unwrap(), 2);
        assert_eq!(session.key_column("dropout").await.unwrap(), 5);

        assert_eq!(table.cell(1, 5).await, "dropout");
        assert!(session.snapshot().config_keys().iter().any(|k| k == "dropout"));
    }

    #[tokio::test]
    async fn key_column_sees_columns_created_by_others() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = session(&table, "W1").await;
        table.edit_cell(1, 5, "dropout").await;

        assert_eq!(session.key_column("dropout").await.unwrap(), 5);

        assert_eq!(table.rows().await[0].len(), 5);
        assert_eq!(table.write_count().await, 0);
    }

    #[tokio::test]
    async fn status_counts_reflect_the_table() {
        let table = lr_table(&[&["a", "ready", "", ""], &["b", "done", "X", ""]]);
        let mut session = session(&table, "W1").await;

        let counts = session.status_counts().await.unwrap();

        assert_eq!(counts.ready, 1);
        assert_eq!(counts.done, 1);
    }
}
