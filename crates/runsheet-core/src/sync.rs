//! Live-run synchronization: status reports, config reconciliation, finishing.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{KEY_STATUS, Result, RunConfig, RunsheetError, STATUS_DONE};
use crate::ports::{CellFormat, CellRange};
use crate::session::{ActiveRun, WorkerSession};

/// Latest config of the active run and the keys that changed since the last look.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigUpdate {
    pub config: RunConfig,
    pub changed_keys: BTreeSet<String>,
}

impl ConfigUpdate {
    pub fn has_changes(&self) -> bool {
        !self.changed_keys.is_empty()
    }
}

impl WorkerSession {
    /// Overwrite the active run's status cell (e.g. progress text).
    ///
    /// The row keeps its worker token, so it is never claimable again unless a
    /// human clears it.
    pub async fn report_status(&mut self, status: &str) -> Result<()> {
        let run_id = self.active_run_id("report a status")?;
        let status_col = self.column(KEY_STATUS)?;
        self.write_cell(run_id.table_row(), status_col, status).await?;
        info!(worker = %self.token, %run_id, status, "status reported");
        Ok(())
    }

    /// Refresh and compare the active run's config with the last one seen.
    ///
    /// Changed cells get a `ChangedValue` hint and the baseline moves forward,
    /// so each external edit is reported once.
    pub async fn reconcile_config(&mut self) -> Result<ConfigUpdate> {
        let run_id = self.active_run_id("reconcile the config")?;
        self.refresh().await?;
        let config = self.registry().resolve_config(run_id)?;

        let baseline = match &self.active {
            Some(active) => &active.config,
            None => {
                return Err(RunsheetError::InvalidState(
                    "cannot reconcile the config: no active run".to_string(),
                ));
            }
        };
        let changed_keys = config.changed_since(baseline);

        if !changed_keys.is_empty() {
            info!(
                worker = %self.token,
                %run_id,
                keys = ?changed_keys,
                "config changed while running"
            );
            for key in &changed_keys {
                if let Some(col) = self.snapshot.key_column(key) {
                    self.highlight(CellRange::cell(run_id.table_row(), col), CellFormat::ChangedValue)
                        .await;
                }
            }
        }

        if let Some(active) = self.active.as_mut() {
            active.config = config.clone();
        }
        Ok(ConfigUpdate {
            config,
            changed_keys,
        })
    }

    /// Report `status` (when given), then reconcile the config.
    pub async fn sync(&mut self, status: Option<&str>) -> Result<ConfigUpdate> {
        if let Some(status) = status {
            self.report_status(status).await?;
        }
        self.reconcile_config().await
    }

    /// Write a final status and release the session.
    ///
    /// The worker token stays in the row. The returned `ActiveRun` carries the
    /// last config this worker saw.
    pub async fn finish_run(&mut self, status: &str) -> Result<ActiveRun> {
        let run_id = self.active_run_id("finish a run")?;
        if let Err(e) = self.refresh().await {
            // stale width only affects the hint
            warn!(error = %e, "refresh before finishing failed");
        }
        let row = run_id.table_row();
        let status_col = self.column(KEY_STATUS)?;
        self.write_cell(row, status_col, status).await?;
        self.highlight(CellRange::row(row, self.snapshot.width()), CellFormat::FinishedRow)
            .await;

        let finished = self.active.take().ok_or_else(|| {
            RunsheetError::InvalidState("cannot finish a run: no active run".to_string())
        })?;
        info!(
            worker = %self.token,
            %run_id,
            run_name = %finished.run_name,
            status,
            "run finished"
        );
        Ok(finished)
    }

    /// `finish_run("done")`.
    pub async fn run_done(&mut self) -> Result<ActiveRun> {
        self.finish_run(STATUS_DONE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CellValue, RunId};
    use crate::impls::InMemoryTable;
    use crate::session::tests::{lr_table, session};

    const STATUS_COL: usize = 2;
    const WORKER_COL: usize = 3;
    const LR_COL: usize = 4;

    async fn running_session(table: &InMemoryTable) -> WorkerSession {
        let mut session = session(table, "W1").await;
        session.find_claim_and_start().await.unwrap().unwrap();
        session
    }

    #[tokio::test]
    async fn report_status_overwrites_the_status_cell() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        session.report_status("epoch 3/10").await.unwrap();

        assert_eq!(table.cell(3, STATUS_COL).await, "epoch 3/10");
        assert_eq!(table.cell(3, WORKER_COL).await, "W1");
        assert!(session.find_ready_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn operations_without_active_run_are_invalid() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = session(&table, "W1").await;

        assert!(matches!(
            session.report_status("x").await.unwrap_err(),
            RunsheetError::InvalidState(_)
        ));
        assert!(matches!(
            session.reconcile_config().await.unwrap_err(),
            RunsheetError::InvalidState(_)
        ));
        assert!(matches!(
            session.run_done().await.unwrap_err(),
            RunsheetError::InvalidState(_)
        ));
        assert_eq!(table.write_count().await, 0);
    }

    #[tokio::test]
    async fn reconcile_reports_each_external_edit_once() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        let update = session.reconcile_config().await.unwrap();
        assert!(!update.has_changes());

        table.edit_cell(3, LR_COL, "0.05").await;
        let update = session.reconcile_config().await.unwrap();
        assert_eq!(update.changed_keys, BTreeSet::from(["lr".to_string()]));
        assert_eq!(update.config.get("lr"), Some(&CellValue::Float(0.05)));
        assert_eq!(
            session.active_run().unwrap().config.get("lr"),
            Some(&CellValue::Float(0.05))
        );

        let update = session.reconcile_config().await.unwrap();
        assert!(!update.has_changes());
    }

    #[tokio::test]
    async fn reconcile_picks_up_new_columns() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        table.edit_cell(1, 5, "dropout").await;
        table.edit_cell(2, 5, "0.3").await;
        let update = session.reconcile_config().await.unwrap();

        assert_eq!(update.changed_keys, BTreeSet::from(["dropout".to_string()]));
        assert_eq!(update.config.get("dropout"), Some(&CellValue::Float(0.3)));
    }

    #[tokio::test]
    async fn changed_cells_get_a_hint() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        table.edit_cell(3, LR_COL, "1").await;
        session.reconcile_config().await.unwrap();

        let last = table.formats().await.last().copied().unwrap();
        assert_eq!(last, (CellRange::cell(3, LR_COL), CellFormat::ChangedValue));
    }

    #[tokio::test]
    async fn sync_reports_then_reconciles() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;
        table.edit_cell(2, LR_COL, "0.2").await;

        // lr was written into the run row at claim time, so the default edit
        // does not reach this run.
        let update = session.sync(Some("50%")).await.unwrap();

        assert_eq!(table.cell(3, STATUS_COL).await, "50%");
        assert!(!update.has_changes());
        assert_eq!(update.config.get("lr"), Some(&CellValue::Float(0.1)));
    }

    #[tokio::test]
    async fn run_done_releases_the_session() {
        let table = lr_table(&[&["a", "ready", "", ""], &["b", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        let finished = session.run_done().await.unwrap();

        assert_eq!(finished.run_id, RunId::new(0));
        assert_eq!(table.cell(3, STATUS_COL).await, "done");
        assert_eq!(table.cell(3, WORKER_COL).await, "W1");
        assert!(session.active_run().is_none());

        let next = session.find_claim_and_start().await.unwrap().unwrap();
        assert_eq!(next.run_id, RunId::new(1));
    }

    #[tokio::test]
    async fn finish_run_keeps_custom_status_verbatim() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;

        session.finish_run("failed (exit 1)").await.unwrap();

        assert_eq!(table.cell(3, STATUS_COL).await, "failed (exit 1)");
        let (_, format) = table.formats().await.last().copied().unwrap();
        assert_eq!(format, CellFormat::FinishedRow);
    }

    #[tokio::test]
    async fn failed_finish_keeps_the_run_active() {
        let table = lr_table(&[&["a", "ready", "", ""]]);
        let mut session = running_session(&table).await;
        table.set_offline(true).await;

        let err = session.run_done().await.unwrap_err();

        assert!(matches!(err, RunsheetError::BackendUnavailable { .. }));
        assert!(session.active_run().is_some());
    }
}
