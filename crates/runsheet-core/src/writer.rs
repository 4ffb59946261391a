//! Run writer: the producer side that appends new runs to the table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::{
    CellValue, DecimalFormat, KEY_RUN_NAME, KEY_STATUS, KEY_WORKER_NAME, Result, RunConfig, RunId,
    RunsheetError, STATUS_READY,
};
use crate::ports::TableBackend;
use crate::table::{TableSnapshot, ensure_column};

/// One run to enqueue.
///
/// Keys not set here inherit the column default when a worker claims the run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RunSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, flatten)]
    pub values: BTreeMap<String, CellValue>,
}

impl RunSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    fn validate(&self) -> Result<()> {
        for key in [KEY_STATUS, KEY_WORKER_NAME] {
            if self.values.contains_key(key) {
                return Err(RunsheetError::ReservedKey(key.to_string()));
            }
        }
        Ok(())
    }

    /// Explicit name, then a `run_name` value, then the run id.
    fn run_name(&self, run_id: RunId) -> String {
        self.name
            .clone()
            .or_else(|| self.values.get(KEY_RUN_NAME).map(CellValue::to_cell_string))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| run_id.to_string())
    }
}

impl From<RunConfig> for RunSpec {
    fn from(config: RunConfig) -> Self {
        Self {
            name: None,
            values: config.into_inner(),
        }
    }
}

/// Appends runs to a shared table.
pub struct RunWriter {
    backend: Arc<dyn TableBackend>,
    format: DecimalFormat,
}

impl RunWriter {
    pub fn new(backend: Arc<dyn TableBackend>, format: DecimalFormat) -> Self {
        Self { backend, format }
    }

    /// Append `runs` after the last row, in order, and mark each one ready.
    ///
    /// Per run, config cells are written first, then `run_name`, then
    /// `status = "ready"`, so a worker never sees a ready row with half its
    /// config. Keys the table lacks get new columns.
    ///
    /// Every spec is checked before anything is written.
    pub async fn write_runs(&self, runs: Vec<RunSpec>) -> Result<Vec<RunId>> {
        for run in &runs {
            run.validate()?;
        }

        let rows = self
            .backend
            .read_table()
            .await
            .map_err(|e| RunsheetError::backend("read_table", e))?;
        let mut snapshot = TableSnapshot::from_rows(rows, self.format)?;
        let first_index = snapshot.run_count();

        let mut written = Vec::with_capacity(runs.len());
        for (offset, run) in runs.iter().enumerate() {
            let run_id = RunId::new(first_index + offset);
            let row = run_id.table_row();

            for (key, value) in &run.values {
                if key == KEY_RUN_NAME || value.is_empty() {
                    continue;
                }
                let col = ensure_column(self.backend.as_ref(), &mut snapshot, key).await?;
                self.write_cell(row, col, &self.format.render(value)).await?;
            }

            let name = run.run_name(run_id);
            self.write_cell(row, self.column(&snapshot, KEY_RUN_NAME)?, &name)
                .await?;
            self.write_cell(row, self.column(&snapshot, KEY_STATUS)?, STATUS_READY)
                .await?;

            debug!(%run_id, run_name = %name, "run written");
            written.push(run_id);
        }

        info!(count = written.len(), "runs added to the table");
        Ok(written)
    }

    fn column(&self, snapshot: &TableSnapshot, key: &str) -> Result<usize> {
        snapshot
            .key_column(key)
            .ok_or_else(|| RunsheetError::MalformedTable(format!("missing reserved column: {key}")))
    }

    async fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<()> {
        self.backend
            .write_cell(row, col, value)
            .await
            .map_err(|e| RunsheetError::backend("write_cell", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryTable;
    use crate::session::tests::{lr_table, session};

    fn writer(table: &InMemoryTable, format: DecimalFormat) -> RunWriter {
        RunWriter::new(Arc::new(table.clone()), format)
    }

    #[tokio::test]
    async fn runs_are_appended_as_ready() {
        let table = lr_table(&[&["old", "done", "X", ""]]);

        let ids = writer(&table, DecimalFormat::Period)
            .write_runs(vec![
                RunSpec::named("fast").set("lr", 0.5),
                RunSpec::new(),
            ])
            .await
            .unwrap();

        assert_eq!(ids, vec![RunId::new(1), RunId::new(2)]);
        let rows = table.rows().await;
        assert_eq!(rows[3], vec!["fast", "ready", "", "0.5"]);
        assert_eq!(table.cell(5, 1).await, "2");
        assert_eq!(table.cell(5, 2).await, "ready");
        assert_eq!(table.cell(5, 4).await, "");
    }

    #[tokio::test]
    async fn status_is_written_last() {
        let table = lr_table(&[]);

        writer(&table, DecimalFormat::Period)
            .write_runs(vec![RunSpec::named("a").set("lr", 1_i64)])
            .await
            .unwrap();

        // lr, run_name, status
        assert_eq!(table.write_count().await, 3);
        let rows = table.rows().await;
        assert_eq!(rows[2], vec!["a", "ready", "", "1"]);
    }

    #[tokio::test]
    async fn unseen_keys_create_columns() {
        let table = lr_table(&[]);

        writer(&table, DecimalFormat::Period)
            .write_runs(vec![
                RunSpec::named("a").set("optimizer", "adam").set("warmup", true),
            ])
            .await
            .unwrap();

        let rows = table.rows().await;
        assert_eq!(rows[0], vec!["run_name", "status", "worker_name", "lr", "optimizer", "warmup"]);
        assert_eq!(rows[2][4..], ["adam", "TRUE"]);
    }

    #[tokio::test]
    async fn reserved_keys_are_rejected_before_writing() {
        let table = lr_table(&[]);

        let err = writer(&table, DecimalFormat::Period)
            .write_runs(vec![
                RunSpec::named("ok"),
                RunSpec::named("bad").set("worker_name", "me"),
            ])
            .await
            .unwrap_err();

        assert!(matches!(err, RunsheetError::ReservedKey(key) if key == "worker_name"));
        assert_eq!(table.write_count().await, 0);
    }

    #[tokio::test]
    async fn run_name_value_is_used_as_the_name() {
        let table = lr_table(&[]);

        writer(&table, DecimalFormat::Period)
            .write_runs(vec![RunSpec::new().set("run_name", 7_i64)])
            .await
            .unwrap();

        assert_eq!(table.cell(3, 1).await, "7");
        assert_eq!(table.rows().await[0].len(), 4);
    }

    #[tokio::test]
    async fn comma_tables_get_localized_values() {
        let table = lr_table(&[]);

        writer(&table, DecimalFormat::Comma)
            .write_runs(vec![RunSpec::named("a").set("lr", -0.0025)])
            .await
            .unwrap();

        assert_eq!(table.cell(3, 4).await, "-0,0025");
    }

    #[tokio::test]
    async fn written_runs_are_claimable_with_their_values() {
        let table = lr_table(&[]);
        writer(&table, DecimalFormat::Period)
            .write_runs(vec![RunSpec::named("a").set("lr", 0.3)])
            .await
            .unwrap();
        let mut worker = session(&table, "W1").await;

        let claimed = worker.find_claim_and_start().await.unwrap().unwrap();

        assert_eq!(claimed.run_name, "a");
        assert_eq!(claimed.config.get("lr"), Some(&CellValue::Float(0.3)));
    }

    #[test]
    fn specs_deserialize_from_json_objects() {
        let spec: RunSpec =
            serde_json::from_str(r#"{"name": "x", "lr": 0.1, "epochs": 3}"#).unwrap();

        assert_eq!(spec.name.as_deref(), Some("x"));
        assert_eq!(spec.values["lr"], CellValue::Float(0.1));
        assert_eq!(spec.values["epochs"], CellValue::Int(3));
    }
}
