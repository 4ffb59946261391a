//! Table snapshot: one full download of the table, parsed and coerced.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::domain::{
    CellValue, DecimalFormat, KEY_RUN_NAME, KEY_STATUS, KEY_WORKER_NAME, RESERVED_KEYS, Result,
    RunId, RunStatus, RunsheetError, is_reserved_key,
};

/// Growable ordered map from key to 0-based column.
///
/// Keys are never removed. If row 1 lists the same key twice (two workers
/// created it concurrently) the last column wins the lookup; the duplicate is
/// left in the table as-is.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    keys: Vec<String>,
    columns: HashMap<String, usize>,
}

impl Schema {
    fn from_header(header: &[String]) -> Self {
        let mut schema = Schema::default();
        for (col, key) in header.iter().enumerate() {
            if key.is_empty() {
                continue;
            }
            schema.push(key.clone(), col);
        }
        schema
    }

    pub(crate) fn push(&mut self, key: String, col: usize) {
        if !self.columns.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.columns.insert(key, col);
    }

    /// 0-based column of `key`.
    pub fn column(&self, key: &str) -> Option<usize> {
        self.columns.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.columns.contains_key(key)
    }

    /// All keys in header order (deduplicated).
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

/// One run row.
///
/// Reserved cells stay raw strings; config cells are coerced (empty = inherit default).
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub run_id: RunId,
    pub run_name: String,
    pub status: String,
    pub worker_name: String,
    pub cells: BTreeMap<String, CellValue>,
}

impl RunRow {
    pub fn status(&self) -> RunStatus {
        RunStatus::parse(&self.status)
    }

    /// `status == "ready"` and nobody has written a worker name yet.
    pub fn is_claimable(&self) -> bool {
        self.status().is_ready() && self.worker_name.is_empty()
    }

    /// Stored cell for a config key (`""` when absent).
    pub fn cell(&self, key: &str) -> CellValue {
        self.cells.get(key).cloned().unwrap_or_else(CellValue::empty)
    }
}

/// Structured view of the whole table at one point in time.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    schema: Schema,
    config_keys: Vec<String>,
    defaults: BTreeMap<String, CellValue>,
    runs: Vec<RunRow>,
    width: usize,
    format: DecimalFormat,
}

impl TableSnapshot {
    /// Parse raw backend rows.
    ///
    /// Row 1 = keys, row 2 = defaults, rows 3.. = runs. Missing trailing cells read as `""`.
    pub fn from_rows(rows: Vec<Vec<String>>, format: DecimalFormat) -> Result<Self> {
        if rows.len() < 2 {
            return Err(RunsheetError::MalformedTable(format!(
                "expected a key row and a default row, found {} row(s)",
                rows.len()
            )));
        }

        let schema = Schema::from_header(&rows[0]);
        let missing: Vec<&str> = RESERVED_KEYS
            .iter()
            .copied()
            .filter(|key| !schema.contains(key))
            .collect();
        if !missing.is_empty() {
            return Err(RunsheetError::MalformedTable(format!(
                "missing reserved column(s): {}",
                missing.join(", ")
            )));
        }

        let config_keys: Vec<String> = schema
            .keys()
            .iter()
            .filter(|key| !is_reserved_key(key))
            .cloned()
            .collect();

        let width = rows.iter().map(Vec::len).max().unwrap_or(0);

        let defaults = config_keys
            .iter()
            .map(|key| {
                let raw = raw_cell(&rows[1], schema.column(key));
                (key.clone(), format.parse(raw))
            })
            .collect();

        let runs = rows[2..]
            .iter()
            .enumerate()
            .map(|(index, row)| RunRow {
                run_id: RunId::new(index),
                run_name: raw_cell(row, schema.column(KEY_RUN_NAME)).to_string(),
                status: raw_cell(row, schema.column(KEY_STATUS)).to_string(),
                worker_name: raw_cell(row, schema.column(KEY_WORKER_NAME)).to_string(),
                cells: config_keys
                    .iter()
                    .map(|key| (key.clone(), format.parse(raw_cell(row, schema.column(key)))))
                    .collect(),
            })
            .collect::<Vec<_>>();

        debug!(
            runs = runs.len(),
            config_keys = config_keys.len(),
            width,
            "table snapshot parsed"
        );

        Ok(Self {
            schema,
            config_keys,
            defaults,
            runs,
            width,
            format,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// All keys except `run_name`, `status` and `worker_name`, in column order.
    pub fn config_keys(&self) -> &[String] {
        &self.config_keys
    }

    pub fn defaults(&self) -> &BTreeMap<String, CellValue> {
        &self.defaults
    }

    pub fn runs(&self) -> &[RunRow] {
        &self.runs
    }

    pub fn run(&self, run_id: RunId) -> Option<&RunRow> {
        self.runs.get(run_id.index())
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of columns in the widest row.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn decimal_format(&self) -> DecimalFormat {
        self.format
    }

    /// 1-based column of `key`, if the table has it.
    pub fn key_column(&self, key: &str) -> Option<usize> {
        self.schema.column(key).map(|col| col + 1)
    }

    /// Record a column the backend just appended (0-based `col`).
    pub(crate) fn add_column(&mut self, key: &str, col: usize) {
        self.schema.push(key.to_string(), col);
        self.width = self.width.max(col + 1);
        if is_reserved_key(key) || self.config_keys.iter().any(|k| k == key) {
            return;
        }
        self.config_keys.push(key.to_string());
        self.defaults.insert(key.to_string(), CellValue::empty());
        for run in &mut self.runs {
            run.cells.insert(key.to_string(), CellValue::empty());
        }
    }
}

fn raw_cell(row: &[String], col: Option<usize>) -> &str {
    col.and_then(|c| row.get(c)).map(String::as_str).unwrap_or("")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn rows(table: &[&[&str]]) -> Vec<Vec<String>> {
        table
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    #[test]
    fn parses_defaults_and_runs() {
        let snapshot = TableSnapshot::from_rows(
            rows(&[
                &["run_name", "status", "worker_name", "lr", "optimizer"],
                &["", "", "", "0.1", "adam"],
                &["baseline", "ready", "", "", ""],
                &["big-lr", "done", "Xy12ab", "0.5", "sgd"],
            ]),
            DecimalFormat::Period,
        )
        .unwrap();

        assert_eq!(snapshot.config_keys(), ["lr", "optimizer"]);
        assert_eq!(snapshot.defaults()["lr"], CellValue::Float(0.1));
        assert_eq!(snapshot.run_count(), 2);

        let run = snapshot.run(RunId::new(1)).unwrap();
        assert_eq!(run.run_name, "big-lr");
        assert_eq!(run.worker_name, "Xy12ab");
        assert_eq!(run.cell("lr"), CellValue::Float(0.5));
        assert!(snapshot.run(RunId::new(0)).unwrap().is_claimable());
        assert!(!run.is_claimable());
    }

    #[test]
    fn reserved_cells_stay_raw() {
        let snapshot = TableSnapshot::from_rows(
            rows(&[
                &["run_name", "status", "worker_name"],
                &["", "", ""],
                &["42", "ready", "007"],
            ]),
            DecimalFormat::Comma,
        )
        .unwrap();

        let run = snapshot.run(RunId::new(0)).unwrap();
        assert_eq!(run.run_name, "42");
        assert_eq!(run.worker_name, "007");
        assert!(run.cells.is_empty());
    }

    #[test]
    fn ragged_rows_read_as_empty_cells() {
        let snapshot = TableSnapshot::from_rows(
            rows(&[
                &["run_name", "status", "worker_name", "epochs"],
                &["", "", "", "10"],
                &["short", "ready"],
            ]),
            DecimalFormat::Period,
        )
        .unwrap();

        let run = snapshot.run(RunId::new(0)).unwrap();
        assert_eq!(run.worker_name, "");
        assert!(run.cell("epochs").is_empty());
        assert_eq!(snapshot.width(), 4);
    }

    #[test]
    fn comma_mode_normalizes_config_cells() {
        let snapshot = TableSnapshot::from_rows(
            rows(&[
                &["run_name", "status", "worker_name", "lr"],
                &["", "", "", "-2,5E-3"],
            ]),
            DecimalFormat::Comma,
        )
        .unwrap();

        assert_eq!(snapshot.defaults()["lr"], CellValue::Float(-0.0025));
    }

    #[test]
    fn fewer_than_two_rows_is_malformed() {
        let err = TableSnapshot::from_rows(
            rows(&[&["run_name", "status", "worker_name"]]),
            DecimalFormat::Period,
        )
        .unwrap_err();
        assert!(matches!(err, RunsheetError::MalformedTable(_)));

        let err = TableSnapshot::from_rows(Vec::new(), DecimalFormat::Period).unwrap_err();
        assert!(matches!(err, RunsheetError::MalformedTable(_)));
    }

    #[test]
    fn missing_reserved_column_is_malformed() {
        let err = TableSnapshot::from_rows(
            rows(&[&["run_name", "status", "lr"], &["", "", "0.1"]]),
            DecimalFormat::Period,
        )
        .unwrap_err();
        match err {
            RunsheetError::MalformedTable(msg) => assert!(msg.contains("worker_name")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn blank_headers_are_ignored_and_duplicates_use_last_column() {
        let snapshot = TableSnapshot::from_rows(
            rows(&[
                &["run_name", "status", "worker_name", "", "lr", "lr"],
                &["", "", "", "junk", "0.1", "0.2"],
            ]),
            DecimalFormat::Period,
        )
        .unwrap();

        assert_eq!(snapshot.config_keys(), ["lr"]);
        assert_eq!(snapshot.key_column("lr"), Some(6));
        assert_eq!(snapshot.defaults()["lr"], CellValue::Float(0.2));
    }
}
