//! InMemoryTable - テスト・開発用の共有 table
//!
//! `Clone` は同じ table を共有するので、複数の `WorkerSession` に渡せば
//! 同じプロセス内で複数 worker の競合を再現できます。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::BackendError;
use crate::ports::{CellFormat, CellRange, TableBackend};

#[derive(Debug, Default)]
struct InMemoryTableState {
    rows: Vec<Vec<String>>,

    /// Cosmetic hints received, in order.
    formats: Vec<(CellRange, CellFormat)>,

    /// When set, every call fails as if the service were unreachable.
    offline: bool,

    /// Number of successful `write_cell` calls.
    writes: usize,
}

impl InMemoryTableState {
    fn check_online(&self, op: &str) -> Result<(), BackendError> {
        if self.offline {
            return Err(BackendError::new(format!("{op}: in-memory table is offline")));
        }
        Ok(())
    }

    fn set(&mut self, row: usize, col: usize, value: &str) -> Result<(), BackendError> {
        if row == 0 || col == 0 {
            return Err(BackendError::new(format!(
                "cell ({row}, {col}) is out of range: rows and columns start at 1"
            )));
        }
        if self.rows.len() < row {
            self.rows.resize_with(row, Vec::new);
        }
        let cells = &mut self.rows[row - 1];
        if cells.len() < col {
            cells.resize(col, String::new());
        }
        cells[col - 1] = value.to_string();
        Ok(())
    }
}

/// Shared in-memory table.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTable {
    state: Arc<Mutex<InMemoryTableState>>,
}

impl InMemoryTable {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryTableState {
                rows,
                ..Default::default()
            })),
        }
    }

    pub fn from_rows(rows: &[&[&str]]) -> Self {
        Self::new(
            rows.iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        )
    }

    /// Current contents.
    pub async fn rows(&self) -> Vec<Vec<String>> {
        self.state.lock().await.rows.clone()
    }

    /// Cell text at 1-based (row, col); `""` when outside the table.
    pub async fn cell(&self, row: usize, col: usize) -> String {
        let state = self.state.lock().await;
        row.checked_sub(1)
            .and_then(|r| state.rows.get(r))
            .and_then(|cells| col.checked_sub(1).and_then(|c| cells.get(c)))
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite a cell directly, bypassing offline mode. Simulates a human or
    /// another worker editing the table.
    pub async fn edit_cell(&self, row: usize, col: usize, value: &str) {
        let mut state = self.state.lock().await;
        if let Err(e) = state.set(row, col, value) {
            tracing::warn!(error = %e, "ignored out-of-range edit");
        }
    }

    pub async fn set_offline(&self, offline: bool) {
        self.state.lock().await.offline = offline;
    }

    pub async fn formats(&self) -> Vec<(CellRange, CellFormat)> {
        self.state.lock().await.formats.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl TableBackend for InMemoryTable {
    async fn read_table(&self) -> Result<Vec<Vec<String>>, BackendError> {
        let state = self.state.lock().await;
        state.check_online("read_table")?;
        Ok(state.rows.clone())
    }

    async fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.check_online("write_cell")?;
        state.set(row, col, value)?;
        state.writes += 1;
        Ok(())
    }

    async fn append_column(&self, name: &str) -> Result<usize, BackendError> {
        let mut state = self.state.lock().await;
        state.check_online("append_column")?;
        let col = state.rows.first().map(Vec::len).unwrap_or(0) + 1;
        state.set(1, col, name)?;
        Ok(col)
    }

    async fn format_cells(&self, range: CellRange, format: CellFormat) -> Result<(), BackendError> {
        let mut state = self.state.lock().await;
        state.check_online("format_cells")?;
        state.formats.push((range, format));
        Ok(())
    }
}
