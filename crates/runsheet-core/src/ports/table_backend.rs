//! TableBackend port - 共有 table（スプレッドシートなど）へのアクセス
//!
//! TableBackend は worker 間で共有される唯一の状態です。
//!
//! # 前提
//! - トランザクションなし、行ロックなし、compare-and-swap なし
//! - 読み取りは eventually fresh（他 worker の書き込みがすぐ見えるとは限らない）
//! - 行・列は 1 始まり（row 1 = key 名、row 2 = default 値、row 3.. = run）
//!
//! # 実装
//! - **InMemoryTable**: テスト用（`impls::inmem_table`）
//! - **CsvFileTable**: ローカルの CSV ファイルを共有 table として使う（`impls::csv_table`）

use async_trait::async_trait;

use crate::domain::BackendError;

/// A rectangular block of cells, 1-based and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRange {
    pub first_row: usize,
    pub first_col: usize,
    pub last_row: usize,
    pub last_col: usize,
}

impl CellRange {
    pub fn cell(row: usize, col: usize) -> Self {
        Self {
            first_row: row,
            first_col: col,
            last_row: row,
            last_col: col,
        }
    }

    pub fn row(row: usize, width: usize) -> Self {
        Self {
            first_row: row,
            first_col: 1,
            last_row: row,
            last_col: width.max(1),
        }
    }
}

/// Cosmetic hint for humans looking at the table.
///
/// Purely a side channel: nothing in the protocol reads it back, and a backend
/// may render it however it likes (or not at all).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellFormat {
    /// Row claimed by a worker and now running.
    ClaimedRow,
    /// Config cell filled in from the column default at claim time.
    InheritedValue,
    /// Config cell edited externally while the run was live.
    ChangedValue,
    /// Row finished by its worker.
    FinishedRow,
}

/// TableBackend は共有 table への最小限の capability
///
/// # 設計原則
/// - `read_table` は毎回 table 全体を返す（部分キャッシュはしない）
/// - 書き込みは 1 セル単位の上書きのみ
/// - `append_column` は row 1 の末尾に列を追加し、その列番号を返す
/// - 失敗はすべて `BackendError`（リトライは呼び出し側の責任）
#[async_trait]
pub trait TableBackend: Send + Sync {
    /// Download every row as raw cell strings. Rows may be ragged.
    async fn read_table(&self) -> Result<Vec<Vec<String>>, BackendError>;

    /// Overwrite one cell (1-based), growing the table if needed.
    async fn write_cell(&self, row: usize, col: usize, value: &str) -> Result<(), BackendError>;

    /// Add `name` as a new column at the end of row 1. Returns its 1-based index.
    async fn append_column(&self, name: &str) -> Result<usize, BackendError>;

    /// Apply a cosmetic hint. Backends without formatting keep the default no-op.
    async fn format_cells(&self, _range: CellRange, _format: CellFormat) -> Result<(), BackendError> {
        Ok(())
    }
}
