//! Domain identifiers.
//!
//! - `RunId`: row 位置から導出される 0 始まりの番号（row 3 が run 0）
//! - `WorkerToken`: worker プロセスごとのランダムな短い名前。`worker_name` セルに書き込む排他トークン

use serde::{Deserialize, Serialize};
use std::fmt;

/// First table row (1-based) that holds a run. Row 1 = keys, row 2 = defaults.
pub const FIRST_RUN_ROW: usize = 3;

/// Zero-based run index (`row - 3`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(usize);

impl RunId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }

    /// 1-based table row holding this run.
    pub fn table_row(self) -> usize {
        self.0 + FIRST_RUN_ROW
    }
}

impl From<usize> for RunId {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutual-exclusion token a worker writes into `worker_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerToken(String);

impl WorkerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for WorkerToken {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}
