//! Status - table 全体の run 状態の集計
//!
//! CLI の `status` コマンドやログ出力で使う。

use serde::{Deserialize, Serialize};

use crate::domain::RunStatus;
use crate::table::RunRow;

/// Number of runs per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: usize,
    pub ready: usize,
    /// Ready but with a worker name written: a claim is in flight (or was abandoned).
    pub claiming: usize,
    pub running: usize,
    pub done: usize,
    pub other: usize,
}

impl StatusCounts {
    pub fn from_runs(runs: &[RunRow]) -> Self {
        let mut counts = StatusCounts::default();
        for run in runs {
            match run.status() {
                RunStatus::Draft => counts.draft += 1,
                RunStatus::Ready if run.worker_name.is_empty() => counts.ready += 1,
                RunStatus::Ready => counts.claiming += 1,
                RunStatus::Running => counts.running += 1,
                RunStatus::Done => counts.done += 1,
                RunStatus::Other(_) => counts.other += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.draft + self.ready + self.claiming + self.running + self.done + self.other
    }
}
