//! Run status as stored in the `status` column.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const STATUS_READY: &str = "ready";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_DONE: &str = "done";

/// Status of a run row.
///
/// Transitions (driven by producers, workers and humans editing the table):
/// - Draft -> Ready (someone types "ready")
/// - Ready -> Running (claim committed)
/// - Running -> Other (progress reported by the worker) -> Done
///
/// The status cell is free text, so anything unrecognized is kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    /// Empty cell: the row is a draft and is never picked up.
    Draft,
    Ready,
    Running,
    Done,
    Other(String),
}

impl RunStatus {
    /// Classify a raw status cell. Matching is exact: "Ready" is not `Ready`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "" => RunStatus::Draft,
            STATUS_READY => RunStatus::Ready,
            STATUS_RUNNING => RunStatus::Running,
            STATUS_DONE => RunStatus::Done,
            other => RunStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Draft => "",
            RunStatus::Ready => STATUS_READY,
            RunStatus::Running => STATUS_RUNNING,
            RunStatus::Done => STATUS_DONE,
            RunStatus::Other(s) => s,
        }
    }

    /// Is this run waiting for a worker?
    pub fn is_ready(&self) -> bool {
        matches!(self, RunStatus::Ready)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Draft => f.write_str("<draft>"),
            other => f.write_str(other.as_str()),
        }
    }
}
