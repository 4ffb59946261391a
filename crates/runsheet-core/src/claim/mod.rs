//! Claim module: the optimistic find -> claim -> verify -> commit protocol.
//!
//! State machine per attempt:
//! - Searching -> (no ready run) done, nothing claimed
//! - Searching -> Claiming -> Lost (someone got there first)
//! - Searching -> Claiming -> [settle] -> Verifying -> Lost (token overwritten / status changed)
//! - Searching -> Claiming -> [settle] -> Verifying -> Committed
//! - Lost -> Searching (while the retry budget lasts) | Exhausted
//!
//! Known gap: two workers that both write before either write is visible will
//! both verify successfully and both run the same row. The settle interval
//! narrows that window; nothing closes it.

mod policy;
mod protocol;

pub use policy::ClaimPolicy;

use std::fmt;

use serde::Serialize;

use crate::domain::{RunConfig, RunId};

/// Protocol states, used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Searching,
    Claiming,
    Verifying,
    Committed,
    Lost,
    Exhausted,
}

impl ClaimState {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimState::Searching => "searching",
            ClaimState::Claiming => "claiming",
            ClaimState::Verifying => "verifying",
            ClaimState::Committed => "committed",
            ClaimState::Lost => "lost",
            ClaimState::Exhausted => "exhausted",
        }
    }
}

impl fmt::Display for ClaimState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a claim attempt ended in `Lost`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LostReason {
    /// Status was no longer "ready" (`status` holds the raw cell).
    NotReady { status: String },
    /// Another worker's token was already there before we wrote ours.
    AlreadyClaimed { worker: String },
    /// Our token was overwritten during the settle interval.
    Stolen { worker: String },
}

impl fmt::Display for LostReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LostReason::NotReady { status } => write!(f, "run is not ready (status: {status:?})"),
            LostReason::AlreadyClaimed { worker } => {
                write!(f, "run is already claimed by worker <{worker}>")
            }
            LostReason::Stolen { worker } => write!(f, "claim was taken over by worker <{worker}>"),
        }
    }
}

/// A run this worker now owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimedRun {
    pub run_id: RunId,
    pub run_name: String,
    pub config: RunConfig,
}

/// Result of one claim attempt on a specific run.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimVerdict {
    Committed(ClaimedRun),
    Lost(LostReason),
}

impl ClaimVerdict {
    pub fn is_committed(&self) -> bool {
        matches!(self, ClaimVerdict::Committed(_))
    }
}
