//! Errors - エラー型と分類
//!
//! claim の競合（他 worker に取られた）はエラーではなく `ClaimVerdict::Lost` として返す。
//! ここに並ぶのは呼び出し側に伝播させるものだけ。

use thiserror::Error;

use super::ids::RunId;

/// ErrorKind は呼び出し側のリトライ判断のための分類
///
/// - Permanent: 恒久的なエラー（リトライ無意味）
/// - Infrastructure: backend（table ストレージ）の障害。リトライ方針は呼び出し側が決める
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permanent,
    Infrastructure,
}

/// Failure reported by a `TableBackend` implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunsheetError {
    #[error("table backend unavailable during {op}: {source}")]
    BackendUnavailable {
        op: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("malformed table: {0}")]
    MalformedTable(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("run {0} does not exist")]
    RunNotFound(RunId),

    #[error("key '{0}' is reserved and cannot be set in a run config")]
    ReservedKey(String),
}

impl RunsheetError {
    pub fn backend(op: &'static str, source: BackendError) -> Self {
        RunsheetError::BackendUnavailable { op, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RunsheetError::BackendUnavailable { .. } => ErrorKind::Infrastructure,
            _ => ErrorKind::Permanent,
        }
    }
}

pub type Result<T, E = RunsheetError> = std::result::Result<T, E>;
