//! SessionBuilder - WorkerSession の構築とワイヤリング
//!
//! # ポイント
//! - Builder パターン（backend 以外はすべて default あり）
//! - 起動時検証（Fail-fast: table が読めない・期待する key が無いなら build で失敗）

use std::sync::Arc;

use tracing::{info, warn};

use crate::claim::ClaimPolicy;
use crate::domain::{DecimalFormat, RunsheetError, WorkerToken};
use crate::ports::{AlphanumericTokens, Clock, SystemClock, TableBackend, TokenGenerator};
use crate::session::WorkerSession;
use crate::settings::RunsheetSettings;
use crate::table::TableSnapshot;

/// SessionBuilder は WorkerSession を構築
///
/// # 使用例
/// ```ignore
/// let session = SessionBuilder::new(Arc::new(CsvFileTable::new("runs.csv")))
///     .settings(&settings)
///     .expect_keys(&["lr", "epochs"])
///     .build()
///     .await?;
/// ```
///
/// # Fail-fast 設計
/// - build() で table を 1 回読み、形式（key 行・default 行・予約列）を検証
/// - expect_keys() で指定した config key が table に無ければ BuildError
pub struct SessionBuilder {
    backend: Arc<dyn TableBackend>,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
    token: Option<WorkerToken>,
    policy: ClaimPolicy,
    format: DecimalFormat,
    highlight: bool,
    expected_keys: Option<Vec<String>>,
}

/// BuildError は session 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Table(#[from] RunsheetError),

    #[error("Missing config keys: {0:?}. These keys were expected but the table has no such column.")]
    MissingConfigKeys(Vec<String>),
}

impl SessionBuilder {
    pub fn new(backend: Arc<dyn TableBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(AlphanumericTokens::default()),
            token: None,
            policy: ClaimPolicy::default(),
            format: DecimalFormat::default(),
            highlight: true,
            expected_keys: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Use a fixed token instead of generating one.
    pub fn worker_token(mut self, token: WorkerToken) -> Self {
        self.token = Some(token);
        self
    }

    pub fn policy(mut self, policy: ClaimPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn decimal_format(mut self, format: DecimalFormat) -> Self {
        self.format = format;
        self
    }

    /// Enable or disable cosmetic cell formatting.
    pub fn highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Apply policy, decimal format and highlighting from settings.
    pub fn settings(self, settings: &RunsheetSettings) -> Self {
        self.policy(settings.claim_policy())
            .decimal_format(settings.decimal_format())
            .highlight(settings.worker.highlight)
    }

    /// 期待される config key のリストを設定
    pub fn expect_keys(mut self, keys: &[&str]) -> Self {
        self.expected_keys = Some(keys.iter().map(|key| key.to_string()).collect());
        self
    }

    /// Read the table once, validate it, and return a ready session.
    pub async fn build(self) -> Result<WorkerSession, BuildError> {
        let rows = self
            .backend
            .read_table()
            .await
            .map_err(|e| RunsheetError::backend("read_table", e))?;
        let snapshot = TableSnapshot::from_rows(rows, self.format)?;

        if let Some(expected_keys) = &self.expected_keys {
            let missing_keys: Vec<String> = expected_keys
                .iter()
                .filter(|key| !snapshot.config_keys().contains(key))
                .cloned()
                .collect();
            if !missing_keys.is_empty() {
                return Err(BuildError::MissingConfigKeys(missing_keys));
            }
        }

        if self.policy.settle_interval.is_zero() {
            warn!("settle interval is zero: concurrent claims will not be detected");
        }

        let token = self.token.unwrap_or_else(|| self.tokens.generate());
        info!(
            worker = %token,
            runs = snapshot.run_count(),
            config_keys = snapshot.config_keys().len(),
            "connected to table"
        );

        Ok(WorkerSession::new(
            self.backend,
            self.clock,
            self.policy,
            self.format,
            self.highlight,
            token,
            snapshot,
        ))
    }
}
