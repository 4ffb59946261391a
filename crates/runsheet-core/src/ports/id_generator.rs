//! TokenGenerator port - worker 名の生成
//!
//! worker 名は `worker_name` セルに書き込む排他トークンです。
//! 調整サーバーがないので、各 worker が独立にランダムな名前を作ります。
//!
//! # 実装
//! - **AlphanumericTokens**: `[A-Za-z0-9]` からランダムに選ぶ（本番用）

use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::domain::WorkerToken;

/// Default token length. 62^6 ≈ 5.7e10 possible names, plenty for human-scale worker counts.
pub const DEFAULT_TOKEN_LEN: usize = 6;

/// TokenGenerator は worker ごとの排他トークンを生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（builder 経由で共有されるため）
pub trait TokenGenerator: Send + Sync {
    fn generate(&self) -> WorkerToken;
}

#[derive(Debug, Clone, Copy)]
pub struct AlphanumericTokens {
    len: usize,
}

impl AlphanumericTokens {
    pub fn new(len: usize) -> Self {
        Self { len }
    }
}

impl Default for AlphanumericTokens {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_LEN)
    }
}

impl TokenGenerator for AlphanumericTokens {
    fn generate(&self) -> WorkerToken {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.len)
            .map(char::from)
            .collect();
        WorkerToken::new(token)
    }
}
