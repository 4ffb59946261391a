//! runsheet-core
//!
//! Core building blocks for runsheet: workers that claim runs from a shared table.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（value, status, ids, config, errors）
//! - **ports**: 抽象化レイヤー（TableBackend, Clock, TokenGenerator）
//! - **table**: table の snapshot と run registry
//! - **claim**: find → claim → verify → commit の optimistic claim protocol
//! - **sync**: 実行中の run の status 報告・config 再同期・終了
//! - **writer**: producer 側（run の追加）
//! - **session**: worker ごとの明示的なコンテキスト
//! - **app**: SessionBuilder と集計
//! - **settings**: TOML 設定
//! - **impls**: 実装（InMemoryTable, CsvFileTable）

pub mod app;
pub mod claim;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod session;
pub mod settings;
pub mod sync;
pub mod table;
pub mod writer;

pub use app::{BuildError, SessionBuilder, StatusCounts};
pub use claim::{ClaimPolicy, ClaimVerdict, ClaimedRun, LostReason};
pub use domain::{CellValue, DecimalFormat, ErrorKind, RunConfig, RunId, RunsheetError, WorkerToken};
pub use session::{ActiveRun, WorkerSession};
pub use settings::RunsheetSettings;
pub use sync::ConfigUpdate;
pub use writer::{RunSpec, RunWriter};
