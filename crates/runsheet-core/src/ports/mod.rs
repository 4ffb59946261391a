//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! claim protocol は table・時刻・worker 名をすべてここ経由で扱うので、
//! ネットワークなしでテストできます。
//!
//! # 設計原則
//! - 共有 table が唯一の source of truth（worker 間に共有メモリはない）
//! - 判断の直前には必ず table 全体を読み直す
//! - settle 待ちは Clock 経由（テストで差し替え可能）

pub mod clock;
pub mod id_generator;
pub mod table_backend;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{AlphanumericTokens, TokenGenerator};
pub use self::table_backend::{CellFormat, CellRange, TableBackend};
