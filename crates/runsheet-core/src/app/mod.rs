//! App - アプリケーション層
//!
//! ports と table を組み合わせて worker session を組み立てます。
//!
//! # 主要コンポーネント
//! - **SessionBuilder**: WorkerSession の構築とワイヤリング（起動時検証つき）
//! - **StatusCounts**: table 全体の run 状態の集計

pub mod builder;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, SessionBuilder};
pub use self::status::StatusCounts;
