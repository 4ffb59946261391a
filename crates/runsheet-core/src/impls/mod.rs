//! Impls - ports の実装
//!
//! - **InMemoryTable**: テスト・開発用の共有 table
//! - **CsvFileTable**: ローカル CSV ファイル（複数プロセスで共有可能）

mod csv_table;
mod inmem_table;

pub use csv_table::CsvFileTable;
pub use inmem_table::InMemoryTable;
