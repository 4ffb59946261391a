//! Domain model (values, statuses, IDs, configs, errors).

pub mod config;
pub mod errors;
pub mod ids;
pub mod status;
pub mod value;

pub use self::config::RunConfig;
pub use self::errors::{BackendError, ErrorKind, Result, RunsheetError};
pub use self::ids::{FIRST_RUN_ROW, RunId, WorkerToken};
pub use self::status::{RunStatus, STATUS_DONE, STATUS_READY, STATUS_RUNNING};
pub use self::value::{CellValue, DecimalFormat, coerce};

/// Reserved column names. Every table must have them in row 1.
pub const KEY_RUN_NAME: &str = "run_name";
pub const KEY_STATUS: &str = "status";
pub const KEY_WORKER_NAME: &str = "worker_name";
pub const RESERVED_KEYS: [&str; 3] = [KEY_RUN_NAME, KEY_STATUS, KEY_WORKER_NAME];

pub fn is_reserved_key(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}
