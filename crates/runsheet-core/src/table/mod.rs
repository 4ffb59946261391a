//! Table module: snapshot parsing, schema, and run lookups.

mod registry;
pub(crate) mod snapshot;

pub use registry::{RunRegistry, ensure_column};
pub use snapshot::{RunRow, Schema, TableSnapshot};
