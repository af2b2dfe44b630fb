mod apply;
mod executor;
mod fs_utils;
mod quiesce;
mod system;
mod writability;

pub use apply::{apply_update, preflight, ApplyContext, UpdateOutcome};
pub use executor::{CommandUpdateExecutor, UpdateExecutor, UpdateTarget};
pub use quiesce::{QuiescenceController, QuiescenceGuard, QuiescenceRecord};
pub use system::{current_unix_timestamp, FsSystemController, SystemController};
pub use writability::{unwritable_paths, FsWritabilityProbe, WritabilityProbe};
