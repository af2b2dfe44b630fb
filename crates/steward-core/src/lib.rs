mod config;
mod model;
mod release;
mod version;

pub use config::{
    default_config_path, default_root, CacheConfig, CoreConfig, ExecutorConfig, PathsConfig,
    StewardConfig, StewardPaths, TelemetryConfig,
};
pub use model::{
    ComponentKind, CoreVersionInfo, ExtensionVersionInfo, ReleaseNote, UpdateEntry,
    UpdateSnapshot, VersionUpdateStatus,
};
pub use release::{any_critical, any_critical_across_extensions, any_manual_required};
pub use version::{
    compare_release_labels, derive_update_status, parse_lenient_version, sort_newest_first,
};
