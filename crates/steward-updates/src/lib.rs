mod aggregator;
mod extensions;
mod normalize;
mod presenter;
mod telemetry;

pub use aggregator::{LocalCore, UpdateAggregator, UPDATE_INFO_CACHE_KEY};
pub use extensions::{ExtensionDirectory, FsExtensionDirectory, InstalledExtension};
pub use normalize::build_snapshot;
pub use presenter::{build_update_entries, core_version_label, render_notes};
pub use telemetry::{
    CoreCheck, DisabledTelemetryClient, ExtensionCheck, HttpTelemetryClient, RemoteCoreInfo,
    RemoteExtensionInfo, RemoteRelease, TelemetryClient, TelemetryRequest, TelemetryResponse,
};

#[cfg(test)]
mod tests;
