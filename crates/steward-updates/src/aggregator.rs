use std::time::Duration;

use anyhow::{Context, Result};
use steward_cache::CacheStore;
use steward_core::{UpdateEntry, UpdateSnapshot};
use tracing::{debug, info, warn};

use crate::{
    build_snapshot, build_update_entries, CoreCheck, ExtensionCheck, ExtensionDirectory,
    InstalledExtension, TelemetryClient, TelemetryRequest,
};

pub const UPDATE_INFO_CACHE_KEY: &str = "updateInfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalCore {
    pub name: String,
    pub version: String,
    pub build: String,
}

pub struct UpdateAggregator<'a> {
    cache: &'a dyn CacheStore,
    telemetry: &'a dyn TelemetryClient,
    extensions: &'a dyn ExtensionDirectory,
    core: LocalCore,
    ttl: Duration,
    snapshot: Option<UpdateSnapshot>,
}

impl<'a> UpdateAggregator<'a> {
    pub fn new(
        cache: &'a dyn CacheStore,
        telemetry: &'a dyn TelemetryClient,
        extensions: &'a dyn ExtensionDirectory,
        core: LocalCore,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            telemetry,
            extensions,
            core,
            ttl,
            snapshot: None,
        }
    }

    pub fn core(&self) -> &LocalCore {
        &self.core
    }

    pub fn loaded_snapshot(&self) -> Option<&UpdateSnapshot> {
        self.snapshot.as_ref()
    }

    /// A cold cache answers `None` unless `force_refresh` is set.
    pub fn get_snapshot(&mut self, force_refresh: bool) -> Option<&UpdateSnapshot> {
        if !force_refresh && !self.is_snapshot_cached() {
            debug!("no update info cached; skipping remote check");
            return None;
        }

        if self.snapshot.is_none() || force_refresh {
            let cached = if force_refresh {
                None
            } else {
                self.read_cached_snapshot()
            };

            let snapshot = match cached {
                Some(snapshot) => snapshot,
                None => {
                    let fresh = self.fetch_snapshot();
                    self.store_snapshot(&fresh);
                    fresh
                }
            };
            self.snapshot = Some(snapshot);
        }

        self.snapshot.as_ref()
    }

    pub fn is_snapshot_cached(&self) -> bool {
        if self.snapshot.is_some() {
            return true;
        }
        match self.cache.contains(UPDATE_INFO_CACHE_KEY) {
            Ok(present) => present,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed probing update info cache");
                false
            }
        }
    }

    pub fn is_critical_update_available(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.core.critical_update_available)
    }

    pub fn is_manual_update_required(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|snapshot| snapshot.core.manual_update_required)
    }

    pub fn flush(&mut self) -> bool {
        info!("flushing update info from cache");
        self.snapshot = None;
        match self.cache.delete(UPDATE_INFO_CACHE_KEY) {
            Ok(removed) => removed,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed flushing update info cache");
                false
            }
        }
    }

    pub fn list_available_updates(&mut self, force_refresh: bool) -> Option<Vec<UpdateEntry>> {
        let core_name = self.core.name.clone();
        let snapshot = self.get_snapshot(force_refresh)?;
        Some(build_update_entries(snapshot, &core_name))
    }

    pub fn build_request(&self) -> Result<(TelemetryRequest, Vec<InstalledExtension>)> {
        let installed = self
            .extensions
            .enabled_extensions()
            .context("failed listing enabled extensions")?;
        let request = TelemetryRequest {
            core: CoreCheck {
                local_version: self.core.version.clone(),
                local_build: self.core.build.clone(),
            },
            extensions: installed
                .iter()
                .map(|extension| ExtensionCheck {
                    id: extension.id.clone(),
                    local_version: extension.version.clone(),
                })
                .collect(),
        };
        Ok((request, installed))
    }

    pub fn remote_check(&self) -> Result<UpdateSnapshot> {
        let (request, installed) = self.build_request()?;
        let response = self
            .telemetry
            .check(&request)
            .context("remote update check failed")?;
        Ok(match response {
            Some(response) => build_snapshot(&request, &installed, response),
            None => {
                debug!("telemetry authority returned no update data");
                UpdateSnapshot::empty()
            }
        })
    }

    fn fetch_snapshot(&self) -> UpdateSnapshot {
        match self.remote_check() {
            Ok(snapshot) => {
                info!(
                    core_update = snapshot.core.update_available(),
                    extensions = snapshot.extensions.len(),
                    "fetched update info"
                );
                snapshot
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "update check failed; reporting no updates");
                UpdateSnapshot::empty()
            }
        }
    }

    fn read_cached_snapshot(&self) -> Option<UpdateSnapshot> {
        let raw = match self.cache.get(UPDATE_INFO_CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("update info cache miss");
                return None;
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed reading update info cache");
                return None;
            }
        };

        match serde_json::from_str::<UpdateSnapshot>(&raw) {
            Ok(snapshot) => {
                debug!("update info cache hit");
                Some(snapshot)
            }
            Err(err) => {
                warn!(error = %err, "cached update info is unreadable; refetching");
                None
            }
        }
    }

    fn store_snapshot(&self, snapshot: &UpdateSnapshot) {
        let encoded = match serde_json::to_string(snapshot) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed encoding update info for cache");
                return;
            }
        };
        if let Err(err) = self.cache.set(UPDATE_INFO_CACHE_KEY, &encoded, self.ttl) {
            warn!(error = %format!("{err:#}"), "failed caching update info");
        }
    }
}
