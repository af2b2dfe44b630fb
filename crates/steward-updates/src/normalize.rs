use std::collections::{BTreeMap, HashMap};

use steward_core::{
    any_critical, any_manual_required, derive_update_status, sort_newest_first, CoreVersionInfo,
    ExtensionVersionInfo, ReleaseNote, UpdateSnapshot, VersionUpdateStatus,
};
use tracing::{debug, warn};

use crate::{
    CoreCheck, ExtensionCheck, InstalledExtension, RemoteCoreInfo, RemoteExtensionInfo,
    RemoteRelease, TelemetryRequest, TelemetryResponse,
};

pub fn build_snapshot(
    request: &TelemetryRequest,
    installed: &[InstalledExtension],
    response: TelemetryResponse,
) -> UpdateSnapshot {
    let TelemetryResponse {
        core,
        extensions: mut remote_extensions,
    } = response;

    let display_names = installed
        .iter()
        .map(|extension| (extension.id.as_str(), extension.name.as_str()))
        .collect::<HashMap<_, _>>();

    let mut extensions = BTreeMap::new();
    for check in &request.extensions {
        let Some(remote) = remote_extensions.remove(&check.id) else {
            debug!(id = %check.id, "telemetry response has no data for extension");
            continue;
        };
        let display_name = display_names.get(check.id.as_str()).copied();
        if let Some(info) = normalize_extension(check, display_name, remote) {
            extensions.insert(info.id.clone(), info);
        }
    }
    for id in remote_extensions.keys() {
        debug!(%id, "ignoring telemetry data for extension that was not requested");
    }

    UpdateSnapshot {
        core: normalize_core(&request.core, core),
        extensions,
    }
}

fn normalize_core(check: &CoreCheck, remote: Option<RemoteCoreInfo>) -> CoreVersionInfo {
    let unresolved = CoreVersionInfo {
        local_version: check.local_version.clone(),
        local_build: check.local_build.clone(),
        latest_version: check.local_version.clone(),
        latest_build: check.local_build.clone(),
        ..CoreVersionInfo::default()
    };

    let Some(remote) = remote else {
        return unresolved;
    };
    let Some(latest_version) = non_empty(remote.latest_version) else {
        warn!("telemetry core entry has no latest version; treating as no update");
        return unresolved;
    };
    let latest_build = non_empty(remote.latest_build).unwrap_or_default();
    let releases = normalize_releases(remote.releases);

    let status = parse_remote_status(remote.status.as_deref()).unwrap_or_else(|| {
        derive_update_status(
            &check.local_version,
            Some(&check.local_build),
            &latest_version,
            Some(&latest_build),
        )
    });

    CoreVersionInfo {
        local_version: check.local_version.clone(),
        local_build: check.local_build.clone(),
        latest_version,
        latest_build,
        status,
        critical_update_available: remote
            .critical_update_available
            .unwrap_or_else(|| any_critical(&releases)),
        manual_update_required: remote
            .manual_update_required
            .unwrap_or_else(|| any_manual_required(&releases)),
        releases,
    }
}

fn normalize_extension(
    check: &ExtensionCheck,
    display_name: Option<&str>,
    remote: RemoteExtensionInfo,
) -> Option<ExtensionVersionInfo> {
    let Some(latest_version) = non_empty(remote.latest_version) else {
        warn!(id = %check.id, "telemetry extension entry has no latest version; omitting");
        return None;
    };

    let status = parse_remote_status(remote.status.as_deref()).unwrap_or_else(|| {
        derive_update_status(&check.local_version, None, &latest_version, None)
    });
    let display_name = display_name
        .map(str::to_string)
        .or_else(|| non_empty(remote.display_name))
        .unwrap_or_else(|| check.id.clone());

    Some(ExtensionVersionInfo {
        id: check.id.clone(),
        display_name,
        local_version: check.local_version.clone(),
        latest_version,
        status,
        releases: normalize_releases(remote.releases),
    })
}

fn normalize_releases(remote: Vec<RemoteRelease>) -> Vec<ReleaseNote> {
    let mut releases = remote
        .into_iter()
        .filter_map(|release| {
            let version = non_empty(release.version)?;
            Some(ReleaseNote {
                version,
                build: non_empty(release.build),
                critical: release.critical.unwrap_or(false),
                manual_update_required: release.manual_update_required.unwrap_or(false),
                notes: release.notes.unwrap_or_default(),
            })
        })
        .collect::<Vec<_>>();
    sort_newest_first(&mut releases);
    releases
}

pub(crate) fn parse_remote_status(raw: Option<&str>) -> Option<VersionUpdateStatus> {
    let normalized = raw?.trim().to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "update-available" | "available" => Some(VersionUpdateStatus::UpdateAvailable),
        "up-to-date" | "current" => Some(VersionUpdateStatus::UpToDate),
        "unknown" => Some(VersionUpdateStatus::Unknown),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
