use std::cmp::Ordering;

use semver::Version;

use crate::{ReleaseNote, VersionUpdateStatus};

pub fn parse_lenient_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    if trimmed.contains(['-', '+']) {
        return None;
    }

    let parts = trimmed.split('.').count();
    let padded = match parts {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

fn parse_build(raw: &str) -> Option<u64> {
    raw.trim().parse::<u64>().ok()
}

pub fn derive_update_status(
    local_version: &str,
    local_build: Option<&str>,
    latest_version: &str,
    latest_build: Option<&str>,
) -> VersionUpdateStatus {
    let (Some(local), Some(latest)) = (
        parse_lenient_version(local_version),
        parse_lenient_version(latest_version),
    ) else {
        return VersionUpdateStatus::Unknown;
    };

    match latest.cmp(&local) {
        Ordering::Greater => VersionUpdateStatus::UpdateAvailable,
        Ordering::Less => VersionUpdateStatus::UpToDate,
        Ordering::Equal => {
            let local_build = local_build.and_then(parse_build);
            let latest_build = latest_build.and_then(parse_build);
            match (local_build, latest_build) {
                (Some(local), Some(latest)) if latest > local => {
                    VersionUpdateStatus::UpdateAvailable
                }
                _ => VersionUpdateStatus::UpToDate,
            }
        }
    }
}

fn release_sort_key(release: &ReleaseNote) -> (Option<Version>, Option<u64>) {
    (
        parse_lenient_version(&release.version),
        release.build.as_deref().and_then(parse_build),
    )
}

/// Orders two releases oldest-to-newest. Unparseable labels sort as oldest.
pub fn compare_release_labels(left: &ReleaseNote, right: &ReleaseNote) -> Ordering {
    release_sort_key(left).cmp(&release_sort_key(right))
}

pub fn sort_newest_first(releases: &mut [ReleaseNote]) {
    releases.sort_by(|left, right| compare_release_labels(right, left));
}
