use super::*;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use steward_cache::{CacheStore, MemoryCacheStore};
use steward_core::{ComponentKind, ReleaseNote, UpdateSnapshot, VersionUpdateStatus};

use crate::normalize::parse_remote_status;
use crate::telemetry::parse_telemetry_body;

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

const DAY: Duration = Duration::from_secs(86_400);

struct FakeTelemetry {
    response: RefCell<Result<Option<TelemetryResponse>, String>>,
    calls: Cell<usize>,
    last_request: RefCell<Option<TelemetryRequest>>,
}

impl FakeTelemetry {
    fn returning(response: Option<TelemetryResponse>) -> Self {
        Self {
            response: RefCell::new(Ok(response)),
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            response: RefCell::new(Err(message.to_string())),
            calls: Cell::new(0),
            last_request: RefCell::new(None),
        }
    }

    fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl TelemetryClient for FakeTelemetry {
    fn check(&self, request: &TelemetryRequest) -> Result<Option<TelemetryResponse>> {
        self.calls.set(self.calls.get() + 1);
        self.last_request.replace(Some(request.clone()));
        self.response.borrow().clone().map_err(|message| anyhow!(message))
    }
}

/// Wraps a memory store, counting reads and optionally failing writes.
#[derive(Default)]
struct CountingCache {
    inner: MemoryCacheStore,
    gets: Cell<usize>,
    fail_writes: bool,
}

impl CacheStore for CountingCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.gets.set(self.gets.get() + 1);
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("cache-write-failed: disk full"));
        }
        self.inner.set(key, value, ttl)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.inner.delete(key)
    }
}

fn local_core() -> LocalCore {
    LocalCore {
        name: "Blocks".to_string(),
        version: "1.2.0".to_string(),
        build: "2410".to_string(),
    }
}

fn installed(id: &str, version: &str) -> InstalledExtension {
    InstalledExtension {
        id: id.to_string(),
        name: format!("{id} Extension"),
        version: version.to_string(),
        enabled: true,
    }
}

fn remote_release(version: &str, build: Option<&str>, critical: bool) -> RemoteRelease {
    RemoteRelease {
        version: Some(version.to_string()),
        build: build.map(str::to_string),
        critical: Some(critical),
        manual_update_required: Some(false),
        notes: Some(format!("Fixes in {version}")),
    }
}

/// Core has two releases (one critical); "a" has one routine release and
/// "b" is up to date.
fn ordering_response() -> TelemetryResponse {
    let mut extensions = BTreeMap::new();
    extensions.insert(
        "a".to_string(),
        RemoteExtensionInfo {
            display_name: None,
            latest_version: Some("2.1.0".to_string()),
            status: Some("update-available".to_string()),
            releases: vec![remote_release("2.1.0", None, false)],
        },
    );
    extensions.insert(
        "b".to_string(),
        RemoteExtensionInfo {
            display_name: None,
            latest_version: Some("1.0.0".to_string()),
            status: Some("up-to-date".to_string()),
            releases: Vec::new(),
        },
    );

    TelemetryResponse {
        core: Some(RemoteCoreInfo {
            latest_version: Some("1.3.0".to_string()),
            latest_build: Some("2500".to_string()),
            status: None,
            critical_update_available: None,
            manual_update_required: None,
            releases: vec![
                remote_release("1.2.5", Some("2450"), true),
                remote_release("1.3.0", Some("2500"), false),
            ],
        }),
        extensions,
    }
}

fn ordering_extensions() -> Vec<InstalledExtension> {
    vec![installed("a", "2.0.0"), installed("b", "1.0.0")]
}

#[test]
fn cold_unforced_snapshot_is_absent_without_remote_call() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    assert!(aggregator.get_snapshot(false).is_none());
    assert!(aggregator.list_available_updates(false).is_none());
    assert!(!aggregator.is_snapshot_cached());
    assert_eq!(telemetry.calls(), 0);
}

#[test]
fn forced_refresh_always_refetches() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    aggregator.get_snapshot(true).expect("forced refresh yields a snapshot");
    assert_eq!(telemetry.calls(), 1);
    aggregator.get_snapshot(true).expect("forced refresh yields a snapshot");
    assert_eq!(telemetry.calls(), 2);

    // A warm memo does not stop a forced refresh in a fresh unit either.
    let mut next_unit = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);
    next_unit.get_snapshot(true).expect("forced refresh yields a snapshot");
    assert_eq!(telemetry.calls(), 3);
}

#[test]
fn forced_refresh_writes_snapshot_to_cache() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let fetched = aggregator
        .get_snapshot(true)
        .cloned()
        .expect("forced refresh yields a snapshot");
    let raw = cache
        .get(UPDATE_INFO_CACHE_KEY)
        .expect("must read")
        .expect("snapshot must be cached");
    let cached: UpdateSnapshot = serde_json::from_str(&raw).expect("cached snapshot must decode");
    assert_eq!(cached, fetched);
}

#[test]
fn unforced_reads_from_warm_cache_are_identical_and_offline() {
    let cache = CountingCache::default();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();

    UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY)
        .get_snapshot(true)
        .expect("seed snapshot");
    assert_eq!(telemetry.calls(), 1);

    let first = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY)
        .get_snapshot(false)
        .cloned()
        .expect("cached snapshot");
    let second = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY)
        .get_snapshot(false)
        .cloned()
        .expect("cached snapshot");

    assert_eq!(first, second);
    assert_eq!(telemetry.calls(), 1, "unforced reads must not hit the network");
}

#[test]
fn memoized_snapshot_is_reused_within_a_unit() {
    let cache = CountingCache::default();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY)
        .get_snapshot(true)
        .expect("seed snapshot");

    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);
    aggregator.get_snapshot(false).expect("cached snapshot");
    let reads_after_first = cache.gets.get();
    aggregator.get_snapshot(false).expect("memoized snapshot");
    aggregator.list_available_updates(false).expect("memoized list");

    assert_eq!(cache.gets.get(), reads_after_first);
    assert_eq!(telemetry.calls(), 1);
}

#[test]
fn null_telemetry_response_yields_empty_snapshot() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(None);
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let snapshot = aggregator
        .get_snapshot(true)
        .expect("forced refresh yields a snapshot");
    assert!(!snapshot.core.update_available());
    assert!(snapshot.extensions.is_empty());
    assert!(snapshot.is_empty());
    assert_eq!(aggregator.list_available_updates(false), Some(Vec::new()));
}

#[test]
fn failing_telemetry_degrades_to_empty_snapshot() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::failing("telemetry-request-failed: connection refused");
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let snapshot = aggregator
        .get_snapshot(true)
        .expect("failure still yields a snapshot");
    assert!(snapshot.is_empty());
    assert!(!aggregator.is_critical_update_available());
    assert!(aggregator.is_snapshot_cached());
}

#[test]
fn failing_extension_directory_degrades_to_empty_snapshot() {
    struct BrokenDirectory;
    impl ExtensionDirectory for BrokenDirectory {
        fn enabled_extensions(&self) -> Result<Vec<InstalledExtension>> {
            Err(anyhow!("permission denied"))
        }
    }

    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let mut aggregator =
        UpdateAggregator::new(&cache, &telemetry, &BrokenDirectory, local_core(), DAY);

    let snapshot = aggregator.get_snapshot(true).expect("snapshot");
    assert!(snapshot.is_empty());
    assert_eq!(telemetry.calls(), 0);
}

#[test]
fn cache_write_failure_still_returns_snapshot() {
    let cache = CountingCache {
        fail_writes: true,
        ..CountingCache::default()
    };
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let snapshot = aggregator.get_snapshot(true).expect("snapshot despite cache failure");
    assert!(snapshot.core.update_available());
    assert!(aggregator.is_critical_update_available());
    assert!(cache.get(UPDATE_INFO_CACHE_KEY).expect("must read").is_none());
}

#[test]
fn unreadable_cached_value_is_refetched() {
    let cache = MemoryCacheStore::new();
    cache
        .set(UPDATE_INFO_CACHE_KEY, "{not json", DAY)
        .expect("must seed garbage");
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let snapshot = aggregator.get_snapshot(false).expect("refetched snapshot");
    assert!(snapshot.core.update_available());
    assert_eq!(telemetry.calls(), 1);
}

#[test]
fn aggregated_list_puts_core_first_and_skips_up_to_date_extensions() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    let entries = aggregator
        .list_available_updates(true)
        .expect("forced list is always available");
    assert_eq!(entries.len(), 2);

    let core = &entries[0];
    assert_eq!(core.kind, ComponentKind::Core);
    assert_eq!(core.name, "Blocks");
    assert_eq!(core.handle, "Blocks");
    assert_eq!(core.version, "1.3.0 Build 2500");
    assert_eq!(core.latest_build.as_deref(), Some("2500"));
    assert!(core.critical);
    assert_eq!(core.manual_update_required, Some(false));
    assert_eq!(
        core.notes,
        "<h5>Blocks 1.3.0.2500</h5><ul><li>Fixes in 1.3.0</li></ul>\
         <h5>Blocks 1.2.5.2450</h5><ul><li>Fixes in 1.2.5</li></ul>"
    );

    let extension = &entries[1];
    assert_eq!(extension.kind, ComponentKind::Extension);
    assert_eq!(extension.handle, "a");
    assert_eq!(extension.name, "a Extension");
    assert_eq!(extension.version, "2.1.0");
    assert!(!extension.critical);
    assert_eq!(extension.manual_update_required, None);
    assert!(entries.iter().all(|entry| entry.handle != "b"));
}

#[test]
fn critical_and_manual_flags_answer_only_for_loaded_snapshot() {
    let cache = MemoryCacheStore::new();
    let mut response = ordering_response();
    if let Some(core) = response.core.as_mut() {
        core.manual_update_required = Some(true);
    }
    let telemetry = FakeTelemetry::returning(Some(response));
    let extensions = ordering_extensions();
    UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY)
        .get_snapshot(true)
        .expect("seed snapshot");

    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);
    assert!(aggregator.is_snapshot_cached());
    assert!(!aggregator.is_critical_update_available());
    assert!(!aggregator.is_manual_update_required());

    aggregator.get_snapshot(false).expect("cached snapshot");
    assert!(aggregator.is_critical_update_available());
    assert!(aggregator.is_manual_update_required());
}

#[test]
fn flush_returns_true_at_most_once() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(Some(ordering_response()));
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);
    aggregator.get_snapshot(true).expect("seed snapshot");

    assert!(aggregator.flush());
    assert!(!aggregator.flush());
    assert!(cache.get(UPDATE_INFO_CACHE_KEY).expect("must read").is_none());
    assert!(aggregator.loaded_snapshot().is_none());
    assert!(!aggregator.is_snapshot_cached());
}

#[test]
fn request_lists_core_and_enabled_extensions() {
    let cache = MemoryCacheStore::new();
    let telemetry = FakeTelemetry::returning(None);
    let mut disabled = installed("zeta", "0.1.0");
    disabled.enabled = false;
    let extensions = vec![installed("seo", "3.0.0"), disabled, installed("forms", "1.1.0")];
    let mut aggregator = UpdateAggregator::new(&cache, &telemetry, &extensions, local_core(), DAY);

    aggregator.get_snapshot(true).expect("snapshot");
    let request = telemetry
        .last_request
        .borrow()
        .clone()
        .expect("request must be sent");
    assert_eq!(request.core.local_version, "1.2.0");
    assert_eq!(request.core.local_build, "2410");
    assert_eq!(
        request.extensions,
        vec![
            ExtensionCheck {
                id: "forms".to_string(),
                local_version: "1.1.0".to_string(),
            },
            ExtensionCheck {
                id: "seo".to_string(),
                local_version: "3.0.0".to_string(),
            },
        ]
    );
}

#[test]
fn build_snapshot_omits_missing_and_malformed_extensions() {
    let extensions = vec![
        installed("a", "1.0.0"),
        installed("b", "1.0.0"),
        installed("c", "1.0.0"),
    ];
    let request = TelemetryRequest {
        core: CoreCheck {
            local_version: "1.0.0".to_string(),
            local_build: "1".to_string(),
        },
        extensions: extensions
            .iter()
            .map(|extension| ExtensionCheck {
                id: extension.id.clone(),
                local_version: extension.version.clone(),
            })
            .collect(),
    };

    let mut remote = BTreeMap::new();
    remote.insert(
        "a".to_string(),
        RemoteExtensionInfo {
            latest_version: Some("1.1.0".to_string()),
            ..RemoteExtensionInfo::default()
        },
    );
    remote.insert(
        "b".to_string(),
        RemoteExtensionInfo {
            latest_version: Some("  ".to_string()),
            status: Some("update-available".to_string()),
            releases: vec![remote_release("9.0.0", None, true)],
            ..RemoteExtensionInfo::default()
        },
    );
    remote.insert(
        "stranger".to_string(),
        RemoteExtensionInfo {
            latest_version: Some("5.0.0".to_string()),
            ..RemoteExtensionInfo::default()
        },
    );

    let snapshot = build_snapshot(
        &request,
        &extensions,
        TelemetryResponse {
            core: None,
            extensions: remote,
        },
    );

    assert_eq!(snapshot.extensions.keys().collect::<Vec<_>>(), vec!["a"]);
    let a = &snapshot.extensions["a"];
    assert_eq!(a.status, VersionUpdateStatus::UpdateAvailable);
    assert_eq!(a.display_name, "a Extension");
    assert!(!snapshot.core.update_available());
    assert_eq!(snapshot.core.local_version, "1.0.0");
    assert_eq!(snapshot.core.status, VersionUpdateStatus::Unknown);
}

#[test]
fn build_snapshot_treats_core_without_latest_version_as_no_update() {
    let request = TelemetryRequest {
        core: CoreCheck {
            local_version: "1.0.0".to_string(),
            local_build: "7".to_string(),
        },
        extensions: Vec::new(),
    };
    let response = TelemetryResponse {
        core: Some(RemoteCoreInfo {
            latest_version: None,
            status: Some("update-available".to_string()),
            critical_update_available: Some(true),
            releases: vec![remote_release("2.0.0", Some("9"), true)],
            ..RemoteCoreInfo::default()
        }),
        extensions: BTreeMap::new(),
    };

    let snapshot = build_snapshot(&request, &[], response);
    assert!(!snapshot.core.update_available());
    assert!(!snapshot.core.critical_update_available);
    assert!(snapshot.core.releases.is_empty());
    assert!(build_update_entries(&snapshot, "Core").is_empty());
}

#[test]
fn build_snapshot_sorts_releases_and_drops_unlabelled_ones() {
    let request = TelemetryRequest {
        core: CoreCheck {
            local_version: "1.0.0".to_string(),
            local_build: "1".to_string(),
        },
        extensions: Vec::new(),
    };
    let response = TelemetryResponse {
        core: Some(RemoteCoreInfo {
            latest_version: Some("1.2.0".to_string()),
            latest_build: Some("30".to_string()),
            releases: vec![
                remote_release("1.1.0", Some("20"), false),
                RemoteRelease::default(),
                remote_release("1.2.0", Some("30"), false),
            ],
            ..RemoteCoreInfo::default()
        }),
        extensions: BTreeMap::new(),
    };

    let snapshot = build_snapshot(&request, &[], response);
    let versions = snapshot
        .core
        .releases
        .iter()
        .map(|release| release.version.as_str())
        .collect::<Vec<_>>();
    assert_eq!(versions, vec!["1.2.0", "1.1.0"]);
    assert_eq!(snapshot.core.status, VersionUpdateStatus::UpdateAvailable);
    assert!(!snapshot.core.critical_update_available);
}

#[test]
fn remote_flags_override_derived_ones() {
    let request = TelemetryRequest {
        core: CoreCheck {
            local_version: "1.0.0".to_string(),
            local_build: "1".to_string(),
        },
        extensions: Vec::new(),
    };
    let response = TelemetryResponse {
        core: Some(RemoteCoreInfo {
            latest_version: Some("1.0.0".to_string()),
            latest_build: Some("1".to_string()),
            status: Some("UPDATE_AVAILABLE".to_string()),
            critical_update_available: Some(false),
            releases: vec![remote_release("1.0.0", Some("1"), true)],
            ..RemoteCoreInfo::default()
        }),
        extensions: BTreeMap::new(),
    };

    let snapshot = build_snapshot(&request, &[], response);
    assert_eq!(snapshot.core.status, VersionUpdateStatus::UpdateAvailable);
    assert!(!snapshot.core.critical_update_available);
}

#[test]
fn render_notes_formats_core_and_extension_headings() {
    let releases = vec![
        ReleaseNote {
            version: "2.0.0".to_string(),
            build: Some("3001".to_string()),
            critical: false,
            manual_update_required: false,
            notes: "<strong>New</strong> editor".to_string(),
        },
        ReleaseNote {
            version: "1.9.0".to_string(),
            build: None,
            critical: true,
            manual_update_required: false,
            notes: "Security fix".to_string(),
        },
    ];

    assert_eq!(
        render_notes(&releases, "Blocks", ComponentKind::Core),
        "<h5>Blocks 2.0.0.3001</h5><ul><li><strong>New</strong> editor</li></ul>\
         <h5>Blocks 1.9.0</h5><ul><li>Security fix</li></ul>"
    );
    assert_eq!(
        render_notes(&releases, "SEO", ComponentKind::Extension),
        "<h5>SEO 2.0.0</h5><ul><li><strong>New</strong> editor</li></ul>\
         <h5>SEO 1.9.0</h5><ul><li>Security fix</li></ul>"
    );
    assert_eq!(render_notes(&[], "SEO", ComponentKind::Extension), "");
}

#[test]
fn core_version_label_omits_empty_build() {
    let mut snapshot = UpdateSnapshot::empty();
    snapshot.core.latest_version = "3.0.0".to_string();
    assert_eq!(core_version_label(&snapshot.core), "3.0.0");
    snapshot.core.latest_build = "12".to_string();
    assert_eq!(core_version_label(&snapshot.core), "3.0.0 Build 12");
}

#[test]
fn extension_entry_reports_critical_from_its_notes() {
    let mut snapshot = UpdateSnapshot::empty();
    snapshot.extensions.insert(
        "seo".to_string(),
        steward_core::ExtensionVersionInfo {
            id: "seo".to_string(),
            display_name: "SEO".to_string(),
            local_version: "1.0.0".to_string(),
            latest_version: "1.0.1".to_string(),
            status: VersionUpdateStatus::UpdateAvailable,
            releases: vec![ReleaseNote {
                version: "1.0.1".to_string(),
                build: None,
                critical: true,
                manual_update_required: true,
                notes: "Patch".to_string(),
            }],
        },
    );

    let entries = build_update_entries(&snapshot, "Core");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].critical);
    assert_eq!(entries[0].manual_update_required, None);
}

#[test]
fn parse_telemetry_body_handles_empty_and_invalid_bodies() {
    assert!(parse_telemetry_body("").expect("empty body").is_none());
    assert!(parse_telemetry_body(" null ").expect("null body").is_none());
    let parsed = parse_telemetry_body("{\"core\":{\"latest_version\":\"1.0.0\"}}")
        .expect("must parse")
        .expect("must be present");
    assert_eq!(
        parsed.core.and_then(|core| core.latest_version).as_deref(),
        Some("1.0.0")
    );

    let err = parse_telemetry_body("<html>").expect_err("html is not a response");
    assert!(err.to_string().contains("telemetry-response-invalid"));
}

#[test]
fn parse_remote_status_accepts_common_spellings() {
    assert_eq!(
        parse_remote_status(Some("update_available")),
        Some(VersionUpdateStatus::UpdateAvailable)
    );
    assert_eq!(
        parse_remote_status(Some("Up-To-Date")),
        Some(VersionUpdateStatus::UpToDate)
    );
    assert_eq!(
        parse_remote_status(Some("unknown")),
        Some(VersionUpdateStatus::Unknown)
    );
    assert_eq!(parse_remote_status(Some("maybe")), None);
    assert_eq!(parse_remote_status(None), None);
}

#[test]
fn disabled_telemetry_client_always_fails() {
    let request = TelemetryRequest {
        core: CoreCheck {
            local_version: "1.0.0".to_string(),
            local_build: "1".to_string(),
        },
        extensions: Vec::new(),
    };
    let err = DisabledTelemetryClient
        .check(&request)
        .expect_err("disabled client must fail");
    assert!(err.to_string().contains("telemetry-disabled"));
}

fn check_request() -> TelemetryRequest {
    TelemetryRequest {
        core: CoreCheck {
            local_version: "1.2.0".to_string(),
            local_build: "2410".to_string(),
        },
        extensions: vec![ExtensionCheck {
            id: "seo".to_string(),
            local_version: "3.0.0".to_string(),
        }],
    }
}

#[test]
fn http_client_posts_request_and_parses_ok_body() {
    let body = r#"{"core":{"latest_version":"1.3.0","latest_build":"2500"}}"#;
    let (endpoint, server) = serve_once(&http_response("200 OK", body));
    let client = local_client(endpoint, Duration::from_secs(5));

    let response = client
        .check(&check_request())
        .expect("check must succeed")
        .expect("body carries a response");
    let core = response.core.expect("core must be present");
    assert_eq!(core.latest_version.as_deref(), Some("1.3.0"));
    assert_eq!(core.latest_build.as_deref(), Some("2500"));

    let raw_request = server.join().expect("server thread must finish");
    assert!(raw_request.starts_with("POST "));
    assert!(raw_request.contains(r#""local_build":"2410""#));
    assert!(raw_request.contains(r#""id":"seo""#));
}

#[test]
fn http_client_treats_no_content_as_nothing_to_report() {
    let (endpoint, server) = serve_once("HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n");
    let client = local_client(endpoint, Duration::from_secs(5));

    assert_eq!(client.check(&check_request()).expect("204 is not an error"), None);
    server.join().expect("server thread must finish");
}

#[test]
fn http_client_treats_null_and_empty_bodies_as_nothing_to_report() {
    for body in ["null", "", "  \n"] {
        let (endpoint, server) = serve_once(&http_response("200 OK", body));
        let client = local_client(endpoint, Duration::from_secs(5));

        assert_eq!(
            client.check(&check_request()).expect("body must parse"),
            None,
            "body {body:?} must mean nothing to report"
        );
        server.join().expect("server thread must finish");
    }
}

#[test]
fn http_client_reports_non_success_status() {
    let (endpoint, server) = serve_once(&http_response("500 Internal Server Error", "boom"));
    let client = local_client(endpoint, Duration::from_secs(5));

    let err = client
        .check(&check_request())
        .expect_err("500 must fail the check");
    let message = format!("{err:#}");
    assert!(message.contains("telemetry-request-failed"));
    assert!(message.contains("500"));
    server.join().expect("server thread must finish");
}

#[test]
fn http_client_rejects_malformed_ok_body() {
    let (endpoint, server) = serve_once(&http_response("200 OK", "<html>maintenance</html>"));
    let client = local_client(endpoint, Duration::from_secs(5));

    let err = client
        .check(&check_request())
        .expect_err("html must not parse");
    assert!(format!("{err:#}").contains("telemetry-response-invalid"));
    server.join().expect("server thread must finish");
}

#[test]
fn http_client_times_out_on_a_stalled_authority() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let endpoint = format!("http://{}/check", listener.local_addr().expect("must have addr"));
    let server = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(Duration::from_millis(1500));
            drop(stream);
        }
    });
    let client = local_client(endpoint, Duration::from_millis(200));

    let err = client
        .check(&check_request())
        .expect_err("stalled authority must time out");
    assert!(format!("{err:#}").contains("telemetry-request-failed"));
    server.join().expect("server thread must finish");
}

#[test]
fn server_error_degrades_forced_snapshot_to_empty() {
    let (endpoint, server) = serve_once(&http_response("500 Internal Server Error", "boom"));
    let client = local_client(endpoint, Duration::from_secs(5));
    let cache = MemoryCacheStore::new();
    let extensions = ordering_extensions();
    let mut aggregator = UpdateAggregator::new(&cache, &client, &extensions, local_core(), DAY);

    let snapshot = aggregator
        .get_snapshot(true)
        .cloned()
        .expect("forced refresh always yields a snapshot");
    assert_eq!(snapshot, UpdateSnapshot::empty());
    server.join().expect("server thread must finish");
}

#[test]
fn fs_extension_directory_reads_enabled_manifests() {
    let root = test_root();
    write_manifest(&root, "seo", "id = \"seo\"\nname = \"SEO\"\nversion = \"3.0.0\"\n");
    write_manifest(
        &root,
        "forms",
        "id = \"forms\"\nname = \"Forms\"\nversion = \"1.1.0\"\nenabled = false\n",
    );
    write_manifest(&root, "broken", "id = \n");
    write_manifest(
        &root,
        "zz-seo-copy",
        "id = \"seo\"\nname = \"SEO copy\"\nversion = \"0.1.0\"\n",
    );
    fs::write(root.join("README.md"), "not an extension").expect("must write stray file");

    let directory = FsExtensionDirectory::open(&root);
    let extensions = directory.enabled_extensions().expect("must list extensions");
    assert_eq!(extensions.len(), 1);
    assert_eq!(extensions[0].id, "seo");
    assert_eq!(extensions[0].name, "SEO");
    assert_eq!(extensions[0].version, "3.0.0");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn fs_extension_directory_missing_root_is_empty() {
    let directory = FsExtensionDirectory::open(test_root().join("missing"));
    assert!(directory
        .enabled_extensions()
        .expect("missing root is not an error")
        .is_empty());
}

fn write_manifest(root: &std::path::Path, dir: &str, content: &str) {
    let dir = root.join(dir);
    fs::create_dir_all(&dir).expect("must create extension dir");
    fs::write(dir.join("extension.toml"), content).expect("must write manifest");
}

fn test_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let counter = TEST_ROOT_COUNTER.fetch_add(1, Ordering::SeqCst);
    path.push(format!(
        "steward-updates-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        counter
    ));
    path
}

fn local_client(endpoint: String, timeout: Duration) -> HttpTelemetryClient {
    let client = reqwest::blocking::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .expect("must build HTTP client");
    HttpTelemetryClient::with_client(endpoint, client)
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Serves `response` to the first connection and hands back the raw request.
fn serve_once(response: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let endpoint = format!("http://{}/check", listener.local_addr().expect("must have addr"));
    let response = response.to_string();
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("must accept");
        let raw_request = read_http_request(&mut stream);
        stream
            .write_all(response.as_bytes())
            .expect("must write response");
        stream.flush().expect("must flush response");
        raw_request
    });
    (endpoint, handle)
}

fn read_http_request(stream: &mut std::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = stream.read(&mut chunk).expect("must read request");
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buffer.len() >= header_end + 4 + content_length {
            break;
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
