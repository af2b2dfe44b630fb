use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::CacheStore;

const ENVELOPE_VERSION: u32 = 1;

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    key: String,
    expires_at_unix: u64,
    value: String,
}

#[derive(Debug, Clone)]
pub struct FsCacheStore {
    root: PathBuf,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.json", key_digest(key)))
    }

    fn read_envelope(&self, key: &str) -> Result<Option<CacheEnvelope>> {
        let path = self.entry_path(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("cache-read-failed: key '{key}' at {}", path.display())
                });
            }
        };

        let envelope = match serde_json::from_str::<CacheEnvelope>(&content) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(
                    key,
                    path = %path.display(),
                    error = %err,
                    "ignoring unreadable cache entry"
                );
                return Ok(None);
            }
        };

        if envelope.version != ENVELOPE_VERSION || envelope.key != key {
            debug!(
                key,
                path = %path.display(),
                "cache entry does not match key; treating as miss"
            );
            return Ok(None);
        }

        if envelope.expires_at_unix <= current_unix_timestamp() {
            // Reads never remove: a concurrent `set` may already own this path.
            debug!(key, "cache entry expired");
            return Ok(None);
        }

        Ok(Some(envelope))
    }
}

impl CacheStore for FsCacheStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_envelope(key)?.map(|envelope| envelope.value))
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!(
                "cache-write-failed: failed creating cache root {}",
                self.root.display()
            )
        })?;

        let envelope = CacheEnvelope {
            version: ENVELOPE_VERSION,
            key: key.to_string(),
            expires_at_unix: current_unix_timestamp().saturating_add(ttl.as_secs().max(1)),
            value: value.to_string(),
        };
        let content = serde_json::to_string(&envelope)
            .with_context(|| format!("cache-write-failed: failed serializing key '{key}'"))?;

        let path = self.entry_path(key);
        let staged = self.root.join(format!(
            ".{}.{}-{}-{}.tmp",
            key_digest(key),
            std::process::id(),
            unique_suffix(),
            TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&staged, content).with_context(|| {
            format!("cache-write-failed: failed writing {}", staged.display())
        })?;
        if let Err(err) = fs::rename(&staged, &path) {
            let _ = fs::remove_file(&staged);
            return Err(err).with_context(|| {
                format!("cache-write-failed: failed replacing {}", path.display())
            });
        }

        debug!(
            key,
            path = %path.display(),
            ttl_secs = ttl.as_secs(),
            "stored cache entry"
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let live = self.read_envelope(key)?.is_some();
        let path = self.entry_path(key);
        remove_file_if_exists(&path).with_context(|| {
            format!("cache-delete-failed: key '{key}' at {}", path.display())
        })?;
        Ok(live)
    }
}

fn key_digest(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn unique_suffix() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}
