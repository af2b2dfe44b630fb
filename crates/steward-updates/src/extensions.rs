use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const EXTENSION_MANIFEST_FILE: &str = "extension.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledExtension {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default = "extension_enabled_default")]
    pub enabled: bool,
}

fn extension_enabled_default() -> bool {
    true
}

pub trait ExtensionDirectory {
    fn enabled_extensions(&self) -> Result<Vec<InstalledExtension>>;
}

impl ExtensionDirectory for Vec<InstalledExtension> {
    fn enabled_extensions(&self) -> Result<Vec<InstalledExtension>> {
        Ok(dedup_enabled(self.iter().cloned()))
    }
}

#[derive(Debug, Clone)]
pub struct FsExtensionDirectory {
    root: PathBuf,
}

impl FsExtensionDirectory {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_manifest(&self, path: &Path) -> Option<InstalledExtension> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "skipping unreadable extension manifest"
                );
                return None;
            }
        };
        match toml::from_str::<InstalledExtension>(&content) {
            Ok(extension) if extension.id.trim().is_empty() => {
                warn!(path = %path.display(), "skipping extension manifest with empty id");
                None
            }
            Ok(extension) => Some(extension),
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "skipping invalid extension manifest"
                );
                None
            }
        }
    }
}

impl ExtensionDirectory for FsExtensionDirectory {
    fn enabled_extensions(&self) -> Result<Vec<InstalledExtension>> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "extensions directory does not exist");
            return Ok(Vec::new());
        }

        let mut manifest_paths = Vec::new();
        for entry in fs::read_dir(&self.root).with_context(|| {
            format!(
                "failed to read extensions directory: {}",
                self.root.display()
            )
        })? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let manifest_path = entry.path().join(EXTENSION_MANIFEST_FILE);
            if manifest_path.is_file() {
                manifest_paths.push(manifest_path);
            }
        }
        manifest_paths.sort();

        let discovered = manifest_paths
            .iter()
            .filter_map(|path| self.read_manifest(path));
        Ok(dedup_enabled(discovered))
    }
}

fn dedup_enabled(
    extensions: impl Iterator<Item = InstalledExtension>,
) -> Vec<InstalledExtension> {
    let mut seen = HashSet::new();
    let mut enabled = extensions
        .filter(|extension| extension.enabled)
        .filter(|extension| {
            let fresh = seen.insert(extension.id.clone());
            if !fresh {
                warn!(id = %extension.id, "ignoring duplicate extension id");
            }
            fresh
        })
        .collect::<Vec<_>>();
    enabled.sort_by(|left, right| left.id.cmp(&right.id));
    enabled
}
