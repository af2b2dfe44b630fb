use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::info;

use crate::fs_utils::remove_file_if_exists;

pub trait SystemController {
    fn is_live(&self) -> Result<bool>;
    fn set_live(&self, live: bool) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsSystemController {
    marker_path: PathBuf,
}

impl FsSystemController {
    pub fn new(marker_path: impl Into<PathBuf>) -> Self {
        Self {
            marker_path: marker_path.into(),
        }
    }

    pub fn marker_path(&self) -> &Path {
        &self.marker_path
    }

    pub fn offline_since(&self) -> Result<Option<u64>> {
        let raw = match fs::read_to_string(&self.marker_path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to read offline marker: {}",
                        self.marker_path.display()
                    )
                });
            }
        };
        Ok(raw.trim().parse::<u64>().ok())
    }

    fn write_marker(&self) -> Result<()> {
        if let Some(parent) = self.marker_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = fs::File::create(&self.marker_path).with_context(|| {
            format!(
                "failed to create offline marker: {}",
                self.marker_path.display()
            )
        })?;
        file.write_all(format!("{}\n", current_unix_timestamp()?).as_bytes())
            .with_context(|| {
                format!(
                    "failed to write offline marker: {}",
                    self.marker_path.display()
                )
            })?;
        file.flush().with_context(|| {
            format!(
                "failed to flush offline marker: {}",
                self.marker_path.display()
            )
        })
    }
}

impl SystemController for FsSystemController {
    fn is_live(&self) -> Result<bool> {
        match fs::symlink_metadata(&self.marker_path) {
            Ok(_) => Ok(false),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(err).with_context(|| {
                format!(
                    "failed to inspect offline marker: {}",
                    self.marker_path.display()
                )
            }),
        }
    }

    fn set_live(&self, live: bool) -> Result<()> {
        if live {
            let removed = remove_file_if_exists(&self.marker_path).with_context(|| {
                format!(
                    "failed to clear offline marker: {}",
                    self.marker_path.display()
                )
            })?;
            if removed {
                info!(marker = %self.marker_path.display(), "system is live");
            }
        } else if !self.marker_path.exists() {
            self.write_marker()?;
            info!(marker = %self.marker_path.display(), "system is offline");
        }
        Ok(())
    }
}

pub fn current_unix_timestamp() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_secs())
}
