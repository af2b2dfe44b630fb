use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

static WRITE_CHECK_COUNTER: AtomicU64 = AtomicU64::new(0);

pub trait WritabilityProbe {
    fn is_writable(&self, path: &Path) -> bool;
    fn canonical(&self, path: &Path) -> PathBuf;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsWritabilityProbe;

impl WritabilityProbe for FsWritabilityProbe {
    fn is_writable(&self, path: &Path) -> bool {
        let result = match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => try_stage_file_in(path),
            Ok(_) => fs::OpenOptions::new().write(true).open(path).map(drop),
            Err(err) => Err(err),
        };
        match result {
            Ok(()) => true,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "path is not writable");
                false
            }
        }
    }

    fn canonical(&self, path: &Path) -> PathBuf {
        if let Ok(canonical) = fs::canonicalize(path) {
            return canonical;
        }
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    }
}

fn try_stage_file_in(dir: &Path) -> io::Result<()> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let counter = WRITE_CHECK_COUNTER.fetch_add(1, Ordering::SeqCst);
    let staged = dir.join(format!(
        ".steward-write-check-{}-{nanos}-{counter}",
        std::process::id()
    ));

    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staged)?;
    drop(file);
    if let Err(err) = fs::remove_file(&staged) {
        warn!(path = %staged.display(), error = %err, "failed to remove write check file");
    }
    Ok(())
}

pub fn unwritable_paths<P: AsRef<Path>>(
    probe: &dyn WritabilityProbe,
    required: &[P],
) -> Vec<PathBuf> {
    let mut unwritable = Vec::new();
    for path in required {
        let path: &Path = path.as_ref();
        if probe.is_writable(path) {
            continue;
        }
        let canonical = probe.canonical(path);
        warn!(path = %canonical.display(), "update target is not writable");
        unwritable.push(canonical);
    }
    unwritable
}
