use std::path::PathBuf;

use anyhow::{anyhow, Result};
use steward_cache::CacheStore;
use steward_updates::UPDATE_INFO_CACHE_KEY;
use tracing::{info, warn};

use crate::{
    unwritable_paths, QuiescenceController, QuiescenceGuard, SystemController, UpdateExecutor,
    UpdateTarget, WritabilityProbe,
};

pub struct ApplyContext<'a> {
    pub system: &'a dyn SystemController,
    pub probe: &'a dyn WritabilityProbe,
    pub executor: &'a dyn UpdateExecutor,
    pub cache: &'a dyn CacheStore,
    pub required_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub target: UpdateTarget,
    pub quiesced: bool,
    pub restored: bool,
    pub cache_flushed: bool,
}

pub fn preflight(ctx: &ApplyContext<'_>) -> Vec<PathBuf> {
    unwritable_paths(ctx.probe, &ctx.required_paths)
}

pub fn apply_update(target: &UpdateTarget, ctx: &ApplyContext<'_>) -> Result<UpdateOutcome> {
    let unwritable = preflight(ctx);
    if !unwritable.is_empty() {
        let listed = unwritable
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(%target, paths = %listed, "refusing update: paths are not writable");
        return Err(anyhow!(
            "update-preflight-failed: cannot update {target}; not writable: {listed}"
        ));
    }

    let mut controller = QuiescenceController::new(ctx.system);
    let guard = QuiescenceGuard::engage(&mut controller);
    let quiesced = guard.quiesced();
    if !quiesced {
        warn!(%target, "system could not be taken offline; updating anyway");
    }

    let run_result = ctx.executor.execute(target);
    let restored = guard.restore();
    if !restored {
        warn!(%target, "system was not restored to live after update");
    }

    if let Err(err) = run_result {
        return Err(err.context(format!(
            "update of {target} failed (quiesced={quiesced} restored={restored})"
        )));
    }

    let cache_flushed = match ctx.cache.delete(UPDATE_INFO_CACHE_KEY) {
        Ok(removed) => removed,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "failed flushing update info after update");
            false
        }
    };
    info!(%target, quiesced, restored, cache_flushed, "update applied");

    Ok(UpdateOutcome {
        target: target.clone(),
        quiesced,
        restored,
        cache_flushed,
    })
}
