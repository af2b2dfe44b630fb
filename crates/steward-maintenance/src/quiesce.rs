use tracing::{debug, info, warn};

use crate::SystemController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiescenceRecord {
    pub was_live: bool,
}

pub struct QuiescenceController<'a> {
    system: &'a dyn SystemController,
    record: Option<QuiescenceRecord>,
}

impl<'a> QuiescenceController<'a> {
    pub fn new(system: &'a dyn SystemController) -> Self {
        Self {
            system,
            record: None,
        }
    }

    pub fn record(&self) -> Option<QuiescenceRecord> {
        self.record
    }

    /// Returns false only when the system was live and could not be taken
    /// offline, or when its liveness could not be observed.
    pub fn begin_quiesce(&mut self) -> bool {
        if let Some(previous) = self.record {
            warn!(
                was_live = previous.was_live,
                "begin_quiesce called again before end_quiesce; replacing record"
            );
        }

        let was_live = match self.system.is_live() {
            Ok(live) => live,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed observing system liveness");
                self.record = Some(QuiescenceRecord { was_live: false });
                return false;
            }
        };
        self.record = Some(QuiescenceRecord { was_live });

        if !was_live {
            debug!("system already offline; nothing to quiesce");
            return true;
        }

        match self.system.set_live(false) {
            Ok(()) => {
                info!("system taken offline for update");
                true
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed taking system offline");
                false
            }
        }
    }

    pub fn end_quiesce(&mut self) -> bool {
        let Some(record) = self.record.take() else {
            debug!("end_quiesce without a matching begin_quiesce");
            return true;
        };
        if !record.was_live {
            debug!("system was offline before quiescence; leaving it offline");
            return true;
        }

        match self.system.set_live(true) {
            Ok(()) => {
                info!("system restored to live after update");
                true
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed restoring system to live");
                false
            }
        }
    }
}

pub struct QuiescenceGuard<'c, 'a> {
    controller: &'c mut QuiescenceController<'a>,
    quiesced: bool,
    restored: Option<bool>,
}

impl<'c, 'a> QuiescenceGuard<'c, 'a> {
    pub fn engage(controller: &'c mut QuiescenceController<'a>) -> Self {
        let quiesced = controller.begin_quiesce();
        Self {
            controller,
            quiesced,
            restored: None,
        }
    }

    pub fn quiesced(&self) -> bool {
        self.quiesced
    }

    pub fn restore(mut self) -> bool {
        self.end()
    }

    fn end(&mut self) -> bool {
        if let Some(restored) = self.restored {
            return restored;
        }
        let restored = self.controller.end_quiesce();
        self.restored = Some(restored);
        restored
    }
}

impl Drop for QuiescenceGuard<'_, '_> {
    fn drop(&mut self) {
        if self.restored.is_none() {
            warn!("quiescence guard dropped before restore; restoring now");
            self.end();
        }
    }
}
