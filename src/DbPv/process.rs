use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use super::completion::CompletionBridge;
use crate::error::{Error, Result};
use crate::Core::record::RecordHandle;

/// Processes a record and waits for it to finish.
pub struct ChannelProcess {
    bridge: CompletionBridge,
    destroyed: AtomicBool,
}

impl ChannelProcess {
    pub(crate) fn new(handle: &RecordHandle) -> Result<Self> {
        Ok(Self {
            bridge: CompletionBridge::new(handle)?,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn process(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::destroyed());
        }
        self.bridge.process()
    }

    pub(crate) fn bridge(&self) -> &CompletionBridge {
        &self.bridge
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn destroy(&self) {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.bridge.destroy();
            debug!("process channel on {} destroyed", self.bridge.record_name());
        }
    }
}

impl Drop for ChannelProcess {
    fn drop(&mut self) {
        self.destroy();
    }
}
