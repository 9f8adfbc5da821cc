use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use parking_lot::Mutex;

use super::completion::CompletionBridge;
use super::Structs::{ChangeSet, FieldSet, ValueSnapshot};
use crate::error::{Error, Result};
use crate::Core::field::FieldType;
use crate::Core::record::RecordHandle;

/// Result of one get: the snapshot and what changed since the previous get.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub snapshot: ValueSnapshot,
    pub changed: ChangeSet,
}

/// One-shot read of a record field, optionally processing the record first.
pub struct ChannelGet {
    handle: RecordHandle,
    field_type: FieldType,
    fields: FieldSet,
    bridge: Option<CompletionBridge>,
    last: Mutex<Option<ValueSnapshot>>,
    destroyed: AtomicBool,
}

impl ChannelGet {
    pub(crate) fn new(handle: RecordHandle, fields: FieldSet, process: bool) -> Result<Self> {
        let raw = handle.record().field_type(handle.field());
        let field_type = FieldType::from_dbf(raw).ok_or(Error::UnsupportedType(raw))?;
        let bridge = if process {
            Some(CompletionBridge::new(&handle)?)
        } else {
            None
        };
        debug!("get channel on {} (process {})", handle.record().name(), process);
        Ok(Self {
            handle,
            field_type,
            fields,
            bridge,
            last: Mutex::new(None),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Processes the record if requested, then reads it. The first reading
    /// marks every requested field as changed.
    pub fn get(&self) -> Result<Reading> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::destroyed());
        }
        if let Some(bridge) = &self.bridge {
            bridge.process()?;
        }

        let mut last = self.last.lock();
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::destroyed());
        }
        let mut snapshot = match last.as_ref() {
            Some(previous) => previous.clone(),
            None => ValueSnapshot::new(self.field_type),
        };
        {
            let lock = self.handle.scan_lock();
            snapshot.capture(&lock, &self.handle, self.field_type, self.fields)?;
        }
        let changed = match last.as_ref() {
            Some(previous) => snapshot.diff(previous, self.fields),
            None => self.fields,
        };
        *last = Some(snapshot.clone());
        trace!("{}: get, changed {:?}", self.handle.record().name(), changed);
        Ok(Reading { snapshot, changed })
    }

    pub fn handle(&self) -> &RecordHandle {
        &self.handle
    }

    pub fn fields(&self) -> FieldSet {
        self.fields
    }

    pub(crate) fn bridge(&self) -> Option<&CompletionBridge> {
        self.bridge.as_ref()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Idempotent. Wakes a get waiting on processing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bridge) = &self.bridge {
            bridge.destroy();
        }
        debug!("get channel on {} destroyed", self.handle.record().name());
    }
}

impl Drop for ChannelGet {
    fn drop(&mut self) {
        self.destroy();
    }
}
