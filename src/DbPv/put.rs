use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, trace};
use parking_lot::Mutex;

use super::completion::CompletionBridge;
use super::Structs::{FieldSet, ValueSnapshot};
use crate::error::{Error, Result};
use crate::Core::field::{write_strided, FieldType, ScalarArray, Transfer};
use crate::Core::record::{EventMask, RecordHandle};

/// Write of a record field, optionally processing the record afterwards.
pub struct ChannelPut {
    handle: RecordHandle,
    field_type: FieldType,
    fields: FieldSet,
    bridge: Option<CompletionBridge>,
    data: Mutex<()>,
    destroyed: AtomicBool,
}

impl ChannelPut {
    pub(crate) fn new(handle: RecordHandle, fields: FieldSet, process: bool) -> Result<Self> {
        let raw = handle.record().field_type(handle.field());
        let field_type = FieldType::from_dbf(raw).ok_or(Error::UnsupportedType(raw))?;
        let bridge = if process {
            Some(CompletionBridge::new(&handle)?)
        } else {
            None
        };
        debug!("put channel on {} (process {})", handle.record().name(), process);
        Ok(Self {
            handle,
            field_type,
            fields,
            bridge,
            data: Mutex::new(()),
            destroyed: AtomicBool::new(false),
        })
    }

    fn check_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(Error::destroyed());
        }
        Ok(())
    }

    /// Writes `value` from element 0, up to the field's capacity. A
    /// variable-length field takes the length of what was written.
    ///
    /// With process semantics this returns only after the record has
    /// processed, so any read started afterwards sees the result.
    pub fn put(&self, value: &ScalarArray) -> Result<()> {
        if value.field_type() != self.field_type {
            return Err(Error::type_mismatch(self.field_type, value.field_type()));
        }
        self.check_live()?;
        // claim before writing: a rejected call leaves the record untouched
        let claim = match &self.bridge {
            Some(bridge) => Some(bridge.begin()?),
            None => None,
        };
        {
            let _data = self.data.lock();
            self.check_live()?;
            let lock = self.handle.scan_lock();
            let record = lock.record();
            let field = self.handle.field();
            let count = value.len().min(record.element_count(field));
            if record.array_info(field).is_some() {
                record.put_array_info(field, count)?;
            }
            write_strided(&lock, field, self.field_type, Transfer::leading(count), value)?;
            record.post_events(field, EventMask::VALUE | EventMask::LOG);
            trace!("{}: put {} elements", record.name(), count);
        }
        match claim {
            Some(claim) => claim.trigger_and_wait(),
            None => Ok(()),
        }
    }

    /// Reads the current value back.
    pub fn get(&self) -> Result<ValueSnapshot> {
        let _data = self.data.lock();
        self.check_live()?;
        let mut snapshot = ValueSnapshot::new(self.field_type);
        let lock = self.handle.scan_lock();
        snapshot.capture(&lock, &self.handle, self.field_type, self.fields)?;
        Ok(snapshot)
    }

    pub fn handle(&self) -> &RecordHandle {
        &self.handle
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub(crate) fn bridge(&self) -> Option<&CompletionBridge> {
        self.bridge.as_ref()
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Idempotent. Wakes a put waiting on processing.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bridge) = &self.bridge {
            bridge.destroy();
        }
        debug!("put channel on {} destroyed", self.handle.record().name());
    }
}

impl Drop for ChannelPut {
    fn drop(&mut self) {
        self.destroy();
    }
}
