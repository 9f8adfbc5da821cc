// Point-in-time copy of the fields a channel exposes, and the bitmap saying
// which of them changed.

use bitflags::bitflags;

use crate::error::Result;
use crate::Core::field::{read_strided, FieldType, ScalarArray, Transfer};
use crate::Core::record::{Alarm, Limits, RecordHandle, ScanLock, TimeStamp};

bitflags! {
    /// Exposed fields of a channel. Used both to select what a channel
    /// exposes and, as [`ChangeSet`], to mark what changed.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FieldSet: u32 {
        const VALUE = 1 << 0;
        const ALARM = 1 << 1;
        const TIME_STAMP = 1 << 2;
        const DISPLAY = 1 << 3;
        const CONTROL = 1 << 4;
    }
}

/// Fields that differ from the previous snapshot given to the same consumer.
pub type ChangeSet = FieldSet;

impl FieldSet {
    /// Parses a request field name (`value`, `alarm`, `timeStamp`, ...).
    pub fn from_request_name(name: &str) -> Option<Self> {
        match name {
            "value" => Some(FieldSet::VALUE),
            "alarm" => Some(FieldSet::ALARM),
            "timeStamp" => Some(FieldSet::TIME_STAMP),
            "display" => Some(FieldSet::DISPLAY),
            "control" => Some(FieldSet::CONTROL),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct ValueSnapshot {
    pub value: ScalarArray,
    pub alarm: Alarm,
    pub time_stamp: TimeStamp,
    pub display: Limits,
    pub control: Limits,
}

impl Clone for ValueSnapshot {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            alarm: self.alarm.clone(),
            time_stamp: self.time_stamp,
            display: self.display,
            control: self.control,
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.value.clone_from(&source.value);
        self.alarm.clone_from(&source.alarm);
        self.time_stamp = source.time_stamp;
        self.display = source.display;
        self.control = source.control;
    }
}

impl ValueSnapshot {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            value: ScalarArray::empty(field_type),
            alarm: Alarm::default(),
            time_stamp: TimeStamp::default(),
            display: Limits::default(),
            control: Limits::default(),
        }
    }

    /// Overwrites the selected parts of `self` from the record. Buffers are
    /// reused, so a steady-state capture of numeric data does not allocate.
    pub(crate) fn capture(
        &mut self,
        lock: &ScanLock<'_>,
        handle: &RecordHandle,
        field_type: FieldType,
        fields: FieldSet,
    ) -> Result<()> {
        let record = lock.record();
        let field = handle.field();
        if fields.contains(FieldSet::VALUE) {
            let length = handle.current_length(lock);
            read_strided(lock, field, field_type, Transfer::leading(length), &mut self.value)?;
        }
        if fields.contains(FieldSet::ALARM) {
            let alarm = record.alarm();
            if alarm != self.alarm {
                self.alarm.clone_from(&alarm);
            }
        }
        if fields.contains(FieldSet::TIME_STAMP) {
            self.time_stamp = record.time_stamp();
        }
        if fields.contains(FieldSet::DISPLAY) {
            self.display = record.display_limits(field);
        }
        if fields.contains(FieldSet::CONTROL) {
            self.control = record.control_limits(field);
        }
        Ok(())
    }

    /// Selected fields whose contents differ between `self` and `other`.
    pub fn diff(&self, other: &ValueSnapshot, fields: FieldSet) -> ChangeSet {
        let mut changed = ChangeSet::empty();
        if fields.contains(FieldSet::VALUE) && self.value != other.value {
            changed |= FieldSet::VALUE;
        }
        if fields.contains(FieldSet::ALARM) && self.alarm != other.alarm {
            changed |= FieldSet::ALARM;
        }
        if fields.contains(FieldSet::TIME_STAMP) && self.time_stamp != other.time_stamp {
            changed |= FieldSet::TIME_STAMP;
        }
        if fields.contains(FieldSet::DISPLAY) && self.display != other.display {
            changed |= FieldSet::DISPLAY;
        }
        if fields.contains(FieldSet::CONTROL) && self.control != other.control {
            changed |= FieldSet::CONTROL;
        }
        changed
    }
}
