// Interface to the record subsystem. Everything a channel operation needs
// from a live record goes through `Record`; the subsystem owns the memory,
// the scan lock and record processing.

use std::sync::{Arc, Weak};

use bitflags::bitflags;

use crate::error::DeviceError;
use crate::DbPv::completion::NotifyHandle;

/// Index of a field inside its record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FieldId(pub u32);

impl FieldId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Dynamic length of an array field, as reported by the record.
/// `offset` is the storage offset of element 0 (ring-buffered arrays).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArrayInfo {
    pub length: usize,
    pub offset: usize,
}

bitflags! {
    /// Which kinds of change a posted event describes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const VALUE = 0x1;
        const LOG = 0x2;
        const ALARM = 0x4;
        const PROPERTY = 0x8;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlarmSeverity {
    #[default]
    NoAlarm,
    Minor,
    Major,
    Invalid,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Alarm {
    pub severity: AlarmSeverity,
    pub status: u16,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TimeStamp {
    pub seconds_past_epoch: i64,
    pub nanoseconds: u32,
    pub user_tag: i32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Limits {
    pub low: f64,
    pub high: f64,
}

/// Handle returned when a listener is registered, used to remove it again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Receives change events posted on a record field.
///
/// Called from the record subsystem's event thread, never with the scan
/// lock held, at any time relative to client calls.
pub trait EventListener: Send + Sync {
    fn event_callback(&self);
}

/// A request to write `value` into `field` and process the record.
/// The subsystem must call `handle.complete(..)` exactly once when done.
pub struct NotifyRequest {
    pub field: FieldId,
    pub value: u8,
    pub handle: NotifyHandle,
}

/// A live record owned by the record subsystem.
///
/// Methods that read record state must be called with the scan lock held
/// (see [`ScanLock`]). The subsystem is free to mutate the record from its
/// own threads whenever the scan lock is not held by someone else.
pub trait Record: Send + Sync {
    fn name(&self) -> &str;

    /// Looks up a field by name (`"VAL"`, `"PROC"`, ...).
    fn resolve_field(&self, name: &str) -> Option<FieldId>;

    /// Raw type code of the field (see `field::DBF_*`).
    fn field_type(&self, field: FieldId) -> u16;

    /// Bytes per element.
    fn field_size(&self, field: FieldId) -> usize;

    /// Static capacity of the field in elements.
    fn element_count(&self, field: FieldId) -> usize;

    /// Current dynamic length, or `None` when the field is fixed-length.
    fn array_info(&self, field: FieldId) -> Option<ArrayInfo>;

    /// Sets the dynamic length. No-op for fixed-length fields.
    fn put_array_info(&self, field: FieldId, length: usize) -> Result<(), DeviceError>;

    /// Base address of the field's element storage.
    ///
    /// # Safety
    /// The pointer is only valid while the scan lock is held, and only for
    /// `element_count(field) * field_size(field)` bytes.
    unsafe fn field_ptr(&self, field: FieldId) -> *mut u8;

    fn alarm(&self) -> Alarm;

    fn time_stamp(&self) -> TimeStamp;

    fn display_limits(&self, field: FieldId) -> Limits;

    fn control_limits(&self, field: FieldId) -> Limits;

    /// Tells listeners of `field` that it changed.
    fn post_events(&self, field: FieldId, mask: EventMask);

    /// Starts asynchronous processing; completion is reported through the
    /// request's handle from a subsystem thread.
    fn put_notify(&self, request: NotifyRequest) -> Result<(), DeviceError>;

    fn add_event_listener(
        &self,
        field: FieldId,
        mask: EventMask,
        listener: Weak<dyn EventListener>,
    ) -> SubscriptionId;

    fn remove_event_listener(&self, id: SubscriptionId);

    /// Acquires the record's scan lock. Prefer [`ScanLock::new`].
    fn scan_lock(&self);

    /// Releases the scan lock.
    ///
    /// # Safety
    /// The calling thread must hold the lock.
    unsafe fn scan_unlock(&self);
}

/// Holds a record's scan lock until dropped.
pub struct ScanLock<'a> {
    record: &'a dyn Record,
}

impl<'a> ScanLock<'a> {
    pub fn new(record: &'a dyn Record) -> Self {
        record.scan_lock();
        Self { record }
    }

    pub fn record(&self) -> &'a dyn Record {
        self.record
    }
}

impl Drop for ScanLock<'_> {
    fn drop(&mut self) {
        // Safety: `new` acquired the lock on this thread.
        unsafe { self.record.scan_unlock() }
    }
}

/// A record plus one of its fields: what a channel is connected to.
#[derive(Clone)]
pub struct RecordHandle {
    record: Arc<dyn Record>,
    field: FieldId,
}

impl RecordHandle {
    pub fn new(record: Arc<dyn Record>, field: FieldId) -> Self {
        Self { record, field }
    }

    /// Resolves `field_name` on `record`.
    pub fn resolve(record: Arc<dyn Record>, field_name: &str) -> Option<Self> {
        let field = record.resolve_field(field_name)?;
        Some(Self::new(record, field))
    }

    pub fn record(&self) -> &dyn Record {
        &*self.record
    }

    pub fn shared_record(&self) -> &Arc<dyn Record> {
        &self.record
    }

    pub fn field(&self) -> FieldId {
        self.field
    }

    pub fn scan_lock(&self) -> ScanLock<'_> {
        ScanLock::new(&*self.record)
    }

    /// Current number of valid elements: the dynamic length when the field
    /// has one, the static capacity otherwise.
    pub fn current_length(&self, _lock: &ScanLock<'_>) -> usize {
        match self.record.array_info(self.field) {
            Some(info) => info.length,
            None => self.record.element_count(self.field),
        }
    }
}
