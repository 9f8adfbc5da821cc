// In-memory record implementing `Record`, standing in for a real record
// database in tests and demos.
//
// Layout: each field owns a byte buffer guarded by the record's scan lock.
// Posted events go to a per-record event thread, so listeners always run
// outside the scan lock. Each notify request is processed on its own thread,
// which takes the scan lock like the real subsystem does.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};
use parking_lot::lock_api::RawMutex as _;
use parking_lot::{Mutex, RawMutex};

use super::event::Event;
use super::field::{FieldType, NativeElement, ScalarArray, Transfer, DBF_ENUM};
use super::record::{
    Alarm, AlarmSeverity, ArrayInfo, EventListener, EventMask, FieldId, Limits, NotifyRequest,
    Record, ScanLock, SubscriptionId, TimeStamp,
};
use crate::error::DeviceError;

/// Record processing hook, run with the scan lock held.
pub type Processor =
    Box<dyn Fn(&mut ScanContext<'_>) -> Result<(), DeviceError> + Send + Sync + 'static>;

struct SoftField {
    name: String,
    dbf: u16,
    field_size: usize,
    capacity: usize,
    dynamic: bool,
    length: AtomicUsize,
    data: UnsafeCell<Box<[u8]>>,
    display: Limits,
    control: Limits,
}

struct Listener {
    id: SubscriptionId,
    field: FieldId,
    mask: EventMask,
    target: Weak<dyn EventListener>,
}

enum Dispatch {
    Fire(Weak<dyn EventListener>),
    Barrier(Arc<Event>),
}

#[derive(Default)]
struct RecordMeta {
    alarm: Alarm,
    time: TimeStamp,
}

pub struct SoftRecord {
    name: String,
    scan: RawMutex,
    fields: Vec<SoftField>,
    by_name: HashMap<String, FieldId>,
    meta: Mutex<RecordMeta>,
    processor: Option<Processor>,
    listeners: Mutex<Vec<Listener>>,
    events: Sender<Dispatch>,
    next_subscription: AtomicU64,
    process_count: AtomicU64,
    this: Weak<SoftRecord>,
}

// Field buffers are only touched with the scan lock held.
unsafe impl Send for SoftRecord {}
unsafe impl Sync for SoftRecord {}

struct FieldDef {
    name: String,
    dbf: u16,
    field_size: usize,
    capacity: usize,
    dynamic: bool,
    display: Limits,
    control: Limits,
}

pub struct SoftRecordBuilder {
    name: String,
    fields: Vec<FieldDef>,
    processor: Option<Processor>,
    trigger: bool,
}

impl SoftRecordBuilder {
    fn push(mut self, name: &str, dbf: u16, field_size: usize, capacity: usize, dynamic: bool) -> Self {
        self.fields.push(FieldDef {
            name: name.to_string(),
            dbf,
            field_size,
            capacity,
            dynamic,
            display: Limits::default(),
            control: Limits::default(),
        });
        self
    }

    /// One-element field.
    pub fn scalar(self, name: &str, field_type: FieldType) -> Self {
        self.push(name, field_type.dbf(), field_type.element_size(), 1, false)
    }

    /// Fixed-length array field.
    pub fn array(self, name: &str, field_type: FieldType, capacity: usize) -> Self {
        self.push(name, field_type.dbf(), field_type.element_size(), capacity, false)
    }

    /// Array field whose valid length can vary up to `capacity`; starts empty.
    pub fn waveform(self, name: &str, field_type: FieldType, capacity: usize) -> Self {
        self.push(name, field_type.dbf(), field_type.element_size(), capacity, true)
    }

    /// Text array with a custom per-element width.
    pub fn text(self, name: &str, width: usize, capacity: usize) -> Self {
        self.push(name, FieldType::String.dbf(), width, capacity, false)
    }

    /// Menu/enum field, which has no native array mapping.
    pub fn enumerated(self, name: &str) -> Self {
        self.push(name, DBF_ENUM, 2, 1, false)
    }

    /// Sets display and control limits of the most recently added field.
    pub fn limits(mut self, display: Limits, control: Limits) -> Self {
        if let Some(def) = self.fields.last_mut() {
            def.display = display;
            def.control = control;
        }
        self
    }

    pub fn processor<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut ScanContext<'_>) -> Result<(), DeviceError> + Send + Sync + 'static,
    {
        self.processor = Some(Box::new(hook));
        self
    }

    /// Leaves out the `PROC` field, so the record cannot be processed
    /// through a channel.
    pub fn no_trigger(mut self) -> Self {
        self.trigger = false;
        self
    }

    /// Builds the record and starts its event thread.
    pub fn build(self) -> io::Result<Arc<SoftRecord>> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut defs = self.fields;
        if self.trigger && !defs.iter().any(|s| s.name == "PROC") {
            defs.push(FieldDef {
                name: "PROC".to_string(),
                dbf: FieldType::UChar.dbf(),
                field_size: 1,
                capacity: 1,
                dynamic: false,
                display: Limits::default(),
                control: Limits::default(),
            });
        }
        let mut by_name = HashMap::new();
        let mut fields = Vec::with_capacity(defs.len());
        for (i, def) in defs.into_iter().enumerate() {
            by_name.insert(def.name.clone(), FieldId(i as u32));
            let bytes = def.capacity * def.field_size;
            fields.push(SoftField {
                length: AtomicUsize::new(if def.dynamic { 0 } else { def.capacity }),
                data: UnsafeCell::new(vec![0u8; bytes].into_boxed_slice()),
                name: def.name,
                dbf: def.dbf,
                field_size: def.field_size,
                capacity: def.capacity,
                dynamic: def.dynamic,
                display: def.display,
                control: def.control,
            });
        }
        let name = self.name;
        let processor = self.processor;
        let record = Arc::new_cyclic(|this| SoftRecord {
            name: name.clone(),
            scan: RawMutex::INIT,
            fields,
            by_name,
            meta: Mutex::new(RecordMeta::default()),
            processor,
            listeners: Mutex::new(Vec::new()),
            events: tx,
            next_subscription: AtomicU64::new(1),
            process_count: AtomicU64::new(0),
            this: this.clone(),
        });
        thread::Builder::new()
            .name(format!("{name}-events"))
            .spawn(move || event_task(rx))?;
        debug!("soft record {} built with {} fields", name, record.fields.len());
        Ok(record)
    }
}

fn event_task(rx: Receiver<Dispatch>) {
    // Ends when the record, which owns the only sender, is dropped.
    for dispatch in rx {
        match dispatch {
            Dispatch::Fire(target) => {
                if let Some(listener) = target.upgrade() {
                    listener.event_callback();
                }
            }
            Dispatch::Barrier(done) => done.signal(),
        }
    }
}

fn now() -> TimeStamp {
    let since = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    TimeStamp {
        seconds_past_epoch: since.as_secs() as i64,
        nanoseconds: since.subsec_nanos(),
        user_tag: 0,
    }
}

impl SoftRecord {
    pub fn builder(name: &str) -> SoftRecordBuilder {
        SoftRecordBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            processor: None,
            trigger: true,
        }
    }

    pub fn field(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).copied()
    }

    fn def(&self, field: FieldId) -> &SoftField {
        &self.fields[field.index()]
    }

    /// Runs `f` with the scan lock held.
    pub fn with_scan_lock<R>(&self, f: impl FnOnce(&mut ScanContext<'_>) -> R) -> R {
        let lock = ScanLock::new(self);
        let mut ctx = ScanContext {
            record: self,
            lock,
        };
        f(&mut ctx)
    }

    /// Device-side write: stores `values`, stamps the time and posts a
    /// value event, the way a driver update would.
    pub fn write<T: NativeElement>(&self, field: &str, values: &[T]) -> Result<(), DeviceError> {
        self.with_scan_lock(|ctx| {
            let id = ctx.write(field, values)?;
            ctx.stamp();
            self.post_events(id, EventMask::VALUE | EventMask::LOG);
            Ok(())
        })
    }

    /// Device-side text write.
    pub fn write_text(&self, field: &str, values: &[&str]) -> Result<(), DeviceError> {
        self.with_scan_lock(|ctx| {
            let id = ctx.write_text(field, values)?;
            ctx.stamp();
            self.post_events(id, EventMask::VALUE | EventMask::LOG);
            Ok(())
        })
    }

    /// Device-side read of a numeric field's valid elements.
    pub fn read<T: NativeElement>(&self, field: &str) -> Result<Vec<T>, DeviceError> {
        self.with_scan_lock(|ctx| ctx.read(field))
    }

    pub fn set_alarm(&self, severity: AlarmSeverity, status: u16, message: &str) {
        self.with_scan_lock(|ctx| {
            ctx.set_alarm(severity, status, message);
            let fields: Vec<FieldId> = (0..self.fields.len()).map(|i| FieldId(i as u32)).collect();
            for id in fields {
                self.post_events(id, EventMask::ALARM);
            }
        })
    }

    /// Processes the record on the calling thread.
    pub fn process(&self) -> Result<(), DeviceError> {
        self.process_with_trigger(None)
    }

    /// Number of completed processing passes.
    pub fn process_count(&self) -> u64 {
        self.process_count.load(Ordering::Acquire)
    }

    /// Blocks until every event posted so far has been delivered.
    pub fn flush_events(&self) {
        let done = Arc::new(Event::new());
        if self.events.send(Dispatch::Barrier(Arc::clone(&done))).is_ok() {
            done.wait();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    fn process_with_trigger(&self, trigger: Option<(FieldId, u8)>) -> Result<(), DeviceError> {
        let result = self.with_scan_lock(|ctx| {
            if let Some((field, value)) = trigger {
                ctx.store(field, &ScalarArray::UChar(vec![value]))?;
            }
            let status = match &self.processor {
                Some(hook) => hook(ctx),
                None => Ok(()),
            };
            ctx.stamp();
            for (i, field) in self.fields.iter().enumerate() {
                if field.name != "PROC" {
                    self.post_events(FieldId(i as u32), EventMask::VALUE | EventMask::LOG);
                }
            }
            status
        });
        self.process_count.fetch_add(1, Ordering::AcqRel);
        trace!("{}: processed ({:?})", self.name, result);
        result
    }
}

impl Record for SoftRecord {
    fn name(&self) -> &str {
        &self.name
    }

    fn resolve_field(&self, name: &str) -> Option<FieldId> {
        self.field(name)
    }

    fn field_type(&self, field: FieldId) -> u16 {
        self.def(field).dbf
    }

    fn field_size(&self, field: FieldId) -> usize {
        self.def(field).field_size
    }

    fn element_count(&self, field: FieldId) -> usize {
        self.def(field).capacity
    }

    fn array_info(&self, field: FieldId) -> Option<ArrayInfo> {
        let def = self.def(field);
        def.dynamic.then(|| ArrayInfo {
            length: def.length.load(Ordering::Acquire),
            offset: 0,
        })
    }

    fn put_array_info(&self, field: FieldId, length: usize) -> Result<(), DeviceError> {
        let def = self.def(field);
        if def.dynamic {
            def.length.store(length.min(def.capacity), Ordering::Release);
        }
        Ok(())
    }

    unsafe fn field_ptr(&self, field: FieldId) -> *mut u8 {
        (*self.def(field).data.get()).as_mut_ptr()
    }

    fn alarm(&self) -> Alarm {
        self.meta.lock().alarm.clone()
    }

    fn time_stamp(&self) -> TimeStamp {
        self.meta.lock().time
    }

    fn display_limits(&self, field: FieldId) -> Limits {
        self.def(field).display
    }

    fn control_limits(&self, field: FieldId) -> Limits {
        self.def(field).control
    }

    fn post_events(&self, field: FieldId, mask: EventMask) {
        let listeners = self.listeners.lock();
        for listener in listeners.iter() {
            if listener.field == field && listener.mask.intersects(mask) {
                let _ = self.events.send(Dispatch::Fire(listener.target.clone()));
            }
        }
    }

    fn put_notify(&self, request: NotifyRequest) -> Result<(), DeviceError> {
        let this = self
            .this
            .upgrade()
            .ok_or_else(|| DeviceError::new(-1, "record is being torn down"))?;
        thread::Builder::new()
            .name(format!("{}-scan", self.name))
            .spawn(move || {
                let status = this.process_with_trigger(Some((request.field, request.value)));
                request.handle.complete(status);
            })
            .map(|_| ())
            .map_err(|e| DeviceError::new(-1, format!("cannot start processing: {e}")))
    }

    fn add_event_listener(
        &self,
        field: FieldId,
        mask: EventMask,
        listener: Weak<dyn EventListener>,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            field,
            mask,
            target: listener,
        });
        id
    }

    fn remove_event_listener(&self, id: SubscriptionId) {
        self.listeners.lock().retain(|l| l.id != id);
    }

    fn scan_lock(&self) {
        self.scan.lock();
    }

    unsafe fn scan_unlock(&self) {
        self.scan.unlock();
    }
}

/// Access to a [`SoftRecord`] while its scan lock is held.
pub struct ScanContext<'a> {
    record: &'a SoftRecord,
    lock: ScanLock<'a>,
}

impl ScanContext<'_> {
    fn lookup(&self, field: &str, want: FieldType) -> Result<FieldId, DeviceError> {
        let id = self
            .record
            .field(field)
            .ok_or_else(|| DeviceError::new(-2, format!("no field {field}")))?;
        if FieldType::from_dbf(self.record.def(id).dbf) != Some(want) {
            return Err(DeviceError::new(-3, format!("field {field} is not {want:?}")));
        }
        Ok(id)
    }

    fn store(&mut self, id: FieldId, data: &ScalarArray) -> Result<(), DeviceError> {
        let def = self.record.def(id);
        let count = data.len().min(def.capacity);
        super::field::write_strided(
            &self.lock,
            id,
            data.field_type(),
            Transfer::leading(count),
            data,
        )
        .map_err(|e| DeviceError::new(-4, e.to_string()))?;
        if def.dynamic {
            def.length.store(count, Ordering::Release);
        }
        Ok(())
    }

    fn load(&self, id: FieldId, field_type: FieldType) -> Result<ScalarArray, DeviceError> {
        let def = self.record.def(id);
        let mut out = ScalarArray::empty(field_type);
        let length = if def.dynamic {
            def.length.load(Ordering::Acquire)
        } else {
            def.capacity
        };
        super::field::read_strided(&self.lock, id, field_type, Transfer::leading(length), &mut out)
            .map_err(|e| DeviceError::new(-4, e.to_string()))?;
        Ok(out)
    }

    /// Writes `values` from element 0; a waveform's length becomes `values.len()`.
    pub fn write<T: NativeElement>(&mut self, field: &str, values: &[T]) -> Result<FieldId, DeviceError> {
        let id = self.lookup(field, T::FIELD_TYPE)?;
        self.store(id, &T::into_array(values.to_vec()))?;
        Ok(id)
    }

    pub fn write_text(&mut self, field: &str, values: &[&str]) -> Result<FieldId, DeviceError> {
        let id = self.lookup(field, FieldType::String)?;
        let data = ScalarArray::String(values.iter().map(|s| s.to_string()).collect());
        self.store(id, &data)?;
        Ok(id)
    }

    pub fn read<T: NativeElement>(&self, field: &str) -> Result<Vec<T>, DeviceError> {
        let id = self.lookup(field, T::FIELD_TYPE)?;
        let values = self.load(id, T::FIELD_TYPE)?;
        Ok(T::from_array(values).unwrap_or_default())
    }

    pub fn read_text(&self, field: &str) -> Result<Vec<String>, DeviceError> {
        let id = self.lookup(field, FieldType::String)?;
        match self.load(id, FieldType::String)? {
            ScalarArray::String(v) => Ok(v),
            _ => Ok(Vec::new()),
        }
    }

    pub fn set_alarm(&mut self, severity: AlarmSeverity, status: u16, message: &str) {
        let mut meta = self.record.meta.lock();
        meta.alarm = Alarm {
            severity,
            status,
            message: message.to_string(),
        };
    }

    /// Sets the record time stamp to now.
    pub fn stamp(&mut self) {
        self.record.meta.lock().time = now();
    }
}
