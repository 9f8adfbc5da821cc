// Change subscription on one record field.
//
// Producer: the record's event callback copies the record into a queue slot.
// Consumer: the client's poll/release. The two meet only in `MonitorQueue`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_utils::CachePadded;
use log::{debug, trace, warn};
use parking_lot::Mutex;

use super::Buffer::Buffer::{Reservation, Reserve};
use super::Buffer::{MonitorElement, MonitorQueue};
use super::Structs::{FieldSet, ValueSnapshot};
use crate::error::{Error, Result};
use crate::Core::field::FieldType;
use crate::Core::record::{EventListener, EventMask, RecordHandle, SubscriptionId};

/// Client side of a monitor: told when a new element can be polled.
pub trait MonitorRequester: Send + Sync {
    fn monitor_event(&self);

    /// The monitor was destroyed and will not produce again.
    fn unlisten(&self) {}
}

/// Counters since the monitor was built.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Event callbacks received.
    pub events: u64,
    /// Elements queued into a free slot.
    pub produced: u64,
    /// Updates folded into an unread element.
    pub merged: u64,
    /// Updates dropped because every slot was delivered.
    pub deferred: u64,
}

#[derive(Default)]
struct Counters {
    events: CachePadded<AtomicU64>,
    produced: CachePadded<AtomicU64>,
    merged: CachePadded<AtomicU64>,
    deferred: CachePadded<AtomicU64>,
}

struct ProducerState {
    /// Last snapshot that went into the queue; changesets are relative to it.
    last: ValueSnapshot,
}

pub(crate) struct MonitorShared {
    handle: RecordHandle,
    field_type: FieldType,
    fields: FieldSet,
    queue: MonitorQueue,
    producer: Mutex<ProducerState>,
    requester: Option<Weak<dyn MonitorRequester>>,
    subscription: Mutex<Option<SubscriptionId>>,
    counters: Counters,
}

impl MonitorShared {
    /// Copies the record into the queue. `force` marks every requested
    /// field as changed, which is how the first element after `start` goes out.
    fn produce(&self, force: bool) {
        let mut producer = self.producer.lock();
        let reservation = match self.queue.reserve() {
            Reserve::Inactive => return,
            Reserve::Full => {
                self.counters.deferred.fetch_add(1, Ordering::Relaxed);
                debug!("{}: every slot delivered, update deferred", self.handle.record().name());
                return;
            }
            Reserve::Slot(reservation) => reservation,
        };

        let mut produced = false;
        {
            let mut slot = self.queue.slot(reservation.slot());
            if let Some(data) = slot.as_mut() {
                let captured = {
                    let lock = self.handle.scan_lock();
                    data.snapshot
                        .capture(&lock, &self.handle, self.field_type, self.fields)
                };
                match captured {
                    Ok(()) => {
                        let mut diff = data.snapshot.diff(&producer.last, self.fields);
                        if force {
                            diff = self.fields;
                        }
                        match reservation {
                            Reservation::Fresh { after_deferral, .. } => {
                                data.changed = diff;
                                data.overflow = after_deferral;
                                produced = !diff.is_empty();
                            }
                            Reservation::Merge { .. } => {
                                data.changed |= diff;
                                if !diff.is_empty() {
                                    data.overflow = true;
                                    self.counters.merged.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        if !diff.is_empty() {
                            producer.last.clone_from(&data.snapshot);
                        }
                    }
                    Err(err) => {
                        warn!("{}: monitor capture failed: {}", self.handle.record().name(), err)
                    }
                }
            }
        }
        self.queue.publish(reservation, produced);
        drop(producer);

        if produced {
            self.counters.produced.fetch_add(1, Ordering::Relaxed);
            trace!("{}: monitor element queued", self.handle.record().name());
            if let Some(requester) = self.requester.as_ref().and_then(Weak::upgrade) {
                requester.monitor_event();
            }
        }
    }
}

impl EventListener for MonitorShared {
    fn event_callback(&self) {
        if self.queue.is_destroyed() {
            return;
        }
        self.counters.events.fetch_add(1, Ordering::Relaxed);
        self.produce(false);
    }
}

/// Raw listener reference for a C record subsystem.
#[derive(Clone)]
pub struct EventHandle {
    target: Weak<dyn EventListener>,
}

impl EventHandle {
    /// Delivers one event callback. Does nothing once the monitor is gone.
    pub fn fire(&self) {
        if let Some(listener) = self.target.upgrade() {
            listener.event_callback();
        }
    }

    pub fn into_raw(self) -> *mut EventHandle {
        Box::into_raw(Box::new(self))
    }

    /// # Safety
    /// `ptr` must come from [`EventHandle::into_raw`] and not be used again.
    pub unsafe fn from_raw(ptr: *mut EventHandle) -> EventHandle {
        *Box::from_raw(ptr)
    }
}

/// Subscription on one record field, buffering up to `queue_size`
/// snapshots for a consumer that polls at its own pace.
pub struct Monitor {
    inner: Arc<MonitorShared>,
}

impl Monitor {
    pub(crate) fn new(
        handle: RecordHandle,
        fields: FieldSet,
        queue_size: usize,
        requester: Option<Weak<dyn MonitorRequester>>,
    ) -> Result<Self> {
        let raw = handle.record().field_type(handle.field());
        let field_type = FieldType::from_dbf(raw).ok_or(Error::UnsupportedType(raw))?;
        let queue = MonitorQueue::new(queue_size, field_type)?;
        let inner = Arc::new(MonitorShared {
            field_type,
            fields,
            queue,
            producer: Mutex::new(ProducerState {
                last: ValueSnapshot::new(field_type),
            }),
            requester,
            subscription: Mutex::new(None),
            counters: Counters::default(),
            handle,
        });
        let weak = Arc::downgrade(&inner);
        let listener: Weak<dyn EventListener> = weak;
        let id = inner.handle.record().add_event_listener(
            inner.handle.field(),
            EventMask::VALUE | EventMask::LOG | EventMask::ALARM,
            listener,
        );
        *inner.subscription.lock() = Some(id);
        debug!(
            "monitor on {} built, queue size {}",
            inner.handle.record().name(),
            queue_size
        );
        Ok(Self { inner })
    }

    /// Starts production and queues the current value with every requested
    /// field marked changed.
    pub fn start(&self) -> Result<()> {
        self.inner.queue.start()?;
        self.inner.produce(true);
        Ok(())
    }

    /// Stops production. Elements already queued stay pollable.
    pub fn stop(&self) -> Result<()> {
        if self.inner.queue.is_destroyed() {
            return Err(Error::destroyed());
        }
        self.inner.queue.stop();
        Ok(())
    }

    /// Oldest unread element, or `None` if there is none.
    pub fn poll(&self) -> Option<MonitorElement> {
        self.inner.queue.poll()
    }

    /// Hands a polled element back. An update that found no slot is
    /// produced now.
    pub fn release(&self, element: MonitorElement) -> Result<()> {
        self.inner.queue.release(element)?;
        if self.inner.queue.has_deferred() {
            self.inner.produce(false);
        }
        Ok(())
    }

    /// Device-side entry point; same as the record posting an event.
    pub fn event_callback(&self) {
        self.inner.event_callback();
    }

    pub fn event_handle(&self) -> EventHandle {
        let weak = Arc::downgrade(&self.inner);
        let target: Weak<dyn EventListener> = weak;
        EventHandle { target }
    }

    pub fn stats(&self) -> MonitorStats {
        let c = &self.inner.counters;
        MonitorStats {
            events: c.events.load(Ordering::Relaxed),
            produced: c.produced.load(Ordering::Relaxed),
            merged: c.merged.load(Ordering::Relaxed),
            deferred: c.deferred.load(Ordering::Relaxed),
        }
    }

    pub fn queue(&self) -> &MonitorQueue {
        &self.inner.queue
    }

    pub fn fields(&self) -> FieldSet {
        self.inner.fields
    }

    pub fn handle(&self) -> &RecordHandle {
        &self.inner.handle
    }

    /// Stops production, unregisters from the record and tells the
    /// requester. Idempotent.
    pub fn destroy(&self) {
        if !self.inner.queue.begin_destroy() {
            return;
        }
        if let Some(id) = self.inner.subscription.lock().take() {
            self.inner.handle.record().remove_event_listener(id);
        }
        debug!("monitor on {} destroyed", self.inner.handle.record().name());
        if let Some(requester) = self.inner.requester.as_ref().and_then(Weak::upgrade) {
            requester.unlisten();
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.destroy();
    }
}

