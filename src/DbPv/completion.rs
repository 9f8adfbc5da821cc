// Blocking wrapper around the record subsystem's asynchronous
// "write the trigger field, process, call me back" request.
//
// Order of a triggered call: claim the bridge, mutate under the scan lock,
// release the scan lock, issue the request, wait. The subsystem's processing takes the scan
// lock itself, so it must never be held across the wait.

use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::Mutex;

use crate::error::{DeviceError, Error, Result};
use crate::Core::event::Event;
use crate::Core::record::{FieldId, NotifyRequest, Record, RecordHandle};

/// Name of the field whose write makes a record process.
pub const TRIGGER_FIELD: &str = "PROC";

#[derive(Default)]
struct PendingState {
    in_flight: bool,
    being_destroyed: bool,
    status: Option<std::result::Result<(), DeviceError>>,
}

pub(crate) struct Pending {
    event: Event,
    state: Mutex<PendingState>,
}

/// Completion callback handed to the record subsystem with each request.
///
/// `complete` only records the outcome and wakes the waiting thread; the
/// outcome is interpreted on that thread.
#[derive(Clone)]
pub struct NotifyHandle {
    pending: Arc<Pending>,
}

impl NotifyHandle {
    /// Reports the end of processing. Safe from any thread; ignored if the
    /// operation was destroyed or nothing is waiting.
    pub fn complete(&self, status: std::result::Result<(), DeviceError>) {
        {
            let mut state = self.pending.state.lock();
            if state.being_destroyed || !state.in_flight || state.status.is_some() {
                trace!("late or duplicate completion ignored");
                return;
            }
            state.status = Some(status);
        }
        self.pending.event.signal();
    }

    /// Leaks the handle as a raw pointer for a C caller.
    pub fn into_raw(self) -> *mut NotifyHandle {
        Box::into_raw(Box::new(self))
    }

    /// # Safety
    /// `ptr` must come from [`NotifyHandle::into_raw`] and not be used again.
    pub unsafe fn from_raw(ptr: *mut NotifyHandle) -> NotifyHandle {
        *Box::from_raw(ptr)
    }
}

/// One reusable pending completion bound to a record's trigger field.
pub struct CompletionBridge {
    record: Arc<dyn Record>,
    trigger: FieldId,
    pending: Arc<Pending>,
}

impl CompletionBridge {
    /// Resolves the trigger field of the handle's record.
    pub fn new(handle: &RecordHandle) -> Result<Self> {
        let record = Arc::clone(handle.shared_record());
        let trigger = record.resolve_field(TRIGGER_FIELD).ok_or_else(|| {
            Error::Configuration(format!(
                "cannot resolve {}.{}",
                record.name(),
                TRIGGER_FIELD
            ))
        })?;
        debug!("completion bridge bound to {}.{}", record.name(), TRIGGER_FIELD);
        Ok(Self {
            record,
            trigger,
            pending: Arc::new(Pending {
                event: Event::new(),
                state: Mutex::new(PendingState::default()),
            }),
        })
    }

    /// Processes the record and blocks until the subsystem reports
    /// completion. Must be called without the scan lock held.
    pub fn process(&self) -> Result<()> {
        self.begin()?.trigger_and_wait()
    }

    /// Claims the bridge for one triggered call. Fails with `InvalidState`
    /// if another call holds it, so a caller can claim before mutating the
    /// record and leave it untouched on rejection.
    pub fn begin(&self) -> Result<InFlight<'_>> {
        let mut state = self.pending.state.lock();
        if state.being_destroyed {
            return Err(Error::destroyed());
        }
        if state.in_flight {
            return Err(Error::InvalidState(
                "a process request is already in flight".to_string(),
            ));
        }
        // a signal raised by destroy from here on must survive until the wait
        self.pending.event.clear();
        state.in_flight = true;
        state.status = None;
        Ok(InFlight { bridge: self })
    }

    fn is_being_destroyed(&self) -> bool {
        self.pending.state.lock().being_destroyed
    }

    /// Marks the bridge destroyed and wakes a waiter, which then fails with
    /// `InvalidState`. Idempotent.
    pub fn destroy(&self) {
        let waiting = {
            let mut state = self.pending.state.lock();
            if state.being_destroyed {
                return;
            }
            state.being_destroyed = true;
            state.in_flight
        };
        if waiting {
            debug!("{}: abandoning in-flight process request", self.record.name());
            self.pending.event.signal();
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.state.lock().in_flight
    }

    pub(crate) fn record_name(&self) -> &str {
        self.record.name()
    }
}

/// A claimed bridge. Dropping it without triggering releases the claim.
#[derive(Debug)]
pub struct InFlight<'a> {
    bridge: &'a CompletionBridge,
}

impl InFlight<'_> {
    /// Issues the process request and blocks until it completes or the
    /// bridge is destroyed.
    pub fn trigger_and_wait(self) -> Result<()> {
        let bridge = self.bridge;
        if bridge.is_being_destroyed() {
            return Err(Error::destroyed());
        }
        let request = NotifyRequest {
            field: bridge.trigger,
            value: 1,
            handle: NotifyHandle {
                pending: Arc::clone(&bridge.pending),
            },
        };
        trace!("{}: process requested", bridge.record.name());
        bridge.record.put_notify(request)?;
        if bridge.is_being_destroyed() {
            return Err(Error::destroyed());
        }

        bridge.pending.event.wait();

        let mut state = bridge.pending.state.lock();
        if state.being_destroyed {
            return Err(Error::destroyed());
        }
        match state.status.take() {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => {
                warn!("{}: processing failed: {}", bridge.record.name(), err);
                Err(err.into())
            }
            None => Err(Error::InvalidState(
                "woken without a completion status".to_string(),
            )),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.bridge.pending.state.lock().in_flight = false;
    }
}

impl Drop for CompletionBridge {
    fn drop(&mut self) {
        self.destroy();
    }
}
