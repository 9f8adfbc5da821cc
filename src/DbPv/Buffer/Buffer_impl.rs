use std::collections::VecDeque;
use std::sync::atomic::Ordering::Relaxed;

use parking_lot::{Mutex, MutexGuard};

use super::Buffer::{
    ElementData, MonitorElement, MonitorQueue, Reservation, Reserve, Ring, SlotState, NEXT_QUEUE_ID,
};
use crate::error::{Error, Result};
use crate::Core::field::FieldType;
use crate::DbPv::Structs::{ChangeSet, ValueSnapshot};

impl MonitorQueue {
    /// Allocates `capacity` slots up front. They are recycled for the life
    /// of the queue and never resized.
    pub fn new(capacity: usize, field_type: FieldType) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Configuration(
                "queue size must be at least 1".to_string(),
            ));
        }
        let slots = (0..capacity)
            .map(|_| {
                Mutex::new(Some(ElementData {
                    snapshot: ValueSnapshot::new(field_type),
                    changed: ChangeSet::empty(),
                    overflow: false,
                }))
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            id: NEXT_QUEUE_ID.fetch_add(1, Relaxed),
            ring: Mutex::new(Ring {
                states: vec![SlotState::Free; capacity].into_boxed_slice(),
                free: (0..capacity).collect(),
                queued: VecDeque::with_capacity(capacity),
                started: false,
                being_destroyed: false,
                deferred: false,
            }),
            slots,
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Elements waiting to be polled.
    pub fn queued_len(&self) -> usize {
        self.ring.lock().queued.len()
    }

    pub fn free_len(&self) -> usize {
        self.ring.lock().free.len()
    }

    pub(crate) fn slot(&self, index: usize) -> MutexGuard<'_, Option<ElementData>> {
        self.slots[index].lock()
    }

    /// Marks the queue started. Fails if it already is.
    pub(crate) fn start(&self) -> Result<()> {
        let mut ring = self.ring.lock();
        if ring.being_destroyed {
            return Err(Error::destroyed());
        }
        if ring.started {
            return Err(Error::AlreadyStarted);
        }
        ring.started = true;
        Ok(())
    }

    /// Returns whether the queue was running.
    pub(crate) fn stop(&self) -> bool {
        let mut ring = self.ring.lock();
        std::mem::replace(&mut ring.started, false)
    }

    /// Flags the queue as being destroyed. Returns `false` if it already was.
    pub(crate) fn begin_destroy(&self) -> bool {
        let mut ring = self.ring.lock();
        if ring.being_destroyed {
            return false;
        }
        ring.being_destroyed = true;
        ring.started = false;
        true
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.ring.lock().being_destroyed
    }

    /// An update was dropped for lack of slots and has not been produced since.
    pub(crate) fn has_deferred(&self) -> bool {
        let ring = self.ring.lock();
        ring.deferred && ring.started && !ring.free.is_empty()
    }

    /// Producer side, step 1: pick the slot the next update goes into.
    ///
    /// A free slot is preferred. With none free, the newest element that
    /// the consumer has not polled yet is reopened for merging. Delivered
    /// slots are never chosen.
    pub(crate) fn reserve(&self) -> Reserve {
        let mut ring = self.ring.lock();
        if ring.being_destroyed || !ring.started {
            return Reserve::Inactive;
        }
        if let Some(slot) = ring.free.pop_front() {
            ring.states[slot] = SlotState::Producing;
            let after_deferral = std::mem::replace(&mut ring.deferred, false);
            return Reserve::Slot(Reservation::Fresh {
                slot,
                after_deferral,
            });
        }
        match ring.queued.back().copied() {
            Some(slot) if ring.states[slot] == SlotState::Queued => {
                ring.states[slot] = SlotState::Refreshing;
                Reserve::Slot(Reservation::Merge { slot })
            }
            _ => {
                ring.deferred = true;
                Reserve::Full
            }
        }
    }

    /// Producer side, step 2: hand the reserved slot back to the ring.
    /// `produced` is false when the update turned out to carry no change,
    /// in which case a fresh slot goes back on the free list.
    pub(crate) fn publish(&self, reservation: Reservation, produced: bool) {
        let mut ring = self.ring.lock();
        match reservation {
            Reservation::Fresh { slot, .. } => {
                debug_assert_eq!(ring.states[slot], SlotState::Producing);
                if produced {
                    ring.states[slot] = SlotState::Queued;
                    ring.queued.push_back(slot);
                } else {
                    ring.states[slot] = SlotState::Free;
                    ring.free.push_front(slot);
                }
            }
            Reservation::Merge { slot } => {
                debug_assert_eq!(ring.states[slot], SlotState::Refreshing);
                ring.states[slot] = SlotState::Queued;
            }
        }
        debug_assert!(check_invariants(&ring, self.capacity));
    }

    /// Takes the oldest queued element, if any. Never blocks on the
    /// producer: an element that is being merged into is reported as not
    /// available yet.
    pub fn poll(&self) -> Option<MonitorElement> {
        let slot = {
            let mut ring = self.ring.lock();
            let slot = *ring.queued.front()?;
            if ring.states[slot] != SlotState::Queued {
                return None;
            }
            ring.queued.pop_front();
            ring.states[slot] = SlotState::Delivered;
            slot
        };
        // Delivered: the producer will not pick this slot, so the lock below
        // is uncontended.
        let data = self.slot(slot).take()?;
        Some(MonitorElement {
            slot,
            queue_id: self.id,
            data,
        })
    }

    /// Gives a polled element's slot back to the free list.
    pub fn release(&self, element: MonitorElement) -> Result<()> {
        if element.queue_id != self.id || element.slot >= self.capacity {
            return Err(Error::InvalidState(
                "element was not delivered by this monitor".to_string(),
            ));
        }
        let slot = element.slot;
        {
            let ring = self.ring.lock();
            if ring.states[slot] != SlotState::Delivered {
                return Err(Error::InvalidState(format!(
                    "slot {} is {:?}, not delivered",
                    slot, ring.states[slot]
                )));
            }
        }
        let mut data = element.data;
        data.changed = ChangeSet::empty();
        data.overflow = false;
        *self.slot(slot) = Some(data);

        let mut ring = self.ring.lock();
        ring.states[slot] = SlotState::Free;
        ring.free.push_back(slot);
        debug_assert!(check_invariants(&ring, self.capacity));
        Ok(())
    }
}

/// Every slot is accounted for exactly once.
fn check_invariants(ring: &Ring, capacity: usize) -> bool {
    let count = |state: SlotState| ring.states.iter().filter(|s| **s == state).count();
    let queued = count(SlotState::Queued) + count(SlotState::Refreshing);
    ring.free.len() == count(SlotState::Free)
        && ring.queued.len() == queued
        && ring.free.iter().all(|s| ring.states[*s] == SlotState::Free)
        && ring.states.len() == capacity
}
