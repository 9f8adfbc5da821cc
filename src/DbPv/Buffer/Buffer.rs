// Bounded queue of snapshot elements shared by one monitor's producer
// (device event callback) and consumer (poll/release).

use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;

use parking_lot::Mutex;

use crate::DbPv::Structs::{ChangeSet, ValueSnapshot};

pub(crate) static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// Ownership state of one slot. A slot is in exactly one state at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// On the free list.
    Free,
    /// Taken off the free list by the producer, being filled.
    Producing,
    /// Waiting to be polled.
    Queued,
    /// Queued, but the producer is merging a newer update into it.
    Refreshing,
    /// Handed to the consumer, not yet released.
    Delivered,
}

/// Contents of one slot.
#[derive(Clone, Debug)]
pub struct ElementData {
    pub(crate) snapshot: ValueSnapshot,
    pub(crate) changed: ChangeSet,
    /// Set when more than one update was folded into this element.
    pub(crate) overflow: bool,
}

/// A polled element. Owns the slot's data until handed back with
/// `release`, so the producer can never touch it in the meantime.
#[derive(Debug)]
pub struct MonitorElement {
    pub(crate) slot: usize,
    pub(crate) queue_id: u64,
    pub(crate) data: ElementData,
}

impl MonitorElement {
    pub fn snapshot(&self) -> &ValueSnapshot {
        &self.data.snapshot
    }

    pub fn changed(&self) -> ChangeSet {
        self.data.changed
    }

    pub fn overflow(&self) -> bool {
        self.data.overflow
    }
}

/// Ring state guarded by the queue lock. `free` and `queued` hold slot
/// indices; `queued` is in production order (front = oldest).
pub(crate) struct Ring {
    pub(crate) states: Box<[SlotState]>,
    pub(crate) free: VecDeque<usize>,
    pub(crate) queued: VecDeque<usize>,
    pub(crate) started: bool,
    pub(crate) being_destroyed: bool,
    /// An update arrived while every slot was delivered.
    pub(crate) deferred: bool,
}

/// Fixed-capacity snapshot queue.
///
/// ### Concurrency Design:
/// - **Ring**: index lists and slot states live behind one short-lived lock.
/// - **Slots**: each slot's data sits behind its own lock, but the state
///   machine gives every slot a single owner, so those locks are never
///   contended. Snapshot copies happen outside the ring lock.
pub struct MonitorQueue {
    pub(crate) id: u64,
    pub(crate) ring: Mutex<Ring>,
    pub(crate) slots: Box<[Mutex<Option<ElementData>>]>,
    pub(crate) capacity: usize,
}

/// A slot reserved by the producer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reservation {
    /// A free slot. `after_deferral` is set if updates were dropped on
    /// the floor since the last element was produced.
    Fresh { slot: usize, after_deferral: bool },
    /// The newest unread element, to be merged into.
    Merge { slot: usize },
}

impl Reservation {
    pub(crate) fn slot(self) -> usize {
        match self {
            Reservation::Fresh { slot, .. } | Reservation::Merge { slot } => slot,
        }
    }
}

/// Outcome of asking the queue for a producer slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Reserve {
    /// Not started, or being destroyed.
    Inactive,
    /// Every slot is delivered; the update is deferred.
    Full,
    Slot(Reservation),
}
