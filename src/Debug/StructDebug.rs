use std::fmt;

use crate::Core::record::RecordHandle;
use crate::Core::soft::SoftRecord;
use crate::DbPv::Buffer::MonitorQueue;
use crate::DbPv::{ChannelArray, ChannelGet, ChannelProcess, ChannelPut, CompletionBridge, Monitor};

/// Debug function for MonitorQueue
///
/// Shows the slot states under the ring lock; slot contents are not
/// touched, since a delivered slot belongs to the consumer.
pub fn debug_monitor_queue(queue: &MonitorQueue, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let ring = queue.ring.lock();
    f.debug_struct("MonitorQueue")
        .field("id", &queue.id)
        .field("capacity", &queue.capacity)
        .field("states", &ring.states)
        .field("free", &ring.free)
        .field("queued", &ring.queued)
        .field("started", &ring.started)
        .field("being_destroyed", &ring.being_destroyed)
        .finish()
}

/// Debug function for RecordHandle
pub fn debug_record_handle(handle: &RecordHandle, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecordHandle")
        .field("record", &handle.record().name())
        .field("field", &handle.field())
        .finish()
}

pub fn debug_completion_bridge(bridge: &CompletionBridge, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CompletionBridge")
        .field("record", &bridge.record_name())
        .field("in_flight", &bridge.is_in_flight())
        .finish()
}

pub fn debug_monitor(monitor: &Monitor, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Monitor")
        .field("handle", monitor.handle())
        .field("fields", &monitor.fields())
        .field("queue", monitor.queue())
        .field("stats", &monitor.stats())
        .finish()
}

pub fn debug_channel_array(array: &ChannelArray, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelArray")
        .field("field_type", &array.field_type())
        .finish_non_exhaustive()
}

pub fn debug_channel_get(get: &ChannelGet, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelGet")
        .field("handle", get.handle())
        .field("fields", &get.fields())
        .field("bridge", &get.bridge())
        .field("destroyed", &get.is_destroyed())
        .finish()
}

pub fn debug_channel_put(put: &ChannelPut, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelPut")
        .field("handle", put.handle())
        .field("field_type", &put.field_type())
        .field("bridge", &put.bridge())
        .field("destroyed", &put.is_destroyed())
        .finish()
}

pub fn debug_channel_process(process: &ChannelProcess, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ChannelProcess")
        .field("bridge", process.bridge())
        .field("destroyed", &process.is_destroyed())
        .finish()
}

/// Debug function for SoftRecord
///
/// Field memory is never read here; it needs the scan lock.
pub fn debug_soft_record(record: &SoftRecord, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    use crate::Core::record::Record;
    f.debug_struct("SoftRecord")
        .field("name", &record.name())
        .field("listeners", &record.listener_count())
        .field("process_count", &record.process_count())
        .finish_non_exhaustive()
}
