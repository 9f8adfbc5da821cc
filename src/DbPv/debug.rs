use std::fmt;

use super::Buffer::MonitorQueue;
use super::{ChannelArray, ChannelGet, ChannelProcess, ChannelPut, CompletionBridge, Monitor};
use crate::Core::record::RecordHandle;
use crate::Core::soft::SoftRecord;

impl fmt::Debug for MonitorQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_monitor_queue(self, f)
    }
}

impl fmt::Debug for RecordHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_record_handle(self, f)
    }
}

impl fmt::Debug for CompletionBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_completion_bridge(self, f)
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_monitor(self, f)
    }
}

impl fmt::Debug for ChannelArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_channel_array(self, f)
    }
}

impl fmt::Debug for SoftRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_soft_record(self, f)
    }
}

impl fmt::Debug for ChannelGet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_channel_get(self, f)
    }
}

impl fmt::Debug for ChannelPut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_channel_put(self, f)
    }
}

impl fmt::Debug for ChannelProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_channel_process(self, f)
    }
}
