use std::sync::{Arc, Weak};

use super::request::Request;
use super::Structs::FieldSet;
use super::{ChannelArray, ChannelGet, ChannelProcess, ChannelPut, Monitor, MonitorRequester};
use crate::error::{Error, Result};
use crate::Core::record::{Record, RecordHandle};

pub struct ChannelBuilder {
    record: Arc<dyn Record>,
    field: String,
    request: Request,
    requester: Option<Weak<dyn MonitorRequester>>,
}

impl ChannelBuilder {
    pub fn new(record: Arc<dyn Record>) -> Self {
        Self {
            record,
            field: "VAL".to_string(), // value field by default
            request: Request::default(),
            requester: None,
        }
    }

    pub fn with_field(mut self, name: &str) -> Self {
        self.field = name.to_string();
        self
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.request = request;
        self
    }

    pub fn with_properties(mut self, fields: FieldSet) -> Self {
        self.request.fields = fields;
        self
    }

    pub fn with_process(mut self, process: bool) -> Self {
        self.request.process = process;
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.request.queue_size = size;
        self
    }

    /// Held weakly; the monitor never keeps its requester alive.
    pub fn with_monitor_requester<R: MonitorRequester + 'static>(mut self, requester: &Arc<R>) -> Self {
        let weak = Arc::downgrade(requester);
        let weak: Weak<dyn MonitorRequester> = weak;
        self.requester = Some(weak);
        self
    }

    fn handle(&self) -> Result<RecordHandle> {
        RecordHandle::resolve(Arc::clone(&self.record), &self.field).ok_or_else(|| {
            Error::Configuration(format!(
                "record {} has no field {}",
                self.record.name(),
                self.field
            ))
        })
    }

    pub fn build_get(self) -> Result<ChannelGet> {
        ChannelGet::new(self.handle()?, self.request.fields, self.request.process)
    }

    pub fn build_put(self) -> Result<ChannelPut> {
        ChannelPut::new(self.handle()?, self.request.fields, self.request.process)
    }

    pub fn build_process(self) -> Result<ChannelProcess> {
        ChannelProcess::new(&self.handle()?)
    }

    pub fn build_array(self) -> Result<ChannelArray> {
        ChannelArray::new(self.handle()?)
    }

    pub fn build_monitor(self) -> Result<Monitor> {
        let handle = self.handle()?;
        Monitor::new(handle, self.request.fields, self.request.queue_size, self.requester)
    }
}
