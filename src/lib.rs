// Module naming follows project convention (DbPv = record-database channel operations)
#[allow(non_snake_case)]
pub mod DbPv {
    pub mod Buffer {
        pub mod Buffer;
        pub mod Buffer_impl;
        pub use Buffer::{MonitorElement, MonitorQueue, SlotState}; // re-export for stable path
    }
    pub mod Structs {
        pub mod Snapshot;
        pub use Snapshot::{ChangeSet, FieldSet, ValueSnapshot}; // re-export for stable path
    }

    pub mod array;
    pub mod completion;
    mod debug;
    pub mod get;
    pub mod monitor;
    pub mod process;
    pub mod put;
    pub mod request;

    mod builder;

    pub use array::ChannelArray;
    pub use builder::ChannelBuilder;
    pub use completion::{CompletionBridge, InFlight, NotifyHandle};
    pub use get::{ChannelGet, Reading};
    pub use monitor::{EventHandle, Monitor, MonitorRequester, MonitorStats};
    pub use process::ChannelProcess;
    pub use put::ChannelPut;
    pub use request::Request;
}
#[allow(non_snake_case)]
pub mod Core {
    pub mod event;
    pub mod field;
    pub mod record;
    pub mod soft;
    pub use field::{FieldType, NativeElement, ScalarArray};
    pub use record::{Record, RecordHandle, ScanLock};
    pub use soft::SoftRecord;
}
#[allow(non_snake_case)]
mod Debug {
    pub mod StructDebug;
}

pub mod error;
pub mod ffi;

pub use error::{DeviceError, Error, ErrorKind, Result};
