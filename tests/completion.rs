// Triggered (process) calls: the blocking bridge over the record's
// asynchronous process-and-notify request.

use crossbeam_channel::{Receiver, Sender};
use dbpv_bridge::Core::event::Event;
use dbpv_bridge::Core::record::{
    Alarm, ArrayInfo, EventListener, EventMask, FieldId, Limits, NotifyRequest, SubscriptionId,
    TimeStamp,
};
use dbpv_bridge::Core::{FieldType, Record, RecordHandle, ScalarArray, SoftRecord};
use dbpv_bridge::DbPv::{ChannelBuilder, CompletionBridge};
use dbpv_bridge::{DeviceError, Error, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Record whose processing doubles VAL into OUT.
fn doubler(name: &str) -> Arc<SoftRecord> {
    SoftRecord::builder(name)
        .scalar("VAL", FieldType::Double)
        .scalar("OUT", FieldType::Double)
        .processor(|ctx| {
            let input = ctx.read::<f64>("VAL")?;
            ctx.write("OUT", &[input[0] * 2.0])?;
            Ok(())
        })
        .build()
        .unwrap()
}

/// Record whose processing blocks until `gate` is signalled.
fn gated(name: &str, gate: Arc<Event>) -> Arc<SoftRecord> {
    SoftRecord::builder(name)
        .scalar("VAL", FieldType::Long)
        .processor(move |_ctx| {
            gate.wait();
            Ok(())
        })
        .build()
        .unwrap()
}

fn bridge(record: &Arc<SoftRecord>) -> CompletionBridge {
    let handle = RecordHandle::resolve(record.clone(), "VAL").unwrap();
    CompletionBridge::new(&handle).unwrap()
}

/// Soft record whose process requests are held until the test completes
/// them by hand.
struct ParkingRecord {
    inner: Arc<SoftRecord>,
    parked: Sender<NotifyRequest>,
}

impl ParkingRecord {
    fn new(name: &str) -> (Arc<ParkingRecord>, Receiver<NotifyRequest>) {
        let inner = SoftRecord::builder(name)
            .scalar("VAL", FieldType::Double)
            .build()
            .unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        (Arc::new(ParkingRecord { inner, parked: tx }), rx)
    }
}

impl Record for ParkingRecord {
    fn name(&self) -> &str {
        self.inner.name()
    }
    fn resolve_field(&self, name: &str) -> Option<FieldId> {
        self.inner.resolve_field(name)
    }
    fn field_type(&self, field: FieldId) -> u16 {
        self.inner.field_type(field)
    }
    fn field_size(&self, field: FieldId) -> usize {
        self.inner.field_size(field)
    }
    fn element_count(&self, field: FieldId) -> usize {
        self.inner.element_count(field)
    }
    fn array_info(&self, field: FieldId) -> Option<ArrayInfo> {
        self.inner.array_info(field)
    }
    fn put_array_info(&self, field: FieldId, length: usize) -> Result<(), DeviceError> {
        self.inner.put_array_info(field, length)
    }
    unsafe fn field_ptr(&self, field: FieldId) -> *mut u8 {
        self.inner.field_ptr(field)
    }
    fn alarm(&self) -> Alarm {
        self.inner.alarm()
    }
    fn time_stamp(&self) -> TimeStamp {
        self.inner.time_stamp()
    }
    fn display_limits(&self, field: FieldId) -> Limits {
        self.inner.display_limits(field)
    }
    fn control_limits(&self, field: FieldId) -> Limits {
        self.inner.control_limits(field)
    }
    fn post_events(&self, field: FieldId, mask: EventMask) {
        self.inner.post_events(field, mask)
    }
    fn put_notify(&self, request: NotifyRequest) -> Result<(), DeviceError> {
        self.parked
            .send(request)
            .map_err(|_| DeviceError::new(-1, "nobody parks requests"))
    }
    fn add_event_listener(
        &self,
        field: FieldId,
        mask: EventMask,
        listener: Weak<dyn EventListener>,
    ) -> SubscriptionId {
        self.inner.add_event_listener(field, mask, listener)
    }
    fn remove_event_listener(&self, id: SubscriptionId) {
        self.inner.remove_event_listener(id)
    }
    fn scan_lock(&self) {
        self.inner.scan_lock()
    }
    unsafe fn scan_unlock(&self) {
        self.inner.scan_unlock()
    }
}

fn wait_in_flight(bridge: &CompletionBridge) {
    while !bridge.is_in_flight() {
        thread::yield_now();
    }
}

#[test]
fn triggered_put_is_visible_after_return() {
    let record = doubler("calc:double");
    let put = ChannelBuilder::new(record.clone())
        .with_process(true)
        .build_put()
        .unwrap();
    let out = ChannelBuilder::new(record.clone())
        .with_field("OUT")
        .build_get()
        .unwrap();

    for i in 1..=20 {
        put.put(&ScalarArray::Double(vec![i as f64])).unwrap();
        let reading = out.get().unwrap();
        assert_eq!(reading.snapshot.value, ScalarArray::Double(vec![2.0 * i as f64]));
    }
    assert_eq!(record.process_count(), 20);
}

#[test]
fn put_without_process_does_not_process() {
    let record = doubler("calc:noproc");
    let put = ChannelBuilder::new(record.clone()).build_put().unwrap();
    put.put(&ScalarArray::Double(vec![4.0])).unwrap();
    assert_eq!(record.process_count(), 0);
    assert_eq!(record.read::<f64>("OUT").unwrap(), vec![0.0]);
}

#[test]
fn process_channel_runs_the_record() {
    let record = doubler("calc:proc");
    record.write("VAL", &[1.5f64]).unwrap();
    let process = ChannelBuilder::new(record.clone()).build_process().unwrap();
    process.process().unwrap();
    assert_eq!(record.read::<f64>("OUT").unwrap(), vec![3.0]);
    assert_eq!(record.read::<u8>("PROC").unwrap(), vec![1]);
}

#[test]
fn concurrent_trigger_is_rejected() {
    let gate = Arc::new(Event::new());
    let record = gated("calc:busy", gate.clone());
    let bridge = Arc::new(bridge(&record));

    let first = {
        let bridge = bridge.clone();
        thread::spawn(move || bridge.process())
    };
    wait_in_flight(&bridge);
    let err = bridge.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    gate.signal();
    first.join().unwrap().unwrap();
    assert!(!bridge.is_in_flight());

    // reusable once the first call finished
    gate.signal();
    bridge.process().unwrap();
}

#[test]
fn device_failure_is_reported_and_bridge_stays_usable() {
    let fail = Arc::new(AtomicBool::new(true));
    let record = {
        let fail = fail.clone();
        SoftRecord::builder("calc:fail")
            .scalar("VAL", FieldType::Double)
            .processor(move |_ctx| {
                if fail.load(Ordering::SeqCst) {
                    Err(DeviceError::new(-7, "link alarm"))
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap()
    };
    let bridge = bridge(&record);

    let err = bridge.process().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeviceFailure);
    assert_eq!(err, Error::Device(DeviceError::new(-7, "link alarm")));

    fail.store(false, Ordering::SeqCst);
    bridge.process().unwrap();
}

#[test]
fn destroy_wakes_the_waiter() {
    let gate = Arc::new(Event::new());
    let record = gated("calc:destroy", gate.clone());
    let bridge = Arc::new(bridge(&record));

    let waiter = {
        let bridge = bridge.clone();
        thread::spawn(move || bridge.process())
    };
    wait_in_flight(&bridge);
    bridge.destroy();
    bridge.destroy();
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    // the late completion is ignored
    let count = record.process_count();
    gate.signal();
    while record.process_count() == count {
        thread::yield_now();
    }
    assert_eq!(bridge.process().unwrap_err().kind(), ErrorKind::InvalidState);
}

#[test]
fn destroyed_put_rejects_calls() {
    let record = doubler("calc:gone");
    let put = ChannelBuilder::new(record.clone())
        .with_process(true)
        .build_put()
        .unwrap();
    put.destroy();
    let err = put.put(&ScalarArray::Double(vec![1.0])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn record_without_trigger_field_cannot_process() {
    let record = SoftRecord::builder("calc:passive")
        .scalar("VAL", FieldType::Double)
        .no_trigger()
        .build()
        .unwrap();
    let err = ChannelBuilder::new(record.clone())
        .build_process()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    // plain puts still work
    let put = ChannelBuilder::new(record).build_put().unwrap();
    put.put(&ScalarArray::Double(vec![1.0])).unwrap();
}

#[test]
fn triggered_puts_from_many_threads_never_deadlock() {
    let record = doubler("calc:busy-many");
    let monitor = ChannelBuilder::new(record.clone())
        .with_field("OUT")
        .with_queue_size(1)
        .build_monitor()
        .unwrap();
    monitor.start().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|t| {
            let record = record.clone();
            thread::spawn(move || {
                let put = ChannelBuilder::new(record)
                    .with_process(true)
                    .build_put()
                    .unwrap();
                for i in 0..50 {
                    put.put(&ScalarArray::Double(vec![(t * 100 + i) as f64]))
                        .unwrap();
                }
            })
        })
        .collect();

    let mut finished = false;
    while !finished {
        if let Some(element) = monitor.poll() {
            monitor.release(element).unwrap();
        }
        let deadlocks = parking_lot::deadlock::check_deadlock();
        assert!(deadlocks.is_empty(), "{} deadlocks detected", deadlocks.len());
        finished = workers.iter().all(|w| w.is_finished());
        thread::sleep(Duration::from_millis(1));
    }
    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(record.process_count(), 200);
}

#[test]
fn rejected_concurrent_put_leaves_the_record_untouched() {
    let (record, parked) = ParkingRecord::new("calc:parked");
    let put = Arc::new(
        ChannelBuilder::new(record.clone())
            .with_process(true)
            .build_put()
            .unwrap(),
    );

    let first = {
        let put = put.clone();
        thread::spawn(move || put.put(&ScalarArray::Double(vec![1.0])))
    };
    let request = parked.recv().unwrap();

    let err = put.put(&ScalarArray::Double(vec![2.0])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(record.inner.read::<f64>("VAL").unwrap(), vec![1.0]);
    assert!(parked.try_recv().is_err());

    request.handle.complete(Ok(()));
    first.join().unwrap().unwrap();

    // the claim is released once the first put returns
    let second = {
        let put = put.clone();
        thread::spawn(move || put.put(&ScalarArray::Double(vec![3.0])))
    };
    parked.recv().unwrap().handle.complete(Ok(()));
    second.join().unwrap().unwrap();
    assert_eq!(record.inner.read::<f64>("VAL").unwrap(), vec![3.0]);
}

#[test]
fn destroy_after_claim_never_blocks_the_caller() {
    let (record, parked) = ParkingRecord::new("calc:claimed");
    let handle = RecordHandle::resolve(record.clone(), "VAL").unwrap();
    let bridge = CompletionBridge::new(&handle).unwrap();

    let claim = bridge.begin().unwrap();
    assert!(bridge.is_in_flight());
    bridge.destroy();
    let err = claim.trigger_and_wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(parked.try_recv().is_err());
    assert!(!bridge.is_in_flight());
}

#[test]
fn destroy_while_parked_wakes_the_put() {
    let (record, parked) = ParkingRecord::new("calc:parked-destroy");
    let put = Arc::new(
        ChannelBuilder::new(record.clone())
            .with_process(true)
            .build_put()
            .unwrap(),
    );
    let waiter = {
        let put = put.clone();
        thread::spawn(move || put.put(&ScalarArray::Double(vec![5.0])))
    };
    let request = parked.recv().unwrap();
    put.destroy();
    assert_eq!(waiter.join().unwrap().unwrap_err().kind(), ErrorKind::InvalidState);

    // the late completion is ignored
    request.handle.complete(Ok(()));
}

#[test]
fn dropped_claim_releases_the_bridge() {
    let record = doubler("calc:unclaimed");
    let bridge = bridge(&record);
    {
        let _claim = bridge.begin().unwrap();
        assert_eq!(bridge.begin().unwrap_err().kind(), ErrorKind::InvalidState);
    }
    assert!(!bridge.is_in_flight());
    bridge.process().unwrap();
}
