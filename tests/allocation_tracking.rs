// Allocation tracking for the monitor queue's steady state.
//
// Slots are allocated once when the monitor is built; producing, polling and
// releasing numeric elements after that must not touch the heap.
//
// dhat counts every thread in the process, so this binary holds a single
// test and lets the record's event thread settle before measuring.
//
// cargo test --test allocation_tracking -- --nocapture

use dbpv_bridge::Core::{FieldType, Record, SoftRecord};
use dbpv_bridge::DbPv::Structs::FieldSet;
use dbpv_bridge::DbPv::ChannelBuilder;
use serial_test::serial;
use std::thread;
use std::time::Duration;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const LEN: usize = 64;

/// Writes `seed..seed + LEN` straight into record memory, the way a driver
/// would, without going through any allocating helper.
fn poke(record: &SoftRecord, seed: usize) {
    let val = record.field("VAL").unwrap();
    record.with_scan_lock(|_ctx| unsafe {
        let base = record.field_ptr(val) as *mut f64;
        for i in 0..LEN {
            base.add(i).write_unaligned((seed + i) as f64);
        }
    });
}

#[test]
#[serial]
fn monitor_steady_state_with_dhat() {
    let _profiler = dhat::Profiler::new_heap();

    let record = SoftRecord::builder("alloc:wf")
        .array("VAL", FieldType::Double, LEN)
        .build()
        .unwrap();
    let monitor = ChannelBuilder::new(record.clone())
        .with_properties(FieldSet::VALUE | FieldSet::ALARM | FieldSet::TIME_STAMP)
        .with_queue_size(4)
        .build_monitor()
        .unwrap();
    monitor.start().unwrap();
    let initial = monitor.poll().unwrap();
    monitor.release(initial).unwrap();

    // warm up: every slot and the producer's reference snapshot get their
    // value buffers sized once
    for seed in 0..8 {
        poke(&record, seed + 1);
        monitor.event_callback();
        let element = monitor.poll().unwrap();
        monitor.release(element).unwrap();
    }
    // the event thread must be parked on its channel, not starting up
    record.flush_events();
    record.flush_events();
    thread::sleep(Duration::from_millis(50));
    assert!(monitor.poll().is_none());

    let before = dhat::HeapStats::get();
    for seed in 100..1100 {
        poke(&record, seed);
        monitor.event_callback();
        let element = monitor.poll().unwrap();
        assert_eq!(element.snapshot().value.first_as_f64(), Some(seed as f64));
        monitor.release(element).unwrap();
    }
    let after = dhat::HeapStats::get();

    println!("blocks before: {}, after: {}", before.total_blocks, after.total_blocks);
    assert_eq!(after.total_blocks, before.total_blocks);
}
