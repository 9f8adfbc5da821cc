// Soft record server walkthrough: a simulated device updates a waveform
// while a client monitors it, reads strided slices and issues triggered puts.
//
//   RUST_LOG=debug cargo run --example soft_ioc [updates]
use crossbeam_channel::{bounded, Sender};
use dbpv_bridge::Core::{FieldType, ScalarArray, SoftRecord};
use dbpv_bridge::DbPv::{ChannelBuilder, MonitorRequester, Request};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const POINTS: usize = 32;

/// Wakes the consumer loop whenever the monitor has something.
struct Wakeup(Sender<()>);

impl MonitorRequester for Wakeup {
    fn monitor_event(&self) {
        let _ = self.0.try_send(());
    }

    fn unlisten(&self) {
        println!("Monitor: unlistened");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let updates: usize = env::args()
        .nth(1)
        .map(|s| s.parse().expect("Invalid number of updates"))
        .unwrap_or(50);

    let scale = SoftRecord::builder("demo:scale")
        .scalar("VAL", FieldType::Double)
        .scalar("GAIN", FieldType::Double)
        .processor(|ctx| {
            let gain = ctx.read::<f64>("VAL")?[0];
            ctx.write("GAIN", &[gain])?;
            Ok(())
        })
        .build()?;
    let wave = SoftRecord::builder("demo:wave")
        .waveform("VAL", FieldType::Double, POINTS)
        .build()?;

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    // Handle Ctrl+C to stop the device and the consumer
    ctrlc::set_handler(move || {
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl+C handler");

    // Simulated device: recomputes the waveform from the current gain.
    let device = {
        let wave = wave.clone();
        let scale = scale.clone();
        let running = running.clone();
        thread::spawn(move || {
            for step in 0..updates {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let gain = match scale.read::<f64>("GAIN") {
                    Ok(g) if g[0] != 0.0 => g[0],
                    _ => 1.0,
                };
                let samples: Vec<f64> = (0..POINTS)
                    .map(|i| gain * ((step + i) as f64 * 0.2).sin())
                    .collect();
                wave.write("VAL", &samples).expect("device write failed");
                thread::sleep(Duration::from_millis(50));
            }
        })
    };

    let (tx, rx) = bounded(1);
    let requester = Arc::new(Wakeup(tx));
    let request: Request = "record[queueSize=4]field(value,timeStamp)".parse()?;
    let monitor = ChannelBuilder::new(wave.clone())
        .with_request(request)
        .with_monitor_requester(&requester)
        .build_monitor()?;
    let array = ChannelBuilder::new(wave.clone()).build_array()?;
    let gain = ChannelBuilder::new(scale.clone())
        .with_process(true)
        .build_put()?;
    monitor.start()?;

    println!("{:<8} {:<8} {:<10} {}", "Elem #", "Overflow", "First", "Changed");
    println!("{}", "=".repeat(48));
    let mut received = 0usize;
    let mut next_gain_change = 10usize;
    while running.load(Ordering::SeqCst) && !device.is_finished() {
        if rx.recv_timeout(Duration::from_millis(200)).is_err() {
            continue;
        }
        while let Some(element) = monitor.poll() {
            received += 1;
            println!(
                "{:<8} {:<8} {:<10.4} {:?}",
                received,
                element.overflow(),
                element.snapshot().value.first_as_f64().unwrap_or(f64::NAN),
                element.changed()
            );
            monitor.release(element)?;
        }
        if received >= next_gain_change {
            next_gain_change += 10;
            let new_gain = 1.0 + (received / 10) as f64;
            gain.put(&ScalarArray::Double(vec![new_gain]))?;
            let every_fourth = array.get_array(0, 0, 4)?;
            println!("--- gain {} | every 4th point: {:?}", new_gain, every_fourth);
        }
    }

    device.join().expect("device thread panicked");
    let stats = monitor.stats();
    println!(
        "Monitor: {} events, {} produced, {} merged, {} deferred",
        stats.events, stats.produced, stats.merged, stats.deferred
    );
    monitor.destroy();
    Ok(())
}
