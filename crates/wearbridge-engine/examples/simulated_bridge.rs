use std::sync::Arc;
use std::time::Duration;

use wearbridge_core::types::Address;
use wearbridge_devices::device::{DeviceFamily, DeviceHandle};
use wearbridge_devices::driver::RadioAdapter;
use wearbridge_devices::drivers::test::TestBench;
use wearbridge_devices::factory::DriverFactory;
use wearbridge_devices::model::NotificationSpec;
use wearbridge_devices::prefs::{keys, MemoryPreferences, SharedPreferences};
use wearbridge_engine::{
    Command, Dispatcher, DispatcherSettings, Envelope, LoggingSubscriptions, ServiceNotice,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    wearbridge_core::logging::init_with_filter("info,wearbridge_engine=debug")?;

    let watch = Address::new("AA:BB:CC:DD:EE:01");
    let prefs = MemoryPreferences::new()
        .with_device(&watch, keys::NOTIFICATION_CACHE, true)
        .with_device(&watch, "canned_reply_1", "On my way");
    let prefs: SharedPreferences = Arc::new(prefs);

    // Every radio device in this example is simulated by the test bench
    let bench = TestBench::new();
    let mut factory = DriverFactory::new(Arc::new(RadioAdapter::new(true, true)), prefs.clone());
    factory.register_radio("pebble", bench.constructor());

    let dispatcher = Dispatcher::new(
        DispatcherSettings::default(),
        factory,
        prefs,
        Arc::new(LoggingSubscriptions),
    );
    let (service, task) = wearbridge_engine::spawn(dispatcher, 16)?;
    let mut notices = service.subscribe_notices();

    service
        .register_device(DeviceHandle::new(watch.clone(), DeviceFamily::Pebble).with_alias("Pebble Time"))
        .await?;

    println!("Queueing a notification while the watch is offline...");
    let outcome = service
        .dispatch(Envelope::broadcast(Command::Notification(NotificationSpec::new(
            "Build", "pipeline is green",
        ))))
        .await?;
    println!("  queued for {:?}", outcome.queued);

    println!("Connecting...");
    service
        .dispatch(Envelope::to(watch.clone(), Command::Connect { first_time: false }))
        .await?;

    // Wait until the watch reports it is ready
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(notice) = notices.recv().await {
            println!("  notice: {:?}", notice);
            if notice == ServiceNotice::DeviceConnected(watch.clone()) {
                break;
            }
        }
    })
    .await?;

    let outcome = service
        .dispatch(Envelope::to(watch.clone(), Command::SetTime))
        .await?;
    println!("Time sync delivered to {:?}", outcome.delivered);

    println!("Calls seen by the simulated watch:");
    for call in bench.calls(&watch) {
        println!("  {:?}", call);
    }

    service.shutdown().await?;
    task.await?;
    Ok(())
}
