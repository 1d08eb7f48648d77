/*!
 * In-process simulated driver.
 *
 * Every [`TestDriver`] built from one [`TestBench`] records its calls on the
 * bench, so a test (or a dry run of the daemon) can inspect what each
 * device was asked to do. Connects walk through CONNECTING, CONNECTED and
 * INITIALIZED immediately unless the bench says otherwise.
 */
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use uuid::Uuid;

use wearbridge_core::types::{Address, Metadata};

use crate::device::ConnectionState;
use crate::driver::{Driver, DriverBase, DriverContext, SharedDriver};
use crate::error::{DeviceError, Result};
use crate::factory::DriverConstructor;
use crate::model::{
    CalendarEventSpec, CallSpec, MusicSpec, MusicStateSpec, NavigationInfoSpec, NotificationSpec,
    WeatherSpec,
};

/// Type tag the test driver is registered under
pub const TEST_DRIVER_TAG: &str = "test";

/// A call received by a test driver
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `connect`
    Connect,
    /// `connect_first_time`
    ConnectFirstTime,
    /// `dispose`
    Dispose,
    /// `on_notification`
    Notification {
        /// Notification identity
        id: Option<i32>,
        /// Title after text processing
        title: String,
        /// Body after text processing
        body: String,
        /// Canned replies attached by the dispatcher
        canned_replies: Vec<String>,
    },
    /// `on_delete_notification`
    DeleteNotification(i32),
    /// `on_set_call_state`
    CallState(CallSpec),
    /// `on_set_music_info`
    MusicInfo(MusicSpec),
    /// `on_set_music_state`
    MusicState(MusicStateSpec),
    /// `on_add_calendar_event`
    CalendarEvent(CalendarEventSpec),
    /// `on_send_weather`
    Weather(Vec<WeatherSpec>),
    /// `on_set_navigation_info`
    Navigation(NavigationInfoSpec),
    /// `on_install_app`
    Install(String),
    /// `on_app_start`
    AppStart(Uuid, bool),
    /// `on_sleep_as_android_action`
    SleepTracking(String),
    /// `on_set_led_color`
    LedColor(i32),
    /// `on_set_fm_frequency`
    FmFrequency(f32),
    /// `on_find_device`
    FindDevice(bool),
    /// `on_power_off`
    PowerOff,
    /// Any other capability, by name
    Other(&'static str),
}

#[derive(Debug, Default)]
struct BenchState {
    calls: HashMap<Address, Vec<RecordedCall>>,
    failing_connects: HashSet<Address>,
    failing_disposes: HashSet<Address>,
    held_at_connected: HashSet<Address>,
    no_reconnect: HashSet<Address>,
    filters: HashMap<Address, (char, char)>,
    links: HashMap<Address, Weak<TestDriver>>,
}

/// Shared recorder and behaviour switches for test drivers
#[derive(Debug, Default)]
pub struct TestBench {
    state: Mutex<BenchState>,
    created: AtomicUsize,
}

impl TestBench {
    /// Create a bench
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A named constructor producing drivers that report to this bench
    pub fn constructor(self: &Arc<Self>) -> DriverConstructor {
        let bench = Arc::clone(self);
        Arc::new(move |context: DriverContext| -> Result<SharedDriver> {
            bench.created.fetch_add(1, Ordering::SeqCst);
            let driver = Arc::new(TestDriver::new(context, Arc::clone(&bench)));
            bench.with_state(|s| s.links.insert(driver.address().clone(), Arc::downgrade(&driver)));
            Ok(driver)
        })
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BenchState) -> T) -> Option<T> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    fn record(&self, address: &Address, call: RecordedCall) {
        self.with_state(|s| s.calls.entry(address.clone()).or_default().push(call));
    }

    fn has(&self, address: &Address, pick: impl FnOnce(&BenchState) -> &HashSet<Address>) -> bool {
        self.with_state(|s| pick(s).contains(address)).unwrap_or(false)
    }

    /// Make every connect to `address` fail with a transport error
    pub fn fail_connect(&self, address: &Address) {
        self.with_state(|s| s.failing_connects.insert(address.clone()));
    }

    /// Make every dispose of `address` fail
    pub fn fail_dispose(&self, address: &Address) {
        self.with_state(|s| s.failing_disposes.insert(address.clone()));
    }

    /// Stop connects to `address` at CONNECTED
    pub fn hold_at_connected(&self, address: &Address) {
        self.with_state(|s| s.held_at_connected.insert(address.clone()));
    }

    /// Make drivers for `address` refuse reuse
    pub fn refuse_reconnect(&self, address: &Address) {
        self.with_state(|s| s.no_reconnect.insert(address.clone()));
    }

    /// Replace `from` with `to` in every text sent to `address`
    pub fn filter_char(&self, address: &Address, from: char, to: char) {
        self.with_state(|s| s.filters.insert(address.clone(), (from, to)));
    }

    fn live_driver(&self, address: &Address) -> Option<Arc<TestDriver>> {
        self.with_state(|s| s.links.get(address).and_then(Weak::upgrade))
            .flatten()
    }

    /// Drop the link of the newest live driver for `address`, which then
    /// reports the state its reconnect flags call for. False without a
    /// live driver.
    pub fn drop_link(&self, address: &Address) -> bool {
        match self.live_driver(address) {
            Some(driver) => {
                driver.base.set_state(driver.base.state_after_link_loss());
                true
            }
            None => false,
        }
    }

    /// Let the newest live driver for `address` reconnect on its own
    pub fn restore_link(&self, address: &Address) -> bool {
        match self.live_driver(address) {
            Some(driver) => {
                driver.base.set_state(ConnectionState::Connected);
                driver.base.set_state(ConnectionState::Initialized);
                true
            }
            None => false,
        }
    }

    /// Calls recorded for a device
    pub fn calls(&self, address: &Address) -> Vec<RecordedCall> {
        self.with_state(|s| s.calls.get(address).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Notifications delivered to a device
    pub fn notifications(&self, address: &Address) -> Vec<RecordedCall> {
        self.calls(address)
            .into_iter()
            .filter(|c| matches!(c, RecordedCall::Notification { .. }))
            .collect()
    }

    /// Number of connect calls, first-time or not
    pub fn connect_count(&self, address: &Address) -> usize {
        self.calls(address)
            .iter()
            .filter(|c| matches!(c, RecordedCall::Connect | RecordedCall::ConnectFirstTime))
            .count()
    }

    /// Number of dispose calls
    pub fn dispose_count(&self, address: &Address) -> usize {
        self.calls(address)
            .iter()
            .filter(|c| **c == RecordedCall::Dispose)
            .count()
    }

    /// Number of drivers built by this bench
    pub fn drivers_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

/// A simulated driver
#[derive(Debug)]
pub struct TestDriver {
    base: DriverBase,
    bench: Arc<TestBench>,
}

impl TestDriver {
    /// Create a driver reporting to `bench`
    pub fn new(context: DriverContext, bench: Arc<TestBench>) -> Self {
        Self {
            base: DriverBase::new(context),
            bench,
        }
    }

    fn record(&self, call: RecordedCall) {
        self.bench.record(self.address(), call);
    }

    async fn establish(&self) -> Result<bool> {
        let address = self.address().clone();
        if self.bench.has(&address, |s| &s.failing_connects) {
            self.base.set_state(ConnectionState::Connecting);
            return Err(DeviceError::transport(format!("{} refused the connection", address)));
        }

        self.base.set_state(ConnectionState::Connecting);
        self.base.set_state(ConnectionState::Connected);
        if !self.bench.has(&address, |s| &s.held_at_connected) {
            self.base.set_state(ConnectionState::Initialized);
        }
        Ok(true)
    }
}

#[async_trait]
impl Driver for TestDriver {
    fn base(&self) -> &DriverBase {
        &self.base
    }

    async fn connect(&self) -> Result<bool> {
        self.record(RecordedCall::Connect);
        self.establish().await
    }

    async fn connect_first_time(&self) -> Result<bool> {
        self.record(RecordedCall::ConnectFirstTime);
        self.establish().await
    }

    async fn dispose(&self) -> Result<()> {
        self.record(RecordedCall::Dispose);
        self.base.clear();
        if self.bench.has(self.address(), |s| &s.failing_disposes) {
            return Err(DeviceError::transport("dispose failed"));
        }
        Ok(())
    }

    fn can_reconnect(&self) -> bool {
        !self.bench.has(self.address(), |s| &s.no_reconnect)
    }

    fn custom_string_filter(&self, text: &str) -> String {
        match self.bench.with_state(|s| s.filters.get(self.address()).copied()).flatten() {
            Some((from, to)) => text.replace(from, &to.to_string()),
            None => text.to_string(),
        }
    }

    async fn on_notification(&self, spec: &NotificationSpec) -> Result<()> {
        self.record(RecordedCall::Notification {
            id: spec.id,
            title: spec.title.clone(),
            body: spec.body.clone(),
            canned_replies: spec.canned_replies.clone(),
        });
        Ok(())
    }

    async fn on_delete_notification(&self, id: i32) -> Result<()> {
        self.record(RecordedCall::DeleteNotification(id));
        Ok(())
    }

    async fn on_set_time(&self) -> Result<()> {
        self.record(RecordedCall::Other("set_time"));
        Ok(())
    }

    async fn on_set_call_state(&self, spec: &CallSpec) -> Result<()> {
        self.record(RecordedCall::CallState(spec.clone()));
        Ok(())
    }

    async fn on_set_music_state(&self, spec: &MusicStateSpec) -> Result<()> {
        self.record(RecordedCall::MusicState(spec.clone()));
        Ok(())
    }

    async fn on_set_music_info(&self, spec: &MusicSpec) -> Result<()> {
        self.record(RecordedCall::MusicInfo(spec.clone()));
        Ok(())
    }

    async fn on_add_calendar_event(&self, spec: &CalendarEventSpec) -> Result<()> {
        self.record(RecordedCall::CalendarEvent(spec.clone()));
        Ok(())
    }

    async fn on_install_app(&self, uri: &str, _options: &Metadata) -> Result<()> {
        self.record(RecordedCall::Install(uri.to_string()));
        Ok(())
    }

    async fn on_app_start(&self, uuid: Uuid, start: bool) -> Result<()> {
        self.record(RecordedCall::AppStart(uuid, start));
        Ok(())
    }

    async fn on_send_weather(&self, weather: &[WeatherSpec]) -> Result<()> {
        self.record(RecordedCall::Weather(weather.to_vec()));
        Ok(())
    }

    async fn on_set_navigation_info(&self, spec: &NavigationInfoSpec) -> Result<()> {
        self.record(RecordedCall::Navigation(spec.clone()));
        Ok(())
    }

    async fn on_sleep_as_android_action(&self, action: &str, _extras: &Metadata) -> Result<()> {
        self.record(RecordedCall::SleepTracking(action.to_string()));
        Ok(())
    }

    async fn on_set_led_color(&self, color: i32) -> Result<()> {
        self.record(RecordedCall::LedColor(color));
        Ok(())
    }

    async fn on_set_fm_frequency(&self, frequency: f32) -> Result<()> {
        self.record(RecordedCall::FmFrequency(frequency));
        Ok(())
    }

    async fn on_find_device(&self, start: bool) -> Result<()> {
        self.record(RecordedCall::FindDevice(start));
        Ok(())
    }

    async fn on_power_off(&self) -> Result<()> {
        self.record(RecordedCall::PowerOff);
        Ok(())
    }

    async fn on_fetch_recorded_data(&self, _data_types: u32) -> Result<()> {
        self.record(RecordedCall::Other("fetch_recorded_data"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFamily;
    use crate::driver::{DriverEvent, RadioAdapter};
    use crate::prefs::MemoryPreferences;
    use tokio::sync::mpsc;

    fn build(bench: &Arc<TestBench>) -> (SharedDriver, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = DriverContext::new(
            Address::new("sim"),
            DeviceFamily::Test,
            Arc::new(RadioAdapter::new(false, false)),
            Arc::new(MemoryPreferences::new()),
            tx,
        );
        ((bench.constructor())(context).unwrap(), rx)
    }

    fn states(rx: &mut mpsc::UnboundedReceiver<DriverEvent>) -> Vec<ConnectionState> {
        let mut seen = Vec::new();
        while let Ok(DriverEvent::StateChanged { state, .. }) = rx.try_recv() {
            seen.push(state);
        }
        seen
    }

    #[tokio::test]
    async fn test_connect_reaches_initialized() {
        let bench = TestBench::new();
        let (driver, mut rx) = build(&bench);

        assert!(driver.connect().await.unwrap());
        assert!(driver.is_initialized());
        assert_eq!(
            states(&mut rx),
            vec![
                ConnectionState::Connecting,
                ConnectionState::Connected,
                ConnectionState::Initialized
            ]
        );
        assert_eq!(bench.drivers_created(), 1);
    }

    #[tokio::test]
    async fn test_held_connect_stops_at_connected() {
        let bench = TestBench::new();
        bench.hold_at_connected(&Address::new("sim"));
        let (driver, mut rx) = build(&bench);

        driver.connect_first_time().await.unwrap();
        assert!(driver.is_connected());
        assert!(!driver.is_initialized());
        assert_eq!(states(&mut rx).last(), Some(&ConnectionState::Connected));
        assert_eq!(bench.calls(&Address::new("sim")), vec![RecordedCall::ConnectFirstTime]);
    }

    #[tokio::test]
    async fn test_failing_connect() {
        let bench = TestBench::new();
        bench.fail_connect(&Address::new("sim"));
        let (driver, _rx) = build(&bench);

        assert!(matches!(driver.connect().await, Err(DeviceError::Transport(_))));
        assert!(!driver.is_connected());
    }

    #[tokio::test]
    async fn test_records_capability_calls() {
        let bench = TestBench::new();
        let (driver, _rx) = build(&bench);
        let address = Address::new("sim");

        driver
            .on_notification(&NotificationSpec::new("Hi", "there").with_id(3))
            .await
            .unwrap();
        driver.on_delete_notification(3).await.unwrap();
        driver.dispose().await.unwrap();

        assert_eq!(bench.notifications(&address).len(), 1);
        assert_eq!(bench.dispose_count(&address), 1);
        assert!(bench.calls(&address).contains(&RecordedCall::DeleteNotification(3)));
    }

    #[tokio::test]
    async fn test_drop_and_restore_link() {
        let bench = TestBench::new();
        let (driver, mut rx) = build(&bench);
        let address = Address::new("sim");

        driver.set_auto_reconnect(true);
        driver.connect().await.unwrap();
        states(&mut rx);

        assert!(bench.drop_link(&address));
        assert!(!driver.is_connected());
        assert_eq!(states(&mut rx), vec![ConnectionState::WaitingForReconnect]);

        assert!(bench.restore_link(&address));
        assert!(driver.is_initialized());
        assert_eq!(
            states(&mut rx),
            vec![ConnectionState::Connected, ConnectionState::Initialized]
        );

        drop(driver);
        assert!(!bench.drop_link(&address));
    }

    #[test]
    fn test_custom_filter() {
        let bench = TestBench::new();
        bench.filter_char(&Address::new("sim"), 'a', '4');
        let (driver, _rx) = build(&bench);
        assert_eq!(driver.custom_string_filter("banana"), "b4n4n4");
    }
}
