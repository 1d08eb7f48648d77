/*!
 * The protocol driver contract.
 *
 * Every device family talks to its hardware through a [`Driver`]. The trait
 * has lifecycle hooks plus one method per capability; every capability has
 * a no-op default so a driver only implements what its device supports.
 *
 * Drivers do their own I/O but never touch the registry. State changes and
 * spontaneous events are sent back through the [`DriverContext`] and applied
 * by whoever owns the registry.
 */
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use wearbridge_core::types::{Address, Metadata};

use crate::device::{BatteryState, ConnectionState, DeviceFamily};
use crate::error::Result;
use crate::model::{
    Alarm, CalendarEventSpec, CallSpec, CameraEvent, CannedMessagesSpec, Contact, GpsLocation,
    LoyaltyCard, MusicSpec, MusicStateSpec, NavigationInfoSpec, NotificationSpec, Reminder,
    WeatherSpec, WorldClock,
};
use crate::prefs::{keys, SharedPreferences};

/// Events a driver reports back to the registry owner
#[derive(Debug, Clone, PartialEq)]
pub enum DriverEvent {
    /// The link state changed
    StateChanged {
        /// Device address
        address: Address,
        /// New state
        state: ConnectionState,
        /// Generation of the reporting driver
        generation: u64,
    },
    /// Battery information
    Battery {
        /// Device address
        address: Address,
        /// Level in percent
        level: Option<u8>,
        /// Charge state
        state: Option<BatteryState>,
    },
    /// Firmware and model information
    Info {
        /// Device address
        address: Address,
        /// Firmware version
        firmware: Option<String>,
        /// Hardware model
        model: Option<String>,
    },
}

impl DriverEvent {
    /// The device the event is about
    pub fn address(&self) -> &Address {
        match self {
            DriverEvent::StateChanged { address, .. }
            | DriverEvent::Battery { address, .. }
            | DriverEvent::Info { address, .. } => address,
        }
    }
}

/// Sender half used by drivers to report events
pub type DriverEventSender = mpsc::UnboundedSender<DriverEvent>;

/// The shared platform radio adapter.
///
/// The bridge does not own the radio stack; it only needs to know whether
/// an adapter exists and is switched on.
#[derive(Debug)]
pub struct RadioAdapter {
    present: AtomicBool,
    enabled: AtomicBool,
}

impl RadioAdapter {
    /// Create an adapter handle
    pub fn new(present: bool, enabled: bool) -> Self {
        Self {
            present: AtomicBool::new(present),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// An adapter exists on this host
    pub fn is_present(&self) -> bool {
        self.present.load(Ordering::SeqCst)
    }

    /// The adapter is switched on
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Record the adapter being switched on or off
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Shared radio handle
pub type SharedRadio = Arc<RadioAdapter>;

/// Everything a driver is wired to when it is constructed
#[derive(Debug, Clone)]
pub struct DriverContext {
    address: Address,
    family: DeviceFamily,
    radio: SharedRadio,
    prefs: SharedPreferences,
    events: DriverEventSender,
    generation: u64,
}

impl DriverContext {
    /// Create a context
    pub fn new(
        address: Address,
        family: DeviceFamily,
        radio: SharedRadio,
        prefs: SharedPreferences,
        events: DriverEventSender,
    ) -> Self {
        Self {
            address,
            family,
            radio,
            prefs,
            events,
            generation: 0,
        }
    }

    /// Stamp the context with the generation of the driver it belongs to
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Device address
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Generation of the driver this context belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Device family
    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    /// Shared radio adapter
    pub fn radio(&self) -> &SharedRadio {
        &self.radio
    }

    /// Preference lookup
    pub fn prefs(&self) -> &SharedPreferences {
        &self.prefs
    }

    /// Report an event. A closed channel means the service is gone, which is
    /// not the driver's problem.
    pub fn emit(&self, event: DriverEvent) {
        if self.events.send(event).is_err() {
            trace!(address = %self.address, "Driver event dropped, receiver closed");
        }
    }
}

/// Shared driver state: link flags and the context.
///
/// Drivers embed one of these and expose it through [`Driver::base`].
#[derive(Debug)]
pub struct DriverBase {
    context: DriverContext,
    connected: AtomicBool,
    initialized: AtomicBool,
    auto_reconnect: AtomicBool,
    scan_reconnect: AtomicBool,
}

impl DriverBase {
    /// Create the base for a driver
    pub fn new(context: DriverContext) -> Self {
        Self {
            context,
            connected: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            auto_reconnect: AtomicBool::new(false),
            scan_reconnect: AtomicBool::new(false),
        }
    }

    /// The driver context
    pub fn context(&self) -> &DriverContext {
        &self.context
    }

    /// Device address
    pub fn address(&self) -> &Address {
        self.context.address()
    }

    /// Record a link state and report it
    pub fn set_state(&self, state: ConnectionState) {
        self.connected.store(state.is_connected(), Ordering::SeqCst);
        self.initialized
            .store(state == ConnectionState::Initialized, Ordering::SeqCst);
        debug!(address = %self.address(), %state, "Driver state");
        self.context.emit(DriverEvent::StateChanged {
            address: self.address().clone(),
            state,
            generation: self.context.generation(),
        });
    }

    /// State to report after the link dropped
    pub fn state_after_link_loss(&self) -> ConnectionState {
        if self.scan_reconnect() {
            ConnectionState::WaitingForScan
        } else if self.auto_reconnect() {
            ConnectionState::WaitingForReconnect
        } else {
            ConnectionState::NotConnected
        }
    }

    /// Link is up
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Device is ready for commands
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Auto-reconnect flag
    pub fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Set the auto-reconnect flag
    pub fn set_auto_reconnect(&self, enable: bool) {
        self.auto_reconnect.store(enable, Ordering::SeqCst);
    }

    /// Scan-reconnect flag
    pub fn scan_reconnect(&self) -> bool {
        self.scan_reconnect.load(Ordering::SeqCst)
    }

    /// Set the scan-reconnect flag
    pub fn set_scan_reconnect(&self, enable: bool) {
        self.scan_reconnect.store(enable, Ordering::SeqCst);
    }

    /// Forget the link without reporting anything
    pub fn clear(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.initialized.store(false, Ordering::SeqCst);
    }
}

/// The driver contract
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Shared driver state
    fn base(&self) -> &DriverBase;

    /// Device address
    fn address(&self) -> &Address {
        self.base().address()
    }

    /// Generation stamped by the factory that built this driver
    fn generation(&self) -> u64 {
        self.base().context().generation()
    }

    /// Start connecting. `Ok(false)` means the attempt was not started.
    async fn connect(&self) -> Result<bool>;

    /// Connect for the first time, e.g. with pairing
    async fn connect_first_time(&self) -> Result<bool> {
        self.connect().await
    }

    /// Release the link and every resource. Must tolerate repeated calls.
    async fn dispose(&self) -> Result<()>;

    /// Link is up
    fn is_connected(&self) -> bool {
        self.base().is_connected()
    }

    /// Device is ready for commands
    fn is_initialized(&self) -> bool {
        self.base().is_initialized()
    }

    /// Whether this driver may be reused for another connect
    fn can_reconnect(&self) -> bool {
        let context = self.base().context();
        context
            .prefs()
            .device_bool(context.address(), keys::CAN_RECONNECT, true)
    }

    /// Enable reconnecting after link loss
    fn set_auto_reconnect(&self, enable: bool) {
        self.base().set_auto_reconnect(enable);
    }

    /// Reconnect-after-link-loss flag
    fn auto_reconnect(&self) -> bool {
        self.base().auto_reconnect()
    }

    /// Enable reconnecting on advertisement
    fn set_scan_reconnect(&self, enable: bool) {
        self.base().set_scan_reconnect(enable);
    }

    /// Device-specific character filter applied to every outgoing text
    fn custom_string_filter(&self, text: &str) -> String {
        text.to_string()
    }

    /// Show a notification
    async fn on_notification(&self, _spec: &NotificationSpec) -> Result<()> {
        Ok(())
    }

    /// Remove a notification
    async fn on_delete_notification(&self, _id: i32) -> Result<()> {
        Ok(())
    }

    /// Synchronise the clock
    async fn on_set_time(&self) -> Result<()> {
        Ok(())
    }

    /// Phone call state
    async fn on_set_call_state(&self, _spec: &CallSpec) -> Result<()> {
        Ok(())
    }

    /// Canned messages
    async fn on_set_canned_messages(&self, _spec: &CannedMessagesSpec) -> Result<()> {
        Ok(())
    }

    /// Playback state
    async fn on_set_music_state(&self, _spec: &MusicStateSpec) -> Result<()> {
        Ok(())
    }

    /// Track metadata
    async fn on_set_music_info(&self, _spec: &MusicSpec) -> Result<()> {
        Ok(())
    }

    /// Phone volume in percent
    async fn on_set_phone_volume(&self, _volume: f32) -> Result<()> {
        Ok(())
    }

    /// Phone ringer mode
    async fn on_change_phone_silent_mode(&self, _ringer_mode: i32) -> Result<()> {
        Ok(())
    }

    /// Alarms
    async fn on_set_alarms(&self, _alarms: &[Alarm]) -> Result<()> {
        Ok(())
    }

    /// Reminders
    async fn on_set_reminders(&self, _reminders: &[Reminder]) -> Result<()> {
        Ok(())
    }

    /// World clocks
    async fn on_set_world_clocks(&self, _clocks: &[WorldClock]) -> Result<()> {
        Ok(())
    }

    /// Contacts
    async fn on_set_contacts(&self, _contacts: &[Contact]) -> Result<()> {
        Ok(())
    }

    /// Loyalty cards
    async fn on_set_loyalty_cards(&self, _cards: &[LoyaltyCard]) -> Result<()> {
        Ok(())
    }

    /// Add a calendar event
    async fn on_add_calendar_event(&self, _spec: &CalendarEventSpec) -> Result<()> {
        Ok(())
    }

    /// Delete a calendar event
    async fn on_delete_calendar_event(&self, _kind: u8, _id: i64) -> Result<()> {
        Ok(())
    }

    /// Install an app, watch face or firmware
    async fn on_install_app(&self, _uri: &str, _options: &Metadata) -> Result<()> {
        Ok(())
    }

    /// Request the installed app list
    async fn on_app_info_req(&self) -> Result<()> {
        Ok(())
    }

    /// Start or stop an app
    async fn on_app_start(&self, _uuid: Uuid, _start: bool) -> Result<()> {
        Ok(())
    }

    /// Download an app from the device
    async fn on_app_download(&self, _uuid: Uuid) -> Result<()> {
        Ok(())
    }

    /// Delete an app
    async fn on_app_delete(&self, _uuid: Uuid) -> Result<()> {
        Ok(())
    }

    /// Send app configuration
    async fn on_app_configuration(&self, _uuid: Uuid, _config: &str, _id: Option<i32>) -> Result<()> {
        Ok(())
    }

    /// Reorder apps
    async fn on_app_reorder(&self, _uuids: &[Uuid]) -> Result<()> {
        Ok(())
    }

    /// Fetch recorded data of the given type mask
    async fn on_fetch_recorded_data(&self, _data_types: u32) -> Result<()> {
        Ok(())
    }

    /// Reset the device
    async fn on_reset(&self, _flags: u32) -> Result<()> {
        Ok(())
    }

    /// Run a single heart rate measurement
    async fn on_heart_rate_test(&self) -> Result<()> {
        Ok(())
    }

    /// Toggle realtime heart rate
    async fn on_enable_realtime_heart_rate_measurement(&self, _enable: bool) -> Result<()> {
        Ok(())
    }

    /// Toggle realtime steps
    async fn on_enable_realtime_steps(&self, _enable: bool) -> Result<()> {
        Ok(())
    }

    /// Constant vibration
    async fn on_set_constant_vibration(&self, _intensity: i32) -> Result<()> {
        Ok(())
    }

    /// Request a screenshot
    async fn on_screenshot_req(&self) -> Result<()> {
        Ok(())
    }

    /// Toggle heart rate during sleep
    async fn on_enable_heart_rate_sleep_support(&self, _enable: bool) -> Result<()> {
        Ok(())
    }

    /// Heart rate measurement interval in seconds
    async fn on_set_heart_rate_measurement_interval(&self, _seconds: i32) -> Result<()> {
        Ok(())
    }

    /// Push one configuration key to the device
    async fn on_send_configuration(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Read one configuration key from the device
    async fn on_read_configuration(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Weather
    async fn on_send_weather(&self, _weather: &[WeatherSpec]) -> Result<()> {
        Ok(())
    }

    /// Developer test hook
    async fn on_test_new_function(&self) -> Result<()> {
        Ok(())
    }

    /// Navigation instruction
    async fn on_set_navigation_info(&self, _spec: &NavigationInfoSpec) -> Result<()> {
        Ok(())
    }

    /// Sleep tracking bridge action
    async fn on_sleep_as_android_action(&self, _action: &str, _extras: &Metadata) -> Result<()> {
        Ok(())
    }

    /// Camera remote event
    async fn on_camera_status_change(&self, _event: CameraEvent, _filename: Option<&str>) -> Result<()> {
        Ok(())
    }

    /// Request the music list
    async fn on_music_list_req(&self) -> Result<()> {
        Ok(())
    }

    /// Music library operation
    async fn on_music_operation(
        &self,
        _operation: i32,
        _playlist_index: i32,
        _playlist_name: Option<&str>,
        _music_ids: &[i32],
    ) -> Result<()> {
        Ok(())
    }

    /// Ring the phone from the device, or stop ringing
    async fn on_find_phone(&self, _start: bool) -> Result<()> {
        Ok(())
    }

    /// Make the device ring or vibrate
    async fn on_find_device(&self, _start: bool) -> Result<()> {
        Ok(())
    }

    /// FM transmitter frequency
    async fn on_set_fm_frequency(&self, _frequency: f32) -> Result<()> {
        Ok(())
    }

    /// LED colour as RGB
    async fn on_set_led_color(&self, _color: i32) -> Result<()> {
        Ok(())
    }

    /// Power the device off
    async fn on_power_off(&self) -> Result<()> {
        Ok(())
    }

    /// GPS fix
    async fn on_set_gps_location(&self, _location: &GpsLocation) -> Result<()> {
        Ok(())
    }
}

/// Shared driver handle
pub type SharedDriver = Arc<dyn Driver>;
