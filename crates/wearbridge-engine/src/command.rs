/*!
 * Command envelopes.
 *
 * An [`Envelope`] is one action with its typed payload and an optional
 * target. Envelopes are plain serde values so they can arrive as JSON from
 * any front end:
 *
 * ```json
 * {"target": "AA:BB:CC:DD:EE:FF", "action": "find_device", "start": true}
 * ```
 */
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wearbridge_core::types::{Address, Metadata};
use wearbridge_devices::model::{
    Alarm, CalendarEventSpec, CallSpec, CameraEvent, CannedMessagesSpec, Contact, GpsLocation,
    LoyaltyCard, MusicSpec, MusicStateSpec, NavigationInfoSpec, NotificationSpec, Reminder,
    WeatherSpec, WorldClock,
};

/// Who an action is delivered to when no target is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// Connect sweep over known devices
    Connect,
    /// Every device that is not already disconnected
    Disconnect,
    /// Every initialized device
    Global,
    /// Only meaningful for one device; dropped without a target
    TargetedOnly,
}

/// An action and its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Command {
    /// Connect, or sweep-connect without a target
    Connect {
        /// Pair before connecting
        #[serde(default)]
        first_time: bool,
    },
    /// Disconnect and dispose the driver
    Disconnect,
    /// Show a notification
    Notification(NotificationSpec),
    /// Remove a notification
    DeleteNotification {
        /// Notification identity
        id: i32,
    },
    /// Synchronise the clock
    SetTime,
    /// Phone call state
    CallState(CallSpec),
    /// Canned messages
    CannedMessages(CannedMessagesSpec),
    /// Track metadata
    MusicInfo(MusicSpec),
    /// Playback state
    MusicState(MusicStateSpec),
    /// Phone volume
    SetPhoneVolume {
        /// Volume in percent
        volume: f32,
    },
    /// Phone ringer mode
    SetPhoneSilentMode {
        /// Ringer mode
        ringer_mode: i32,
    },
    /// Alarms
    SetAlarms {
        /// Alarm slots
        alarms: Vec<Alarm>,
    },
    /// Reminders
    SetReminders {
        /// Reminders
        reminders: Vec<Reminder>,
    },
    /// World clocks
    SetWorldClocks {
        /// Clocks
        clocks: Vec<WorldClock>,
    },
    /// Contacts
    SetContacts {
        /// Contacts
        contacts: Vec<Contact>,
    },
    /// Loyalty cards
    SetLoyaltyCards {
        /// Cards
        cards: Vec<LoyaltyCard>,
    },
    /// Add a calendar event
    AddCalendarEvent(CalendarEventSpec),
    /// Delete a calendar event
    DeleteCalendarEvent {
        /// Event kind
        #[serde(default)]
        kind: u8,
        /// Event identity
        id: i64,
    },
    /// Install an app, watch face or firmware
    Install {
        /// Location of the file
        uri: String,
        /// Installer options
        #[serde(default)]
        options: Metadata,
    },
    /// Request the installed app list
    RequestAppInfo,
    /// Start or stop an app
    StartApp {
        /// App identity
        uuid: Uuid,
        /// Start or stop
        #[serde(default = "default_true")]
        start: bool,
    },
    /// Download an app from the device
    DownloadApp {
        /// App identity
        uuid: Uuid,
    },
    /// Delete an app
    DeleteApp {
        /// App identity
        uuid: Uuid,
    },
    /// Send app configuration
    AppConfigure {
        /// App identity
        uuid: Uuid,
        /// Configuration document
        config: String,
        /// Configuration slot
        #[serde(default)]
        id: Option<i32>,
    },
    /// Reorder apps
    AppReorder {
        /// New order
        uuids: Vec<Uuid>,
    },
    /// Fetch recorded data
    FetchRecordedData {
        /// Data type mask
        data_types: u32,
    },
    /// Reset the device
    Reset {
        /// Reset flags
        #[serde(default)]
        flags: u32,
    },
    /// Single heart rate measurement
    HeartRateTest,
    /// Toggle realtime heart rate
    EnableRealtimeHeartRate {
        /// On or off
        enable: bool,
    },
    /// Toggle realtime steps
    EnableRealtimeSteps {
        /// On or off
        enable: bool,
    },
    /// Constant vibration
    SetConstantVibration {
        /// Intensity
        intensity: i32,
    },
    /// Request a screenshot
    RequestScreenshot,
    /// Toggle heart rate during sleep
    EnableHeartRateSleepSupport {
        /// On or off
        enable: bool,
    },
    /// Heart rate measurement interval
    SetHeartRateMeasurementInterval {
        /// Interval in seconds
        seconds: i32,
    },
    /// Push a configuration key
    SendConfiguration {
        /// Preference key
        key: String,
    },
    /// Read a configuration key
    ReadConfiguration {
        /// Preference key
        key: String,
    },
    /// Weather
    SendWeather {
        /// Current location first
        weather: Vec<WeatherSpec>,
    },
    /// Developer test hook
    TestNewFunction,
    /// Navigation instruction
    NavigationInfo(NavigationInfoSpec),
    /// Sleep tracking bridge action
    SleepAsAndroid {
        /// Action name; `action` on the wire is the envelope tag
        #[serde(rename = "sleep_action")]
        action: String,
        /// Action extras
        #[serde(default)]
        extras: Metadata,
    },
    /// Camera remote event
    CameraStatus {
        /// Event
        event: CameraEvent,
        /// Picture file name
        #[serde(default)]
        filename: Option<String>,
    },
    /// Request the music list
    RequestMusicList,
    /// Music library operation
    MusicOperation {
        /// Operation code
        operation: i32,
        /// Playlist index
        #[serde(default)]
        playlist_index: i32,
        /// Playlist name
        #[serde(default)]
        playlist_name: Option<String>,
        /// Track identities
        #[serde(default)]
        music_ids: Vec<i32>,
    },
    /// Ring the phone from the device
    FindPhone {
        /// Start or stop
        start: bool,
    },
    /// Make the device ring
    FindDevice {
        /// Start or stop
        start: bool,
    },
    /// FM transmitter frequency
    SetFmFrequency {
        /// Frequency in MHz, -1 means unset
        frequency: f32,
    },
    /// LED colour
    SetLedColor {
        /// RGB colour, 0 means unset
        color: i32,
    },
    /// Power the device off
    PowerOff,
    /// GPS fix
    GpsLocation(GpsLocation),
}

fn default_true() -> bool {
    true
}

impl Command {
    /// The action name as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Connect { .. } => "connect",
            Command::Disconnect => "disconnect",
            Command::Notification(_) => "notification",
            Command::DeleteNotification { .. } => "delete_notification",
            Command::SetTime => "set_time",
            Command::CallState(_) => "call_state",
            Command::CannedMessages(_) => "canned_messages",
            Command::MusicInfo(_) => "music_info",
            Command::MusicState(_) => "music_state",
            Command::SetPhoneVolume { .. } => "set_phone_volume",
            Command::SetPhoneSilentMode { .. } => "set_phone_silent_mode",
            Command::SetAlarms { .. } => "set_alarms",
            Command::SetReminders { .. } => "set_reminders",
            Command::SetWorldClocks { .. } => "set_world_clocks",
            Command::SetContacts { .. } => "set_contacts",
            Command::SetLoyaltyCards { .. } => "set_loyalty_cards",
            Command::AddCalendarEvent(_) => "add_calendar_event",
            Command::DeleteCalendarEvent { .. } => "delete_calendar_event",
            Command::Install { .. } => "install",
            Command::RequestAppInfo => "request_app_info",
            Command::StartApp { .. } => "start_app",
            Command::DownloadApp { .. } => "download_app",
            Command::DeleteApp { .. } => "delete_app",
            Command::AppConfigure { .. } => "app_configure",
            Command::AppReorder { .. } => "app_reorder",
            Command::FetchRecordedData { .. } => "fetch_recorded_data",
            Command::Reset { .. } => "reset",
            Command::HeartRateTest => "heart_rate_test",
            Command::EnableRealtimeHeartRate { .. } => "enable_realtime_heart_rate",
            Command::EnableRealtimeSteps { .. } => "enable_realtime_steps",
            Command::SetConstantVibration { .. } => "set_constant_vibration",
            Command::RequestScreenshot => "request_screenshot",
            Command::EnableHeartRateSleepSupport { .. } => "enable_heart_rate_sleep_support",
            Command::SetHeartRateMeasurementInterval { .. } => "set_heart_rate_measurement_interval",
            Command::SendConfiguration { .. } => "send_configuration",
            Command::ReadConfiguration { .. } => "read_configuration",
            Command::SendWeather { .. } => "send_weather",
            Command::TestNewFunction => "test_new_function",
            Command::NavigationInfo(_) => "navigation_info",
            Command::SleepAsAndroid { .. } => "sleep_as_android",
            Command::CameraStatus { .. } => "camera_status",
            Command::RequestMusicList => "request_music_list",
            Command::MusicOperation { .. } => "music_operation",
            Command::FindPhone { .. } => "find_phone",
            Command::FindDevice { .. } => "find_device",
            Command::SetFmFrequency { .. } => "set_fm_frequency",
            Command::SetLedColor { .. } => "set_led_color",
            Command::PowerOff => "power_off",
            Command::GpsLocation(_) => "gps_location",
        }
    }

    /// Broadcast scope of the action
    pub fn scope(&self) -> CommandScope {
        match self {
            Command::Connect { .. } => CommandScope::Connect,
            Command::Disconnect => CommandScope::Disconnect,
            Command::Install { .. }
            | Command::RequestAppInfo
            | Command::StartApp { .. }
            | Command::DownloadApp { .. }
            | Command::DeleteApp { .. }
            | Command::AppConfigure { .. }
            | Command::AppReorder { .. }
            | Command::RequestScreenshot
            | Command::Reset { .. }
            | Command::PowerOff
            | Command::TestNewFunction
            | Command::ReadConfiguration { .. }
            | Command::RequestMusicList
            | Command::MusicOperation { .. }
            | Command::SetLedColor { .. }
            | Command::SetFmFrequency { .. } => CommandScope::TargetedOnly,
            _ => CommandScope::Global,
        }
    }

    /// Rewrite every user-visible text field
    pub fn map_text(&mut self, f: &mut dyn FnMut(&str) -> String) {
        fn apply(field: &mut String, f: &mut dyn FnMut(&str) -> String) {
            if !field.is_empty() {
                *field = f(field);
            }
        }
        fn apply_opt(field: &mut Option<String>, f: &mut dyn FnMut(&str) -> String) {
            if let Some(value) = field.as_mut() {
                apply(value, f);
            }
        }

        match self {
            Command::Notification(spec) => {
                apply(&mut spec.title, f);
                apply(&mut spec.body, f);
                apply_opt(&mut spec.sender, f);
                apply_opt(&mut spec.subject, f);
                apply_opt(&mut spec.source_name, f);
            }
            Command::CallState(spec) => apply_opt(&mut spec.name, f),
            Command::CannedMessages(spec) => {
                for message in &mut spec.messages {
                    apply(message, f);
                }
            }
            Command::MusicInfo(spec) => {
                apply_opt(&mut spec.artist, f);
                apply_opt(&mut spec.album, f);
                apply_opt(&mut spec.track, f);
            }
            Command::SetReminders { reminders } => {
                for reminder in reminders {
                    apply(&mut reminder.message, f);
                }
            }
            Command::AddCalendarEvent(spec) => {
                apply(&mut spec.title, f);
                apply_opt(&mut spec.description, f);
                apply_opt(&mut spec.location, f);
            }
            Command::SendWeather { weather } => {
                for entry in weather {
                    apply(&mut entry.location, f);
                    apply(&mut entry.current_condition, f);
                }
            }
            Command::NavigationInfo(spec) => {
                apply_opt(&mut spec.instruction, f);
                apply_opt(&mut spec.distance_to_turn, f);
                apply_opt(&mut spec.eta, f);
            }
            _ => {}
        }
    }
}

/// A command with an optional target device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Explicit target; `None` broadcasts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<Address>,
    /// The action
    #[serde(flatten)]
    pub command: Command,
}

impl Envelope {
    /// A broadcast envelope
    pub fn broadcast(command: Command) -> Self {
        Self {
            target: None,
            command,
        }
    }

    /// An envelope for one device
    pub fn to<A: Into<Address>>(target: A, command: Command) -> Self {
        Self {
            target: Some(target.into()),
            command,
        }
    }

    /// Parse an envelope from JSON
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}
