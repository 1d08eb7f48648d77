/*!
 * Payloads carried by commands and handed to drivers.
 */
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of notification source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Generic application notification
    #[default]
    Generic,
    /// Text message
    Sms,
    /// E-mail
    Email,
    /// Chat application
    Chat,
    /// Missed call
    MissedCall,
}

/// An action the user can trigger on a notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
    /// Action handle
    pub handle: i64,
    /// Label shown on the device
    pub title: String,
    /// The action accepts a text reply
    #[serde(default)]
    pub reply: bool,
}

/// A notification to show on a device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationSpec {
    /// Identity used for deletion; assigned by the dispatcher when absent
    #[serde(default)]
    pub id: Option<i32>,
    /// Kind of source
    #[serde(default)]
    pub kind: NotificationKind,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Body text
    #[serde(default)]
    pub body: String,
    /// Sender name
    #[serde(default)]
    pub sender: Option<String>,
    /// Subject line
    #[serde(default)]
    pub subject: Option<String>,
    /// Sender phone number
    #[serde(default)]
    pub phone_number: Option<String>,
    /// Name of the source application
    #[serde(default)]
    pub source_name: Option<String>,
    /// Identifier of the source application
    #[serde(default)]
    pub source_app_id: Option<String>,
    /// When the notification was posted
    #[serde(default)]
    pub when: Option<DateTime<Utc>>,
    /// Actions attached by the source
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    /// Canned replies offered on the device
    #[serde(default)]
    pub canned_replies: Vec<String>,
}

impl NotificationSpec {
    /// A generic notification with title and body
    pub fn new<T: Into<String>, B: Into<String>>(title: T, body: B) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Set the identity
    pub fn with_id(mut self, id: i32) -> Self {
        self.id = Some(id);
        self
    }

    /// Whether canned replies apply to this notification
    pub fn accepts_canned_replies(&self) -> bool {
        !self.actions.is_empty() || (self.kind == NotificationKind::Sms && self.phone_number.is_some())
    }
}

/// Phone call state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallCommand {
    /// Incoming call ringing
    Incoming,
    /// Outgoing call started
    Outgoing,
    /// Call accepted
    Accept,
    /// Call in progress
    Start,
    /// Call rejected
    Reject,
    /// Call ended
    End,
}

/// A call state update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSpec {
    /// What happened
    pub command: CallCommand,
    /// Caller number
    #[serde(default)]
    pub number: Option<String>,
    /// Caller name
    #[serde(default)]
    pub name: Option<String>,
}

/// Canned messages for one purpose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CannedMessagesSpec {
    /// What the messages are used for
    pub kind: CannedMessageKind,
    /// The messages
    pub messages: Vec<String>,
}

/// Purpose of canned messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CannedMessageKind {
    /// Replies to notifications
    Generic,
    /// Replies used when rejecting a call
    RejectedCall,
}

/// Track metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MusicSpec {
    /// Artist
    #[serde(default)]
    pub artist: Option<String>,
    /// Album
    #[serde(default)]
    pub album: Option<String>,
    /// Track title
    #[serde(default)]
    pub track: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<u32>,
    /// Number of tracks in the current list
    #[serde(default)]
    pub track_count: Option<u32>,
    /// Position of the track in the current list
    #[serde(default)]
    pub track_number: Option<u32>,
}

/// Player state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// Playing
    Playing,
    /// Paused
    Paused,
    /// Stopped
    Stopped,
}

/// Playback state update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicStateSpec {
    /// Player state
    pub state: PlaybackState,
    /// Position in seconds
    #[serde(default)]
    pub position: u32,
    /// Playback rate in percent
    #[serde(default = "default_rate")]
    pub play_rate: u32,
    /// Shuffle enabled
    #[serde(default)]
    pub shuffle: bool,
    /// Repeat enabled
    #[serde(default)]
    pub repeat: bool,
}

fn default_rate() -> u32 {
    100
}

/// An alarm slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alarm {
    /// Slot index on the device
    pub position: u8,
    /// Alarm is armed
    pub enabled: bool,
    /// Time of day
    pub time: NaiveTime,
    /// Repetition bitmask, Monday is bit 0
    #[serde(default)]
    pub repetition: u8,
    /// Smart wake-up window
    #[serde(default)]
    pub smart_wakeup: bool,
    /// Label
    #[serde(default)]
    pub title: Option<String>,
}

/// A reminder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    /// Reminder identity
    pub id: String,
    /// Text
    pub message: String,
    /// When it fires
    pub date: DateTime<Utc>,
    /// Repetition rule name
    #[serde(default)]
    pub repetition: Option<String>,
}

/// A world clock entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldClock {
    /// Entry identity
    pub id: String,
    /// Label
    pub label: String,
    /// IANA time zone
    pub time_zone: String,
}

/// A contact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    /// Contact identity
    pub id: String,
    /// Display name
    pub name: String,
    /// Phone number
    pub number: String,
}

/// A loyalty card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyCard {
    /// Card name
    pub name: String,
    /// Card number
    pub card_id: String,
    /// Barcode format name
    #[serde(default)]
    pub barcode_format: Option<String>,
}

/// A calendar event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEventSpec {
    /// Event identity
    pub id: i64,
    /// Event kind
    #[serde(default)]
    pub kind: u8,
    /// Start time
    pub start: DateTime<Utc>,
    /// Duration in seconds
    #[serde(default)]
    pub duration_seconds: u32,
    /// Title
    pub title: String,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Location
    #[serde(default)]
    pub location: Option<String>,
    /// Whole-day event
    #[serde(default)]
    pub all_day: bool,
}

/// Current or forecast weather for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSpec {
    /// When the data was fetched
    pub timestamp: DateTime<Utc>,
    /// Location name
    pub location: String,
    /// Temperature in Kelvin
    pub current_temp: i32,
    /// Condition code
    pub current_condition_code: i32,
    /// Condition text
    #[serde(default)]
    pub current_condition: String,
    /// Relative humidity in percent
    #[serde(default)]
    pub humidity: Option<u8>,
    /// Daily minimum in Kelvin
    #[serde(default)]
    pub today_min_temp: Option<i32>,
    /// Daily maximum in Kelvin
    #[serde(default)]
    pub today_max_temp: Option<i32>,
}

/// Navigation instruction
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NavigationInfoSpec {
    /// Instruction text
    #[serde(default)]
    pub instruction: Option<String>,
    /// Distance to the next turn, e.g. "300 m"
    #[serde(default)]
    pub distance_to_turn: Option<String>,
    /// Estimated time of arrival
    #[serde(default)]
    pub eta: Option<String>,
    /// Maneuver code
    #[serde(default)]
    pub next_action: i32,
}

/// A GPS fix forwarded to the device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Altitude in meters
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Horizontal accuracy in meters
    #[serde(default)]
    pub accuracy: Option<f32>,
    /// Speed in m/s
    #[serde(default)]
    pub speed: Option<f32>,
    /// Time of the fix
    pub time: DateTime<Utc>,
}

/// Camera remote event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraEvent {
    /// Camera opened on the phone
    Opened,
    /// A picture was taken
    TookPicture,
    /// An error occurred
    Error,
    /// Camera closed
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_replies_applicability() {
        let plain = NotificationSpec::new("title", "body");
        assert!(!plain.accepts_canned_replies());

        let sms = NotificationSpec {
            kind: NotificationKind::Sms,
            phone_number: Some("+100".to_string()),
            ..NotificationSpec::default()
        };
        assert!(sms.accepts_canned_replies());

        let chat = NotificationSpec {
            actions: vec![NotificationAction {
                handle: 1,
                title: "Reply".to_string(),
                reply: true,
            }],
            ..NotificationSpec::default()
        };
        assert!(chat.accepts_canned_replies());
    }

    #[test]
    fn test_notification_defaults_from_json() {
        let spec: NotificationSpec = serde_json::from_str(r#"{"title":"Hi"}"#).unwrap();
        assert_eq!(spec.title, "Hi");
        assert_eq!(spec.body, "");
        assert_eq!(spec.id, None);
        assert_eq!(spec.kind, NotificationKind::Generic);
    }
}
