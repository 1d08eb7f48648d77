/*!
 * Read-only preference lookup.
 *
 * Preferences are owned by whatever persists them; the bridge only reads.
 * Device lookups fall back to the global value of the same key, then to the
 * caller's default.
 */
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use wearbridge_core::config::Config;
use wearbridge_core::types::{Address, Value};

/// Preference keys
pub mod keys {
    /// Reconnect automatically after link loss (device, default true)
    pub const AUTO_RECONNECT: &str = "prefs_key_device_auto_reconnect";
    /// Driver may be reused for a reconnect (device, default true)
    pub const CAN_RECONNECT: &str = "prefs_device_support_can_reconnect";
    /// Reconnect by waiting for advertisements (global)
    pub const RECONNECT_SCAN: &str = "prefs_general_key_auto_reconnect_scan";
    /// Only sweep devices connected before (global, default true)
    pub const RECONNECT_ONLY_TO_CONNECTED: &str = "general_reconnectonlytoconnected";
    /// Addresses connected before (global, list)
    pub const LAST_DEVICE_ADDRESSES: &str = "last_device_addresses";
    /// Cache notifications while the device is offline
    pub const NOTIFICATION_CACHE: &str = "notification_cache_while_disconnected";
    /// Seconds a sighted device stays SCANNED
    pub const SCAN_DEBOUNCE: &str = "devicesetting_scannable_debounce";
    /// Minimum seconds between acted-on sightings
    pub const SCAN_UNSEEN: &str = "devicesetting_scannable_unseen";
    /// RSSI threshold for sightings
    pub const SCAN_RSSI: &str = "devicesetting_scannable_rssi";
    /// Comma separated transliteration languages (device)
    pub const TRANSLITERATION_LANGUAGES: &str = "pref_transliteration_languages";
    /// Address of the device receiving sleep-tracking actions (global)
    pub const SLEEP_TRACKING_DEVICE: &str = "sleepasandroid_device";
    /// Number of extra connect attempts in stress mode
    pub const STRESS_CONNECT_COUNT: &str = "stress_test_connect_count";
    /// Run stress connects in parallel
    pub const STRESS_CONNECT_PARALLEL: &str = "stress_test_connect_parallel";
    /// Dispose twice in stress mode
    pub const STRESS_DISPOSE: &str = "stress_test_dispose";
    /// Prefix of canned reply slots, numbered 1 to 16
    pub const CANNED_REPLY_PREFIX: &str = "canned_reply_";
    /// Number of canned reply slots
    pub const CANNED_REPLY_SLOTS: usize = 16;
}

/// Read-only key/value lookup for global and per-device settings
pub trait Preferences: Send + Sync + Debug {
    /// Look up a global value
    fn global(&self, key: &str) -> Option<Value>;

    /// Look up a device value without falling back to the global one
    fn device_only(&self, address: &Address, key: &str) -> Option<Value>;

    /// Look up a device value, falling back to the global one
    fn device(&self, address: &Address, key: &str) -> Option<Value> {
        self.device_only(address, key).or_else(|| self.global(key))
    }

    /// Global boolean
    fn global_bool(&self, key: &str, default: bool) -> bool {
        self.global(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Global string
    fn global_string(&self, key: &str) -> Option<String> {
        self.global(key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Global string list
    fn global_list(&self, key: &str) -> Vec<String> {
        self.global(key).map(|v| v.as_string_list()).unwrap_or_default()
    }

    /// Device boolean
    fn device_bool(&self, address: &Address, key: &str, default: bool) -> bool {
        self.device(address, key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// Device integer
    fn device_int(&self, address: &Address, key: &str, default: i64) -> i64 {
        self.device(address, key).and_then(|v| v.as_integer()).unwrap_or(default)
    }

    /// Device string
    fn device_string(&self, address: &Address, key: &str) -> Option<String> {
        self.device(address, key).and_then(|v| v.as_str().map(str::to_string))
    }

    /// Device string list
    fn device_list(&self, address: &Address, key: &str) -> Vec<String> {
        self.device(address, key).map(|v| v.as_string_list()).unwrap_or_default()
    }
}

/// Shared preference handle
pub type SharedPreferences = Arc<dyn Preferences>;

/// In-memory preference store
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    global: RwLock<HashMap<String, Value>>,
    devices: RwLock<HashMap<Address, HashMap<String, Value>>>,
}

impl MemoryPreferences {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store from the `preferences` and `devices` config sections
    pub fn from_config(config: &Config) -> Self {
        let prefs = Self::new();
        for (key, value) in &config.preferences {
            prefs.set_global(key, value.clone());
        }
        for device in &config.devices {
            let address = Address::new(&device.address);
            for (key, value) in &device.preferences {
                prefs.set_device(&address, key, value.clone());
            }
        }
        prefs
    }

    /// Set a global value
    pub fn set_global<V: Into<Value>>(&self, key: &str, value: V) {
        if let Ok(mut global) = self.global.write() {
            global.insert(key.to_string(), value.into());
        }
    }

    /// Set a device value
    pub fn set_device<V: Into<Value>>(&self, address: &Address, key: &str, value: V) {
        if let Ok(mut devices) = self.devices.write() {
            devices
                .entry(address.clone())
                .or_default()
                .insert(key.to_string(), value.into());
        }
    }

    /// Builder-style global value
    pub fn with_global<V: Into<Value>>(self, key: &str, value: V) -> Self {
        self.set_global(key, value);
        self
    }

    /// Builder-style device value
    pub fn with_device<V: Into<Value>>(self, address: &Address, key: &str, value: V) -> Self {
        self.set_device(address, key, value);
        self
    }
}

impl Preferences for MemoryPreferences {
    fn global(&self, key: &str) -> Option<Value> {
        self.global.read().ok()?.get(key).cloned()
    }

    fn device_only(&self, address: &Address, key: &str) -> Option<Value> {
        self.devices.read().ok()?.get(address)?.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wearbridge_core::config::DeviceConfig;

    #[test]
    fn test_device_falls_back_to_global() {
        let watch = Address::new("AA:BB:CC:DD:EE:01");
        let prefs = MemoryPreferences::new()
            .with_global(keys::NOTIFICATION_CACHE, true)
            .with_device(&watch, keys::SCAN_RSSI, -70);

        assert!(prefs.device_bool(&watch, keys::NOTIFICATION_CACHE, false));
        assert_eq!(prefs.device_int(&watch, keys::SCAN_RSSI, -100), -70);
        assert_eq!(
            prefs.device_int(&Address::new("other"), keys::SCAN_RSSI, -100),
            -100
        );
        assert!(prefs.device_only(&watch, keys::NOTIFICATION_CACHE).is_none());
    }

    #[test]
    fn test_string_values_are_parsed() {
        let watch = Address::new("watch");
        let prefs = MemoryPreferences::new()
            .with_device(&watch, keys::SCAN_DEBOUNCE, "30")
            .with_device(&watch, keys::AUTO_RECONNECT, "false")
            .with_global(keys::LAST_DEVICE_ADDRESSES, "a,b");

        assert_eq!(prefs.device_int(&watch, keys::SCAN_DEBOUNCE, 60), 30);
        assert!(!prefs.device_bool(&watch, keys::AUTO_RECONNECT, true));
        assert_eq!(prefs.global_list(keys::LAST_DEVICE_ADDRESSES), vec!["a", "b"]);
    }

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config
            .preferences
            .insert(keys::SLEEP_TRACKING_DEVICE.to_string(), Value::from("watch"));
        let mut device_prefs = HashMap::new();
        device_prefs.insert(keys::AUTO_RECONNECT.to_string(), Value::Bool(false));
        config.devices.push(DeviceConfig {
            address: "WATCH".to_string(),
            family: "test".to_string(),
            alias: None,
            preferences: device_prefs,
        });

        let prefs = MemoryPreferences::from_config(&config);
        assert_eq!(
            prefs.global_string(keys::SLEEP_TRACKING_DEVICE).as_deref(),
            Some("watch")
        );
        assert!(!prefs.device_bool(&Address::new("watch"), keys::AUTO_RECONNECT, true));
    }
}
