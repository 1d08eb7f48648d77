/*!
 * Command dispatcher.
 *
 * The [`Dispatcher`] owns the connection registry, the pending notification
 * queues, the scan bookkeeping and the subscription manager. Every method
 * takes `&mut self`; the service loop is the only caller and processes one
 * message at a time, so no state here needs a lock.
 *
 * After each mutation the feature set is recomputed from the registry and
 * the active subscriptions are reconciled against it.
 */
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn, Instrument};

use wearbridge_core::config::Config;
use wearbridge_core::logging::{device_span, operation_span};
use wearbridge_core::types::Address;
use wearbridge_core::utils::{millis_to_duration, with_timeout};
use wearbridge_devices::device::{CapabilityDescriptor, ConnectionState, DeviceHandle};
use wearbridge_devices::discovery::{initial_state, ScanCoordinator, ScanPolicy, SightingOutcome};
use wearbridge_devices::driver::{DriverEvent, DriverEventSender, SharedDriver};
use wearbridge_devices::factory::{DriverFactory, Transport};
use wearbridge_devices::model::NotificationSpec;
use wearbridge_devices::prefs::{keys, Preferences, SharedPreferences};
use wearbridge_devices::registry::ConnectionRegistry;
use wearbridge_devices::DeviceError;

use crate::command::{Command, CommandScope, Envelope};
use crate::error::{Error, Result};
use crate::features::{aggregate, AggregatedFeatures};
use crate::queue::PendingCommandQueue;
use crate::sanitize::{sanitize, Transliterator};
use crate::scheduler::{DeferredQueue, DeferredTask};
use crate::stress::{self, StressSettings};
use crate::subscription::{desired, SharedSubscriptionProvider, SubscriptionFamily, SubscriptionManager};

/// Dispatcher tunables taken from the configuration
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Scan defaults before per-device overrides
    pub scan: ScanPolicy,
    /// Move disconnected radio devices to WAITING_FOR_SCAN at start
    pub reconnect_via_scan: bool,
    /// Per-device notification cache size
    pub cache_capacity: usize,
    /// Cache notifications unless a device preference says otherwise
    pub cache_while_disconnected: bool,
    /// Enables the stress diagnostics
    pub debug_mode: bool,
    /// Upper bound on one driver disposal
    pub dispose_timeout: Duration,
}

impl DispatcherSettings {
    /// Settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            scan: ScanPolicy::from_config(&config.scanning),
            reconnect_via_scan: config.scanning.reconnect_via_scan,
            cache_capacity: config.cache.capacity,
            cache_while_disconnected: config.cache.cache_while_disconnected,
            debug_mode: config.runtime.debug_mode,
            dispose_timeout: millis_to_duration(config.runtime.dispose_timeout_ms),
        }
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Something collaborators outside the service may want to know about
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceNotice {
    /// A device moved to another connection state
    StateChanged {
        /// Device address
        address: Address,
        /// The old state
        previous: ConnectionState,
        /// The new state
        current: ConnectionState,
    },
    /// A device became ready for commands
    DeviceConnected(Address),
    /// A passive scan sighted a device
    DeviceScanned(Address),
    /// Something the user should be told
    Advisory {
        /// Device concerned, if any
        address: Option<Address>,
        /// Message text
        message: String,
    },
    /// The set of active subscriptions changed
    SubscriptionsChanged {
        /// Newly active families
        added: Vec<SubscriptionFamily>,
        /// Families torn down
        removed: Vec<SubscriptionFamily>,
    },
}

/// What happened to one envelope
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Devices the command reached
    pub delivered: Vec<Address>,
    /// Devices that queued the notification for later
    pub queued: Vec<Address>,
    /// Devices whose queue dropped the deleted notification
    pub dequeued: Vec<Address>,
    /// Devices that failed, with the reason
    pub failed: Vec<(Address, String)>,
}

impl DispatchOutcome {
    fn fail(&mut self, address: Address, error: impl ToString) {
        self.failed.push((address, error.to_string()));
    }

    /// Whether the envelope had no effect at all
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
            && self.queued.is_empty()
            && self.dequeued.is_empty()
            && self.failed.is_empty()
    }
}

/// The command dispatcher
#[derive(Debug)]
pub struct Dispatcher {
    settings: DispatcherSettings,
    registry: ConnectionRegistry,
    factory: DriverFactory,
    prefs: SharedPreferences,
    scanner: ScanCoordinator,
    deferred: DeferredQueue,
    queues: HashMap<Address, PendingCommandQueue>,
    subscriptions: SubscriptionManager,
    aggregated: AggregatedFeatures,
    events_tx: DriverEventSender,
    events_rx: Option<mpsc::UnboundedReceiver<DriverEvent>>,
    notices: broadcast::Sender<ServiceNotice>,
    previously_connected: HashSet<Address>,
    next_notification_id: i32,
}

impl Dispatcher {
    /// Create a dispatcher with an empty registry
    pub fn new(
        settings: DispatcherSettings,
        factory: DriverFactory,
        prefs: SharedPreferences,
        subscriptions: SharedSubscriptionProvider,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(256);
        let previously_connected = prefs
            .global_list(keys::LAST_DEVICE_ADDRESSES)
            .into_iter()
            .map(Address::new)
            .collect();

        Self {
            registry: ConnectionRegistry::new(settings.dispose_timeout),
            settings,
            factory,
            prefs,
            scanner: ScanCoordinator::new(),
            deferred: DeferredQueue::new(),
            queues: HashMap::new(),
            subscriptions: SubscriptionManager::new(subscriptions),
            aggregated: AggregatedFeatures::default(),
            events_tx,
            events_rx: Some(events_rx),
            notices,
            previously_connected,
            next_notification_id: 1,
        }
    }

    /// The connection registry
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Result of the last aggregation
    pub fn aggregated(&self) -> &AggregatedFeatures {
        &self.aggregated
    }

    /// The subscription manager
    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// Pending notifications for a device
    pub fn pending(&self, address: &Address) -> Option<&PendingCommandQueue> {
        self.queues.get(address)
    }

    /// Addresses a sweep connect may pick when restricted to known devices
    pub fn previously_connected(&self) -> &HashSet<Address> {
        &self.previously_connected
    }

    /// Subscribe to service notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<ServiceNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<ServiceNotice> {
        self.notices.clone()
    }

    /// Hand the driver event receiver to the service loop
    pub fn take_driver_events(&mut self) -> Option<mpsc::UnboundedReceiver<DriverEvent>> {
        self.events_rx.take()
    }

    /// Apply every driver event that is already waiting. Only useful while
    /// nobody has taken the receiver.
    pub async fn pump_driver_events(&mut self) -> usize {
        let mut pending = Vec::new();
        if let Some(rx) = self.events_rx.as_mut() {
            while let Ok(event) = rx.try_recv() {
                pending.push(event);
            }
        }
        let count = pending.len();
        for event in pending {
            self.handle_driver_event(event).await;
        }
        count
    }

    /// Earliest deferred task deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.next_deadline()
    }

    fn notify(&self, notice: ServiceNotice) {
        // Nobody listening is fine.
        let _ = self.notices.send(notice);
    }

    fn advise(&self, address: Option<&Address>, message: impl Into<String>) {
        let message = message.into();
        info!(address = ?address.map(Address::as_str), "{}", message);
        self.notify(ServiceNotice::Advisory {
            address: address.cloned(),
            message,
        });
    }

    fn set_state(&mut self, address: &Address, state: ConnectionState) {
        match self.registry.set_state(address, state) {
            Ok(previous) if previous != state => {
                self.notify(ServiceNotice::StateChanged {
                    address: address.clone(),
                    previous,
                    current: state,
                });
                if state == ConnectionState::Initialized {
                    self.notify(ServiceNotice::DeviceConnected(address.clone()));
                }
            }
            Ok(_) => {}
            Err(e) => debug!(address = %address, "State change dropped: {}", e),
        }
    }

    async fn refresh(&mut self) {
        let aggregated = aggregate(&self.registry);
        let wanted = desired(&aggregated);
        self.aggregated = aggregated;

        let diff = self.subscriptions.reconcile(&wanted).await;
        if !diff.is_empty() {
            self.notify(ServiceNotice::SubscriptionsChanged {
                added: diff.added,
                removed: diff.removed,
            });
        }
    }

    /// Start hook: optionally move radio devices to WAITING_FOR_SCAN, then
    /// bring subscriptions in line with the registry
    pub async fn start(&mut self) {
        if self.settings.reconnect_via_scan {
            let sweep: Vec<Address> = self
                .registry
                .entries()
                .filter(|entry| {
                    entry.capabilities().radio
                        && Transport::classify(entry.address()) == Transport::Radio
                        && entry.device().state() == ConnectionState::NotConnected
                        && self.prefs.device_bool(entry.address(), keys::AUTO_RECONNECT, true)
                })
                .map(|entry| entry.address().clone())
                .collect();
            for address in sweep {
                debug!(address = %address, "Waiting for scan");
                self.set_state(&address, ConnectionState::WaitingForScan);
            }
        }
        self.refresh().await;
        info!(devices = self.registry.len(), "Dispatcher started");
    }

    /// Stop hook: tear down every subscription and dispose every driver.
    /// Failures are logged and never stop the teardown.
    pub async fn stop(&mut self) {
        let diff = self.subscriptions.teardown_all().await;
        if !diff.is_empty() {
            self.notify(ServiceNotice::SubscriptionsChanged {
                added: Vec::new(),
                removed: diff.removed,
            });
        }

        for address in self.registry.addresses() {
            if self.release_driver(&address).await {
                self.set_state(&address, ConnectionState::NotConnected);
            }
        }
        self.aggregated = AggregatedFeatures::default();
        info!("Dispatcher stopped");
    }

    /// Register a device. Returns false if the address was already known.
    pub async fn register_device(&mut self, device: DeviceHandle) -> bool {
        let address = device.address().clone();
        if self.registry.contains(&address) {
            return false;
        }

        let entry = self.registry.register(device);
        let initial = initial_state(entry.capabilities());
        if initial != entry.device().state() && initial == ConnectionState::WaitingForScan {
            self.set_state(&address, initial);
        }
        self.refresh().await;
        true
    }

    /// Replace a device's family and alias, and with them its capabilities
    pub async fn update_device(&mut self, device: DeviceHandle) -> Result<()> {
        self.registry.update_device(device)?;
        self.refresh().await;
        Ok(())
    }

    /// Forget a device: dispose its driver, drop its queue and timers
    pub async fn remove_device(&mut self, address: &Address) -> bool {
        self.release_driver(address).await;
        let removed = self.registry.remove(address).await.is_some();
        self.queues.remove(address);
        self.scanner.forget(address);
        self.deferred.cancel_for(address);
        self.refresh().await;
        removed
    }

    /// Detach and dispose a device's driver within the dispose timeout.
    /// Returns whether a driver was attached.
    async fn release_driver(&mut self, address: &Address) -> bool {
        let Some(driver) = self.registry.take_driver(address) else {
            return false;
        };

        let settings = StressSettings::from_prefs(self.prefs.as_ref(), address, self.settings.debug_mode);
        match with_timeout(self.settings.dispose_timeout, stress::dispose(&driver, settings)).await {
            Ok(()) => debug!(address = %address, "Driver released"),
            Err(e) => warn!(address = %address, "Failed to dispose driver: {}", e),
        }
        true
    }

    /// Route one envelope
    pub async fn dispatch(&mut self, envelope: Envelope) -> DispatchOutcome {
        let Envelope { target, mut command } = envelope;
        if let Command::Notification(spec) = &mut command {
            if spec.id.is_none() {
                spec.id = Some(self.next_notification_id);
                self.next_notification_id = self.next_notification_id.wrapping_add(1);
            }
        }

        trace!(action = command.name(), target = ?target.as_ref().map(Address::as_str), "Dispatching");
        if let Command::Connect { first_time } = command {
            return self
                .connect_to_device(target.as_ref(), first_time)
                .instrument(operation_span("connect", "dispatcher"))
                .await;
        }

        let mut outcome = DispatchOutcome::default();
        let explicit = target.is_some();
        let targets = match target {
            Some(address) => {
                if !self.registry.contains(&address) {
                    warn!(address = %address, action = command.name(), "Unknown device, envelope dropped");
                    outcome.fail(address.clone(), DeviceError::DeviceNotFound(address));
                    return outcome;
                }
                vec![address]
            }
            None if command.scope() == CommandScope::TargetedOnly => {
                warn!(action = command.name(), "Action needs a target device, envelope dropped");
                return outcome;
            }
            None => self.registry.addresses(),
        };

        for address in targets {
            let state = match self.registry.lookup(&address) {
                Some(entry) => entry.device().state(),
                None => continue,
            };

            match &command {
                Command::Disconnect => {
                    if explicit || state != ConnectionState::NotConnected {
                        self.disconnect(&address).await;
                        outcome.delivered.push(address);
                    }
                }
                Command::Notification(spec) if state != ConnectionState::Initialized => {
                    if self.caches_offline(&address) {
                        self.enqueue(&address, spec.clone());
                        outcome.queued.push(address);
                    } else if explicit {
                        outcome.fail(address.clone(), DeviceError::NotConnected(address));
                    }
                }
                Command::DeleteNotification { id } if state != ConnectionState::Initialized => {
                    let removed = self
                        .queues
                        .get_mut(&address)
                        .map(|queue| queue.remove_notification(*id))
                        .unwrap_or(false);
                    if removed {
                        debug!(address = %address, id, "Dropped queued notification");
                        outcome.dequeued.push(address);
                    }
                }
                _ if state != ConnectionState::Initialized => {
                    if explicit {
                        debug!(address = %address, %state, action = command.name(), "Device not ready");
                        outcome.fail(address.clone(), DeviceError::NotConnected(address));
                    }
                }
                _ => match self.deliver(&address, command.clone()).await {
                    Ok(true) => outcome.delivered.push(address),
                    Ok(false) => {}
                    Err(e) => {
                        warn!(address = %address, action = command.name(), "Dispatch failed: {}", e);
                        outcome.fail(address, e);
                    }
                },
            }
        }

        self.refresh().await;
        outcome
    }

    fn caches_offline(&self, address: &Address) -> bool {
        self.prefs
            .device_bool(address, keys::NOTIFICATION_CACHE, self.settings.cache_while_disconnected)
    }

    fn enqueue(&mut self, address: &Address, spec: NotificationSpec) {
        let capacity = self.settings.cache_capacity;
        let queue = self
            .queues
            .entry(address.clone())
            .or_insert_with(|| PendingCommandQueue::new(capacity));
        if let Some(evicted) = queue.push(spec) {
            debug!(address = %address, id = ?evicted.id, "Notification cache full, dropped oldest");
        }
        debug!(address = %address, pending = queue.len(), "Queued notification");
    }

    async fn disconnect(&mut self, address: &Address) {
        if !self.release_driver(address).await {
            debug!(address = %address, "Disconnect without a driver");
        }
        self.set_state(address, ConnectionState::NotConnected);
    }

    /// Sanitise a command for a device and hand it to the driver.
    ///
    /// `Ok(false)` means the command did not apply to this device.
    async fn deliver(&self, address: &Address, mut command: Command) -> Result<bool> {
        let entry = self.registry.require(address)?;
        let driver = entry
            .driver()
            .cloned()
            .ok_or_else(|| DeviceError::DeviceNotFound(address.clone()))?;
        let capabilities = entry.capabilities().clone();

        let languages = self.prefs.device_list(address, keys::TRANSLITERATION_LANGUAGES);
        let transliterator = Transliterator::from_names(&languages, capabilities.unicode_emoji);
        command.map_text(&mut |text: &str| {
            sanitize(
                text,
                |t| driver.custom_string_filter(t),
                capabilities.unicode_emoji,
                transliterator.as_ref(),
            )
        });

        if let Command::Notification(spec) = &mut command {
            if spec.accepts_canned_replies() {
                spec.canned_replies = canned_replies(self.prefs.as_ref(), address);
            }
        }

        invoke(&driver, address, &capabilities, self.prefs.as_ref(), command)
            .instrument(device_span(address.as_str()))
            .await
    }

    /// Connect one device, or sweep-connect every eligible one
    pub async fn connect_to_device(&mut self, target: Option<&Address>, first_time: bool) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let from_user = target.is_some();

        let candidates = match target {
            Some(address) if self.registry.contains(address) => vec![address.clone()],
            Some(address) => {
                warn!(address = %address, "Connect requested for unknown device");
                outcome.fail(address.clone(), DeviceError::DeviceNotFound(address.clone()));
                return outcome;
            }
            None => {
                let only_known = self.prefs.global_bool(keys::RECONNECT_ONLY_TO_CONNECTED, true);
                self.registry
                    .addresses()
                    .into_iter()
                    .filter(|address| !only_known || self.previously_connected.contains(address))
                    .collect::<Vec<_>>()
            }
        };

        if candidates.is_empty() {
            info!("No devices to connect to");
        }

        for address in candidates {
            let Some(entry) = self.registry.lookup(&address) else {
                continue;
            };
            if !entry.capabilities().connectable {
                debug!(address = %address, "Not connecting to a scan-only device");
                if from_user {
                    self.advise(Some(&address), format!("{} cannot be connected directly", entry.device().display_name()));
                }
                continue;
            }

            let auto_reconnect = self.prefs.device_bool(&address, keys::AUTO_RECONNECT, true);
            if !from_user && !auto_reconnect {
                debug!(address = %address, "Auto reconnect is off");
                continue;
            }

            self.previously_connected.insert(address.clone());
            match self.connect_one(&address, first_time, auto_reconnect).await {
                Ok(true) => outcome.delivered.push(address),
                Ok(false) => {}
                Err(e) => {
                    warn!(address = %address, "Connect failed: {}", e);
                    self.advise(Some(&address), format!("Cannot connect: {}", e));
                    outcome.fail(address, e);
                }
            }
        }

        self.refresh().await;
        outcome
    }

    async fn connect_one(&mut self, address: &Address, first_time: bool, auto_reconnect: bool) -> Result<bool> {
        let entry = self.registry.require(address)?;
        if entry.driver().map(|d| d.is_connected()).unwrap_or(false) {
            debug!(address = %address, "Driver already connected");
            return Ok(false);
        }
        let state = entry.device().state();
        if state.is_connected() || state.is_connecting() {
            debug!(address = %address, %state, "Already connected or connecting");
            return Ok(false);
        }
        if entry.driver().map(|d| !d.can_reconnect()).unwrap_or(false) {
            debug!(address = %address, "Driver cannot reconnect, replacing it");
            self.release_driver(address).await;
        }

        let driver = match self.registry.lookup(address).and_then(|e| e.driver().cloned()) {
            Some(driver) => driver,
            None => {
                let entry = self.registry.require(address)?;
                let created = self
                    .factory
                    .create(entry.device(), entry.capabilities(), self.events_tx.clone())?;
                match created {
                    Some(driver) => {
                        self.registry.attach_driver(address, driver.clone())?;
                        driver
                    }
                    None => {
                        let status = self.factory.radio_status();
                        let message = status.advisory().unwrap_or("Radio unavailable");
                        self.advise(Some(address), message);
                        return Ok(false);
                    }
                }
            }
        };

        let result = if first_time {
            driver.connect_first_time().await
        } else {
            driver.set_auto_reconnect(auto_reconnect);
            driver.set_scan_reconnect(self.settings.reconnect_via_scan);
            let settings = StressSettings::from_prefs(self.prefs.as_ref(), address, self.settings.debug_mode);
            stress::connect(&driver, settings).await
        };

        match result {
            Ok(started) => {
                debug!(address = %address, started, "Connect attempted");
                Ok(true)
            }
            Err(e) => {
                self.release_driver(address).await;
                self.set_state(address, ConnectionState::NotConnected);
                Err(e.into())
            }
        }
    }

    /// Apply an event reported by a driver.
    ///
    /// State changes are only applied when they come from the driver that
    /// is attached right now, so late events from a released or replaced
    /// driver cannot resurrect its device.
    pub async fn handle_driver_event(&mut self, event: DriverEvent) {
        let Some(entry) = self.registry.lookup(event.address()) else {
            trace!(address = %event.address(), "Event for unknown device");
            return;
        };

        match event {
            DriverEvent::StateChanged {
                address,
                state,
                generation,
            } => {
                if entry.driver().map(|d| d.generation()) != Some(generation) {
                    trace!(address = %address, %state, generation, "Event from a released driver");
                    return;
                }
                let previous = entry.device().state();
                self.set_state(&address, state);
                if state == ConnectionState::Initialized && previous != state {
                    self.flush_queue(&address).await;
                }
                self.refresh().await;
            }
            DriverEvent::Battery { address, level, state } => {
                if let Err(e) = self.registry.record_battery(&address, level, state) {
                    debug!(address = %address, "Battery dropped: {}", e);
                }
            }
            DriverEvent::Info { address, firmware, model } => {
                if let Err(e) = self.registry.record_info(&address, firmware, model) {
                    debug!(address = %address, "Device info dropped: {}", e);
                }
            }
        }
    }

    async fn flush_queue(&mut self, address: &Address) {
        let Some(mut queue) = self.queues.remove(address) else {
            return;
        };
        let pending = queue.drain();
        if pending.is_empty() {
            return;
        }

        info!(address = %address, count = pending.len(), "Sending cached notifications");
        for spec in pending {
            if let Err(e) = self.deliver(address, Command::Notification(spec)).await {
                warn!(address = %address, "Cached notification failed: {}", e);
            }
        }
    }

    /// A passive scan saw `address` at signal strength `rssi`
    pub async fn on_sighting(&mut self, address: &Address, rssi: i32, now: Instant) -> Option<SightingOutcome> {
        let entry = self.registry.lookup(address)?;
        let policy = self.settings.scan.for_device(self.prefs.as_ref(), address);
        let outcome = self
            .scanner
            .on_sighting(entry.device(), entry.capabilities(), rssi, &policy, now);

        match outcome {
            SightingOutcome::Scanned { revert_at, scanned_at } => {
                self.set_state(address, ConnectionState::Scanned);
                self.deferred.schedule(
                    revert_at,
                    DeferredTask::RevertScan {
                        address: address.clone(),
                        scanned_at,
                    },
                );
                self.notify(ServiceNotice::DeviceScanned(address.clone()));
                self.refresh().await;
            }
            SightingOutcome::ConnectDirect => {
                self.connect_to_device(Some(address), false).await;
            }
            SightingOutcome::Ignored(_) => {}
        }
        Some(outcome)
    }

    /// Run every deferred task due at `now`. Returns how many ran.
    pub async fn run_due(&mut self, now: Instant) -> usize {
        let due = self.deferred.pop_due(now);
        let count = due.len();
        for task in due {
            match task {
                DeferredTask::RevertScan { address, scanned_at } => {
                    let Some(state) = self.registry.lookup(&address).map(|e| e.device().state()) else {
                        continue;
                    };
                    if self.scanner.on_scan_timeout(&address, state, scanned_at, now) {
                        debug!(address = %address, "Scan expired");
                        self.set_state(&address, ConnectionState::WaitingForScan);
                    }
                }
            }
        }
        if count > 0 {
            self.refresh().await;
        }
        count
    }
}

/// Non-empty canned replies from the device preferences
fn canned_replies(prefs: &dyn Preferences, address: &Address) -> Vec<String> {
    (1..=keys::CANNED_REPLY_SLOTS)
        .filter_map(|slot| prefs.device_string(address, &format!("{}{}", keys::CANNED_REPLY_PREFIX, slot)))
        .filter(|reply| !reply.trim().is_empty())
        .collect()
}

fn sleep_tracking_target(prefs: &dyn Preferences, address: &Address, capabilities: &CapabilityDescriptor) -> bool {
    capabilities.sleep_tracking
        && prefs
            .global_string(keys::SLEEP_TRACKING_DEVICE)
            .map(|selected| Address::new(selected) == *address)
            .unwrap_or(false)
}

/// Call the driver method for a command. `Ok(false)` means skipped.
async fn invoke(
    driver: &SharedDriver,
    address: &Address,
    capabilities: &CapabilityDescriptor,
    prefs: &dyn Preferences,
    command: Command,
) -> Result<bool> {
    match command {
        Command::Connect { .. } | Command::Disconnect => {
            return Err(Error::routing(format!("{} is not a driver command", command.name())));
        }
        Command::Notification(spec) => driver.on_notification(&spec).await?,
        Command::DeleteNotification { id } => driver.on_delete_notification(id).await?,
        Command::SetTime => driver.on_set_time().await?,
        Command::CallState(spec) => driver.on_set_call_state(&spec).await?,
        Command::CannedMessages(spec) => driver.on_set_canned_messages(&spec).await?,
        Command::MusicInfo(spec) => driver.on_set_music_info(&spec).await?,
        Command::MusicState(spec) => driver.on_set_music_state(&spec).await?,
        Command::SetPhoneVolume { volume } => driver.on_set_phone_volume(volume).await?,
        Command::SetPhoneSilentMode { ringer_mode } => driver.on_change_phone_silent_mode(ringer_mode).await?,
        Command::SetAlarms { alarms } => driver.on_set_alarms(&alarms).await?,
        Command::SetReminders { reminders } => driver.on_set_reminders(&reminders).await?,
        Command::SetWorldClocks { clocks } => driver.on_set_world_clocks(&clocks).await?,
        Command::SetContacts { contacts } => driver.on_set_contacts(&contacts).await?,
        Command::SetLoyaltyCards { cards } => driver.on_set_loyalty_cards(&cards).await?,
        Command::AddCalendarEvent(spec) => driver.on_add_calendar_event(&spec).await?,
        Command::DeleteCalendarEvent { kind, id } => driver.on_delete_calendar_event(kind, id).await?,
        Command::Install { uri, options } => {
            if uri.is_empty() {
                debug!(address = %address, "Install without a file, skipped");
                return Ok(false);
            }
            driver.on_install_app(&uri, &options).await?
        }
        Command::RequestAppInfo => driver.on_app_info_req().await?,
        Command::StartApp { uuid, start } => driver.on_app_start(uuid, start).await?,
        Command::DownloadApp { uuid } => driver.on_app_download(uuid).await?,
        Command::DeleteApp { uuid } => driver.on_app_delete(uuid).await?,
        Command::AppConfigure { uuid, config, id } => driver.on_app_configuration(uuid, &config, id).await?,
        Command::AppReorder { uuids } => driver.on_app_reorder(&uuids).await?,
        Command::FetchRecordedData { data_types } => driver.on_fetch_recorded_data(data_types).await?,
        Command::Reset { flags } => driver.on_reset(flags).await?,
        Command::HeartRateTest => driver.on_heart_rate_test().await?,
        Command::EnableRealtimeHeartRate { enable } => {
            driver.on_enable_realtime_heart_rate_measurement(enable).await?
        }
        Command::EnableRealtimeSteps { enable } => driver.on_enable_realtime_steps(enable).await?,
        Command::SetConstantVibration { intensity } => driver.on_set_constant_vibration(intensity).await?,
        Command::RequestScreenshot => driver.on_screenshot_req().await?,
        Command::EnableHeartRateSleepSupport { enable } => driver.on_enable_heart_rate_sleep_support(enable).await?,
        Command::SetHeartRateMeasurementInterval { seconds } => {
            driver.on_set_heart_rate_measurement_interval(seconds).await?
        }
        Command::SendConfiguration { key } => driver.on_send_configuration(&key).await?,
        Command::ReadConfiguration { key } => driver.on_read_configuration(&key).await?,
        Command::SendWeather { weather } => driver.on_send_weather(&weather).await?,
        Command::TestNewFunction => driver.on_test_new_function().await?,
        Command::NavigationInfo(spec) => driver.on_set_navigation_info(&spec).await?,
        Command::SleepAsAndroid { action, extras } => {
            if !sleep_tracking_target(prefs, address, capabilities) {
                trace!(address = %address, "Not the sleep tracking device");
                return Ok(false);
            }
            driver.on_sleep_as_android_action(&action, &extras).await?
        }
        Command::CameraStatus { event, filename } => {
            driver.on_camera_status_change(event, filename.as_deref()).await?
        }
        Command::RequestMusicList => driver.on_music_list_req().await?,
        Command::MusicOperation {
            operation,
            playlist_index,
            playlist_name,
            music_ids,
        } => {
            driver
                .on_music_operation(operation, playlist_index, playlist_name.as_deref(), &music_ids)
                .await?
        }
        Command::FindPhone { start } => driver.on_find_phone(start).await?,
        Command::FindDevice { start } => driver.on_find_device(start).await?,
        Command::SetFmFrequency { frequency } => {
            if frequency == -1.0 {
                return Ok(false);
            }
            driver.on_set_fm_frequency(frequency).await?
        }
        Command::SetLedColor { color } => {
            if color == 0 {
                return Ok(false);
            }
            driver.on_set_led_color(color).await?
        }
        Command::PowerOff => driver.on_power_off().await?,
        Command::GpsLocation(location) => driver.on_set_gps_location(&location).await?,
    }
    Ok(true)
}
