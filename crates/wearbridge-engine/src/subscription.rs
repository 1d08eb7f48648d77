/*!
 * Passive subscription lifecycle.
 *
 * A subscription family is an OS event source the bridge listens to (call
 * state, SMS, weather providers, ...). Which families are active follows
 * from the aggregated feature set; the [`SubscriptionManager`] turns that
 * desired set into subscribe and unsubscribe calls on a
 * [`SubscriptionProvider`].
 */
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use wearbridge_core::types::Address;

use crate::error::{Error, Result};
use crate::features::AggregatedFeatures;

/// A family of passive subscriptions
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubscriptionFamily {
    /// Phone call state
    PhoneCalls,
    /// Incoming SMS
    Sms,
    /// Clock and time zone changes
    TimeChange,
    /// Next alarm clock changes
    AlarmClock,
    /// Radio pairing requests
    PairingRequest,
    /// Ringer mode changes
    SilentMode,
    /// Location updates
    Location,
    /// Media session and volume observation
    MusicSession,
    /// Navigation app bridge
    Navigation,
    /// Weather providers
    Weather,
    /// Sleep tracking bridge
    SleepTracking,
    /// Periodic activity fetch on unlock
    ActivityAutoFetch,
    /// Calendar sync for one device
    Calendar(Address),
}

impl fmt::Display for SubscriptionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionFamily::Calendar(address) => write!(f, "calendar({})", address),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Families that should be active for an aggregation result
pub fn desired(aggregated: &AggregatedFeatures) -> BTreeSet<SubscriptionFamily> {
    let mut families = BTreeSet::new();
    if !aggregated.any_work {
        return families;
    }

    families.extend([
        SubscriptionFamily::PhoneCalls,
        SubscriptionFamily::Sms,
        SubscriptionFamily::TimeChange,
        SubscriptionFamily::AlarmClock,
        SubscriptionFamily::PairingRequest,
        SubscriptionFamily::SilentMode,
        SubscriptionFamily::Location,
    ]);

    let features = &aggregated.features;
    if features.music {
        families.insert(SubscriptionFamily::MusicSession);
    }
    if features.navigation {
        families.insert(SubscriptionFamily::Navigation);
    }
    if features.weather {
        families.insert(SubscriptionFamily::Weather);
    }
    if features.sleep_tracking {
        families.insert(SubscriptionFamily::SleepTracking);
    }
    if features.activity_fetch {
        families.insert(SubscriptionFamily::ActivityAutoFetch);
    }
    if aggregated.any_initialized {
        families.extend(
            aggregated
                .calendar_devices
                .iter()
                .cloned()
                .map(SubscriptionFamily::Calendar),
        );
    }
    families
}

/// Something that can attach to and detach from OS event sources
#[async_trait]
pub trait SubscriptionProvider: Send + Sync + fmt::Debug {
    /// Start listening to a family
    async fn subscribe(&self, family: &SubscriptionFamily) -> Result<()>;

    /// Stop listening to a family
    async fn unsubscribe(&self, family: &SubscriptionFamily) -> Result<()>;
}

/// Shared subscription provider
pub type SharedSubscriptionProvider = Arc<dyn SubscriptionProvider>;

/// Changes applied by one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDiff {
    /// Newly subscribed families
    pub added: Vec<SubscriptionFamily>,
    /// Torn down families
    pub removed: Vec<SubscriptionFamily>,
}

impl SubscriptionDiff {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Keeps the active subscriptions equal to the desired set
#[derive(Debug)]
pub struct SubscriptionManager {
    provider: SharedSubscriptionProvider,
    active: BTreeSet<SubscriptionFamily>,
}

impl SubscriptionManager {
    /// Create a manager with nothing subscribed
    pub fn new(provider: SharedSubscriptionProvider) -> Self {
        Self {
            provider,
            active: BTreeSet::new(),
        }
    }

    /// Currently active families
    pub fn active(&self) -> &BTreeSet<SubscriptionFamily> {
        &self.active
    }

    /// Whether a family is active
    pub fn is_active(&self, family: &SubscriptionFamily) -> bool {
        self.active.contains(family)
    }

    /// Tear down what is no longer wanted, then subscribe what is missing.
    ///
    /// A failed subscribe leaves the family inactive so the next pass tries
    /// again. A failed unsubscribe is logged and the family is dropped.
    pub async fn reconcile(&mut self, wanted: &BTreeSet<SubscriptionFamily>) -> SubscriptionDiff {
        let mut diff = SubscriptionDiff::default();

        let stale: Vec<_> = self.active.difference(wanted).cloned().collect();
        for family in stale {
            if let Err(e) = self.provider.unsubscribe(&family).await {
                warn!(%family, "Failed to unsubscribe: {}", e);
            }
            self.active.remove(&family);
            diff.removed.push(family);
        }

        let missing: Vec<_> = wanted.difference(&self.active).cloned().collect();
        for family in missing {
            match self.provider.subscribe(&family).await {
                Ok(()) => {
                    self.active.insert(family.clone());
                    diff.added.push(family);
                }
                Err(e) => warn!(%family, "Failed to subscribe: {}", e),
            }
        }

        if !diff.is_empty() {
            debug!(added = diff.added.len(), removed = diff.removed.len(), "Subscriptions changed");
        }
        diff
    }

    /// Unsubscribe everything
    pub async fn teardown_all(&mut self) -> SubscriptionDiff {
        self.reconcile(&BTreeSet::new()).await
    }
}

/// Provider that only logs
#[derive(Debug, Default)]
pub struct LoggingSubscriptions;

#[async_trait]
impl SubscriptionProvider for LoggingSubscriptions {
    async fn subscribe(&self, family: &SubscriptionFamily) -> Result<()> {
        info!(%family, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, family: &SubscriptionFamily) -> Result<()> {
        info!(%family, "Unsubscribed");
        Ok(())
    }
}

/// A call seen by [`RecordingSubscriptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionCall {
    /// `subscribe`
    Subscribe(SubscriptionFamily),
    /// `unsubscribe`
    Unsubscribe(SubscriptionFamily),
}

#[derive(Debug, Default)]
struct RecordingState {
    calls: Vec<SubscriptionCall>,
    failing: BTreeSet<SubscriptionFamily>,
}

/// Provider that records every call, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingSubscriptions {
    state: Mutex<RecordingState>,
}

impl RecordingSubscriptions {
    /// Create a recorder
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make subscribing to `family` fail
    pub fn fail(&self, family: SubscriptionFamily) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(family);
        }
    }

    /// Every call so far
    pub fn calls(&self) -> Vec<SubscriptionCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Families subscribed and not unsubscribed since
    pub fn active(&self) -> BTreeSet<SubscriptionFamily> {
        let mut active = BTreeSet::new();
        for call in self.calls() {
            match call {
                SubscriptionCall::Subscribe(family) => active.insert(family),
                SubscriptionCall::Unsubscribe(family) => active.remove(&family),
            };
        }
        active
    }

    fn record(&self, call: SubscriptionCall) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::other("subscription recorder poisoned"))?;
        if let SubscriptionCall::Subscribe(family) = &call {
            if state.failing.contains(family) {
                return Err(Error::other(format!("{} unavailable", family)));
            }
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl SubscriptionProvider for RecordingSubscriptions {
    async fn subscribe(&self, family: &SubscriptionFamily) -> Result<()> {
        self.record(SubscriptionCall::Subscribe(family.clone()))
    }

    async fn unsubscribe(&self, family: &SubscriptionFamily) -> Result<()> {
        self.record(SubscriptionCall::Unsubscribe(family.clone()))
    }
}
