/*!
 * Connect and dispose stress diagnostics.
 *
 * Only active when `runtime.debug_mode` is on. Per device, extra connect
 * attempts can be fired at the same driver, serially or in parallel, and
 * dispose can be called twice. The first attempt's result is the one
 * returned; the rest are only logged.
 */
use futures::future::join_all;
use tokio::task::JoinError;
use tracing::debug;

use wearbridge_core::types::Address;
use wearbridge_devices::driver::SharedDriver;
use wearbridge_devices::prefs::{keys, Preferences};
use wearbridge_devices::{DeviceError, Result as DeviceResult};

/// Stress settings for one device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StressSettings {
    /// Extra connect attempts on top of the normal one
    pub extra_connects: usize,
    /// Fire the attempts concurrently
    pub parallel: bool,
    /// Call dispose a second time
    pub dispose_twice: bool,
}

impl StressSettings {
    /// Read a device's stress preferences; all off unless `debug_mode`
    pub fn from_prefs(prefs: &dyn Preferences, address: &Address, debug_mode: bool) -> Self {
        if !debug_mode {
            return Self::default();
        }
        Self {
            extra_connects: prefs
                .device_int(address, keys::STRESS_CONNECT_COUNT, 0)
                .max(0) as usize,
            parallel: prefs.device_bool(address, keys::STRESS_CONNECT_PARALLEL, false),
            dispose_twice: prefs.device_bool(address, keys::STRESS_DISPOSE, false),
        }
    }
}

/// Connect with the configured number of extra attempts
pub async fn connect(driver: &SharedDriver, settings: StressSettings) -> DeviceResult<bool> {
    if settings.extra_connects == 0 {
        return driver.connect().await;
    }

    let attempts = settings.extra_connects + 1;
    debug!(
        address = %driver.address(),
        extras = settings.extra_connects,
        parallel = settings.parallel,
        "Stress connect"
    );

    let mut results = if settings.parallel {
        let handles = (0..attempts).map(|_| {
            let driver = driver.clone();
            tokio::spawn(async move { driver.connect().await })
        });
        join_all(handles)
            .await
            .into_iter()
            .map(attempt_result)
            .collect::<Vec<_>>()
    } else {
        let mut results = Vec::with_capacity(attempts);
        for _ in 0..attempts {
            results.push(driver.connect().await);
        }
        results
    };

    for (i, result) in results.iter().enumerate().skip(1) {
        debug!(address = %driver.address(), attempt = i, ?result, "Stress connect attempt");
    }
    results.swap_remove(0)
}

// A panicked or cancelled attempt is a failed attempt.
fn attempt_result(joined: Result<DeviceResult<bool>, JoinError>) -> DeviceResult<bool> {
    joined.unwrap_or_else(|e| Err(DeviceError::transport(format!("connect attempt aborted: {}", e))))
}

/// Dispose, twice if configured
pub async fn dispose(driver: &SharedDriver, settings: StressSettings) -> DeviceResult<()> {
    let first = driver.dispose().await;
    if settings.dispose_twice {
        debug!(address = %driver.address(), "Stress dispose (extra)");
        driver.dispose().await?;
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use wearbridge_devices::device::DeviceFamily;
    use wearbridge_devices::driver::{DriverContext, RadioAdapter};
    use wearbridge_devices::drivers::test::TestBench;
    use wearbridge_devices::prefs::MemoryPreferences;

    fn driver(bench: &Arc<TestBench>) -> SharedDriver {
        let (tx, _rx) = mpsc::unbounded_channel();
        let context = DriverContext::new(
            Address::new("test"),
            DeviceFamily::Test,
            Arc::new(RadioAdapter::new(true, true)),
            Arc::new(MemoryPreferences::new()),
            tx,
        );
        (bench.constructor())(context).unwrap()
    }

    #[test]
    fn test_settings_need_debug_mode() {
        let address = Address::new("test");
        let prefs = MemoryPreferences::new()
            .with_device(&address, keys::STRESS_CONNECT_COUNT, 3)
            .with_device(&address, keys::STRESS_DISPOSE, true);

        assert_eq!(StressSettings::from_prefs(&prefs, &address, false), StressSettings::default());
        let settings = StressSettings::from_prefs(&prefs, &address, true);
        assert_eq!(settings.extra_connects, 3);
        assert!(settings.dispose_twice);
        assert!(!settings.parallel);
    }

    #[tokio::test]
    async fn test_serial_connects() {
        let bench = TestBench::new();
        let driver = driver(&bench);
        let settings = StressSettings {
            extra_connects: 2,
            ..StressSettings::default()
        };
        assert!(connect(&driver, settings).await.unwrap());
        assert_eq!(bench.connect_count(&Address::new("test")), 3);
    }

    #[tokio::test]
    async fn test_aborted_attempt_is_a_failure() {
        let joined = tokio::spawn(async {
            let blow_up = true;
            if blow_up {
                panic!("driver blew up");
            }
            Ok::<bool, DeviceError>(true)
        })
        .await;
        let result = attempt_result(joined);
        assert!(matches!(result, Err(DeviceError::Transport(msg)) if msg.contains("aborted")));

        assert!(attempt_result(Ok(Ok(true))).unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallel_connects() {
        let bench = TestBench::new();
        let driver = driver(&bench);
        let settings = StressSettings {
            extra_connects: 4,
            parallel: true,
            dispose_twice: true,
        };
        assert!(connect(&driver, settings).await.unwrap());
        assert_eq!(bench.connect_count(&Address::new("test")), 5);

        dispose(&driver, settings).await.unwrap();
        assert_eq!(bench.dispose_count(&Address::new("test")), 2);
    }
}
