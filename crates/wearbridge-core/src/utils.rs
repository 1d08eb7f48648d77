/*!
 * Async helpers shared by the Wearbridge crates.
 */
use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Run a fallible future with a timeout
///
/// # Arguments
///
/// * `duration` - The timeout duration
/// * `future` - The future to run
///
/// # Returns
///
/// The result of the future, or a timeout error if the timeout is reached
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: std::fmt::Display,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::other(e.to_string())),
        Err(_) => Err(Error::timeout(format!("Operation timed out after {:?}", duration))),
    }
}

/// Spawn a task that logs its outcome instead of returning it
///
/// # Arguments
///
/// * `name` - A name for the task (for logging)
/// * `fut` - The future to run
pub fn spawn_and_log<F, T, E>(name: &str, fut: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = std::result::Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let task_name = name.to_string();
    tokio::spawn(async move {
        match fut.await {
            Ok(_) => debug!("Task '{}' completed successfully", task_name),
            Err(e) => warn!("Task '{}' failed: {}", task_name, e),
        }
    })
}

/// Convert milliseconds to a Duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(Duration::from_secs(1), async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_inner_error() {
        let result =
            with_timeout(Duration::from_secs(1), async { Err::<u8, _>("link lost") }).await;
        assert!(matches!(result, Err(Error::Other(msg)) if msg == "link lost"));
    }

    #[tokio::test]
    async fn test_with_timeout_failure() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, Error>(42)
        })
        .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_spawn_and_log_completes() {
        let handle = spawn_and_log("failing", async { Err::<(), _>("boom") });
        assert!(handle.await.is_ok());
    }

    #[test]
    fn test_with_timeout_outside_a_runtime() {
        let result = tokio_test::block_on(with_timeout(Duration::from_secs(1), async {
            Ok::<_, Error>("ready")
        }));
        assert_eq!(result.unwrap(), "ready");
    }

    #[test]
    fn test_millis_to_duration() {
        assert_eq!(millis_to_duration(1234), Duration::from_millis(1234));
    }
}
