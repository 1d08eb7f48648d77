/*!
 * Tokio runtime construction for Wearbridge processes.
 */
use tokio::runtime::{Builder as TokioRuntimeBuilder, Runtime as TokioRuntime};
use tracing::{error, info};

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

/// Build the multi-threaded runtime the service runs on.
///
/// A `worker_threads` of zero leaves the thread count to Tokio.
pub fn build(config: &RuntimeConfig, thread_name: &str) -> Result<TokioRuntime> {
    let mut builder = TokioRuntimeBuilder::new_multi_thread();
    if config.worker_threads > 0 {
        builder.worker_threads(config.worker_threads);
    }

    let runtime = builder
        .enable_all()
        .thread_name(thread_name)
        .build()
        .map_err(|e| Error::runtime(format!("Failed to create Tokio runtime: {}", e)))?;

    info!(
        worker_threads = config.worker_threads,
        "Created {} runtime", thread_name
    );
    Ok(runtime)
}

/// Wait for ctrl-c
pub async fn shutdown_signal() -> Result<()> {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received ctrl-c signal, shutting down");
            Ok(())
        }
        Err(err) => {
            error!("Failed to listen for ctrl-c: {}", err);
            Err(Error::runtime(format!("Failed to listen for ctrl-c: {}", err)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_fixed_threads() {
        let config = RuntimeConfig {
            worker_threads: 2,
            ..RuntimeConfig::default()
        };
        let runtime = build(&config, "wearbridge-test").unwrap();
        let value = runtime.block_on(async { tokio::spawn(async { 21 * 2 }).await.unwrap() });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_build_with_default_threads() {
        let runtime = build(&RuntimeConfig::default(), "wearbridge-test").unwrap();
        runtime.block_on(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        });
    }
}
