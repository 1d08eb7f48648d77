/*!
 * Network companion driver.
 *
 * Talks newline-delimited JSON to a companion reachable at `host:port`.
 * Every outgoing frame is an object tagged by `type`; incoming `battery` and
 * `info` frames become driver events, anything else is ignored.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use wearbridge_core::utils::{spawn_and_log, with_timeout};

use crate::device::{BatteryState, ConnectionState};
use crate::driver::{Driver, DriverBase, DriverContext, DriverEvent};
use crate::error::{DeviceError, Result};
use crate::model::{CallSpec, MusicSpec, MusicStateSpec, NotificationSpec, WeatherSpec};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outgoing<'a> {
    Hello { version: &'static str },
    Notification(&'a NotificationSpec),
    DeleteNotification { id: i32 },
    SetTime { now: DateTime<Utc> },
    CallState(&'a CallSpec),
    MusicInfo(&'a MusicSpec),
    MusicState(&'a MusicStateSpec),
    Weather { entries: &'a [WeatherSpec] },
    FindDevice { start: bool },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Incoming {
    Battery {
        #[serde(default)]
        level: Option<u8>,
        #[serde(default)]
        state: Option<BatteryState>,
    },
    Info {
        #[serde(default)]
        firmware: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug)]
struct Link {
    base: DriverBase,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    disposed: AtomicBool,
}

impl Link {
    // Dial, greet, then read until the companion hangs up.
    async fn run(self: Arc<Self>) -> Result<()> {
        let address = self.base.address().clone();
        let stream = match with_timeout(CONNECT_TIMEOUT, TcpStream::connect(address.as_str())).await {
            Ok(stream) => stream,
            Err(e) => {
                self.base.set_state(ConnectionState::NotConnected);
                return Err(DeviceError::transport(format!("{}: {}", address, e)));
            }
        };
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let (reader, writer) = stream.into_split();
        *self.writer.lock().await = Some(writer);
        self.base.set_state(ConnectionState::Connected);

        let hello = Outgoing::Hello {
            version: crate::VERSION,
        };
        if let Err(e) = self.send(&hello).await {
            self.writer.lock().await.take();
            self.base.set_state(self.base.state_after_link_loss());
            return Err(e);
        }
        self.base.set_state(ConnectionState::Initialized);
        debug!(address = %address, "Companion link ready");

        self.read_loop(reader).await
    }

    async fn read_loop(&self, reader: OwnedReadHalf) -> Result<()> {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!(address = %self.base.address(), "Read failed: {}", e);
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Incoming>(line) {
                Ok(frame) => self.handle(frame),
                Err(e) => warn!(address = %self.base.address(), "Malformed frame: {}", e),
            }
        }

        if !self.disposed.load(Ordering::SeqCst) {
            info!(address = %self.base.address(), "Companion closed the connection");
            self.writer.lock().await.take();
            self.base.set_state(self.base.state_after_link_loss());
        }
        Ok(())
    }

    fn handle(&self, frame: Incoming) {
        let address = self.base.address().clone();
        match frame {
            Incoming::Battery { level, state } => {
                self.base
                    .context()
                    .emit(DriverEvent::Battery { address, level, state });
            }
            Incoming::Info { firmware, model } => {
                self.base
                    .context()
                    .emit(DriverEvent::Info { address, firmware, model });
            }
            Incoming::Unknown => trace!(address = %address, "Ignoring frame"),
        }
    }

    async fn send(&self, frame: &Outgoing<'_>) -> Result<()> {
        let mut line = serde_json::to_string(frame)?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| DeviceError::NotConnected(self.base.address().clone()))?;
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        Ok(())
    }
}

/// Driver for a companion app reachable over TCP.
///
/// `connect` only starts the link task; dialing, the handshake and every
/// later state change are reported through the driver context.
#[derive(Debug)]
pub struct TcpDriver {
    link: Arc<Link>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpDriver {
    /// Create a driver; the address must be `host:port`
    pub fn new(context: DriverContext) -> Self {
        Self {
            link: Arc::new(Link {
                base: DriverBase::new(context),
                writer: tokio::sync::Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    fn link_task_running(&self) -> bool {
        self.task
            .lock()
            .map(|slot| slot.as_ref().map(|h| !h.is_finished()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn stop_link_task(&self) {
        if let Ok(mut slot) = self.task.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl Driver for TcpDriver {
    fn base(&self) -> &DriverBase {
        &self.link.base
    }

    async fn connect(&self) -> Result<bool> {
        if self.link.disposed.load(Ordering::SeqCst) || self.is_connected() || self.link_task_running() {
            return Ok(false);
        }

        let address = self.address().clone();
        self.link.base.set_state(ConnectionState::Connecting);
        let handle = spawn_and_log(&format!("tcp-link {}", address), Arc::clone(&self.link).run());
        if let Ok(mut slot) = self.task.lock() {
            if let Some(stale) = slot.replace(handle) {
                stale.abort();
            }
        }
        Ok(true)
    }

    async fn dispose(&self) -> Result<()> {
        self.link.disposed.store(true, Ordering::SeqCst);
        self.stop_link_task();
        if let Some(mut writer) = self.link.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!(address = %self.address(), "Shutdown failed: {}", e);
            }
        }
        self.link.base.clear();
        Ok(())
    }

    async fn on_notification(&self, spec: &NotificationSpec) -> Result<()> {
        self.link.send(&Outgoing::Notification(spec)).await
    }

    async fn on_delete_notification(&self, id: i32) -> Result<()> {
        self.link.send(&Outgoing::DeleteNotification { id }).await
    }

    async fn on_set_time(&self) -> Result<()> {
        self.link.send(&Outgoing::SetTime { now: Utc::now() }).await
    }

    async fn on_set_call_state(&self, spec: &CallSpec) -> Result<()> {
        self.link.send(&Outgoing::CallState(spec)).await
    }

    async fn on_set_music_info(&self, spec: &MusicSpec) -> Result<()> {
        self.link.send(&Outgoing::MusicInfo(spec)).await
    }

    async fn on_set_music_state(&self, spec: &MusicStateSpec) -> Result<()> {
        self.link.send(&Outgoing::MusicState(spec)).await
    }

    async fn on_send_weather(&self, weather: &[WeatherSpec]) -> Result<()> {
        self.link.send(&Outgoing::Weather { entries: weather }).await
    }

    async fn on_find_device(&self, start: bool) -> Result<()> {
        self.link.send(&Outgoing::FindDevice { start }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceFamily;
    use crate::driver::RadioAdapter;
    use crate::prefs::MemoryPreferences;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use wearbridge_core::types::Address;

    async fn listener() -> (TcpListener, Address) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = Address::new(listener.local_addr().unwrap().to_string());
        (listener, address)
    }

    fn driver(address: &Address) -> (TcpDriver, mpsc::UnboundedReceiver<DriverEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = DriverContext::new(
            address.clone(),
            DeviceFamily::NetworkCompanion,
            Arc::new(RadioAdapter::new(false, false)),
            Arc::new(MemoryPreferences::new()),
            tx,
        );
        (TcpDriver::new(context), rx)
    }

    async fn next_state(rx: &mut mpsc::UnboundedReceiver<DriverEvent>) -> ConnectionState {
        loop {
            match rx.recv().await {
                Some(DriverEvent::StateChanged { state, .. }) => return state,
                Some(_) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_connect_send_and_receive() {
        let (listener, address) = listener().await;
        let (driver, mut rx) = driver(&address);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read, mut write) = socket.into_split();
            let mut lines = BufReader::new(read).lines();
            let hello = lines.next_line().await.unwrap().unwrap();
            write
                .write_all(b"{\"type\":\"battery\",\"level\":42,\"state\":\"charging\"}\n{\"type\":\"vendor_blob\"}\n")
                .await
                .unwrap();
            let notification = lines.next_line().await.unwrap().unwrap();
            (hello, notification)
        });

        assert!(driver.connect().await.unwrap());
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Connected);
        assert_eq!(next_state(&mut rx).await, ConnectionState::Initialized);
        assert!(driver.is_initialized());

        assert_eq!(
            rx.recv().await,
            Some(DriverEvent::Battery {
                address: address.clone(),
                level: Some(42),
                state: Some(BatteryState::Charging),
            })
        );

        driver
            .on_notification(&NotificationSpec::new("Hi", "there").with_id(7))
            .await
            .unwrap();

        let (hello, notification) = server.await.unwrap();
        assert!(hello.contains("\"type\":\"hello\""));
        let value: serde_json::Value = serde_json::from_str(&notification).unwrap();
        assert_eq!(value["type"], "notification");
        assert_eq!(value["title"], "Hi");
        assert_eq!(value["id"], 7);

        driver.dispose().await.unwrap();
        driver.dispose().await.unwrap();
        assert!(!driver.is_connected());
        assert!(!driver.connect().await.unwrap());
    }

    #[tokio::test]
    async fn test_link_loss_reports_reconnect_state() {
        let (listener, address) = listener().await;
        let (driver, mut rx) = driver(&address);
        driver.set_auto_reconnect(true);

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            drop(socket);
        });

        driver.connect().await.ok();
        server.await.unwrap();

        let mut last = next_state(&mut rx).await;
        while last != ConnectionState::WaitingForReconnect {
            last = next_state(&mut rx).await;
        }
    }

    #[tokio::test]
    async fn test_connect_returns_before_dialing() {
        let (listener, address) = listener().await;
        drop(listener);
        let (driver, mut rx) = driver(&address);

        assert!(driver.connect().await.unwrap());
        assert!(!driver.is_connected());
        assert!(!driver.connect().await.unwrap());

        assert_eq!(next_state(&mut rx).await, ConnectionState::Connecting);
        assert_eq!(next_state(&mut rx).await, ConnectionState::NotConnected);
    }

    #[tokio::test]
    async fn test_send_without_link_fails() {
        let (_listener, address) = listener().await;
        let (driver, _rx) = driver(&address);
        let result = driver.on_delete_notification(1).await;
        assert!(matches!(result, Err(DeviceError::NotConnected(_))));
    }
}
