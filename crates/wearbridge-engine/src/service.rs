/*!
 * The service actor.
 *
 * [`spawn`] moves a [`Dispatcher`] onto its own task and returns a cloneable
 * [`ServiceHandle`]. The task serialises three inputs: messages from handles,
 * events reported by drivers, and the deadline of the next deferred task.
 */
use std::future::pending;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use wearbridge_core::types::Address;
use wearbridge_devices::device::DeviceHandle;
use wearbridge_devices::driver::DriverEvent;

use crate::command::Envelope;
use crate::dispatcher::{DispatchOutcome, Dispatcher, ServiceNotice};
use crate::error::{Error, Result};
use crate::subscription::SubscriptionFamily;

/// Messages accepted by the service loop
#[derive(Debug)]
enum ServiceMessage {
    Dispatch(Envelope, Option<oneshot::Sender<DispatchOutcome>>),
    Sighted { address: Address, rssi: i32 },
    Register(DeviceHandle, oneshot::Sender<bool>),
    Update(DeviceHandle, oneshot::Sender<Result<()>>),
    Remove(Address, oneshot::Sender<bool>),
    Devices(oneshot::Sender<Vec<DeviceHandle>>),
    Subscriptions(oneshot::Sender<Vec<SubscriptionFamily>>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle to a running service
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    inbox: mpsc::Sender<ServiceMessage>,
    notices: broadcast::Sender<ServiceNotice>,
}

impl ServiceHandle {
    async fn request<T>(&self, message: ServiceMessage, reply: oneshot::Receiver<T>) -> Result<T> {
        self.inbox.send(message).await?;
        Ok(reply.await?)
    }

    /// Dispatch an envelope and wait for the outcome
    pub async fn dispatch(&self, envelope: Envelope) -> Result<DispatchOutcome> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Dispatch(envelope, Some(tx)), rx).await
    }

    /// Queue an envelope without waiting for it
    pub async fn post(&self, envelope: Envelope) -> Result<()> {
        self.inbox.send(ServiceMessage::Dispatch(envelope, None)).await?;
        Ok(())
    }

    /// Report a passive scan sighting
    pub async fn sighted(&self, address: Address, rssi: i32) -> Result<()> {
        self.inbox.send(ServiceMessage::Sighted { address, rssi }).await?;
        Ok(())
    }

    /// Register a device; false if it was already known
    pub async fn register_device(&self, device: DeviceHandle) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Register(device, tx), rx).await
    }

    /// Replace a device's family and alias
    pub async fn update_device(&self, device: DeviceHandle) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Update(device, tx), rx).await?
    }

    /// Remove a device; false if it was unknown
    pub async fn remove_device(&self, address: Address) -> Result<bool> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Remove(address, tx), rx).await
    }

    /// Snapshot of every registered device
    pub async fn devices(&self) -> Result<Vec<DeviceHandle>> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Devices(tx), rx).await
    }

    /// Currently active subscription families
    pub async fn active_subscriptions(&self) -> Result<Vec<SubscriptionFamily>> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Subscriptions(tx), rx).await
    }

    /// Subscribe to service notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<ServiceNotice> {
        self.notices.subscribe()
    }

    /// Stop the service and wait until every driver is disposed
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(ServiceMessage::Shutdown(tx), rx).await
    }
}

/// Start the service loop on the current runtime
pub fn spawn(mut dispatcher: Dispatcher, mailbox_capacity: usize) -> Result<(ServiceHandle, JoinHandle<()>)> {
    let driver_events = dispatcher
        .take_driver_events()
        .ok_or_else(|| Error::other("driver event receiver already taken"))?;
    let (inbox_tx, inbox) = mpsc::channel(mailbox_capacity.max(1));
    let handle = ServiceHandle {
        inbox: inbox_tx,
        notices: dispatcher.notice_sender(),
    };

    let actor = ServiceActor {
        dispatcher,
        inbox,
        driver_events,
    };
    Ok((handle, tokio::spawn(actor.run())))
}

enum Step {
    Message(ServiceMessage),
    Driver(DriverEvent),
    Timer,
    Closed,
}

struct ServiceActor {
    dispatcher: Dispatcher,
    inbox: mpsc::Receiver<ServiceMessage>,
    driver_events: mpsc::UnboundedReceiver<DriverEvent>,
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

impl ServiceActor {
    async fn run(mut self) {
        self.dispatcher.start().await;

        loop {
            let deadline = self.dispatcher.next_deadline();
            let step = tokio::select! {
                message = self.inbox.recv() => match message {
                    Some(message) => Step::Message(message),
                    None => Step::Closed,
                },
                Some(event) = self.driver_events.recv() => Step::Driver(event),
                _ = wait_until(deadline) => Step::Timer,
            };

            match step {
                Step::Message(message) => {
                    if !self.handle_message(message).await {
                        info!("Service stopped");
                        return;
                    }
                }
                Step::Driver(event) => self.dispatcher.handle_driver_event(event).await,
                Step::Timer => {
                    let ran = self.dispatcher.run_due(Instant::now()).await;
                    debug!(ran, "Deferred tasks ran");
                }
                Step::Closed => {
                    info!("All service handles dropped");
                    self.dispatcher.stop().await;
                    return;
                }
            }
        }
    }

    // Returns false once the loop should end. Reply send failures mean the
    // caller stopped waiting.
    async fn handle_message(&mut self, message: ServiceMessage) -> bool {
        match message {
            ServiceMessage::Dispatch(envelope, reply) => {
                let outcome = self.dispatcher.dispatch(envelope).await;
                if let Some(reply) = reply {
                    let _ = reply.send(outcome);
                }
            }
            ServiceMessage::Sighted { address, rssi } => {
                self.dispatcher.on_sighting(&address, rssi, Instant::now()).await;
            }
            ServiceMessage::Register(device, reply) => {
                let _ = reply.send(self.dispatcher.register_device(device).await);
            }
            ServiceMessage::Update(device, reply) => {
                let _ = reply.send(self.dispatcher.update_device(device).await);
            }
            ServiceMessage::Remove(address, reply) => {
                let _ = reply.send(self.dispatcher.remove_device(&address).await);
            }
            ServiceMessage::Devices(reply) => {
                let devices = self
                    .dispatcher
                    .registry()
                    .entries()
                    .map(|entry| entry.device().clone())
                    .collect();
                let _ = reply.send(devices);
            }
            ServiceMessage::Subscriptions(reply) => {
                let active = self.dispatcher.subscriptions().active().iter().cloned().collect();
                let _ = reply.send(active);
            }
            ServiceMessage::Shutdown(ack) => {
                self.dispatcher.stop().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }
}
