// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hub session (C4): identity caching, the synchronous request/reply
//! rendezvous, and notify-path dispatch to the attach registry, peripheral
//! queues, and any handlers a caller has registered.

use crate::consts::{DeviceType, HubType};
use crate::error::{Error, OptionContext, Result};
use crate::message::{
    HubAction as HubActionKind, HubActionMessage, HubPropertyReference, HubPropertyValue,
    HubPropertiesMessage, Message,
};
use crate::registry::{Peripheral, Registry};
use crate::transport::Transport;
use std::collections::HashMap;
use std::mem::Discriminant;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};

/// The LWP3 hub characteristic is the only write target; the transport's
/// `handle` parameter exists for trait generality but is unused here.
const HUB_HANDLE: u16 = 0;

/// Recommended synchronous-request timeout (§5).
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
/// `wait_for_devices` bound and poll interval (§4.5/§4.11).
pub const WAIT_FOR_DEVICES_BOUND: Duration = Duration::from_secs(10);
pub const WAIT_FOR_DEVICES_POLL: Duration = Duration::from_millis(100);

pub type HandlerFn = Box<dyn Fn(&Message) + Send + Sync>;

struct Pending {
    request: Message,
    reply_tx: oneshot::Sender<Result<Message>>,
}

/// Identity/telemetry cached at construction and kept fresh by the
/// built-in HubProperties handler (§4.4).
#[derive(Clone, Debug, Default)]
pub struct Identity {
    pub advertising_name: String,
    pub primary_mac: String,
    pub system_type_id: u8,
    pub manufacturer_name: String,
    pub fw_version: String,
    pub hw_version: String,
    pub rssi: i8,
    /// Battery level as reported by the BATTERY_VOLTAGE property; on
    /// real hubs this is already a 0-100 percentage, not raw millivolts.
    pub battery_percentage: u8,
}

struct SessionState {
    transport: Box<dyn Transport>,
    pending: Mutex<Option<Pending>>,
    handlers: Mutex<HashMap<Discriminant<Message>, Vec<HandlerFn>>>,
    identity: Mutex<Identity>,
    registry: Registry,
    disconnected: std::sync::atomic::AtomicBool,
}

/// A connected LWP3 hub. Cheaply clonable; all state lives behind an
/// `Arc`, matching the teacher's `HubMutex`-style shared-handle pattern.
#[derive(Clone)]
pub struct Hub {
    state: Arc<SessionState>,
}

impl Hub {
    /// Construct a session over an already-connected transport: installs
    /// the notify handler, enables notifications, then synchronously
    /// requests identity properties (§4.4).
    pub async fn connect(transport: Box<dyn Transport>) -> Result<Self> {
        let state = Arc::new(SessionState {
            transport,
            pending: Mutex::new(None),
            handlers: Mutex::new(HashMap::new()),
            identity: Mutex::new(Identity::default()),
            registry: Registry::new(),
            disconnected: std::sync::atomic::AtomicBool::new(false),
        });

        state.registry.bind_session(WeakSession(Arc::downgrade(&state)));

        let pump_state = state.clone();
        state.transport.set_notify_handler(Box::new(move |handle, bytes| {
            let state = pump_state.clone();
            tokio::spawn(async move {
                state.on_notification(handle, bytes).await;
            });
        }));
        state.transport.enable_notifications().await?;

        let hub = Self { state };
        hub.request_identity().await?;
        hub.enable_passive_updates().await?;
        Ok(hub)
    }

    async fn request_identity(&self) -> Result<()> {
        use HubPropertyReference::*;
        for reference in [
            AdvertisingName,
            PrimaryMacAddress,
            SystemTypeId,
            ManufacturerName,
            FwVersion,
            HwVersion,
        ] {
            let reply = self
                .send(Message::HubProperties(HubPropertiesMessage::request(reference)))
                .await?;
            if let Some(Message::HubProperties(p)) = reply {
                self.state.identity.lock().await.apply(p.value);
            }
        }
        Ok(())
    }

    async fn enable_passive_updates(&self) -> Result<()> {
        use HubPropertyReference::*;
        self.send_fire_and_forget(Message::HubProperties(HubPropertiesMessage::enable_updates(Rssi)))
            .await?;
        self.send_fire_and_forget(Message::HubProperties(HubPropertiesMessage::enable_updates(
            BatteryVoltage,
        )))
        .await
    }

    async fn send_fire_and_forget(&self, msg: Message) -> Result<()> {
        let bytes = msg.encode()?;
        self.state.transport.write(HUB_HANDLE, &bytes).await
    }

    /// Send a downstream message; if it needs a reply, blocks until the
    /// matching upstream frame arrives, a `GenericError` matches, or the
    /// request times out (§4.4, §5).
    pub async fn send(&self, msg: Message) -> Result<Option<Message>> {
        if self.state.disconnected.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(Error::PeerDisconnected);
        }
        if !msg.needs_reply() {
            self.send_fire_and_forget(msg).await?;
            return Ok(None);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.state.pending.lock().await;
            if pending.is_some() {
                return Err(Error::InvalidState(
                    "a synchronous request is already pending on this session".into(),
                ));
            }
            *pending = Some(Pending { request: msg.clone(), reply_tx: tx });
        }

        let bytes = msg.encode()?;
        self.state.transport.write(HUB_HANDLE, &bytes).await?;

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result.map(Some),
            Ok(Err(_)) => {
                self.state.pending.lock().await.take();
                Err(Error::PeerDisconnected)
            }
            Err(_) => {
                self.state.pending.lock().await.take();
                Err(Error::TimedOut(format!("no reply to {msg:?} within {REQUEST_TIMEOUT:?}")))
            }
        }
    }

    pub async fn add_message_handler(&self, sample: &Message, handler: HandlerFn) {
        let key = std::mem::discriminant(sample);
        self.state.handlers.lock().await.entry(key).or_default().push(handler);
    }

    pub async fn identity(&self) -> Identity {
        self.state.identity.lock().await.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.state.registry
    }

    /// Look up an attached peripheral by its hub-model symbolic port
    /// name, e.g. `"A"` or the dynamically-registered `"A+B"` (§6).
    pub fn get_device_by_port_name(&self, name: &str) -> Option<std::sync::Arc<Peripheral>> {
        let port = self.state.registry.port_by_name(name)?;
        self.state.registry.get(port)
    }

    pub fn get_devices_by_type(&self, device_type: DeviceType) -> Vec<std::sync::Arc<Peripheral>> {
        self.state.registry.get_by_device_type(device_type)
    }

    /// Confirms the transport connected to a hub model this driver
    /// actually recognises, rather than an unidentified LWP3 device.
    pub fn check_hub_type(&self) -> bool {
        self.state.transport.hub_type() != HubType::Unknown
    }

    /// A non-owning handle peripherals use to send commands back through
    /// this session without holding the session alive (§4.6, §4.7).
    pub(crate) fn weak(&self) -> WeakSession {
        WeakSession(Arc::downgrade(&self.state))
    }

    /// Block (polling every 100ms, up to 10s) until every internal port
    /// declared by the hub model has an attached peripheral (§4.5, §4.8).
    pub async fn wait_for_devices(&self, internal_ports: &[u8]) -> Result<()> {
        let deadline = tokio::time::Instant::now() + WAIT_FOR_DEVICES_BOUND;
        loop {
            if internal_ports.iter().all(|p| self.state.registry.has_port(*p)) {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                log::warn!("wait_for_devices timed out waiting for ports {internal_ports:?}");
                return Ok(());
            }
            tokio::time::sleep(WAIT_FOR_DEVICES_POLL).await;
        }
    }

    pub async fn report_status(&self) -> Result<()> {
        let identity = self.identity().await;
        log::info!(
            "{} ({}): fw {} hw {} battery {}%",
            identity.advertising_name,
            identity.primary_mac,
            identity.fw_version,
            identity.hw_version,
            identity.battery_percentage
        );
        Ok(())
    }

    pub async fn switch_off(&self) -> Result<()> {
        self.send(Message::HubAction(HubActionMessage { action: HubActionKind::SwitchOffHub }))
            .await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        use HubPropertyReference::*;
        self.send_fire_and_forget(Message::HubProperties(HubPropertiesMessage::disable_updates(Rssi)))
            .await?;
        self.send_fire_and_forget(Message::HubProperties(HubPropertiesMessage::disable_updates(
            BatteryVoltage,
        )))
        .await?;
        let _ = self
            .send(Message::HubAction(HubActionMessage { action: HubActionKind::Disconnect }))
            .await;
        self.state.disconnected.store(true, std::sync::atomic::Ordering::SeqCst);
        self.state.transport.disconnect().await
    }
}

/// A weak, clonable reference to a session, held by peripherals so they
/// can issue commands without creating a reference cycle through the
/// registry that owns them.
#[derive(Clone)]
pub(crate) struct WeakSession(Weak<SessionState>);

impl WeakSession {
    pub(crate) async fn send(&self, msg: Message) -> Result<Option<Message>> {
        let state = self.0.upgrade().context("session has been dropped")?;
        Hub { state }.send(msg).await
    }
}

impl Identity {
    fn apply(&mut self, value: HubPropertyValue) {
        use HubPropertyValue::*;
        match value {
            AdvertisingName(name) => self.advertising_name = name,
            PrimaryMacAddress(mac) => self.primary_mac = mac,
            SystemTypeId(id) => self.system_type_id = id,
            ManufacturerName(name) => self.manufacturer_name = name,
            FwVersion(v) => self.fw_version = v,
            HwVersion(v) => self.hw_version = v,
            Rssi(v) => self.rssi = v,
            BatteryVoltage(v) => self.battery_percentage = v,
            _ => {}
        }
    }
}

impl SessionState {
    async fn on_notification(self: Arc<Self>, _handle: u16, bytes: Vec<u8>) {
        let msg = match Message::decode(&bytes) {
            Ok(m) => m,
            Err(e) => {
                log::error!("dropping undecodable frame: {e}");
                return;
            }
        };
        log::trace!("received {msg:?}");
        self.deliver_reply_if_pending(&msg).await;
        self.run_builtin_handlers(&msg).await;
        self.run_registered_handlers(&msg).await;
    }

    async fn deliver_reply_if_pending(&self, msg: &Message) {
        let mut pending_guard = self.pending.lock().await;
        let is_generic_error = matches!(msg, Message::GenericError(_));
        let matches = pending_guard
            .as_ref()
            .map(|p| p.request.is_reply(msg) || is_generic_error)
            .unwrap_or(false);
        if !matches {
            return;
        }
        let pending = pending_guard.take().unwrap();
        drop(pending_guard);
        let result = if let Message::GenericError(e) = msg {
            log::error!("{e}");
            Err(Error::PeerError { cmd: e.command, code: e.code as u8, text: e.to_string() })
        } else {
            Ok(msg.clone())
        };
        let _ = pending.reply_tx.send(result);
    }

    async fn run_builtin_handlers(&self, msg: &Message) {
        match msg {
            Message::HubAttachedIo(event) => {
                self.registry.handle_attach_event(event.clone());
            }
            Message::PortValueSingle(v) => {
                self.registry.forward_single(v.port_id, &v.payload).await;
            }
            Message::PortValueCombined(v) => {
                self.registry.forward_combined(v.port_id, &v.data).await;
            }
            Message::HubAction(HubActionMessage { action }) => {
                if matches!(action, HubActionKind::HubWillSwitchOff | HubActionKind::HubWillDisconnect) {
                    log::warn!("peer is going away ({action:?})");
                    self.disconnected.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            }
            Message::HubProperties(p) => {
                self.identity.lock().await.apply(p.value.clone());
            }
            _ => {}
        }
    }

    async fn run_registered_handlers(&self, msg: &Message) {
        let key = std::mem::discriminant(msg);
        let handlers = self.handlers.lock().await;
        if let Some(hs) = handlers.get(&key) {
            for h in hs {
                h(msg);
            }
        }
    }
}
