// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The peripheral base (C6): port-mode state, subscription lifecycle,
//! the single-slot drop-newest inbound queue and its worker, and the
//! output-command helpers every C7 variant builds on.

pub mod button;
pub mod duplo;
pub mod led;
pub mod motor;
pub mod technic;
pub mod tilt;
pub mod vision;
pub mod voltage_current;

use crate::error::{Error, OptionContext, Result};
use crate::message::{
    InformationType, Message, ModeInformationType, PortCapabilities, PortInfoRequest, PortInfoValue,
    PortInputFormatSetupSingle, PortModeInfoRequest, PortModeInfoValue, PortOutputCommand, PortValueSingle,
    ValueFormat, CompletionInfo,
};
use crate::session::WeakSession;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

pub const WRITE_DIRECT: u8 = crate::message::WRITE_DIRECT;
pub const WRITE_DIRECT_MODE_DATA: u8 = crate::message::WRITE_DIRECT_MODE_DATA;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortModeState {
    pub mode: u8,
    pub delta: u32,
    pub enabled: bool,
}

pub type SubscriberId = u64;
type Callback = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Shared machinery behind every device-specific peripheral: the C7
/// variants hold one of these and build typed `subscribe`/command
/// methods atop `subscribe_raw`/`send_output`/`read_raw`.
pub struct PeripheralCore {
    pub port_id: u8,
    pub virtual_composing: Option<(u8, u8)>,
    session: WeakSession,
    mode: Mutex<Option<PortModeState>>,
    subscribers: Mutex<Vec<(SubscriberId, Callback)>>,
    next_subscriber_id: AtomicU64,
    slot: Mutex<Option<Vec<u8>>>,
    notify: Notify,
}

impl PeripheralCore {
    pub fn new(port_id: u8, session: WeakSession, virtual_composing: Option<(u8, u8)>) -> Arc<Self> {
        let core = Arc::new(Self {
            port_id,
            virtual_composing,
            session,
            mode: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: AtomicU64::new(0),
            slot: Mutex::new(None),
            notify: Notify::new(),
        });
        core.clone().spawn_worker();
        core
    }

    fn spawn_worker(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                self.notify.notified().await;
                let item = self.slot.lock().await.take();
                let Some(bytes) = item else { continue };
                let subs = self.subscribers.lock().await.clone();
                for (_, cb) in subs {
                    let bytes = bytes.clone();
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(&bytes))).is_err() {
                        log::warn!("subscriber callback panicked on port {:#04x}", self.port_id);
                    }
                }
            }
        });
    }

    /// Called from the notify path (C4/C5) with a freshly-arrived port
    /// value. Drops the newest value on overflow rather than blocking
    /// the notify thread (§4.6, §5 backpressure).
    pub async fn push(&self, bytes: Vec<u8>) {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            log::warn!("port {:#04x} queue full, dropping newest value", self.port_id);
            return;
        }
        *slot = Some(bytes);
        self.notify.notify_one();
    }

    pub async fn subscribe_raw(&self, mode: u8, delta: u32, cb: Callback) -> Result<SubscriberId> {
        {
            let subs = self.subscribers.lock().await;
            let current = self.mode.lock().await;
            if !subs.is_empty() {
                if let Some(state) = current.as_ref() {
                    if state.mode != mode {
                        return Err(Error::InvalidState(format!(
                            "port {:#04x} already subscribed in mode {}, cannot subscribe in mode {mode}",
                            self.port_id, state.mode
                        )));
                    }
                }
            }
        }
        self.set_port_mode(mode, true, delta).await?;
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().await.push((id, cb));
        Ok(id)
    }

    pub async fn unsubscribe(&self, id: Option<SubscriberId>) -> Result<()> {
        let mut subs = self.subscribers.lock().await;
        match id {
            Some(id) => subs.retain(|(sid, _)| *sid != id),
            None => subs.clear(),
        }
        let empty = subs.is_empty();
        drop(subs);
        if empty {
            if let Some(state) = *self.mode.lock().await {
                self.set_port_mode(state.mode, false, state.delta).await?;
            }
        }
        Ok(())
    }

    /// No-op if `(mode, enabled, delta)` already matches the cache;
    /// otherwise sends `PortInputFormatSetupSingle` and waits for the ack
    /// to update the cache (§4.6).
    pub async fn set_port_mode(&self, mode: u8, enabled: bool, delta: u32) -> Result<()> {
        {
            let current = self.mode.lock().await;
            if let Some(state) = *current {
                if state.mode == mode && state.enabled == enabled && state.delta == delta {
                    return Ok(());
                }
            }
        }
        let request = Message::PortInputFormatSetupSingle(PortInputFormatSetupSingle {
            port_id: self.port_id,
            mode,
            delta,
            notification_enabled: enabled,
        });
        let reply = self.session.send(request).await?;
        let ack = match reply {
            Some(Message::PortInputFormatSingle(ack)) => ack,
            Some(Message::PortInputFormatSetupSingle(ack)) => ack,
            _ => {
                return Err(Error::InvalidState(format!(
                    "no PortInputFormatSingle ack for port {:#04x}",
                    self.port_id
                )))
            }
        };
        *self.mode.lock().await =
            Some(PortModeState { mode: ack.mode, delta: ack.delta, enabled: ack.notification_enabled });
        Ok(())
    }

    pub async fn current_mode(&self) -> Option<PortModeState> {
        *self.mode.lock().await
    }

    fn output_subcommand(&self, subcommand: u8) -> u8 {
        if self.virtual_composing.is_some() {
            subcommand + 1
        } else {
            subcommand
        }
    }

    /// Compose and send a raw PortOutput subcommand, offsetting the
    /// opcode by +1 for virtual (grouped) ports (§4.6, §4.7).
    pub async fn send_cmd(&self, subcommand: u8, params: Vec<u8>) -> Result<()> {
        let cmd = PortOutputCommand::new(
            self.port_id,
            CompletionInfo::CommandFeedback,
            self.output_subcommand(subcommand),
            params,
        );
        self.session.send(Message::PortOutput(cmd)).await?;
        Ok(())
    }

    /// Switch into `mode` (preserving whatever update/delta setting is
    /// already cached, defaulting to disabled+1) before writing, exactly
    /// as the reference implementation's `set_port_mode`-then-write
    /// sequence does (§4.6, §4.7 scenario 1).
    pub async fn write_direct_mode(&self, mode: u8, params: &[u8]) -> Result<()> {
        let (enabled, delta) = self.current_mode().await.map(|s| (s.enabled, s.delta)).unwrap_or((false, 1));
        self.set_port_mode(mode, enabled, delta).await?;
        let mut payload = vec![mode];
        payload.extend_from_slice(params);
        self.send_cmd(WRITE_DIRECT_MODE_DATA, payload).await
    }

    /// One-shot read: optionally set the mode, then request the current
    /// port value (§4.6).
    pub async fn read_raw(&self, mode: Option<u8>) -> Result<Vec<u8>> {
        if let Some(mode) = mode {
            let delta = self.mode.lock().await.map(|s| s.delta).unwrap_or(1);
            let enabled = self.mode.lock().await.map(|s| s.enabled).unwrap_or(false);
            self.set_port_mode(mode, enabled, delta).await?;
        }
        let request = Message::PortInfoRequest(PortInfoRequest {
            port_id: self.port_id,
            information_type: InformationType::PortValue,
        });
        match self.session.send(request).await? {
            Some(Message::PortValueSingle(PortValueSingle { payload, .. })) => Ok(payload),
            _ => Err(Error::InvalidState(format!("no port value reply for port {:#04x}", self.port_id))),
        }
    }

    /// Query MODE_INFO, MODE_COMBINATIONS (if the port reports itself
    /// combinable) and every `PortModeInfoRequest` sub-kind for every
    /// reported mode; a failure in any sub-kind but Name is tolerated
    /// (§4.6).
    pub async fn describe_possible_modes(&self) -> Result<PossibleModes> {
        let info = self
            .session
            .send(Message::PortInfoRequest(PortInfoRequest {
                port_id: self.port_id,
                information_type: InformationType::ModeInfo,
            }))
            .await?;
        let Some(Message::PortInfo(info)) = info else {
            return Err(Error::InvalidState("no PortInfo(ModeInfo) reply".into()));
        };
        let PortInfoValue::ModeInfo { capabilities, mode_count, .. } = info.value else {
            return Err(Error::InvalidState("unexpected PortInfo payload".into()));
        };

        let possible_combinations = if capabilities.contains(PortCapabilities::LOGICAL_COMBINABLE) {
            self.query_possible_combinations().await
        } else {
            None
        };

        let mut modes = Vec::new();
        for mode in 0..mode_count {
            let name = match self.query_mode_info(mode, ModeInformationType::Name).await {
                Ok(Some(PortModeInfoValue::Name(name))) => name,
                _ => continue, // Name failure aborts enumeration for this mode.
            };
            let units = self
                .mode_info_as(mode, ModeInformationType::Units, |v| match v {
                    PortModeInfoValue::Units(u) => Some(u),
                    _ => None,
                })
                .await;
            let raw_range = self
                .mode_info_as(mode, ModeInformationType::RawRange, |v| match v {
                    PortModeInfoValue::RawRange { min, max } => Some((min, max)),
                    _ => None,
                })
                .await;
            let pct_range = self
                .mode_info_as(mode, ModeInformationType::PctRange, |v| match v {
                    PortModeInfoValue::PctRange { min, max } => Some((min, max)),
                    _ => None,
                })
                .await;
            let si_range = self
                .mode_info_as(mode, ModeInformationType::SiRange, |v| match v {
                    PortModeInfoValue::SiRange { min, max } => Some((min, max)),
                    _ => None,
                })
                .await;
            let mapping = self
                .mode_info_as(mode, ModeInformationType::Mapping, |v| match v {
                    PortModeInfoValue::Mapping { input, output } => Some((input, output)),
                    _ => None,
                })
                .await;
            let motor_bias = self
                .mode_info_as(mode, ModeInformationType::MotorBias, |v| match v {
                    PortModeInfoValue::MotorBias(b) => Some(b),
                    _ => None,
                })
                .await;
            let capability_bits = self
                .mode_info_as(mode, ModeInformationType::CapabilityBits, |v| match v {
                    PortModeInfoValue::CapabilityBits(bits) => Some(bits),
                    _ => None,
                })
                .await;
            let used_internally = self
                .mode_info_as(mode, ModeInformationType::UsedInternally, |v| match v {
                    PortModeInfoValue::CapabilityBits(bits) => Some(bits),
                    _ => None,
                })
                .await;
            let value_format = self
                .mode_info_as(mode, ModeInformationType::ValueFormat, |v| match v {
                    PortModeInfoValue::ValueFormat(f) => Some(f),
                    _ => None,
                })
                .await;

            modes.push(ModeDescription {
                mode,
                name,
                units,
                raw_range,
                pct_range,
                si_range,
                mapping,
                motor_bias,
                capability_bits,
                used_internally,
                value_format,
            });
        }
        Ok(PossibleModes { possible_combinations, modes })
    }

    async fn query_possible_combinations(&self) -> Option<Vec<u16>> {
        let reply = self
            .session
            .send(Message::PortInfoRequest(PortInfoRequest {
                port_id: self.port_id,
                information_type: InformationType::PossibleModeCombinations,
            }))
            .await
            .ok()?;
        match reply {
            Some(Message::PortInfo(info)) => match info.value {
                PortInfoValue::PossibleModeCombinations(combos) => Some(combos),
                _ => None,
            },
            _ => None,
        }
    }

    async fn query_mode_info(
        &self,
        mode: u8,
        information_type: ModeInformationType,
    ) -> Result<Option<PortModeInfoValue>> {
        let reply = self
            .session
            .send(Message::PortModeInfoRequest(PortModeInfoRequest {
                port_id: self.port_id,
                mode,
                information_type,
            }))
            .await?;
        Ok(match reply {
            Some(Message::PortModeInfo(info)) => Some(info.value),
            _ => None,
        })
    }

    async fn mode_info_as<T>(
        &self,
        mode: u8,
        information_type: ModeInformationType,
        extract: impl Fn(PortModeInfoValue) -> Option<T>,
    ) -> Option<T> {
        self.query_mode_info(mode, information_type).await.ok().flatten().and_then(extract)
    }
}

/// The result of [`PeripheralCore::describe_possible_modes`]: every mode's
/// per-mode description, plus the port's possible logical-mode
/// combinations when `PortCapabilities::LOGICAL_COMBINABLE` is set.
#[derive(Clone, Debug, PartialEq)]
pub struct PossibleModes {
    pub possible_combinations: Option<Vec<u16>>,
    pub modes: Vec<ModeDescription>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModeDescription {
    pub mode: u8,
    pub name: String,
    pub units: Option<String>,
    pub raw_range: Option<(f32, f32)>,
    pub pct_range: Option<(f32, f32)>,
    pub si_range: Option<(f32, f32)>,
    pub mapping: Option<(u8, u8)>,
    pub motor_bias: Option<u8>,
    pub capability_bits: Option<Vec<u8>>,
    pub used_internally: Option<Vec<u8>>,
    pub value_format: Option<ValueFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_port_offsets_subcommand_opcode() {
        // Cannot construct a live PeripheralCore without a session in a
        // unit test; the opcode arithmetic itself is the thing worth
        // pinning down.
        let physical_offset = |virtual_composing: Option<(u8, u8)>, subcommand: u8| {
            if virtual_composing.is_some() { subcommand + 1 } else { subcommand }
        };
        assert_eq!(physical_offset(None, 0x07), 0x07);
        assert_eq!(physical_offset(Some((0, 1)), 0x07), 0x08);
    }
}
