// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The LWP3 binary message codec (C2): frame header encoding/decoding and
//! the closed, tagged [`Message`] set keyed by the LWP3 type byte.
//!
//! Decoders are pure functions over a byte slice; encoders build a body
//! then hand it to [`encode_frame`] to prepend the header. This module
//! knows nothing about transports, sessions, or peripherals.

use crate::bytes;
use crate::error::{Error, OptionContext, Result};
use crate::macros::{next, next_i16, next_u16, next_u32, ok};
use lwp3_macros::Parse;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use std::time::Instant;

/// Maximum frame length (header + hub id + type + body) the two-byte
/// length encoding can represent: `255 + (255 - 1)`.
pub const MAX_FRAME_LEN: usize = 509;

fn decode_length(data: &[u8]) -> Result<(usize, usize)> {
    let first = *data.first().context("empty frame")?;
    if first <= 0x7f {
        Ok((first as usize, 1))
    } else {
        let second = *data.get(1).context("truncated two-byte length header")?;
        Ok((first as usize + second as usize - 1, 2))
    }
}

fn encode_length(len: usize) -> Vec<u8> {
    if len <= 0x7f {
        vec![len as u8]
    } else {
        let first = len.min(255) as u8;
        let second = (len.saturating_sub(255) + 1) as u8;
        vec![first, second]
    }
}

/// Prepend the LWP3 header (length, hub id `0`, message type) to `payload`.
pub fn encode_frame(message_type: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let body_len = 2 + payload.len(); // hub id + type byte
    let total_with_short_header = body_len + 1;
    let header = if total_with_short_header <= 0x7f {
        vec![total_with_short_header as u8]
    } else {
        let total = body_len + 2;
        if total > MAX_FRAME_LEN {
            return Err(Error::InvalidFrame(format!(
                "frame of {total} bytes exceeds the {MAX_FRAME_LEN}-byte limit"
            )));
        }
        encode_length(total)
    };
    let mut frame = header;
    frame.push(0); // hub id, always 0
    frame.push(message_type);
    frame.extend_from_slice(payload);
    Ok(frame)
}

fn decode_frame(data: &[u8]) -> Result<(u8, &[u8])> {
    let (len, header_len) = decode_length(data)?;
    let frame = data
        .get(..len)
        .ok_or_else(|| Error::InvalidFrame(format!(
            "declared length {len} exceeds buffer of {}",
            data.len()
        )))?;
    let hub_id = *frame.get(header_len).context("missing hub id byte")?;
    if hub_id != 0 {
        return Err(Error::InvalidFrame(format!("non-zero hub id {hub_id}")));
    }
    let message_type = *frame.get(header_len + 1).context("missing type byte")?;
    Ok((message_type, &frame[header_len + 2..]))
}

macro_rules! kind_byte {
    (HubProperties) => { 0x01 };
    (HubAction) => { 0x02 };
    (HubAlert) => { 0x03 };
    (HubAttachedIo) => { 0x04 };
    (GenericError) => { 0x05 };
    (PortInfoRequest) => { 0x21 };
    (PortModeInfoRequest) => { 0x22 };
    (PortInputFormatSetupSingle) => { 0x41 };
    (PortInputFormatSetupCombined) => { 0x42 };
    (PortInfo) => { 0x43 };
    (PortModeInfo) => { 0x44 };
    (PortValueSingle) => { 0x45 };
    (PortValueCombined) => { 0x46 };
    (PortInputFormatSingle) => { 0x47 };
    (PortInputFormatCombined) => { 0x48 };
    (VirtualPortSetup) => { 0x61 };
    (PortOutput) => { 0x81 };
    (PortOutputFeedback) => { 0x82 };
}

/// Every message carries the monotonic instant it was decoded at (§4.2).
#[derive(Clone, Debug)]
pub struct Timestamped<T> {
    pub value: T,
    pub decoded_at: Instant,
}

/// The closed, tagged set of LWP3 message kinds this driver understands.
/// Message families outside this set (firmware-update bootloader
/// commands, the HW network/ESP command family) are not represented:
/// they belong to adjacent LWP3 subsystems, not the hub driver.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    HubProperties(HubPropertiesMessage),
    HubAction(HubActionMessage),
    HubAlert(HubAlertMessage),
    HubAttachedIo(AttachedIo),
    GenericError(GenericErrorMessage),
    PortInfoRequest(PortInfoRequest),
    PortModeInfoRequest(PortModeInfoRequest),
    PortInputFormatSetupSingle(PortInputFormatSetupSingle),
    PortInputFormatSetupCombined(PortInputFormatSetupCombined),
    PortInfo(PortInfo),
    PortModeInfo(PortModeInfo),
    PortValueSingle(PortValueSingle),
    PortValueCombined(PortValueCombined),
    PortInputFormatSingle(PortInputFormatSingle),
    PortInputFormatCombined(PortInputFormatCombined),
    VirtualPortSetup(VirtualPortSetup),
    PortOutput(PortOutputCommand),
    PortOutputFeedback(PortOutputFeedback),
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        use Message::*;
        match self {
            HubProperties(_) => kind_byte!(HubProperties),
            HubAction(_) => kind_byte!(HubAction),
            HubAlert(_) => kind_byte!(HubAlert),
            HubAttachedIo(_) => kind_byte!(HubAttachedIo),
            GenericError(_) => kind_byte!(GenericError),
            PortInfoRequest(_) => kind_byte!(PortInfoRequest),
            PortModeInfoRequest(_) => kind_byte!(PortModeInfoRequest),
            PortInputFormatSetupSingle(_) => kind_byte!(PortInputFormatSetupSingle),
            PortInputFormatSetupCombined(_) => kind_byte!(PortInputFormatSetupCombined),
            PortInfo(_) => kind_byte!(PortInfo),
            PortModeInfo(_) => kind_byte!(PortModeInfo),
            PortValueSingle(_) => kind_byte!(PortValueSingle),
            PortValueCombined(_) => kind_byte!(PortValueCombined),
            PortInputFormatSingle(_) => kind_byte!(PortInputFormatSingle),
            PortInputFormatCombined(_) => kind_byte!(PortInputFormatCombined),
            VirtualPortSetup(_) => kind_byte!(VirtualPortSetup),
            PortOutput(_) => kind_byte!(PortOutput),
            PortOutputFeedback(_) => kind_byte!(PortOutputFeedback),
        }
    }

    /// Whether sending this message should block the caller awaiting a
    /// matching upstream reply (§4.4, §4.2 per-kind notes).
    pub fn needs_reply(&self) -> bool {
        use Message::*;
        match self {
            HubProperties(m) => matches!(
                m.operation,
                HubPropertyOperation::UpdateRequest | HubPropertyOperation::UpdateEnable
            ),
            HubAction(m) => matches!(
                m.action,
                HubAction::SwitchOffHub | HubAction::Disconnect
            ),
            PortOutput(m) => m.completion_info == CompletionInfo::CommandFeedback,
            PortInputFormatSetupSingle(_) => true,
            _ => false,
        }
    }

    /// Whether `upstream` is the reply this (downstream, `needs_reply`)
    /// message is waiting for (§4.4, §5 reply rendezvous).
    pub fn is_reply(&self, upstream: &Message) -> bool {
        use Message::*;
        match (self, upstream) {
            (HubProperties(d), HubProperties(u)) => {
                u.operation == HubPropertyOperation::UpstreamUpdate
                    && u.reference() == d.reference()
            }
            (HubAction(d), HubAction(u)) => match (d.action, u.action) {
                (HubAction::SwitchOffHub, HubAction::HubWillSwitchOff) => true,
                (HubAction::Disconnect, HubAction::HubWillDisconnect) => true,
                _ => false,
            },
            (PortOutput(d), PortOutputFeedback(u)) => u
                .statuses
                .iter()
                .any(|s| s.port_id == d.port_id && s.completed()),
            (PortInputFormatSetupSingle(d), PortInputFormatSingle(u)) => u.port_id == d.port_id,
            _ => false,
        }
    }

    /// Encode this (downstream) message into a full LWP3 frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        use Message::*;
        let body = match self {
            HubProperties(m) => m.serialise(),
            HubAction(m) => vec![m.action as u8],
            HubAlert(m) => m.serialise(),
            PortInfoRequest(m) => m.serialise(),
            PortModeInfoRequest(m) => m.serialise(),
            PortInputFormatSetupSingle(m) => m.serialise(),
            PortInputFormatSetupCombined(m) => m.serialise(),
            VirtualPortSetup(m) => m.serialise(),
            PortOutput(m) => m.serialise(),
            other => {
                return Err(Error::NotImplementedError(format!(
                    "{other:?} is not a downstream message kind"
                )))
            }
        };
        encode_frame(self.type_byte(), &body)
    }

    /// Decode a complete LWP3 frame into a tagged [`Message`].
    pub fn decode(data: &[u8]) -> Result<Message> {
        let (message_type, body) = decode_frame(data)?;
        let mut iter = body.iter();
        Ok(match message_type {
            x if x == kind_byte!(HubProperties) => {
                Message::HubProperties(HubPropertiesMessage::parse(&mut iter)?)
            }
            x if x == kind_byte!(HubAction) => Message::HubAction(HubActionMessage {
                action: ok!(HubAction::from_u8(next!(iter))),
            }),
            x if x == kind_byte!(HubAlert) => {
                Message::HubAlert(HubAlertMessage::parse(&mut iter)?)
            }
            x if x == kind_byte!(HubAttachedIo) => {
                Message::HubAttachedIo(AttachedIo::parse(&mut iter)?)
            }
            x if x == kind_byte!(GenericError) => {
                Message::GenericError(GenericErrorMessage::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortInfo) => Message::PortInfo(PortInfo::parse(&mut iter)?),
            x if x == kind_byte!(PortModeInfo) => {
                Message::PortModeInfo(PortModeInfo::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortInputFormatSingle) => {
                Message::PortInputFormatSingle(PortInputFormatSingle::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortInputFormatCombined) => {
                Message::PortInputFormatCombined(PortInputFormatCombined::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortValueSingle) => {
                Message::PortValueSingle(PortValueSingle::parse(body)?)
            }
            x if x == kind_byte!(PortValueCombined) => {
                Message::PortValueCombined(PortValueCombined::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortOutputFeedback) => {
                Message::PortOutputFeedback(PortOutputFeedback::parse(body)?)
            }
            x if x == kind_byte!(PortOutput) => {
                Message::PortOutput(PortOutputCommand::parse(&mut iter)?)
            }
            x if x == kind_byte!(PortInputFormatSetupSingle) => Message::PortInputFormatSetupSingle(
                PortInputFormatSetupSingle::parse(&mut iter)?,
            ),
            x if x == kind_byte!(VirtualPortSetup) => {
                Message::VirtualPortSetup(VirtualPortSetup::parse(&mut iter)?)
            }
            other => {
                return Err(Error::InvalidFrame(format!(
                    "unrecognised message type {other:#04x}"
                )))
            }
        })
    }
}

// ---------------------------------------------------------------------
// HubProperties (0x01)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubPropertyOperation {
    Set = 0x01,
    UpdateEnable = 0x02,
    UpdateDisable = 0x03,
    Reset = 0x04,
    UpdateRequest = 0x05,
    UpstreamUpdate = 0x06,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubPropertyReference {
    AdvertisingName = 0x01,
    Button = 0x02,
    FwVersion = 0x03,
    HwVersion = 0x04,
    Rssi = 0x05,
    BatteryVoltage = 0x06,
    BatteryType = 0x07,
    ManufacturerName = 0x08,
    RadioFirmwareVersion = 0x09,
    LegoWirelessProtocolVersion = 0x0a,
    SystemTypeId = 0x0b,
    HwNetworkId = 0x0c,
    PrimaryMacAddress = 0x0d,
    SecondaryMacAddress = 0x0e,
    HardwareNetworkFamily = 0x0f,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HubPropertyValue {
    AdvertisingName(String),
    Button(u8),
    FwVersion(String),
    HwVersion(String),
    Rssi(i8),
    BatteryVoltage(u8),
    BatteryType(u8),
    ManufacturerName(String),
    PrimaryMacAddress(String),
    SystemTypeId(u8),
    Raw { reference: HubPropertyReference, bytes: Vec<u8> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct HubPropertiesMessage {
    pub operation: HubPropertyOperation,
    pub value: HubPropertyValue,
}

impl HubPropertiesMessage {
    pub fn reference(&self) -> HubPropertyReference {
        use HubPropertyValue::*;
        match &self.value {
            AdvertisingName(_) => HubPropertyReference::AdvertisingName,
            Button(_) => HubPropertyReference::Button,
            FwVersion(_) => HubPropertyReference::FwVersion,
            HwVersion(_) => HubPropertyReference::HwVersion,
            Rssi(_) => HubPropertyReference::Rssi,
            BatteryVoltage(_) => HubPropertyReference::BatteryVoltage,
            BatteryType(_) => HubPropertyReference::BatteryType,
            ManufacturerName(_) => HubPropertyReference::ManufacturerName,
            PrimaryMacAddress(_) => HubPropertyReference::PrimaryMacAddress,
            SystemTypeId(_) => HubPropertyReference::SystemTypeId,
            Raw { reference, .. } => *reference,
        }
    }

    /// Build a property request (UPD_REQUEST) for `reference`; this is
    /// what `request_firmware_version` etc. send downstream.
    pub fn request(reference: HubPropertyReference) -> Self {
        let value = HubPropertyValue::Raw { reference, bytes: Vec::new() };
        Self { operation: HubPropertyOperation::UpdateRequest, value }
    }

    pub fn enable_updates(reference: HubPropertyReference) -> Self {
        let value = HubPropertyValue::Raw { reference, bytes: Vec::new() };
        Self { operation: HubPropertyOperation::UpdateEnable, value }
    }

    pub fn disable_updates(reference: HubPropertyReference) -> Self {
        let value = HubPropertyValue::Raw { reference, bytes: Vec::new() };
        Self { operation: HubPropertyOperation::UpdateDisable, value }
    }

    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let reference = ok!(HubPropertyReference::from_u8(next!(iter)));
        let operation = ok!(HubPropertyOperation::from_u8(next!(iter)));
        let rest: Vec<u8> = iter.copied().collect();
        let ascii = |b: &[u8]| {
            String::from_utf8_lossy(
                &b[..b.iter().position(|&c| c == 0).unwrap_or(b.len())],
            )
            .into_owned()
        };
        let value = match reference {
            HubPropertyReference::AdvertisingName => HubPropertyValue::AdvertisingName(ascii(&rest)),
            HubPropertyReference::Button => HubPropertyValue::Button(
                *rest.first().context("Button property missing payload")?,
            ),
            HubPropertyReference::FwVersion => HubPropertyValue::FwVersion(bytes::decode_version(
                rest.get(0..4)
                    .context("FwVersion property missing payload")?
                    .try_into()
                    .unwrap(),
            )),
            HubPropertyReference::HwVersion => HubPropertyValue::HwVersion(bytes::decode_version(
                rest.get(0..4)
                    .context("HwVersion property missing payload")?
                    .try_into()
                    .unwrap(),
            )),
            HubPropertyReference::Rssi => HubPropertyValue::Rssi(
                *rest.first().context("Rssi property missing payload")? as i8,
            ),
            HubPropertyReference::BatteryVoltage => HubPropertyValue::BatteryVoltage(
                *rest.first().context("BatteryVoltage property missing payload")?,
            ),
            HubPropertyReference::BatteryType => HubPropertyValue::BatteryType(
                *rest.first().context("BatteryType property missing payload")?,
            ),
            HubPropertyReference::ManufacturerName => {
                HubPropertyValue::ManufacturerName(ascii(&rest))
            }
            HubPropertyReference::PrimaryMacAddress => {
                HubPropertyValue::PrimaryMacAddress(bytes::decode_mac(&rest))
            }
            HubPropertyReference::SystemTypeId => HubPropertyValue::SystemTypeId(
                *rest.first().context("SystemTypeId property missing payload")?,
            ),
            other => HubPropertyValue::Raw { reference: other, bytes: rest },
        };
        Ok(Self { operation, value })
    }

    fn serialise(&self) -> Vec<u8> {
        let mut out = vec![self.reference() as u8, self.operation as u8];
        use HubPropertyValue::*;
        match &self.value {
            Button(v) | BatteryVoltage(v) | BatteryType(v) | SystemTypeId(v) => out.push(*v),
            Rssi(v) => out.push(*v as u8),
            AdvertisingName(s) | ManufacturerName(s) => out.extend_from_slice(s.as_bytes()),
            Raw { bytes, .. } => out.extend_from_slice(bytes),
            FwVersion(_) | HwVersion(_) | PrimaryMacAddress(_) => {
                // these are upstream-only values; downstream requests carry
                // no payload and are built via `request`/`enable_updates`.
            }
        }
        out
    }
}

// ---------------------------------------------------------------------
// HubAction (0x02)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubAction {
    SwitchOffHub = 0x01,
    Disconnect = 0x02,
    VccPortControlOn = 0x03,
    VccPortControlOff = 0x04,
    ActivateBusyIndication = 0x05,
    ResetBusyIndication = 0x06,
    HubWillSwitchOff = 0x30,
    HubWillDisconnect = 0x31,
    HubWillGoIntoBootMode = 0x32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubActionMessage {
    pub action: HubAction,
}

// ---------------------------------------------------------------------
// HubAlert (0x03)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum AlertType {
    LowVoltage = 0x01,
    HighCurrent = 0x02,
    LowSignalStrength = 0x03,
    OverPowerCondition = 0x04,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubAlertMessage {
    pub alert_type: AlertType,
    pub operation: HubPropertyOperation,
    pub status: u8,
}

impl HubAlertMessage {
    pub fn is_ok(&self) -> bool {
        self.status == 0
    }

    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let alert_type = ok!(AlertType::from_u8(next!(iter)));
        let operation = ok!(HubPropertyOperation::from_u8(next!(iter)));
        let status = next!(iter);
        Ok(Self { alert_type, operation, status })
    }

    fn serialise(&self) -> Vec<u8> {
        vec![self.alert_type as u8, self.operation as u8, self.status]
    }
}

// ---------------------------------------------------------------------
// HubAttachedIO (0x04)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum AttachEvent {
    Detached = 0x00,
    Attached = 0x01,
    AttachedVirtual = 0x02,
}

#[derive(Clone, Debug, PartialEq)]
pub enum IoAttachEvent {
    Detached,
    Attached { device_type: u16, hw_version: String, fw_version: String },
    AttachedVirtual { port_a: u8, port_b: u8 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttachedIo {
    pub port: u8,
    pub event: IoAttachEvent,
}

impl AttachedIo {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port = next!(iter);
        let event_type = AttachEvent::parse(&mut *iter)?;
        let event = match event_type {
            AttachEvent::Detached => IoAttachEvent::Detached,
            AttachEvent::Attached => {
                let device_type = next_u16!(iter);
                let hw: [u8; 4] = [next!(iter), next!(iter), next!(iter), next!(iter)];
                let fw: [u8; 4] = [next!(iter), next!(iter), next!(iter), next!(iter)];
                IoAttachEvent::Attached {
                    device_type,
                    hw_version: bytes::decode_version(&hw),
                    fw_version: bytes::decode_version(&fw),
                }
            }
            AttachEvent::AttachedVirtual => {
                let port_a = next!(iter);
                let port_b = next!(iter);
                IoAttachEvent::AttachedVirtual { port_a, port_b }
            }
        };
        Ok(Self { port, event })
    }
}

// ---------------------------------------------------------------------
// GenericError (0x05)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum ErrorCode {
    Ack = 0x01,
    Mack = 0x02,
    BufferOverflow = 0x03,
    Timeout = 0x04,
    UnknownCommand = 0x05,
    InvalidParams = 0x06,
    Overcurrent = 0x07,
    InternalError = 0x08,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenericErrorMessage {
    pub command: u8,
    pub code: ErrorCode,
}

impl GenericErrorMessage {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let command = next!(iter);
        let code = ErrorCode::parse(&mut *iter)?;
        Ok(Self { command, code })
    }
}

impl std::fmt::Display for GenericErrorMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Command {:#04x} caused error {:#04x}: {:?}",
            self.command, self.code as u8, self.code
        )
    }
}

// ---------------------------------------------------------------------
// PortInfoRequest (0x21) / PortInfo (0x43)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum InformationType {
    PortValue = 0x00,
    ModeInfo = 0x01,
    PossibleModeCombinations = 0x02,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortInfoRequest {
    pub port_id: u8,
    pub information_type: InformationType,
}

impl PortInfoRequest {
    fn serialise(&self) -> Vec<u8> {
        vec![self.port_id, self.information_type as u8]
    }
}

/// A tiny `bitflags`-shaped helper so `PortCapabilities` reads like the
/// rest of the codec without pulling in the `bitflags` crate for four
/// constants.
macro_rules! bitflags_like {
    (
        $(#[$outer:meta])*
        pub struct $name:ident(u8) {
            $(const $flag:ident = $value:expr;)*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        pub struct $name(pub u8);

        impl $name {
            $(pub const $flag: u8 = $value;)*

            pub fn contains(&self, flag: u8) -> bool {
                self.0 & flag == flag
            }
        }
    };
}

bitflags_like! {
    /// Capability bits carried in `PortInfo::ModeInfo` (§4.2).
    pub struct PortCapabilities(u8) {
        const LOGICAL_SYNCHRONIZABLE = 0b1000;
        const LOGICAL_COMBINABLE = 0b0100;
        const INPUT = 0b0010;
        const OUTPUT = 0b0001;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortInfoValue {
    ModeInfo {
        capabilities: PortCapabilities,
        mode_count: u8,
        input_modes: u16,
        output_modes: u16,
    },
    PossibleModeCombinations(Vec<u16>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInfo {
    pub port_id: u8,
    pub value: PortInfoValue,
}

impl PortInfo {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let info_type = InformationType::parse(&mut *iter)?;
        let value = match info_type {
            InformationType::ModeInfo => {
                let capabilities = PortCapabilities(next!(iter));
                let mode_count = next!(iter);
                let input_modes = next_u16!(iter);
                let output_modes = next_u16!(iter);
                PortInfoValue::ModeInfo { capabilities, mode_count, input_modes, output_modes }
            }
            InformationType::PossibleModeCombinations => {
                let mut combos = Vec::new();
                loop {
                    let lo = match iter.next() {
                        Some(b) => *b,
                        None => break,
                    };
                    let hi = next!(iter);
                    let combo = u16::from_le_bytes([lo, hi]);
                    if combo == 0 {
                        break;
                    }
                    combos.push(combo);
                }
                PortInfoValue::PossibleModeCombinations(combos)
            }
            InformationType::PortValue => {
                return Err(Error::InvalidFrame(
                    "PortInfo cannot carry PORT_VALUE, only requests do".into(),
                ))
            }
        };
        Ok(Self { port_id, value })
    }
}

// ---------------------------------------------------------------------
// PortModeInfoRequest (0x22) / PortModeInfo (0x44)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, Parse)]
pub enum ModeInformationType {
    Name = 0x00,
    RawRange = 0x01,
    PctRange = 0x02,
    SiRange = 0x03,
    Units = 0x04,
    Mapping = 0x05,
    UsedInternally = 0x06,
    MotorBias = 0x07,
    CapabilityBits = 0x08,
    ValueFormat = 0x80,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortModeInfoRequest {
    pub port_id: u8,
    pub mode: u8,
    pub information_type: ModeInformationType,
}

impl PortModeInfoRequest {
    fn serialise(&self) -> Vec<u8> {
        vec![self.port_id, self.mode, self.information_type as u8]
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum DatasetType {
    Bits8 = 0b00,
    Bits16 = 0b01,
    Bits32 = 0b10,
    Float = 0b11,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValueFormat {
    pub number_of_datasets: u8,
    pub dataset_type: DatasetType,
    pub total_figures: u8,
    pub decimals: u8,
}

#[derive(Clone, Debug, PartialEq)]
pub enum PortModeInfoValue {
    Name(String),
    RawRange { min: f32, max: f32 },
    PctRange { min: f32, max: f32 },
    SiRange { min: f32, max: f32 },
    Units(String),
    Mapping { input: u8, output: u8 },
    MotorBias(u8),
    CapabilityBits(Vec<u8>),
    ValueFormat(ValueFormat),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortModeInfo {
    pub port_id: u8,
    pub mode: u8,
    pub value: PortModeInfoValue,
}

fn zero_terminated_ascii<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> String {
    let bytes: Vec<u8> = iter.copied().take_while(|&b| b != 0).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

impl PortModeInfo {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let mode = next!(iter);
        let info_type = ModeInformationType::parse(&mut *iter)?;
        let value = match info_type {
            ModeInformationType::Name => PortModeInfoValue::Name(zero_terminated_ascii(iter)),
            ModeInformationType::Units => PortModeInfoValue::Units(zero_terminated_ascii(iter)),
            ModeInformationType::RawRange => {
                let min = crate::macros::next_f32!(iter);
                let max = crate::macros::next_f32!(iter);
                PortModeInfoValue::RawRange { min, max }
            }
            ModeInformationType::PctRange => {
                let min = crate::macros::next_f32!(iter);
                let max = crate::macros::next_f32!(iter);
                PortModeInfoValue::PctRange { min, max }
            }
            ModeInformationType::SiRange => {
                let min = crate::macros::next_f32!(iter);
                let max = crate::macros::next_f32!(iter);
                PortModeInfoValue::SiRange { min, max }
            }
            ModeInformationType::Mapping => {
                let input = next!(iter);
                let output = next!(iter);
                PortModeInfoValue::Mapping { input, output }
            }
            ModeInformationType::MotorBias => PortModeInfoValue::MotorBias(next!(iter)),
            ModeInformationType::CapabilityBits | ModeInformationType::UsedInternally => {
                PortModeInfoValue::CapabilityBits(iter.copied().collect())
            }
            ModeInformationType::ValueFormat => {
                let number_of_datasets = next!(iter);
                let raw_type = next!(iter);
                let dataset_type = ok!(DatasetType::from_u8(raw_type));
                let total_figures = next!(iter);
                let decimals = next!(iter);
                PortModeInfoValue::ValueFormat(ValueFormat {
                    number_of_datasets,
                    dataset_type,
                    total_figures,
                    decimals,
                })
            }
        };
        Ok(Self { port_id, mode, value })
    }
}

// ---------------------------------------------------------------------
// PortInputFormatSetupSingle (0x41) / PortInputFormatSingle (0x47)
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortInputFormatSetupSingle {
    pub port_id: u8,
    pub mode: u8,
    pub delta: u32,
    pub notification_enabled: bool,
}

impl PortInputFormatSetupSingle {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let mode = next!(iter);
        let delta = next_u32!(iter);
        let notification_enabled = next!(iter) != 0;
        Ok(Self { port_id, mode, delta, notification_enabled })
    }

    fn serialise(&self) -> Vec<u8> {
        let mut out = vec![self.port_id, self.mode];
        out.extend_from_slice(&self.delta.to_le_bytes());
        out.push(self.notification_enabled as u8);
        out
    }
}

pub type PortInputFormatSingle = PortInputFormatSetupSingle;

// ---------------------------------------------------------------------
// PortInputFormatSetupCombined (0x42) / PortInputFormatCombined (0x48)
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum CombinedSetupSubcommand {
    SetModeAndDatasetCombinations = 0x01,
    Lock = 0x02,
    UnlockMultiEnabled = 0x03,
    UnlockMultiDisabled = 0x04,
    NotUsed = 0x05,
    ResetSensor = 0x06,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CombinedSetupPayload {
    SetModeAndDatasetCombinations { combination_index: u8, mode_dataset: Vec<u8> },
    Lock,
    UnlockMultiEnabled,
    UnlockMultiDisabled,
    ResetSensor,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInputFormatSetupCombined {
    pub port_id: u8,
    pub payload: CombinedSetupPayload,
}

impl PortInputFormatSetupCombined {
    fn serialise(&self) -> Vec<u8> {
        let mut out = vec![self.port_id];
        match &self.payload {
            CombinedSetupPayload::SetModeAndDatasetCombinations { combination_index, mode_dataset } => {
                out.push(CombinedSetupSubcommand::SetModeAndDatasetCombinations as u8);
                out.push(*combination_index);
                out.extend_from_slice(mode_dataset);
            }
            CombinedSetupPayload::Lock => out.push(CombinedSetupSubcommand::Lock as u8),
            CombinedSetupPayload::UnlockMultiEnabled => {
                out.push(CombinedSetupSubcommand::UnlockMultiEnabled as u8)
            }
            CombinedSetupPayload::UnlockMultiDisabled => {
                out.push(CombinedSetupSubcommand::UnlockMultiDisabled as u8)
            }
            CombinedSetupPayload::ResetSensor => out.push(CombinedSetupSubcommand::ResetSensor as u8),
        }
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortInputFormatCombined {
    pub port_id: u8,
    pub combination_index: u8,
    pub multi_update_enabled: bool,
    pub configured_slots: u16,
}

impl PortInputFormatCombined {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let control = next!(iter);
        let combination_index = control & 0b0000_0111;
        let multi_update_enabled = (control & 0b1111_1000) != 0;
        let configured_slots = next_u16!(iter);
        Ok(Self { port_id, combination_index, multi_update_enabled, configured_slots })
    }
}

// ---------------------------------------------------------------------
// PortValueSingle (0x45) / PortValueCombined (0x46)
// ---------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortValueSingle {
    pub port_id: u8,
    pub payload: Vec<u8>,
}

impl PortValueSingle {
    fn parse(body: &[u8]) -> Result<Self> {
        let port_id = *body.first().context("PortValueSingle missing port id")?;
        Ok(Self { port_id, payload: body[1..].to_vec() })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortValueCombined {
    pub port_id: u8,
    pub slot_mask: u16,
    pub data: Vec<u8>,
}

impl PortValueCombined {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let slot_mask = next_u16!(iter);
        Ok(Self { port_id, slot_mask, data: iter.copied().collect() })
    }
}

// ---------------------------------------------------------------------
// VirtualPortSetup (0x61)
// ---------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualPortSetup {
    Disconnect { port_id: u8 },
    Connect { port_a: u8, port_b: u8 },
}

impl VirtualPortSetup {
    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        Ok(match next!(iter) {
            0x00 => VirtualPortSetup::Disconnect { port_id: next!(iter) },
            0x01 => VirtualPortSetup::Connect { port_a: next!(iter), port_b: next!(iter) },
            other => {
                return Err(Error::InvalidFrame(format!(
                    "unrecognised VirtualPortSetup subcommand {other:#04x}"
                )))
            }
        })
    }

    fn serialise(&self) -> Vec<u8> {
        match self {
            VirtualPortSetup::Disconnect { port_id } => vec![0x00, *port_id],
            VirtualPortSetup::Connect { port_a, port_b } => vec![0x01, *port_a, *port_b],
        }
    }
}

// ---------------------------------------------------------------------
// PortOutput (0x81) / PortOutputFeedback (0x82)
// ---------------------------------------------------------------------

pub const WRITE_DIRECT: u8 = 0x50;
pub const WRITE_DIRECT_MODE_DATA: u8 = 0x51;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartupInfo {
    BufferIfNecessary = 0x00,
    ExecuteImmediately = 0x10,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionInfo {
    NoAction = 0x00,
    CommandFeedback = 0x01,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortOutputCommand {
    pub port_id: u8,
    pub startup_info: StartupInfo,
    pub completion_info: CompletionInfo,
    pub subcommand: u8,
    pub params: Vec<u8>,
}

impl PortOutputCommand {
    pub fn new(
        port_id: u8,
        completion_info: CompletionInfo,
        subcommand: u8,
        params: Vec<u8>,
    ) -> Self {
        Self {
            port_id,
            startup_info: StartupInfo::ExecuteImmediately,
            completion_info,
            subcommand,
            params,
        }
    }

    fn parse<'a>(iter: &mut impl Iterator<Item = &'a u8>) -> Result<Self> {
        let port_id = next!(iter);
        let flags = next!(iter);
        let startup_info = if flags & 0x10 != 0 {
            StartupInfo::ExecuteImmediately
        } else {
            StartupInfo::BufferIfNecessary
        };
        let completion_info = if flags & 0x01 != 0 {
            CompletionInfo::CommandFeedback
        } else {
            CompletionInfo::NoAction
        };
        let subcommand = next!(iter);
        let params = iter.copied().collect();
        Ok(Self { port_id, startup_info, completion_info, subcommand, params })
    }

    fn serialise(&self) -> Vec<u8> {
        let flags = self.startup_info as u8 | self.completion_info as u8;
        let mut out = vec![self.port_id, flags, self.subcommand];
        out.extend_from_slice(&self.params);
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortOutputFeedbackStatus {
    pub port_id: u8,
    pub in_progress: bool,
    pub completed: bool,
    pub discarded: bool,
    pub idle: bool,
    pub busy_full: bool,
}

impl PortOutputFeedbackStatus {
    pub fn completed(&self) -> bool {
        self.completed
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortOutputFeedback {
    pub statuses: Vec<PortOutputFeedbackStatus>,
}

impl PortOutputFeedback {
    fn parse(body: &[u8]) -> Result<Self> {
        let mut statuses = Vec::new();
        let mut chunks = body.chunks_exact(2);
        for chunk in &mut chunks {
            let port_id = chunk[0];
            let bits = chunk[1];
            statuses.push(PortOutputFeedbackStatus {
                port_id,
                in_progress: bits & 0x01 != 0,
                completed: bits & 0x02 != 0,
                discarded: bits & 0x04 != 0,
                idle: bits & 0x08 != 0,
                busy_full: bits & 0x10 != 0,
            });
        }
        if !chunks.remainder().is_empty() {
            return Err(Error::InvalidFrame(
                "PortOutputFeedback body is not a whole number of (port, status) pairs".into(),
            ));
        }
        Ok(Self { statuses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(frame: &[u8]) -> &[u8] {
        let (_, body) = decode_frame(frame).unwrap();
        body
    }

    #[test]
    fn length_round_trips_across_boundaries() {
        for n in [0usize, 125, 126, 127, 128, 200, 500] {
            let payload = vec![0xABu8; n];
            let frame = encode_frame(0x45, &payload).unwrap();
            let body = body_of(&frame);
            assert_eq!(body, payload.as_slice(), "payload size {n}");
        }
    }

    #[test]
    fn frame_over_max_is_rejected() {
        let payload = vec![0u8; MAX_FRAME_LEN];
        assert!(encode_frame(0x45, &payload).is_err());
    }

    #[test]
    fn hub_id_must_be_zero() {
        let mut frame = encode_frame(0x01, &[1, 2]).unwrap();
        frame[1] = 1; // corrupt hub id
        assert!(Message::decode(&frame).is_err());
    }

    #[test]
    fn port_output_scenario_1_led_colour_index() {
        // PortOutput(port=0x32, flags=0x11, subcmd=0x51, payload=00 07)
        let msg = Message::PortOutput(PortOutputCommand::new(
            0x32,
            CompletionInfo::CommandFeedback,
            WRITE_DIRECT_MODE_DATA,
            vec![0x00, 0x07],
        ));
        let frame = msg.encode().unwrap();
        // header(1) + hubid(1) + type(1) + port + flags + subcmd + 2 params = 8
        assert_eq!(frame, vec![0x08, 0x00, 0x81, 0x32, 0x11, 0x51, 0x00, 0x07]);
    }

    #[test]
    fn port_output_scenario_2_rotate_motor() {
        let params = vec![0x5A, 0x00, 0x00, 0x00, 0xCE, 0x64, 0x7F, 0x03];
        let msg = Message::PortOutput(PortOutputCommand::new(
            0x00,
            CompletionInfo::CommandFeedback,
            0x0B,
            params.clone(),
        ));
        let frame = msg.encode().unwrap();
        assert_eq!(&frame[6..], params.as_slice());
        assert_eq!(frame[5], 0x0B);
    }

    #[test]
    fn tilt_sensor_value_decodes_three_i16() {
        let body = [0x63u8, 0x00, 0x01, 0x00, 0x02, 0x00, 0x03];
        let frame = encode_frame(kind_byte!(PortValueSingle), &body).unwrap();
        let msg = Message::decode(&frame).unwrap();
        let Message::PortValueSingle(v) = msg else { panic!("wrong kind") };
        assert_eq!(v.port_id, 0x63);
        let mut it = v.payload.iter();
        let x = next_i16!(it);
        let y = next_i16!(it);
        let z = next_i16!(it);
        assert_eq!((x, y, z), (-256, 512, 768));
    }

    #[test]
    fn firmware_version_property_scenario_4() {
        let mut body = vec![HubPropertyReference::FwVersion as u8, HubPropertyOperation::UpstreamUpdate as u8];
        body.extend_from_slice(&[0x34, 0x12, 0x07, 0x10]);
        let frame = encode_frame(kind_byte!(HubProperties), &body).unwrap();
        let msg = Message::decode(&frame).unwrap();
        let Message::HubProperties(p) = msg else { panic!("wrong kind") };
        assert_eq!(p.value, HubPropertyValue::FwVersion("1.0.07.1234".into()));
    }

    #[test]
    fn reply_matching_is_specific() {
        let request = Message::HubProperties(HubPropertiesMessage::request(
            HubPropertyReference::FwVersion,
        ));
        assert!(request.needs_reply());
        let good_reply = Message::HubProperties(HubPropertiesMessage {
            operation: HubPropertyOperation::UpstreamUpdate,
            value: HubPropertyValue::FwVersion("1.0.00.0000".into()),
        });
        assert!(request.is_reply(&good_reply));
        let wrong_property = Message::HubProperties(HubPropertiesMessage {
            operation: HubPropertyOperation::UpstreamUpdate,
            value: HubPropertyValue::Rssi(-40),
        });
        assert!(!request.is_reply(&wrong_property));
    }

    #[test]
    fn virtual_port_setup_round_trips() {
        let msg = VirtualPortSetup::Connect { port_a: 0x00, port_b: 0x01 };
        let decoded = {
            let body = msg.serialise();
            let mut it = body.iter();
            VirtualPortSetup::parse(&mut it).unwrap()
        };
        assert_eq!(msg, decoded);
    }
}
