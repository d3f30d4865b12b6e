//! Voltage and current sensors (C7): a raw `u16` scaled by hub-model
//! specific max-value/max-raw constants, falling back to the
//! unknown-hub constants when the model isn't listed. Also the Powered-Up
//! remote control's RSSI port, which is just a raw signed byte.

use super::PeripheralCore;
use crate::bytes;
use crate::consts::HubType;
use crate::error::Result;
use std::sync::Arc;

struct Scale {
    max_value: f32,
    max_raw: f32,
}

const fn scale(max_value: f32, max_raw: f32) -> Scale {
    Scale { max_value, max_raw }
}

fn voltage_scale(hub_type: HubType) -> Scale {
    match hub_type {
        HubType::Wedo2SmartHub => scale(1.0, 40.0),
        HubType::DuploTrainBase => scale(6.4, 3047.0),
        HubType::RemoteControl => scale(6.4, 3200.0),
        _ => scale(9.615, 3893.0),
    }
}

fn current_scale(hub_type: HubType) -> Scale {
    match hub_type {
        HubType::Wedo2SmartHub => scale(1.0, 1000.0),
        HubType::TechnicMediumHub => scale(4175.0, 4095.0),
        _ => scale(2444.0, 4095.0),
    }
}

pub fn decode_voltage(hub_type: HubType, data: &[u8]) -> Result<f32> {
    let raw = bytes::u16_at(data, 0)? as f32;
    let Scale { max_value, max_raw } = voltage_scale(hub_type);
    Ok(raw * max_value / max_raw)
}

pub fn decode_current_milliamps(hub_type: HubType, data: &[u8]) -> Result<f32> {
    let raw = bytes::u16_at(data, 0)? as f32;
    let Scale { max_value, max_raw } = current_scale(hub_type);
    Ok(raw * max_value / max_raw)
}

/// The hub's built-in voltage sensor (`VoltageSensor`), scaled per hub
/// model at construction time since the model doesn't change mid-session.
pub struct VoltageSensor {
    core: Arc<PeripheralCore>,
    hub_type: HubType,
}

impl VoltageSensor {
    pub fn new(core: Arc<PeripheralCore>, hub_type: HubType) -> Self {
        Self { core, hub_type }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub fn hub_type(&self) -> HubType {
        self.hub_type
    }
}

/// The hub's built-in current sensor (`CurrentSensor`).
pub struct CurrentSensor {
    core: Arc<PeripheralCore>,
    hub_type: HubType,
}

impl CurrentSensor {
    pub fn new(core: Arc<PeripheralCore>, hub_type: HubType) -> Self {
        Self { core, hub_type }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub fn hub_type(&self) -> HubType {
        self.hub_type
    }
}

/// Raw signed RSSI reading, in dBm, off the Powered-Up remote control's
/// built-in signal-strength port (`RemoteControlRssi`).
pub fn decode_rssi_dbm(data: &[u8]) -> Result<i8> {
    bytes::i8_at(data, 0)
}

pub struct RssiSensor {
    core: Arc<PeripheralCore>,
}

impl RssiSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_hub_voltage_scale() {
        let v = decode_voltage(HubType::Unknown, &3893u16.to_le_bytes()).unwrap();
        assert!((v - 9.615).abs() < 0.001, "got {v}");
    }

    #[test]
    fn duplo_train_base_has_its_own_scale() {
        let v = decode_voltage(HubType::DuploTrainBase, &3047u16.to_le_bytes()).unwrap();
        assert!((v - 6.4).abs() < 0.001, "got {v}");
    }

    #[test]
    fn rssi_is_a_signed_byte() {
        assert_eq!(decode_rssi_dbm(&[0xCE]).unwrap(), -50);
    }
}
