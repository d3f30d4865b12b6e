//! Technic Hub sensors (C7): the external colour, distance, force, and
//! temperature sensors (distinct from the hub's own internal IMU, see
//! [`super::tilt`]).

use super::PeripheralCore;
use crate::bytes;
use crate::error::{Error, Result};
use std::sync::Arc;

pub const COLOR_MODE_COLOR: u8 = 0;
pub const COLOR_MODE_REFLECTIVITY: u8 = 1;
pub const COLOR_MODE_AMBIENT: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorValue {
    Color(u8),
    Reflectivity(u8),
    Ambient(u8),
}

pub fn decode_color(mode: u8, data: &[u8]) -> Result<ColorValue> {
    Ok(match mode {
        COLOR_MODE_COLOR => ColorValue::Color(bytes::u8_at(data, 0)?.min(10)),
        COLOR_MODE_REFLECTIVITY => ColorValue::Reflectivity(bytes::u8_at(data, 0)?),
        COLOR_MODE_AMBIENT => ColorValue::Ambient(bytes::u8_at(data, 0)?),
        other => return Err(Error::InvalidFrame(format!("unexpected Technic colour mode {other}"))),
    })
}

/// The Spike Prime-era Technic colour sensor (`TechnicColorSensor`).
pub struct TechnicColorSensor {
    core: Arc<PeripheralCore>,
}

impl TechnicColorSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

pub const DISTANCE_MODE_DISTANCE: u8 = 0;
pub const DISTANCE_MODE_FAST_DISTANCE: u8 = 1;
const SET_BRIGHTNESS: u8 = 5;

pub fn decode_distance_mm(data: &[u8]) -> Result<u16> {
    bytes::u16_at(data, 0)
}

pub struct DistanceSensor {
    core: Arc<PeripheralCore>,
}

impl DistanceSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn set_brightness(&self, top_left: u8, top_right: u8, bottom_left: u8, bottom_right: u8) -> Result<()> {
        self.core
            .send_cmd(SET_BRIGHTNESS, vec![top_left, top_right, bottom_left, bottom_right])
            .await
    }
}

pub const FORCE_MODE_FORCE: u8 = 0;
pub const FORCE_MODE_TOUCHED: u8 = 1;
pub const FORCE_MODE_TAPPED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForceValue {
    ForceNewtons(u8),
    Touched(bool),
    Tapped(u8),
}

pub fn decode_force(mode: u8, data: &[u8]) -> Result<ForceValue> {
    Ok(match mode {
        FORCE_MODE_FORCE => ForceValue::ForceNewtons(bytes::u8_at(data, 0)?),
        FORCE_MODE_TOUCHED => ForceValue::Touched(bytes::u8_at(data, 0)? != 0),
        FORCE_MODE_TAPPED => ForceValue::Tapped(bytes::u8_at(data, 0)?),
        other => return Err(Error::InvalidFrame(format!("unexpected force sensor mode {other}"))),
    })
}

/// The Spike Prime-era Technic force sensor (`TechnicForceSensor`).
pub struct ForceSensor {
    core: Arc<PeripheralCore>,
}

impl ForceSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

pub const TEMPERATURE_MODE: u8 = 0;

/// `i16 * 0.1` degrees Celsius (§4.7, ported from the reference
/// implementation's temperature sensor decoder).
pub fn decode_temperature_celsius(data: &[u8]) -> Result<f32> {
    Ok(bytes::i16_at(data, 0)? as f32 * 0.1)
}

/// The Technic Hub's built-in temperature sensor (`TechnicMediumHubTemperatureSensor`).
pub struct Temperature {
    core: Arc<PeripheralCore>,
}

impl Temperature {
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
    fn temperature_scales_by_tenths() {
        let celsius = decode_temperature_celsius(&[0xF6, 0x00]).unwrap();
        assert!((celsius - 24.6).abs() < 0.01, "got {celsius}");
    }
}
