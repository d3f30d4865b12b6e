//! Duplo Train Base peripherals (C7): the built-in colour sensor,
//! speedometer, and speaker.

use super::PeripheralCore;
use crate::bytes;
use crate::error::{Error, Result};
use std::sync::Arc;

pub const COLOR_MODE_COLOR: u8 = 0;
pub const COLOR_MODE_REFLECTIVITY: u8 = 2;
pub const COLOR_MODE_RGB: u8 = 3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColorSensorValue {
    Color(u8),
    Reflectivity(u8),
    Rgb(u16, u16, u16),
}

pub fn decode_color_sensor(mode: u8, data: &[u8]) -> Result<ColorSensorValue> {
    Ok(match mode {
        COLOR_MODE_COLOR => ColorSensorValue::Color(bytes::u8_at(data, 0)?),
        COLOR_MODE_REFLECTIVITY => ColorSensorValue::Reflectivity(bytes::u8_at(data, 0)?),
        COLOR_MODE_RGB => ColorSensorValue::Rgb(
            bytes::u16_at(data, 0)?,
            bytes::u16_at(data, 2)?,
            bytes::u16_at(data, 4)?,
        ),
        other => return Err(Error::InvalidFrame(format!("unexpected Duplo colour mode {other}"))),
    })
}

/// The Duplo Train Base's built-in colour sensor (`DuploTrainBaseColorSensor`).
pub struct DuploColorSensor {
    core: Arc<PeripheralCore>,
}

impl DuploColorSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

pub const SPEEDOMETER_MODE_SPEED: u8 = 0;

pub fn decode_speed(data: &[u8]) -> Result<i16> {
    bytes::i16_at(data, 0)
}

/// The Duplo Train Base's built-in speedometer (`DuploTrainBaseSpeedometer`).
pub struct Speedometer {
    core: Arc<PeripheralCore>,
}

impl Speedometer {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

pub const SPEAKER_MODE_SOUND: u8 = 1;
pub const SPEAKER_MODE_TONE: u8 = 2;

pub struct Speaker {
    core: Arc<PeripheralCore>,
}

impl Speaker {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn play_sound(&self, sound: u8) -> Result<()> {
        self.core.write_direct_mode(SPEAKER_MODE_SOUND, &[sound]).await
    }

    pub async fn play_tone(&self, tone: u8) -> Result<()> {
        self.core.write_direct_mode(SPEAKER_MODE_TONE, &[tone]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_color_reflectivity_and_rgb() {
        assert_eq!(decode_color_sensor(COLOR_MODE_COLOR, &[7]).unwrap(), ColorSensorValue::Color(7));
        assert_eq!(
            decode_color_sensor(COLOR_MODE_REFLECTIVITY, &[42]).unwrap(),
            ColorSensorValue::Reflectivity(42)
        );
        let rgb = decode_color_sensor(COLOR_MODE_RGB, &[1, 0, 2, 0, 3, 0]).unwrap();
        assert_eq!(rgb, ColorSensorValue::Rgb(1, 2, 3));
    }

    #[test]
    fn rejects_unknown_color_mode() {
        assert!(decode_color_sensor(9, &[0]).is_err());
    }

    #[test]
    fn speed_decodes_signed_i16() {
        assert_eq!(decode_speed(&(-500i16).to_le_bytes()).unwrap(), -500);
    }
}
