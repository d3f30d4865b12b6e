//! The Powered-Up colour/distance ("vision") sensor (C7): a single
//! physical sensor with eight modes covering colour, distance, ambient
//! light, and raw IR transmit/receive.

use super::PeripheralCore;
use crate::bytes;
use crate::error::{Error, Result};
use std::sync::Arc;

pub const MODE_COLOR_INDEX: u8 = 0;
pub const MODE_DISTANCE_INCHES: u8 = 1;
pub const MODE_COUNT_2INCH: u8 = 2;
pub const MODE_DISTANCE_REFLECTED: u8 = 3;
pub const MODE_AMBIENT_LIGHT: u8 = 4;
pub const MODE_SET_COLOR: u8 = 5;
pub const MODE_COLOR_RGB: u8 = 6;
pub const MODE_SET_IR_TX: u8 = 7;
pub const MODE_COLOR_DISTANCE_FLOAT: u8 = 8;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VisionValue {
    ColorIndex(u8),
    DistanceInches(u8),
    Count2Inch(u32),
    DistanceReflected(f32),
    AmbientLight(f32),
    ColorRgb(f32, f32, f32),
    ColorDistanceFloat { color: u8, distance: f32 },
}

pub fn decode(mode: u8, data: &[u8]) -> Result<VisionValue> {
    Ok(match mode {
        MODE_COLOR_INDEX => VisionValue::ColorIndex(bytes::u8_at(data, 0)?),
        MODE_DISTANCE_INCHES => VisionValue::DistanceInches(bytes::u8_at(data, 0)?),
        MODE_COUNT_2INCH => VisionValue::Count2Inch(bytes::u32_at(data, 0)?),
        MODE_DISTANCE_REFLECTED => VisionValue::DistanceReflected(bytes::u8_at(data, 0)? as f32 / 100.0),
        MODE_AMBIENT_LIGHT => VisionValue::AmbientLight(bytes::u8_at(data, 0)? as f32 / 100.0),
        MODE_COLOR_RGB => {
            let scale = 255.0 / 1023.0;
            VisionValue::ColorRgb(
                bytes::u16_at(data, 0)? as f32 * scale,
                bytes::u16_at(data, 2)? as f32 * scale,
                bytes::u16_at(data, 4)? as f32 * scale,
            )
        }
        MODE_COLOR_DISTANCE_FLOAT => {
            let color = bytes::u8_at(data, 0)?;
            let integer = bytes::u8_at(data, 1)? as f32;
            let denominator = bytes::u8_at(data, 3)?;
            let distance = if denominator != 0 { integer + 1.0 / denominator as f32 } else { integer };
            VisionValue::ColorDistanceFloat { color, distance }
        }
        other => {
            return Err(Error::InvalidFrame(format!("unexpected vision sensor mode {other}")))
        }
    })
}

pub struct VisionSensor {
    core: Arc<PeripheralCore>,
}

impl VisionSensor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn set_color(&self, index: u8) -> Result<()> {
        self.core.write_direct_mode(MODE_SET_COLOR, &[index]).await
    }

    pub async fn set_ir_transmit_level(&self, level: f32) -> Result<()> {
        let raw = (level.clamp(0.0, 1.0) * 65535.0) as u16;
        self.core.write_direct_mode(MODE_SET_IR_TX, &raw.to_le_bytes()).await
    }
}

pub const MOTION_MODE_DISTANCE: u8 = 0;

/// WeDo 2.0-era motion sensor (`MotionSensor`): a byte 0-254 distance, with
/// byte 1 set to 1 adding 255 before the `*10` millimetre scale (ported
/// from the reference implementation's `MotionSensor._decode_port_data`).
pub fn decode_motion_distance_mm(data: &[u8]) -> Result<u16> {
    let mut distance = bytes::u8_at(data, 0)? as u16;
    if bytes::u8_at(data, 1)? == 1 {
        distance += 255;
    }
    Ok(distance * 10)
}

pub struct MotionSensor {
    core: Arc<PeripheralCore>,
}

impl MotionSensor {
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
    fn motion_distance_adds_overflow_byte() {
        assert_eq!(decode_motion_distance_mm(&[10, 0]).unwrap(), 100);
        assert_eq!(decode_motion_distance_mm(&[10, 1]).unwrap(), 2650);
    }

    #[test]
    fn color_distance_float_uses_reciprocal_denominator() {
        let data = [3u8, 5, 0, 2]; // color=3, integer=5, denominator=2 at offset 3
        let VisionValue::ColorDistanceFloat { color, distance } = decode(MODE_COLOR_DISTANCE_FLOAT, &data).unwrap()
        else {
            panic!("wrong variant")
        };
        assert_eq!(color, 3);
        assert_eq!(distance, 5.5);
    }

    #[test]
    fn color_distance_float_zero_denominator_is_just_integer() {
        let data = [3u8, 5, 0, 0];
        let VisionValue::ColorDistanceFloat { distance, .. } =
            decode(MODE_COLOR_DISTANCE_FLOAT, &data).unwrap()
        else {
            panic!("wrong variant")
        };
        assert_eq!(distance, 5.0);
    }
}
