//! Tilt, accelerometer, and gyro peripherals (C7): the Technic Hub's
//! internal IMU plus the legacy Move Hub-style tilt sensor.

use super::PeripheralCore;
use crate::bytes;
use crate::error::Result;
use std::sync::Arc;

pub const MODE_ACCELEROMETER: u8 = 0;
pub const MODE_GYRO: u8 = 0;
pub const MODE_TILT: u8 = 0;

/// Technic Hub accelerometer: three `i16` divided by 4.096 and rounded,
/// yielding milli-g (§4.7).
pub fn decode_accelerometer(data: &[u8]) -> Result<(i32, i32, i32)> {
    let x = bytes::i16_at(data, 0)? as f32 / 4.096;
    let y = bytes::i16_at(data, 2)? as f32 / 4.096;
    let z = bytes::i16_at(data, 4)? as f32 / 4.096;
    Ok((x.round() as i32, y.round() as i32, z.round() as i32))
}

/// Technic Hub gyro: three `i16` scaled by 7/400, yielding degrees/second.
pub fn decode_gyro(data: &[u8]) -> Result<(f32, f32, f32)> {
    let scale = 7.0 / 400.0;
    let x = bytes::i16_at(data, 0)? as f32 * scale;
    let y = bytes::i16_at(data, 2)? as f32 * scale;
    let z = bytes::i16_at(data, 4)? as f32 * scale;
    Ok((x, y, z))
}

/// Technic Hub tilt: three `i16`, first axis negated.
pub fn decode_technic_tilt(data: &[u8]) -> Result<(i16, i16, i16)> {
    let x = bytes::i16_at(data, 0)?;
    let y = bytes::i16_at(data, 2)?;
    let z = bytes::i16_at(data, 4)?;
    Ok((-x, y, z))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoAxisSimple {
    Horizontal = 0,
    Down = 3,
    Left = 5,
    Right = 7,
    Up = 9,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThreeAxisSimple {
    Back = 0,
    Up = 1,
    Down = 2,
    Left = 3,
    Right = 4,
    Front = 5,
}

/// Generic (Move Hub / legacy) tilt sensor decoders for each mode.
pub enum GenericTiltValue {
    AngleTwoAxis { roll: i8, pitch: i8 },
    SimpleTwoAxis(u8),
    SimpleThreeAxis(u8),
    ImpactCount(u32),
    AccelThreeAxis { roll: i8, pitch: i8, yaw: i8 },
    OrientationConfig(u8),
    Calibration(u8, u8, u8),
}

pub const MODE_ANGLE_TWO_AXIS: u8 = 0;
pub const MODE_SIMPLE_TWO_AXIS: u8 = 1;
pub const MODE_SIMPLE_THREE_AXIS: u8 = 2;
pub const MODE_IMPACT_COUNT: u8 = 3;
pub const MODE_ACCEL_THREE_AXIS: u8 = 4;
pub const MODE_ORIENTATION_CONFIG: u8 = 5;
pub const MODE_CALIBRATION: u8 = 6;

pub fn decode_generic_tilt(mode: u8, data: &[u8]) -> Result<GenericTiltValue> {
    Ok(match mode {
        MODE_ANGLE_TWO_AXIS => {
            GenericTiltValue::AngleTwoAxis { roll: bytes::i8_at(data, 0)?, pitch: bytes::i8_at(data, 1)? }
        }
        MODE_SIMPLE_TWO_AXIS => GenericTiltValue::SimpleTwoAxis(bytes::u8_at(data, 0)?),
        MODE_SIMPLE_THREE_AXIS => GenericTiltValue::SimpleThreeAxis(bytes::u8_at(data, 0)?),
        MODE_IMPACT_COUNT => GenericTiltValue::ImpactCount(bytes::u32_at(data, 0)?),
        MODE_ACCEL_THREE_AXIS => GenericTiltValue::AccelThreeAxis {
            roll: bytes::i8_at(data, 0)?,
            pitch: bytes::i8_at(data, 1)?,
            yaw: bytes::i8_at(data, 2)?,
        },
        MODE_ORIENTATION_CONFIG => GenericTiltValue::OrientationConfig(bytes::u8_at(data, 0)?),
        MODE_CALIBRATION => {
            GenericTiltValue::Calibration(bytes::u8_at(data, 0)?, bytes::u8_at(data, 1)?, bytes::u8_at(data, 2)?)
        }
        other => {
            return Err(crate::error::Error::InvalidFrame(format!(
                "unexpected generic tilt mode {other}"
            )))
        }
    })
}

/// The Technic Hub's built-in 3-axis tilt sensor (`TechnicMediumHubTiltSensor`).
pub struct TechnicTilt {
    core: Arc<PeripheralCore>,
}

impl TechnicTilt {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

/// The Technic Hub's built-in accelerometer (`TechnicMediumHubAccelerometer`).
pub struct Accelerometer {
    core: Arc<PeripheralCore>,
}

impl Accelerometer {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

/// The Technic Hub's built-in gyro (`TechnicMediumHubGyroSensor`).
pub struct Gyro {
    core: Arc<PeripheralCore>,
}

impl Gyro {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }
}

/// Legacy Move Hub-style tilt sensor (`TiltSensor`, `MoveHubTiltSensor`):
/// one of the seven [`GenericTiltValue`] modes depending on what's been
/// subscribed.
pub struct GenericTilt {
    core: Arc<PeripheralCore>,
}

impl GenericTilt {
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
    fn technic_tilt_scenario() {
        // PortValueSingle(port=0x63, payload=00 01 00 02 00 03) -> (-256, 512, 768)
        let data = [0x00u8, 0x01, 0x00, 0x02, 0x00, 0x03];
        assert_eq!(decode_technic_tilt(&data).unwrap(), (-256, 512, 768));
    }

    #[test]
    fn accelerometer_scales_and_rounds() {
        let data = [0x00u8, 0x10, 0x00, 0x00, 0x00, 0x00]; // x = 0x1000 = 4096
        let (x, y, z) = decode_accelerometer(&data).unwrap();
        assert_eq!((x, y, z), (1000, 0, 0));
    }
}
