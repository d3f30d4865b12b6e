//! Motor peripherals (C7): three capability tiers — Basic, Tacho, and
//! Absolute — built on the output-command and subscription machinery in
//! [`super::PeripheralCore`].

use super::PeripheralCore;
use crate::consts::EndState;
use crate::error::Result;
use std::sync::Arc;

const START_POWER: u8 = 0x00;
const SET_ACC_TIME: u8 = 0x05;
const SET_DEC_TIME: u8 = 0x06;
const START_SPEED: u8 = 0x07;
const START_SPEED_FOR_TIME: u8 = 0x09;
const START_SPEED_FOR_DEGREES: u8 = 0x0b;
const GOTO_ABSOLUTE_POSITION: u8 = 0x0d;
const PRESET_ENCODER: u8 = 0x14;

pub const MODE_POWER: u8 = 0;
pub const MODE_SPEED: u8 = 1;
pub const MODE_ANGLE: u8 = 2;
pub const MODE_ABSOLUTE: u8 = 3;

/// Acceleration/deceleration profile flags carried by every timed/angled
/// motor subcommand (§4.7); both engaged by default.
fn profile_flags(use_acc: bool, use_dec: bool) -> u8 {
    (use_acc as u8) | ((use_dec as u8) << 1)
}

fn clamp_speed(speed: i8) -> i8 {
    if speed as i32 == EndState::Float as i32
        || speed as i32 == EndState::Hold as i32
        || speed as i32 == EndState::Brake as i32
    {
        speed
    } else {
        speed.clamp(-100, 100)
    }
}

/// Normalise an angle in degrees into `[-180, 180]`. The exact ±180
/// boundary keeps the sign of the input, so three half-turns in either
/// direction (540 / -540) land on +180 / -180 respectively rather than
/// collapsing onto the same representative.
pub fn normalise_angle(degrees: i32) -> i32 {
    let mut angle = degrees % 360;
    if angle > 180 {
        angle -= 360;
    } else if angle < -180 {
        angle += 360;
    }
    if angle == -180 && degrees >= 0 {
        angle = 180;
    } else if angle == 180 && degrees < 0 {
        angle = -180;
    }
    angle
}

/// Map an angle to the nearest multiple of 90 using the strict
/// thresholds (-135, -45, 45, 135), ported from the reference
/// implementation's `_round_to_neares_90` (§4.7).
pub fn round_to_nearest_90(degrees: i32) -> i32 {
    let a = normalise_angle(degrees);
    if a < -135 {
        -180
    } else if a < -45 {
        -90
    } else if a < 45 {
        0
    } else if a < 135 {
        90
    } else {
        -180
    }
}

/// Basic motor: `set_power`/`stop`/`break_motor`.
pub struct Motor {
    core: Arc<PeripheralCore>,
}

impl Motor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn set_power(&self, primary: i8, secondary: Option<i8>) -> Result<()> {
        let primary = clamp_speed(primary);
        let mut params = vec![primary as u8];
        if let Some(secondary) = secondary {
            params.push(clamp_speed(secondary) as u8);
        } else if self.core.virtual_composing.is_some() {
            params.push(primary as u8);
        }
        self.core.send_cmd(START_POWER, params).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.set_power(0, None).await
    }

    pub async fn break_motor(&self) -> Result<()> {
        self.set_power(EndState::Brake as i8, None).await
    }
}

/// Tacho motor: adds timed/degree-bounded speed moves.
pub struct TachoMotor {
    core: Arc<PeripheralCore>,
}

impl TachoMotor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    fn speed_params(&self, primary: i8, secondary: Option<i8>) -> Vec<u8> {
        let mut params = vec![clamp_speed(primary) as u8];
        if let Some(secondary) = secondary {
            params.push(clamp_speed(secondary) as u8);
        } else if self.core.virtual_composing.is_some() {
            params.push(clamp_speed(primary) as u8);
        }
        params
    }

    pub async fn set_acceleration_time(&self, seconds: f32) -> Result<()> {
        let ms = (seconds * 1000.0) as u16;
        self.core.send_cmd(SET_ACC_TIME, ms.to_le_bytes().to_vec()).await
    }

    pub async fn set_deceleration_time(&self, seconds: f32) -> Result<()> {
        let ms = (seconds * 1000.0) as u16;
        self.core.send_cmd(SET_DEC_TIME, ms.to_le_bytes().to_vec()).await
    }

    pub async fn start_speed(&self, primary: i8, secondary: Option<i8>, max_power: u8) -> Result<()> {
        let mut params = self.speed_params(primary, secondary);
        params.push(max_power);
        params.push(profile_flags(true, true));
        self.core.send_cmd(START_SPEED, params).await
    }

    pub async fn start_speed_for_time(
        &self,
        seconds: f32,
        primary: i8,
        secondary: Option<i8>,
        max_power: u8,
        end_state: EndState,
    ) -> Result<()> {
        let ms: u16 = (seconds * 1000.0) as u16;
        let mut params = ms.to_le_bytes().to_vec();
        params.extend(self.speed_params(primary, secondary));
        params.push(max_power);
        params.push(end_state as u8);
        params.push(profile_flags(true, true));
        self.core.send_cmd(START_SPEED_FOR_TIME, params).await
    }

    pub async fn start_speed_for_degrees(
        &self,
        degrees: i32,
        primary: i8,
        secondary: Option<i8>,
        max_power: u8,
        end_state: EndState,
    ) -> Result<()> {
        let (degrees, primary, secondary) = if degrees < 0 {
            (-degrees, -primary, secondary.map(|s| -s))
        } else {
            (degrees, primary, secondary)
        };
        let mut params = (degrees as u32).to_le_bytes().to_vec();
        params.extend(self.speed_params(primary, secondary));
        params.push(max_power);
        params.push(end_state as u8);
        params.push(profile_flags(true, true));
        self.core.send_cmd(START_SPEED_FOR_DEGREES, params).await
    }

    /// Rotate by a relative angle at full power, braking at the end
    /// (§4.7): negative angles negate both degrees and speed so the
    /// wire always carries a positive degree count.
    pub async fn rotate_by_angle(&self, degrees: i32, speed: i8) -> Result<()> {
        self.start_speed_for_degrees(degrees, speed, None, 100, EndState::Brake).await
    }

    pub async fn angle(&self) -> Result<i32> {
        let bytes = self.core.read_raw(Some(MODE_ANGLE)).await?;
        Ok(i32::from_le_bytes(bytes[0..4].try_into().unwrap_or_default()))
    }
}

/// Absolute motor: adds GOTO_ABSOLUTE_POSITION / PRESET_ENCODER.
pub struct AbsoluteMotor {
    core: Arc<PeripheralCore>,
}

impl AbsoluteMotor {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn goto_absolute_position(
        &self,
        degrees: i32,
        speed: i8,
        max_power: u8,
        end_state: EndState,
    ) -> Result<()> {
        let target = normalise_angle(degrees);
        let mut params = target.to_le_bytes().to_vec();
        params.push(speed as u8);
        params.push(max_power);
        params.push(end_state as u8);
        params.push(profile_flags(true, true));
        self.core.send_cmd(GOTO_ABSOLUTE_POSITION, params).await
    }

    /// Move to an absolute angle (normalised into `(-180, 180]`) at full
    /// power, braking at the end (§4.7 scenario 5).
    pub async fn goto_abs_position(&self, degrees: i32) -> Result<()> {
        self.goto_absolute_position(degrees, 50, 100, EndState::Brake).await
    }

    pub async fn preset_encoder(&self, degrees: i32) -> Result<()> {
        self.core.send_cmd(PRESET_ENCODER, degrees.to_le_bytes().to_vec()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_clamps_but_preserves_sentinels() {
        assert_eq!(clamp_speed(50), 50);
        assert_eq!(clamp_speed(-120), -100);
        assert_eq!(clamp_speed(EndState::Brake as i8), EndState::Brake as i8);
        assert_eq!(clamp_speed(EndState::Hold as i8), EndState::Hold as i8);
    }

    #[test]
    fn angle_normalises_into_half_open_range() {
        assert_eq!(normalise_angle(270), -90);
        assert_eq!(normalise_angle(-270), 90);
        assert_eq!(normalise_angle(180), 180);
        assert_eq!(normalise_angle(-180), -180);
    }

    #[test]
    fn angle_boundary_keeps_sign_across_full_turns() {
        assert_eq!(normalise_angle(540), 180);
        assert_eq!(normalise_angle(-540), -180);
        assert_eq!(normalise_angle(900), 180);
        assert_eq!(normalise_angle(-900), -180);
    }

    #[test]
    fn rounds_to_nearest_quadrant() {
        assert_eq!(round_to_nearest_90(10), 0);
        assert_eq!(round_to_nearest_90(100), 90);
        assert_eq!(round_to_nearest_90(-100), -90);
        assert_eq!(round_to_nearest_90(170), -180);
        assert_eq!(round_to_nearest_90(-179), -180);
    }

    #[test]
    fn rounds_at_exact_135_boundary() {
        assert_eq!(round_to_nearest_90(135), -180);
        assert_eq!(round_to_nearest_90(-135), -90);
    }
}
