// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Constants defined by the LWP3 specification, translated into Rust types:
//! hub/device type ids, the BLE service and characteristic UUIDs, and
//! colour/brake-style enumerations shared by several peripherals.

use num_derive::FromPrimitive;
use std::fmt::{self, Display};

/// Hub models this driver recognises from BLE manufacturer data.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum HubType {
    Unknown = 0,
    Wedo2SmartHub = 1,
    MoveHub = 2,
    Hub = 3,
    RemoteControl = 4,
    DuploTrainBase = 5,
    TechnicMediumHub = 6,
}

impl Display for HubType {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        use HubType::*;
        match self {
            Unknown | MoveHub | Hub => write!(fmt, "{:?}", self),
            Wedo2SmartHub => write!(fmt, "Wedo 2 Smart Hub"),
            RemoteControl => write!(fmt, "Remote Control"),
            DuploTrainBase => write!(fmt, "Duplo Train Base"),
            TechnicMediumHub => write!(fmt, "Technic Medium Hub"),
        }
    }
}

/// LWP3 device-type ids, as carried in `HubAttachedIO` attach events.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum DeviceType {
    Unknown = 0,
    SimpleMediumLinearMotor = 1,
    TrainMotor = 2,
    Light = 8,
    VoltageSensor = 20,
    CurrentSensor = 21,
    PiezoBuzzer = 22,
    HubLed = 23,
    TiltSensor = 34,
    MotionSensor = 35,
    ColorDistanceSensor = 37,
    MediumLinearMotor = 38,
    MoveHubMediumLinearMotor = 39,
    MoveHubTiltSensor = 40,
    DuploTrainBaseMotor = 41,
    DuploTrainBaseSpeaker = 42,
    DuploTrainBaseColorSensor = 43,
    DuploTrainBaseSpeedometer = 44,
    TechnicLargeLinearMotor = 46,
    TechnicXlargeLinearMotor = 47,
    TechnicMediumAngularMotor = 48,
    TechnicLargeAngularMotor = 49,
    RemoteControlButton = 55,
    RemoteControlRssi = 56,
    TechnicMediumHubAccelerometer = 57,
    TechnicMediumHubGyroSensor = 58,
    TechnicMediumHubTiltSensor = 59,
    TechnicMediumHubTemperatureSensor = 60,
    TechnicColorSensor = 61,
    TechnicDistanceSensor = 62,
    TechnicForceSensor = 63,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum Color {
    Black = 0,
    Pink = 1,
    Purple = 2,
    Blue = 3,
    LightBlue = 4,
    Cyan = 5,
    Green = 6,
    Yellow = 7,
    Orange = 8,
    Red = 9,
    White = 10,
    None = 255,
}

/// Motor end-state sentinels (§4.7): passed through `set_power`/`stop`
/// untouched rather than clamped into the [-100,100] speed domain.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum EndState {
    Float = 0,
    Hold = 126,
    Brake = 127,
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum BLEManufacturerData {
    DuploTrainBaseId = 32,
    MoveHubId = 64,
    HubId = 65,
    RemoteControlId = 66,
    TechnicMediumHubId = 128,
}

pub mod bleservice {
    use lazy_static::lazy_static;
    use uuid::Uuid;

    lazy_static! {
        pub static ref WEDO2_SMART_HUB: Uuid =
            Uuid::parse_str("00001523-1212-efde-1523-785feabcd123").unwrap();
        pub static ref LPF2_HUB: Uuid =
            Uuid::parse_str("00001623-1212-efde-1623-785feabcd123").unwrap();
    }
}

pub mod blecharacteristic {
    use lazy_static::lazy_static;
    use uuid::Uuid;

    lazy_static! {
        /// The single LWP3 GATT characteristic used for both writes and
        /// notifications on Move Hub / Technic Hub / Powered-Up / Duplo
        /// Train Base.
        pub static ref LPF2_ALL: Uuid =
            Uuid::parse_str("00001624-1212-efde-1623-785feabcd123").unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lpf2_uuid_parses() {
        assert_eq!(
            blecharacteristic::LPF2_ALL.to_string(),
            "00001624-1212-efde-1623-785feabcd123"
        );
    }
}
