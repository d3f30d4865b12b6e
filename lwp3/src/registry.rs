// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The attach/detach registry (C5): turns `HubAttachedIo` events into
//! typed peripherals, maintains the port⇄name map (including dynamically
//! registered virtual ports), and forwards inbound port values to the
//! right peripheral's queue.

use crate::consts::{DeviceType, HubType};
use crate::message::{AttachedIo, IoAttachEvent};
use crate::peripheral::{duplo, led, motor, technic, tilt, vision, voltage_current, PeripheralCore};
use crate::session::WeakSession;
use num_traits::FromPrimitive;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A typed, attached peripheral. One variant per concrete device-type
/// family this driver recognises; `Generic` covers anything else so an
/// unrecognised device still shows up in the registry (§4.5).
pub enum Peripheral {
    Motor(motor::Motor),
    TachoMotor(motor::TachoMotor),
    AbsoluteMotor(motor::AbsoluteMotor),
    LedLight(led::LedLight),
    LedRgb(led::LedRgb),
    Vision(vision::VisionSensor),
    Motion(vision::MotionSensor),
    DuploSpeaker(duplo::Speaker),
    DuploColorSensor(duplo::DuploColorSensor),
    Speedometer(duplo::Speedometer),
    DistanceSensor(technic::DistanceSensor),
    TechnicColorSensor(technic::TechnicColorSensor),
    ForceSensor(technic::ForceSensor),
    Temperature(technic::Temperature),
    GenericTilt(tilt::GenericTilt),
    TechnicTilt(tilt::TechnicTilt),
    Accelerometer(tilt::Accelerometer),
    Gyro(tilt::Gyro),
    VoltageSensor(voltage_current::VoltageSensor),
    CurrentSensor(voltage_current::CurrentSensor),
    Rssi(voltage_current::RssiSensor),
    Generic(Arc<PeripheralCore>),
}

impl Peripheral {
    pub fn core(&self) -> &Arc<PeripheralCore> {
        match self {
            Peripheral::Motor(m) => m.core(),
            Peripheral::TachoMotor(m) => m.core(),
            Peripheral::AbsoluteMotor(m) => m.core(),
            Peripheral::LedLight(m) => m.core(),
            Peripheral::LedRgb(m) => m.core(),
            Peripheral::Vision(m) => m.core(),
            Peripheral::Motion(m) => m.core(),
            Peripheral::DuploSpeaker(m) => m.core(),
            Peripheral::DuploColorSensor(m) => m.core(),
            Peripheral::Speedometer(m) => m.core(),
            Peripheral::DistanceSensor(m) => m.core(),
            Peripheral::TechnicColorSensor(m) => m.core(),
            Peripheral::ForceSensor(m) => m.core(),
            Peripheral::Temperature(m) => m.core(),
            Peripheral::GenericTilt(m) => m.core(),
            Peripheral::TechnicTilt(m) => m.core(),
            Peripheral::Accelerometer(m) => m.core(),
            Peripheral::Gyro(m) => m.core(),
            Peripheral::VoltageSensor(m) => m.core(),
            Peripheral::CurrentSensor(m) => m.core(),
            Peripheral::Rssi(m) => m.core(),
            Peripheral::Generic(core) => core,
        }
    }
}

struct Attachment {
    peripheral: Arc<Peripheral>,
    device_type: DeviceType,
}

pub struct Registry {
    hub_type: Mutex<HubType>,
    session: Mutex<Option<WeakSession>>,
    peripherals: Mutex<HashMap<u8, Attachment>>,
    port_names: Mutex<HashMap<String, u8>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            hub_type: Mutex::new(HubType::Unknown),
            session: Mutex::new(None),
            peripherals: Mutex::new(HashMap::new()),
            port_names: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn bind_session(&self, session: WeakSession) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub fn set_hub_type(&self, hub_type: HubType) {
        *self.hub_type.lock().unwrap() = hub_type;
    }

    pub fn hub_type(&self) -> HubType {
        *self.hub_type.lock().unwrap()
    }

    /// Seed the symbolic port-name map with the hub model's static
    /// port-name assignments (§4.4, §4.8).
    pub fn seed_port_names(&self, names: &[(&str, u8)]) {
        let mut map = self.port_names.lock().unwrap();
        for (name, port) in names {
            map.insert((*name).to_string(), *port);
        }
    }

    pub fn has_port(&self, port_id: u8) -> bool {
        self.peripherals.lock().unwrap().contains_key(&port_id)
    }

    pub fn port_by_name(&self, name: &str) -> Option<u8> {
        self.port_names.lock().unwrap().get(name).copied()
    }

    pub fn name_by_port(&self, port_id: u8) -> Option<String> {
        self.port_names
            .lock()
            .unwrap()
            .iter()
            .find(|(_, p)| **p == port_id)
            .map(|(name, _)| name.clone())
    }

    pub fn get(&self, port_id: u8) -> Option<Arc<Peripheral>> {
        self.peripherals.lock().unwrap().get(&port_id).map(|a| a.peripheral.clone())
    }

    pub fn get_by_device_type(&self, device_type: DeviceType) -> Vec<Arc<Peripheral>> {
        self.peripherals
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.device_type == device_type)
            .map(|a| a.peripheral.clone())
            .collect()
    }

    pub fn handle_attach_event(&self, event: AttachedIo) {
        match event.event {
            IoAttachEvent::Detached => {
                let removed = self.peripherals.lock().unwrap().remove(&event.port);
                if removed.is_some() {
                    let mut names = self.port_names.lock().unwrap();
                    if let Some(name) = names.iter().find(|(_, p)| **p == event.port).map(|(n, _)| n.clone()) {
                        // only forget names this attach created dynamically;
                        // static model names are reseeded on reconnect.
                        if name.contains('+') {
                            names.remove(&name);
                        }
                    }
                    log::debug!("port {:#04x} detached", event.port);
                }
            }
            IoAttachEvent::Attached { device_type, hw_version, fw_version } => {
                log::info!(
                    "port {:#04x} attached: device type {device_type} (hw {hw_version}, fw {fw_version})",
                    event.port
                );
                self.attach(event.port, device_type, None);
            }
            IoAttachEvent::AttachedVirtual { port_a, port_b } => {
                log::info!("virtual port {:#04x} attached ({port_a:#04x}+{port_b:#04x})", event.port);
                if let (Some(name_a), Some(name_b)) =
                    (self.name_by_port(port_a), self.name_by_port(port_b))
                {
                    self.port_names.lock().unwrap().insert(format!("{name_a}+{name_b}"), event.port);
                }
                // Virtual attaches report the composing ports, not a fresh
                // device-type id; reuse port_a's type for peripheral kind.
                let device_type = self
                    .peripherals
                    .lock()
                    .unwrap()
                    .get(&port_a)
                    .map(|a| a.device_type)
                    .unwrap_or(DeviceType::Unknown);
                self.attach(event.port, device_type as u16, Some((port_a, port_b)));
            }
        }
    }

    fn attach(&self, port_id: u8, device_type_id: u16, virtual_composing: Option<(u8, u8)>) {
        let Some(session) = self.session.lock().unwrap().clone() else {
            log::error!("attach event before session was bound");
            return;
        };
        let core = PeripheralCore::new(port_id, session, virtual_composing);
        let device_type = DeviceType::from_u16(device_type_id).unwrap_or(DeviceType::Unknown);
        let peripheral = construct_peripheral(device_type, core, self.hub_type());
        self.peripherals
            .lock()
            .unwrap()
            .insert(port_id, Attachment { peripheral: Arc::new(peripheral), device_type });
    }

    pub async fn forward_single(&self, port_id: u8, payload: &[u8]) {
        if let Some(core) = self.get(port_id).map(|p| p.core().clone()) {
            core.push(payload.to_vec()).await;
        }
    }

    pub async fn forward_combined(&self, port_id: u8, data: &[u8]) {
        if let Some(core) = self.get(port_id).map(|p| p.core().clone()) {
            core.push(data.to_vec()).await;
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Static device-type → peripheral-kind table (§4.5, §4.7, §4.8).
/// Anything not listed here gets a [`Peripheral::Generic`] wrapping the
/// bare core.
fn construct_peripheral(device_type: DeviceType, core: Arc<PeripheralCore>, hub_type: HubType) -> Peripheral {
    use DeviceType::*;
    match device_type {
        SimpleMediumLinearMotor | TrainMotor => Peripheral::Motor(motor::Motor::new(core)),
        MediumLinearMotor | MoveHubMediumLinearMotor | DuploTrainBaseMotor => {
            Peripheral::TachoMotor(motor::TachoMotor::new(core))
        }
        TechnicLargeLinearMotor | TechnicXlargeLinearMotor | TechnicMediumAngularMotor
        | TechnicLargeAngularMotor => Peripheral::AbsoluteMotor(motor::AbsoluteMotor::new(core)),
        // DEV_RGB_LIGHT (0x17) is the hub's built-in colour LED; plain
        // DEV_LED_LIGHT (0x08) is a brightness-only external light.
        HubLed => Peripheral::LedRgb(led::LedRgb::new(core)),
        Light => Peripheral::LedLight(led::LedLight::new(core)),
        ColorDistanceSensor => Peripheral::Vision(vision::VisionSensor::new(core)),
        MotionSensor => Peripheral::Motion(vision::MotionSensor::new(core)),
        DuploTrainBaseSpeaker => Peripheral::DuploSpeaker(duplo::Speaker::new(core)),
        DuploTrainBaseColorSensor => Peripheral::DuploColorSensor(duplo::DuploColorSensor::new(core)),
        DuploTrainBaseSpeedometer => Peripheral::Speedometer(duplo::Speedometer::new(core)),
        TechnicDistanceSensor => Peripheral::DistanceSensor(technic::DistanceSensor::new(core)),
        TechnicColorSensor => Peripheral::TechnicColorSensor(technic::TechnicColorSensor::new(core)),
        TechnicForceSensor => Peripheral::ForceSensor(technic::ForceSensor::new(core)),
        TechnicMediumHubTemperatureSensor => Peripheral::Temperature(technic::Temperature::new(core)),
        TiltSensor | MoveHubTiltSensor => Peripheral::GenericTilt(tilt::GenericTilt::new(core)),
        TechnicMediumHubTiltSensor => Peripheral::TechnicTilt(tilt::TechnicTilt::new(core)),
        TechnicMediumHubAccelerometer => Peripheral::Accelerometer(tilt::Accelerometer::new(core)),
        TechnicMediumHubGyroSensor => Peripheral::Gyro(tilt::Gyro::new(core)),
        VoltageSensor => Peripheral::VoltageSensor(voltage_current::VoltageSensor::new(core, hub_type)),
        CurrentSensor => Peripheral::CurrentSensor(voltage_current::CurrentSensor::new(core, hub_type)),
        RemoteControlRssi => Peripheral::Rssi(voltage_current::RssiSensor::new(core)),
        _ => Peripheral::Generic(core),
    }
}

// The hub's built-in push button rides `HubProperties(BUTTON, ...)`
// rather than a port/mode pair (see `peripheral::button`'s own doc
// comment), so it never goes through `construct_peripheral`.
#[allow(unused_imports)]
use crate::peripheral::button as _button;
