// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hub-model policy (C8): each recognised hub declares its symbolic
//! port-name map, its internal (built-in, always-attached) ports, and
//! the steps it runs right after connecting.

use crate::consts::HubType;
use crate::error::Result;
use crate::session::Hub;

/// Everything the session needs to know about a specific hub model that
/// isn't already carried on the wire (§4.8).
pub trait HubModel: Send + Sync {
    fn hub_type(&self) -> HubType;
    /// Symbolic name → internal port id, seeded into the registry at
    /// boot (§4.4, §4.8). Virtual ports formed later from an attach
    /// event get their combined name (`"A+B"`) added dynamically.
    fn port_names(&self) -> &'static [(&'static str, u8)];
    /// Built-in ports that are always present and that `wait_for_devices`
    /// blocks on by default.
    fn internal_ports(&self) -> &'static [u8];
}

pub struct MoveHubModel;

impl HubModel for MoveHubModel {
    fn hub_type(&self) -> HubType {
        HubType::MoveHub
    }

    fn port_names(&self) -> &'static [(&'static str, u8)] {
        &[
            ("A", 0x00),
            ("B", 0x01),
            ("C", 0x02),
            ("D", 0x03),
            ("AB", 0x10),
            ("HUB_LED", 0x32),
            ("TILT_SENSOR", 0x3a),
            ("CURRENT", 0x3b),
            ("VOLTAGE", 0x3c),
        ]
    }

    fn internal_ports(&self) -> &'static [u8] {
        &[0x32, 0x3a, 0x3b, 0x3c]
    }
}

pub struct TechnicHubModel;

impl HubModel for TechnicHubModel {
    fn hub_type(&self) -> HubType {
        HubType::TechnicMediumHub
    }

    fn port_names(&self) -> &'static [(&'static str, u8)] {
        &[
            ("A", 0x00),
            ("B", 0x01),
            ("C", 0x02),
            ("D", 0x03),
            ("HUB_LED", 0x32),
            ("CURRENT", 0x3b),
            ("VOLTAGE", 0x3c),
            ("TEMPERATURE2", 0x3d),
            ("TEMPERATURE", 0x60),
            ("ACCELEROMETER", 0x61),
            ("GYRO_SENSOR", 0x62),
            ("TILT_SENSOR", 0x63),
        ]
    }

    fn internal_ports(&self) -> &'static [u8] {
        &[0x32, 0x3b, 0x3c, 0x3d, 0x60, 0x61, 0x62, 0x63]
    }
}

/// Hubs this driver talks to but has no distinct port-name map for yet
/// (Hub, Remote Control, Duplo Train Base, Wedo 2 Smart Hub): only the
/// hub LED is statically known, everything else attaches dynamically.
pub struct GenericHubModel(pub HubType);

impl HubModel for GenericHubModel {
    fn hub_type(&self) -> HubType {
        self.0
    }

    fn port_names(&self) -> &'static [(&'static str, u8)] {
        &[("HUB_LED", 0x32)]
    }

    fn internal_ports(&self) -> &'static [u8] {
        &[0x32]
    }
}

pub fn model_for(hub_type: HubType) -> Box<dyn HubModel> {
    match hub_type {
        HubType::MoveHub => Box::new(MoveHubModel),
        HubType::TechnicMediumHub => Box::new(TechnicHubModel),
        other => Box::new(GenericHubModel(other)),
    }
}

/// Post-attach boot steps (§4.8): seed the port-name map, remember the
/// hub type, wait for the model's internal ports to attach, then log a
/// status line.
pub async fn boot(hub: &Hub, model: &dyn HubModel) -> Result<()> {
    hub.registry().set_hub_type(model.hub_type());
    hub.registry().seed_port_names(model.port_names());
    hub.wait_for_devices(model.internal_ports()).await?;
    hub.report_status().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_hub_port_names_match_reference_layout() {
        let model = MoveHubModel;
        let names: std::collections::HashMap<_, _> = model.port_names().iter().copied().collect();
        assert_eq!(names["A"], 0x00);
        assert_eq!(names["AB"], 0x10);
        assert_eq!(names["VOLTAGE"], 0x3c);
    }

    #[test]
    fn technic_hub_has_imu_ports_move_hub_lacks() {
        let model = TechnicHubModel;
        let names: std::collections::HashMap<_, _> = model.port_names().iter().copied().collect();
        assert_eq!(names["ACCELEROMETER"], 0x61);
        assert_eq!(names["GYRO_SENSOR"], 0x62);
        assert!(!MoveHubModel.port_names().iter().any(|(n, _)| *n == "ACCELEROMETER"));
    }

    #[test]
    fn unrecognised_hub_falls_back_to_generic_model() {
        let model = model_for(HubType::RemoteControl);
        assert_eq!(model.internal_ports(), &[0x32]);
    }
}
