// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The BLE transport adapter (C3): a thin boundary over the radio with no
//! knowledge of LWP3 framing. `Transport` is the trait the hub session
//! (C4) drives; [`BtleplugTransport`] is the real-world implementation,
//! scanning for and connecting to a hub over `btleplug`.

use crate::consts::{self, BLEManufacturerData, HubType};
use crate::error::{Error, OptionContext, Result};
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, PeripheralProperties,
    ScanFilter, ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use num_traits::FromPrimitive;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

/// LWP3 manufacturer id, as assigned by the Bluetooth SIG to the LEGO
/// Group; carried in BLE advertisement manufacturer-specific data.
const LEGO_MANUFACTURER_ID: u16 = 919;

/// A notification callback: handle (opaque, currently unused by the
/// single-characteristic LWP3 GATT profile) plus the raw payload.
pub type NotifyHandler = Box<dyn Fn(u16, Vec<u8>) + Send + Sync>;

/// Capability set the hub session needs from a BLE link (§4.3, §6). No
/// framing or protocol logic belongs on this trait: it is pure transport.
#[async_trait]
pub trait Transport: Debug + Send + Sync {
    async fn write(&self, handle: u16, bytes: &[u8]) -> Result<()>;
    async fn enable_notifications(&self) -> Result<()>;
    fn set_notify_handler(&self, handler: NotifyHandler);
    async fn disconnect(&self) -> Result<()>;
    async fn is_alive(&self) -> Result<bool>;
    fn name(&self) -> String;
    fn address(&self) -> String;
    fn hub_type(&self) -> HubType;
}

fn identify_hub_type(props: &PeripheralProperties) -> Option<HubType> {
    if props.services.contains(&consts::bleservice::WEDO2_SMART_HUB) {
        return Some(HubType::Wedo2SmartHub);
    }
    if !props.services.contains(&consts::bleservice::LPF2_HUB) {
        return None;
    }
    let manufacturer_id = props.manufacturer_data.get(&LEGO_MANUFACTURER_ID)?;
    let id_byte = *manufacturer_id.get(1)?;
    use BLEManufacturerData::*;
    Some(match BLEManufacturerData::from_u8(id_byte)? {
        DuploTrainBaseId => HubType::DuploTrainBase,
        HubId => HubType::Hub,
        MoveHubId => HubType::MoveHub,
        RemoteControlId => HubType::RemoteControl,
        TechnicMediumHubId => HubType::TechnicMediumHub,
    })
}

fn name_matches(candidate: &str, wanted: &str) -> bool {
    candidate.eq_ignore_ascii_case(wanted)
}

/// Scan for and connect to a single LWP3 hub (§6's `connect` contract):
/// matches by exact MAC, by case-insensitive name, or (if neither is
/// given) the first hub seen; skips any address in `prohibited_macs`.
pub async fn connect(
    hub_mac: Option<&str>,
    hub_name: Option<&str>,
    prohibited_macs: &HashSet<String>,
) -> Result<BtleplugTransport> {
    let manager = Manager::new().await?;
    let adapter = manager
        .adapters()
        .await?
        .into_iter()
        .next()
        .context("no Bluetooth adapter available")?;

    let mut events = adapter.events().await?;
    adapter.start_scan(ScanFilter::default()).await?;

    while let Some(event) = events.next().await {
        let CentralEvent::DeviceDiscovered(id) = event else { continue };
        let peripheral = adapter.peripheral(&id).await?;
        let Some(props) = peripheral.properties().await? else { continue };
        let Some(hub_type) = identify_hub_type(&props) else { continue };
        let address = props.address.to_string();
        if prohibited_macs.contains(&address) {
            continue;
        }
        let name = props.local_name.clone().unwrap_or_else(|| "unknown".into());

        let matches = match (hub_mac, hub_name) {
            (Some(mac), _) => address.eq_ignore_ascii_case(mac),
            (None, Some(n)) => name_matches(&name, n),
            (None, None) => true,
        };
        if !matches {
            continue;
        }

        adapter.stop_scan().await?;
        return BtleplugTransport::connect(peripheral, hub_type, name, address).await;
    }

    Err(Error::TimedOut("BLE scan ended without finding a matching hub".into()))
}

/// A real `btleplug`-backed [`Transport`]. Carries no LWP3 framing
/// knowledge: it writes whatever bytes the hub session hands it to the
/// LWP3 characteristic, and forwards raw notification payloads back.
pub struct BtleplugTransport {
    peripheral: Peripheral,
    characteristic: Characteristic,
    hub_type: HubType,
    name: String,
    address: String,
    handler: Arc<Mutex<Option<NotifyHandler>>>,
}

impl std::fmt::Debug for BtleplugTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleplugTransport")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("hub_type", &self.hub_type)
            .finish()
    }
}

impl BtleplugTransport {
    async fn connect(
        peripheral: Peripheral,
        hub_type: HubType,
        name: String,
        address: String,
    ) -> Result<Self> {
        peripheral.connect().await?;
        peripheral.discover_services().await?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == *consts::blecharacteristic::LPF2_ALL)
            .context("hub does not advertise the LPF2_ALL characteristic")?;

        let transport = Self {
            peripheral,
            characteristic,
            hub_type,
            name,
            address,
            handler: Arc::new(Mutex::new(None)),
        };
        transport.spawn_notification_pump();
        Ok(transport)
    }

    pub fn hub_type(&self) -> HubType {
        self.hub_type
    }

    /// Forward every BLE notification on the LWP3 characteristic to
    /// whatever handler is installed at the time, if any. Installed once
    /// at connect time; runs for the lifetime of the transport.
    fn spawn_notification_pump(&self) {
        let peripheral = self.peripheral.clone();
        let handler = self.handler.clone();
        tokio::spawn(async move {
            let mut stream = match peripheral.notifications().await {
                Ok(s) => s,
                Err(e) => {
                    log::error!("failed to subscribe to notifications: {e}");
                    return;
                }
            };
            while let Some(ValueNotification { value, .. }) = stream.next().await {
                let guard = handler.lock().unwrap();
                if let Some(cb) = guard.as_ref() {
                    cb(0, value);
                } else {
                    log::trace!("dropped notification: no handler installed yet");
                }
            }
            log::debug!("notification stream ended");
        });
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn write(&self, _handle: u16, bytes: &[u8]) -> Result<()> {
        self.peripheral
            .write(&self.characteristic, bytes, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    async fn enable_notifications(&self) -> Result<()> {
        self.peripheral.subscribe(&self.characteristic).await?;
        Ok(())
    }

    fn set_notify_handler(&self, handler: NotifyHandler) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn is_alive(&self) -> Result<bool> {
        Ok(self.peripheral.is_connected().await?)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn address(&self) -> String {
        self.address.clone()
    }

    fn hub_type(&self) -> HubType {
        self.hub_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_matching_is_case_insensitive() {
        assert!(name_matches("Technic Hub", "technic hub"));
        assert!(!name_matches("Technic Hub", "Move Hub"));
    }
}
