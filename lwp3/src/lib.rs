// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host-side driver for LEGO Wireless Protocol 3.0.00 (LWP3) Smart Hubs.
//!
//! `lwp3` scans for and connects to a hub over Bluetooth Low Energy,
//! speaks the LWP3 frame/message codec, and exposes typed peripheral
//! wrappers (motors, LEDs, sensors) built on top of the generic
//! attach/detach and port-value machinery. A minimal connection looks
//! like:
//!
//! ```no_run
//! # async fn example() -> lwp3::error::Result<()> {
//! let hub = lwp3::connect(None, Some("Technic Hub"), &Default::default()).await?;
//! let motor = hub.get_device_by_port_name("A");
//! # let _ = motor;
//! # Ok(())
//! # }
//! ```

pub mod bytes;
pub mod consts;
pub mod error;
pub mod hub_model;
pub(crate) mod macros;
pub mod message;
pub mod peripheral;
pub mod registry;
pub mod session;
pub mod transport;

use std::collections::HashSet;

pub use error::{Error, Result};
pub use message::Message;
pub use registry::Peripheral;
pub use session::{Hub, Identity};
pub use transport::Transport;

/// Scan for, connect to, and boot a hub in one call: finds a matching
/// BLE peripheral, opens the LWP3 session, then runs the matched hub
/// model's boot sequence (port-name seeding, waiting for internal
/// ports, and an initial status log) (§4.8, §6).
///
/// `hub_mac` and `hub_name` are alternative filters; when both are
/// `None` the first LWP3 device seen is used. MACs in
/// `prohibited_macs` are skipped even if they otherwise match.
pub async fn connect(
    hub_mac: Option<&str>,
    hub_name: Option<&str>,
    prohibited_macs: &HashSet<String>,
) -> Result<Hub> {
    let transport = transport::connect(hub_mac, hub_name, prohibited_macs).await?;
    let hub_type = transport.hub_type();
    let hub = Hub::connect(Box::new(transport)).await?;
    let model = hub_model::model_for(hub_type);
    hub_model::boot(&hub, model.as_ref()).await?;
    Ok(hub)
}
