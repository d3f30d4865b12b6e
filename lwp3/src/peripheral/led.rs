//! LED peripherals (C7): the single-brightness hub LED and the
//! colour/RGB LED fitted to Powered-Up/Move/Technic hubs.

use super::PeripheralCore;
use crate::consts::Color;
use crate::error::{Error, Result};
use num_traits::FromPrimitive;
use std::sync::Arc;

pub const MODE_BRIGHTNESS: u8 = 0;
pub const MODE_INDEX: u8 = 0;
pub const MODE_RGB: u8 = 1;

pub struct LedLight {
    core: Arc<PeripheralCore>,
}

impl LedLight {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    pub async fn set_brightness(&self, brightness: u8) -> Result<()> {
        self.core.write_direct_mode(MODE_BRIGHTNESS, &[brightness]).await
    }
}

pub struct LedRgb {
    core: Arc<PeripheralCore>,
}

impl LedRgb {
    pub fn new(core: Arc<PeripheralCore>) -> Self {
        Self { core }
    }

    pub fn core(&self) -> &Arc<PeripheralCore> {
        &self.core
    }

    /// `Color::None` (0xFF) is coerced to `Color::Black`; any other
    /// foreign index is rejected (§4.7).
    pub async fn set_color(&self, color: Color) -> Result<()> {
        let index = if color == Color::None { Color::Black as u8 } else { color as u8 };
        if Color::from_u8(index).is_none() {
            return Err(Error::InvalidArgument(format!("unknown colour index {index:#04x}")));
        }
        self.core.write_direct_mode(MODE_INDEX, &[index]).await
    }

    pub async fn set_rgb(&self, r: u8, g: u8, b: u8) -> Result<()> {
        self.core.write_direct_mode(MODE_RGB, &[r, g, b]).await
    }
}

/// Decode a `PortValueSingle` payload from an LED RGB peripheral into
/// either an index or an RGB triple, matching whichever mode is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedRgbValue {
    Index(u8),
    Rgb(u8, u8, u8),
}

pub fn decode_rgb_value(mode: u8, data: &[u8]) -> Result<LedRgbValue> {
    match mode {
        MODE_INDEX => Ok(LedRgbValue::Index(*data.first().unwrap_or(&0))),
        MODE_RGB => Ok(LedRgbValue::Rgb(
            *data.first().unwrap_or(&0),
            *data.get(1).unwrap_or(&0),
            *data.get(2).unwrap_or(&0),
        )),
        other => Err(Error::InvalidFrame(format!("unexpected LED RGB mode {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_index_and_rgb() {
        assert_eq!(decode_rgb_value(MODE_INDEX, &[9]).unwrap(), LedRgbValue::Index(9));
        assert_eq!(decode_rgb_value(MODE_RGB, &[1, 2, 3]).unwrap(), LedRgbValue::Rgb(1, 2, 3));
    }
}
