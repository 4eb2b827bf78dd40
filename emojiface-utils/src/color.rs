//! Overlay color handling.

use image::Rgba;
use serde::{Deserialize, Serialize};

/// Simple RGBA color stored in 8-bit channels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RgbaColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl RgbaColor {
    /// Constructs an opaque RGB color.
    pub const fn opaque(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            alpha: 255,
        }
    }

    /// Converts into the `image` crate pixel type.
    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.red, self.green, self.blue, self.alpha])
    }
}

impl Default for RgbaColor {
    /// Glyphs are painted black unless configured otherwise.
    fn default() -> Self {
        Self::opaque(0, 0, 0)
    }
}

impl From<RgbaColor> for Rgba<u8> {
    fn from(color: RgbaColor) -> Self {
        color.to_rgba()
    }
}

/// Parse a hexadecimal color string. Accepts `#RGB`, `#RRGGBB`, `#RRGGBBAA`, with or without `#`.
pub fn parse_hex_color(input: &str) -> Option<RgbaColor> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix('#')
        .or_else(|| trimmed.strip_prefix("0x"))
        .unwrap_or(trimmed);
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    match hex.len() {
        3 => Some(RgbaColor::opaque(
            nibble(&hex[0..1])?,
            nibble(&hex[1..2])?,
            nibble(&hex[2..3])?,
        )),
        6 => Some(RgbaColor::opaque(
            byte(&hex[0..2])?,
            byte(&hex[2..4])?,
            byte(&hex[4..6])?,
        )),
        8 => Some(RgbaColor {
            red: byte(&hex[0..2])?,
            green: byte(&hex[2..4])?,
            blue: byte(&hex[4..6])?,
            alpha: byte(&hex[6..8])?,
        }),
        _ => None,
    }
}

fn byte(slice: &str) -> Option<u8> {
    u8::from_str_radix(slice, 16).ok()
}

fn nibble(slice: &str) -> Option<u8> {
    let nib = u8::from_str_radix(slice, 16).ok()?;
    Some((nib << 4) | nib)
}
