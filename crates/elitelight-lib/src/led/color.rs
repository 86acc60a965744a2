//! Colour parsing and formatting.
//!
//! Colours are plain 8-bit RGB triples. The named palette matches the colour
//! choices offered in the plugin settings.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_color(*self))
    }
}

/// Named colours, in the order they are listed to the user.
pub const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("red", Rgb::new(255, 0, 0)),
    ("orange", Rgb::new(255, 50, 0)),
    ("yellow", Rgb::new(255, 255, 0)),
    ("green", Rgb::new(0, 255, 0)),
    ("blue", Rgb::new(0, 0, 255)),
    ("white", Rgb::new(255, 255, 255)),
    ("purple", Rgb::new(128, 0, 128)),
    ("cyan", Rgb::new(0, 255, 255)),
    ("pink", Rgb::new(255, 192, 203)),
    ("magenta", Rgb::new(255, 0, 255)),
    ("lime", Rgb::new(0, 255, 0)),
    ("olive", Rgb::new(128, 128, 0)),
    ("teal", Rgb::new(0, 128, 128)),
    ("navy", Rgb::new(0, 0, 128)),
    ("maroon", Rgb::new(128, 0, 0)),
    ("silver", Rgb::new(192, 192, 192)),
    ("gray", Rgb::new(128, 128, 128)),
    ("brown", Rgb::new(165, 42, 42)),
    ("gold", Rgb::new(255, 215, 0)),
    ("light_blue", Rgb::new(173, 216, 230)),
    ("dark_green", Rgb::new(0, 100, 0)),
    ("dark_red", Rgb::new(139, 0, 0)),
    ("orchid", Rgb::new(218, 112, 214)),
];

/// Look up a named colour (case-insensitive).
pub fn named_color(name: &str) -> Option<Rgb> {
    let name = name.trim();
    NAMED_COLORS
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|&(_, rgb)| rgb)
}

/// Parse a colour string.
///
/// Accepts:
/// - Named: `"red"`, `"light_blue"`, ... (see [`NAMED_COLORS`])
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Triplet: `"255,0,0"`
pub fn parse_color(s: &str) -> crate::error::Result<Rgb> {
    let s = s.trim();

    if let Some(rgb) = named_color(s) {
        return Ok(rgb);
    }

    if s.contains(',') {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(crate::ElitelightError::Color(format!(
                "Invalid colour triplet: {s} (use r,g,b)"
            )));
        }
        let mut channels = [0u8; 3];
        for (slot, part) in channels.iter_mut().zip(&parts) {
            *slot = part.parse::<u8>().map_err(|_| {
                crate::ElitelightError::Color(format!("Invalid colour channel {part:?} in {s}"))
            })?;
        }
        return Ok(Rgb::new(channels[0], channels[1], channels[2]));
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return Err(crate::ElitelightError::Color(format!(
            "Invalid colour: {s} (use #RRGGBB, r,g,b or a colour name)"
        )));
    }
    let val = u32::from_str_radix(hex, 16)
        .map_err(|_| crate::ElitelightError::Color(format!("Invalid hex colour: {s}")))?;
    Ok(Rgb::new(
        ((val >> 16) & 0xFF) as u8,
        ((val >> 8) & 0xFF) as u8,
        (val & 0xFF) as u8,
    ))
}

/// Format a colour as `#RRGGBB`.
pub fn format_color(rgb: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", rgb.r, rgb.g, rgb.b)
}
