//! Color parsing and formatting for indicator devices.

use std::fmt;

/// A device-agnostic 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    pub fn is_off(self) -> bool {
        self == Rgb::OFF
    }

    /// Bytes in WS2812 wire order (green, red, blue).
    pub fn grb(self) -> [u8; 3] {
        [self.g, self.r, self.b]
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// Parse a color string.
///
/// Accepts:
/// - Hex: `"#FF0000"`, `"FF0000"`, `"#ff0000"`
/// - Named: `"red"`, `"green"`, `"blue"`, `"white"`, `"orange"`, `"yellow"`,
///   `"purple"`, `"cyan"`, `"pink"`, `"off"`/`"black"`
pub fn parse_color(s: &str) -> crate::error::Result<Rgb> {
    let s = s.trim();

    match s.to_lowercase().as_str() {
        "red" => return Ok(Rgb::new(0xFF, 0x00, 0x00)),
        "green" => return Ok(Rgb::new(0x00, 0xFF, 0x00)),
        "blue" => return Ok(Rgb::new(0x00, 0x00, 0xFF)),
        "white" => return Ok(Rgb::new(0xFF, 0xFF, 0xFF)),
        "orange" => return Ok(Rgb::new(0xFF, 0x80, 0x00)),
        "yellow" => return Ok(Rgb::new(0xFF, 0xFF, 0x00)),
        "purple" => return Ok(Rgb::new(0x80, 0x00, 0xFF)),
        "cyan" => return Ok(Rgb::new(0x00, 0xFF, 0xFF)),
        "pink" => return Ok(Rgb::new(0xFF, 0x14, 0x93)),
        "off" | "black" => return Ok(Rgb::OFF),
        _ => {}
    }

    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(crate::SessionlightError::Color(format!(
            "Invalid color: {s} (use #RRGGBB or a color name)"
        )));
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&hex[range], 16)
            .map_err(|_| crate::SessionlightError::Color(format!("Invalid hex color: {s}")))
    };
    Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}
