//! LED colors and per-mode renderings.

mod color;

pub use color::{Rgb, parse_color};

/// Device-specific shape of a rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// How many LEDs to light on multi-LED devices. `None` = all of them.
    pub led_count: Option<u8>,
}

/// A fully resolved rendering for one mode on one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rendering {
    pub color: Rgb,
    pub options: RenderOptions,
}
