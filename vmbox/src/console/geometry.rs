//! Pixel-to-physical geometry conversion for the console display.
//!
//! The transport wants physical dimensions in 0.01 mm units plus a device
//! scale percentage; the window layer only knows pixels and a DPI percent.
//! [`DisplayGeometry::from_window`] bridges the two.

/// 0.01 mm units per inch.
const CENTI_MM_PER_INCH: u64 = 2_540;

/// Baseline dots-per-inch at 100% scale.
const BASELINE_DPI: u64 = 96;

/// Screen orientation, carried to the transport as degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    LandscapeFlipped,
    PortraitFlipped,
}

impl Orientation {
    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Landscape => 0,
            Orientation::Portrait => 90,
            Orientation::LandscapeFlipped => 180,
            Orientation::PortraitFlipped => 270,
        }
    }
}

/// One full geometry update as the transport consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width_px: u32,
    pub height_px: u32,
    /// Physical width in 0.01 mm units.
    pub physical_width: u32,
    /// Physical height in 0.01 mm units.
    pub physical_height: u32,
    pub orientation: Orientation,
    /// Window DPI as a percentage of the 96-DPI baseline.
    pub dpi_percent: u32,
    /// Scale percentage the transport applies to its framebuffer.
    pub device_scale_percent: u32,
}

impl DisplayGeometry {
    /// Derive a full geometry update from window pixel dimensions and DPI.
    pub fn from_window(width_px: u32, height_px: u32, dpi_percent: u32) -> Self {
        let dpi_percent = dpi_percent.max(1);
        Self {
            width_px,
            height_px,
            physical_width: px_to_centi_mm(width_px, dpi_percent),
            physical_height: px_to_centi_mm(height_px, dpi_percent),
            orientation: Orientation::Landscape,
            dpi_percent,
            device_scale_percent: device_scale_for_dpi(dpi_percent),
        }
    }
}

/// Convert a pixel dimension to 0.01 mm units at the given DPI percent.
///
/// Saturates at `u32::MAX` for dimensions too large to represent.
pub fn px_to_centi_mm(px: u32, dpi_percent: u32) -> u32 {
    let dpi_percent = dpi_percent.max(1) as u64;
    let centi_mm = px as u64 * CENTI_MM_PER_INCH * 100 / (BASELINE_DPI * dpi_percent);
    u32::try_from(centi_mm).unwrap_or(u32::MAX)
}

/// Device scale percentage for a window DPI percent.
///
/// The transport only understands the three fixed scale steps, so window
/// DPI is bucketed to the nearest step below it.
pub fn device_scale_for_dpi(dpi_percent: u32) -> u32 {
    if dpi_percent < 140 {
        100
    } else if dpi_percent < 180 {
        140
    } else {
        180
    }
}
