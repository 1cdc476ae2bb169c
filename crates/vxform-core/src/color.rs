//! Colour space and range tags carried by generic frame buffers.

use serde::{Deserialize, Serialize};

/// Colour space (primaries + matrix) of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorSpace {
    /// sRGB (computer graphics RGB)
    Srgb,
    /// ITU-R BT.601 (SD broadcast)
    Bt601,
    /// ITU-R BT.709 (HD broadcast)
    #[default]
    Bt709,
    /// ITU-R BT.2020 (UHD broadcast)
    Bt2020,
}

impl ColorSpace {
    /// Luma coefficients (Kr, Kb) for the YUV matrix of this space.
    pub fn luma_coefficients(self) -> (f64, f64) {
        match self {
            Self::Bt601 => (0.299, 0.114),
            Self::Bt709 | Self::Srgb => (0.2126, 0.0722),
            Self::Bt2020 => (0.2627, 0.0593),
        }
    }
}

/// Quantisation range of sample values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorRange {
    /// Limited / studio / "MPEG" range (16-235 for 8-bit luma)
    #[default]
    Narrow,
    /// Full / PC / "JPEG" range (0-255 for 8-bit)
    Full,
}

impl ColorRange {
    #[inline]
    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }
}
