//! Built-in filters.

mod buffer;
mod crop;
mod overlay;
mod rotate;
mod scale;

pub use buffer::{BufferSink, BufferSource, NullFilter};
pub use crop::CropFilter;
pub use overlay::OverlayFilter;
pub use rotate::RotateFilter;
pub use scale::ScaleFilter;

use crate::error::{NativeError, Result};
use crate::graph::filter::{FilterDefinition, FilterRegistry};
use crate::pixfmt::{NativeColorRange, PixelFormat};
use crate::sample::CompLayout;

/// Register every built-in filter with `registry`.
pub fn register_builtins(registry: &FilterRegistry) {
    registry.register(FilterDefinition::new("buffer", BufferSource::OPTIONS, |args| {
        Ok(Box::new(BufferSource::from_args(args)?))
    }));
    registry.register(FilterDefinition::new("buffersink", &[], |_| {
        Ok(Box::new(BufferSink))
    }));
    registry.register(FilterDefinition::new("null", &[], |_| Ok(Box::new(NullFilter))));
    registry.register(FilterDefinition::new("scale", ScaleFilter::OPTIONS, |args| {
        Ok(Box::new(ScaleFilter::from_args(args)?))
    }));
    registry.register(FilterDefinition::new("crop", CropFilter::OPTIONS, |args| {
        Ok(Box::new(CropFilter::from_args(args)?))
    }));
    registry.register(FilterDefinition::new("rotate", RotateFilter::OPTIONS, |args| {
        Ok(Box::new(RotateFilter::from_args(args)?))
    }));
    registry.register(FilterDefinition::new("overlay", OverlayFilter::OPTIONS, |args| {
        Ok(Box::new(OverlayFilter::from_args(args)?))
    }));
}

/// A dimension given as a number or relative to the input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DimExpr {
    Fixed(i64),
    InputWidth,
    InputHeight,
    /// Diagonal of the input, rounded up
    Diagonal,
}

impl DimExpr {
    pub(crate) fn parse(filter: &str, key: &str, value: &str) -> Result<Self> {
        match value.trim() {
            "iw" | "in_w" => Ok(Self::InputWidth),
            "ih" | "in_h" => Ok(Self::InputHeight),
            "hypot(iw,ih)" | "diag" => Ok(Self::Diagonal),
            v => v.parse().map(Self::Fixed).map_err(|_| {
                NativeError::InvalidArgument(format!("{filter}: invalid value '{value}' for '{key}'"))
            }),
        }
    }

    pub(crate) fn eval(self, in_w: u32, in_h: u32) -> i64 {
        match self {
            Self::Fixed(v) => v,
            Self::InputWidth => in_w as i64,
            Self::InputHeight => in_h as i64,
            Self::Diagonal => (in_w as f64).hypot(in_h as f64).ceil() as i64,
        }
    }
}

/// Largest output dimension any filter accepts.
pub(crate) const MAX_DIMENSION: i64 = 1 << 15;

/// Value written where there is no picture: black, with alpha opaque or
/// transparent.
pub(crate) fn fill_value(
    format: PixelFormat,
    range: NativeColorRange,
    index: usize,
    layout: &CompLayout,
    opaque: bool,
) -> f32 {
    if index == 3 {
        return if opaque { layout.max } else { 0.0 };
    }
    if !format.is_yuv() {
        return 0.0;
    }
    let depth = (layout.max + 1.0).log2().round() as u32;
    if index == 0 {
        let full = format.is_full_range_alias() || range == NativeColorRange::Jpeg;
        if full {
            0.0
        } else {
            (16u32 << depth.saturating_sub(8)) as f32
        }
    } else {
        (1u32 << depth.saturating_sub(1)) as f32
    }
}
