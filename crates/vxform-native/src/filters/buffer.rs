//! Graph endpoints: `buffer` sources, `buffersink` sinks and `null`.

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::filter::{parse_value, Filter, FilterArgs, LinkFormat};
use crate::pixfmt::{NativeColorRange, NativeColorSpace, PixelFormat};

/// Source node that frames are pushed into.
#[derive(Debug, Clone)]
pub struct BufferSource {
    format: LinkFormat,
}

impl BufferSource {
    pub const OPTIONS: &'static [&'static str] =
        &["width", "height", "pix_fmt", "video_size", "colorspace", "range"];

    pub fn new(format: LinkFormat) -> Self {
        Self { format }
    }

    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        let (mut width, mut height) = (args.parse_or("width", 0u32)?, args.parse_or("height", 0u32)?);
        if let Some(size) = args.get("video_size") {
            let (w, h) = size.split_once('x').ok_or_else(|| {
                NativeError::InvalidArgument(format!("buffer: invalid video_size '{size}'"))
            })?;
            width = parse_value("buffer", "video_size", w)?;
            height = parse_value("buffer", "video_size", h)?;
        }
        if width == 0 || height == 0 {
            return Err(NativeError::InvalidArgument(format!(
                "buffer: invalid size {width}x{height}"
            )));
        }
        let format: PixelFormat = args
            .get("pix_fmt")
            .ok_or_else(|| NativeError::InvalidArgument("buffer: pix_fmt is required".into()))?
            .parse()?;
        let color_space = match args.get("colorspace") {
            Some(name) => NativeColorSpace::from_name(name).ok_or_else(|| {
                NativeError::InvalidArgument(format!("buffer: unknown colorspace '{name}'"))
            })?,
            None => NativeColorSpace::Unspecified,
        };
        let color_range = match args.get("range") {
            Some(name) => NativeColorRange::from_name(name).ok_or_else(|| {
                NativeError::InvalidArgument(format!("buffer: unknown range '{name}'"))
            })?,
            None => NativeColorRange::Unspecified,
        };
        Ok(Self::new(LinkFormat {
            width,
            height,
            format,
            color_space,
            color_range,
        }))
    }
}

impl Filter for BufferSource {
    fn name(&self) -> &'static str {
        "buffer"
    }

    fn nb_inputs(&self) -> usize {
        0
    }

    fn configure(&mut self, _inputs: &[LinkFormat]) -> Result<LinkFormat> {
        Ok(self.format)
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        let frame = inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("buffer: no frame".into()))?;
        if !self.format.accepts(&frame) {
            return Err(NativeError::InvalidArgument(format!(
                "buffer: frame {}x{} {} does not match source {}x{} {}",
                frame.width,
                frame.height,
                frame.format,
                self.format.width,
                self.format.height,
                self.format.format
            )));
        }
        Ok(frame)
    }
}

/// Sink node frames are pulled from.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferSink;

impl Filter for BufferSink {
    fn name(&self) -> &'static str {
        "buffersink"
    }

    fn nb_outputs(&self) -> usize {
        0
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        inputs
            .first()
            .copied()
            .ok_or_else(|| NativeError::GraphConfig("buffersink: no input".into()))
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("buffersink: no frame".into()))
    }
}

/// Passes frames through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFilter;

impl Filter for NullFilter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        inputs
            .first()
            .copied()
            .ok_or_else(|| NativeError::GraphConfig("null: no input".into()))
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("null: no frame".into()))
    }
}
