//! `scale`: resize (and optionally convert) frames.

use super::{DimExpr, MAX_DIMENSION};
use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::filter::{Filter, FilterArgs, LinkFormat};
use crate::pixfmt::PixelFormat;
use crate::scale::{ColorDetails, FrameShape, Interpolation, ScaleContext};

/// Resizes to `w`x`h`. A negative dimension keeps the aspect ratio and is
/// rounded to a multiple of its magnitude; zero keeps the input size.
pub struct ScaleFilter {
    w: DimExpr,
    h: DimExpr,
    interp: Interpolation,
    out_format: Option<PixelFormat>,
    input: Option<LinkFormat>,
    output: Option<LinkFormat>,
    ctx: Option<ScaleContext>,
}

impl ScaleFilter {
    pub const OPTIONS: &'static [&'static str] = &["w", "h", "flags", "format", "width", "height"];

    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        let w = match args.get_any(&["w", "width"]) {
            Some(v) => DimExpr::parse("scale", "w", v)?,
            None => DimExpr::InputWidth,
        };
        let h = match args.get_any(&["h", "height"]) {
            Some(v) => DimExpr::parse("scale", "h", v)?,
            None => DimExpr::InputHeight,
        };
        let interp = match args.get("flags") {
            Some(name) => Interpolation::from_name(name).ok_or_else(|| {
                NativeError::InvalidArgument(format!("scale: unknown flags '{name}'"))
            })?,
            None => Interpolation::Bilinear,
        };
        let out_format = args.get("format").map(str::parse).transpose()?;
        Ok(Self {
            w,
            h,
            interp,
            out_format,
            input: None,
            output: None,
            ctx: None,
        })
    }

    fn output_size(&self, in_w: u32, in_h: u32) -> Result<(u32, u32)> {
        let mut w = self.w.eval(in_w, in_h);
        let mut h = self.h.eval(in_w, in_h);
        if w == 0 {
            w = in_w as i64;
        }
        if h == 0 {
            h = in_h as i64;
        }
        if w < 0 && h < 0 {
            (w, h) = (in_w as i64, in_h as i64);
        } else if w < 0 {
            w = keep_aspect(h, in_w, in_h, -w);
        } else if h < 0 {
            h = keep_aspect(w, in_h, in_w, -h);
        }
        if !(1..=MAX_DIMENSION).contains(&w) || !(1..=MAX_DIMENSION).contains(&h) {
            return Err(NativeError::InvalidArgument(format!(
                "scale: output size {w}x{h} out of range"
            )));
        }
        Ok((w as u32, h as u32))
    }
}

/// `other * num / den`, rounded to a multiple of `multiple`.
fn keep_aspect(other: i64, num: u32, den: u32, multiple: i64) -> i64 {
    let exact = other as f64 * num as f64 / den as f64;
    let m = multiple as f64;
    (((exact / m).round()) * m).max(m) as i64
}

impl Filter for ScaleFilter {
    fn name(&self) -> &'static str {
        "scale"
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        let input = *inputs
            .first()
            .ok_or_else(|| NativeError::GraphConfig("scale: no input".into()))?;
        let (w, h) = self.output_size(input.width, input.height)?;
        let output = LinkFormat {
            format: self.out_format.unwrap_or(input.format),
            ..input.with_size(w, h)
        };
        let stale = self.ctx.as_ref().is_some_and(|ctx| {
            ctx.source() != FrameShape::new(input.width, input.height, input.format)
                || ctx.destination() != FrameShape::new(output.width, output.height, output.format)
        });
        if stale {
            self.ctx = None;
        }
        self.input = Some(input);
        self.output = Some(output);
        Ok(output)
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        let frame = inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("scale: no frame".into()))?;
        let output = self
            .output
            .ok_or_else(|| NativeError::GraphConfig("scale: not configured".into()))?;
        if output.accepts(&frame) {
            return Ok(frame);
        }
        if self.ctx.is_none() {
            self.ctx = Some(ScaleContext::new(
                FrameShape::of(&frame),
                FrameShape::new(output.width, output.height, output.format),
                self.interp,
            )?);
        }
        let Some(ctx) = self.ctx.as_mut() else {
            return Err(NativeError::GraphConfig("scale: no context".into()));
        };
        ctx.set_color_details(ColorDetails {
            src_space: frame.color_space,
            src_range: frame.color_range,
            dst_space: frame.color_space,
            dst_range: frame.color_range,
        });
        ctx.scale_new(&frame)
    }

    fn process_command(&mut self, cmd: &str, arg: &str) -> Result<()> {
        match cmd {
            "w" | "width" => self.w = DimExpr::parse("scale", cmd, arg)?,
            "h" | "height" => self.h = DimExpr::parse("scale", cmd, arg)?,
            "flags" => {
                self.interp = Interpolation::from_name(arg).ok_or_else(|| {
                    NativeError::InvalidArgument(format!("scale: unknown flags '{arg}'"))
                })?;
                self.ctx = None;
            }
            _ => {
                return Err(NativeError::NotSupported(format!(
                    "scale does not accept command '{cmd}'"
                )))
            }
        }
        Ok(())
    }
}
