//! `crop`: zero-copy sub-rectangle of the input.

use super::DimExpr;
use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::filter::{parse_value, Filter, FilterArgs, LinkFormat};

/// Crops `w`x`h` at (`x`, `y`). Unset offsets centre the window.
pub struct CropFilter {
    w: DimExpr,
    h: DimExpr,
    x: Option<i64>,
    y: Option<i64>,
    input: Option<LinkFormat>,
    window: (u32, u32, u32, u32),
}

impl CropFilter {
    pub const OPTIONS: &'static [&'static str] = &["w", "h", "x", "y"];

    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        let w = match args.get("w") {
            Some(v) => DimExpr::parse("crop", "w", v)?,
            None => DimExpr::InputWidth,
        };
        let h = match args.get("h") {
            Some(v) => DimExpr::parse("crop", "h", v)?,
            None => DimExpr::InputHeight,
        };
        let x = args.get("x").map(|v| parse_value("crop", "x", v)).transpose()?;
        let y = args.get("y").map(|v| parse_value("crop", "y", v)).transpose()?;
        Ok(Self {
            w,
            h,
            x,
            y,
            input: None,
            window: (0, 0, 0, 0),
        })
    }

    fn resolve(&self, in_w: u32, in_h: u32) -> Result<(u32, u32, u32, u32)> {
        let w = self.w.eval(in_w, in_h);
        let h = self.h.eval(in_w, in_h);
        let x = self.x.unwrap_or((in_w as i64 - w) / 2);
        let y = self.y.unwrap_or((in_h as i64 - h) / 2);
        let fits = w > 0
            && h > 0
            && x >= 0
            && y >= 0
            && x + w <= in_w as i64
            && y + h <= in_h as i64;
        if !fits {
            return Err(NativeError::InvalidArgument(format!(
                "crop: {w}x{h}+{x}+{y} does not fit in {in_w}x{in_h}"
            )));
        }
        Ok((x as u32, y as u32, w as u32, h as u32))
    }
}

impl Filter for CropFilter {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        let input = *inputs
            .first()
            .ok_or_else(|| NativeError::GraphConfig("crop: no input".into()))?;
        if input.format.is_hw() {
            return Err(NativeError::NotSupported("crop: hardware frames".into()));
        }
        self.window = self.resolve(input.width, input.height)?;
        self.input = Some(input);
        let (_, _, w, h) = self.window;
        Ok(input.with_size(w, h))
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        let frame = inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("crop: no frame".into()))?;
        let (x, y, w, h) = self.window;
        frame.crop_view(x, y, w, h)
    }

    fn process_command(&mut self, cmd: &str, arg: &str) -> Result<()> {
        match cmd {
            "w" | "out_w" => self.w = DimExpr::parse("crop", cmd, arg)?,
            "h" | "out_h" => self.h = DimExpr::parse("crop", cmd, arg)?,
            "x" => self.x = Some(parse_value("crop", cmd, arg)?),
            "y" => self.y = Some(parse_value("crop", cmd, arg)?),
            _ => {
                return Err(NativeError::NotSupported(format!(
                    "crop does not accept command '{cmd}'"
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FilterGraph;
    use crate::pixfmt::PixelFormat;

    #[test]
    fn test_crop_is_zero_copy() {
        let mut graph = FilterGraph::parse(
            "buffer@in=video_size=8x8:pix_fmt=gray,crop=w=4:h=2:x=2:y=3,buffersink@out",
        )
        .unwrap();
        let (src, sink) = (graph.source("in").unwrap(), graph.sink("out").unwrap());
        let mut frame = NativeFrame::alloc(8, 8, PixelFormat::Gray8).unwrap();
        let stride = frame.stride(0);
        frame.plane_mut(0).unwrap()[3 * stride + 2] = 9;
        let keep = frame.clone();
        graph.push_frame(src, frame).unwrap();
        let out = graph.pull_frame(sink).unwrap();
        assert_eq!((out.width, out.height), (4, 2));
        assert_eq!(out.row(0, 0).unwrap(), &[9, 0, 0, 0]);
        assert!(out
            .plane_buffer(0)
            .unwrap()
            .same_memory(keep.plane_buffer(0).unwrap()));
    }

    #[test]
    fn test_crop_defaults_to_centre() {
        let graph = FilterGraph::parse(
            "buffer=video_size=10x10:pix_fmt=rgba,crop=4:4,buffersink@out",
        )
        .unwrap();
        let sink = graph.sink("out").unwrap();
        let fmt = graph.output_format(sink).unwrap();
        assert_eq!((fmt.width, fmt.height), (4, 4));
    }

    #[test]
    fn test_crop_out_of_bounds_fails() {
        assert!(FilterGraph::parse(
            "buffer=video_size=10x10:pix_fmt=rgba,crop=w=8:h=8:x=4:y=0,buffersink"
        )
        .is_err());
    }

    #[test]
    fn test_crop_commands_resize_window() {
        let mut graph = FilterGraph::parse(
            "buffer=video_size=10x10:pix_fmt=rgba,crop@c=w=8:h=8,buffersink@out",
        )
        .unwrap();
        graph.send_command("c", "w", "2").unwrap();
        let sink = graph.sink("out").unwrap();
        assert_eq!(graph.output_format(sink).unwrap().width, 2);
        assert!(graph.send_command("c", "w", "20").is_err());
    }
}
