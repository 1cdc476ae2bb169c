//! `rotate`: arbitrary-angle rotation about the frame centre.

use rayon::prelude::*;

use super::{fill_value, DimExpr, MAX_DIMENSION};
use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::filter::{parse_value, Filter, FilterArgs, LinkFormat};
use crate::sample::CompLayout;

/// Rotates clockwise by `a` radians (y axis pointing down) into an
/// `ow`x`oh` frame. Uncovered pixels are black, with opaque alpha unless
/// `c=none`.
pub struct RotateFilter {
    angle: f64,
    out_w: DimExpr,
    out_h: DimExpr,
    opaque: bool,
    output: Option<LinkFormat>,
}

impl RotateFilter {
    pub const OPTIONS: &'static [&'static str] =
        &["a", "ow", "oh", "c", "angle", "out_w", "out_h", "fillcolor"];

    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        let angle = match args.get_any(&["a", "angle"]) {
            Some(v) => parse_angle(v)?,
            None => 0.0,
        };
        let out_w = match args.get_any(&["ow", "out_w"]) {
            Some(v) => DimExpr::parse("rotate", "ow", v)?,
            None => DimExpr::InputWidth,
        };
        let out_h = match args.get_any(&["oh", "out_h"]) {
            Some(v) => DimExpr::parse("rotate", "oh", v)?,
            None => DimExpr::InputHeight,
        };
        let opaque = match args.get_any(&["c", "fillcolor"]) {
            None | Some("black") => true,
            Some("none") => false,
            Some(other) => {
                return Err(NativeError::InvalidArgument(format!(
                    "rotate: unsupported fillcolor '{other}'"
                )))
            }
        };
        Ok(Self {
            angle,
            out_w,
            out_h,
            opaque,
            output: None,
        })
    }
}

fn parse_angle(value: &str) -> Result<f64> {
    let angle: f64 = parse_value("rotate", "a", value)?;
    if !angle.is_finite() {
        return Err(NativeError::InvalidArgument(format!(
            "rotate: angle '{value}' is not finite"
        )));
    }
    Ok(angle)
}

impl Filter for RotateFilter {
    fn name(&self) -> &'static str {
        "rotate"
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        let input = *inputs
            .first()
            .ok_or_else(|| NativeError::GraphConfig("rotate: no input".into()))?;
        if input.format.is_hw() {
            return Err(NativeError::NotSupported("rotate: hardware frames".into()));
        }
        let w = self.out_w.eval(input.width, input.height);
        let h = self.out_h.eval(input.width, input.height);
        if !(1..=MAX_DIMENSION).contains(&w) || !(1..=MAX_DIMENSION).contains(&h) {
            return Err(NativeError::InvalidArgument(format!(
                "rotate: output size {w}x{h} out of range"
            )));
        }
        let output = input.with_size(w as u32, h as u32);
        self.output = Some(output);
        Ok(output)
    }

    fn filter_frame(&mut self, mut inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        let src = inputs
            .pop()
            .ok_or_else(|| NativeError::InvalidArgument("rotate: no frame".into()))?;
        let output = self
            .output
            .ok_or_else(|| NativeError::GraphConfig("rotate: not configured".into()))?;
        let mut dst = NativeFrame::alloc(output.width, output.height, src.format)?;
        dst.copy_props(&src);
        let (sin, cos) = self.angle.sin_cos();
        for (index, comp) in CompLayout::all(src.format).iter().enumerate() {
            let fill = fill_value(src.format, src.color_range, index, comp, self.opaque);
            rotate_component(&src, &mut dst, comp, fill, sin, cos)?;
        }
        Ok(dst)
    }

    fn process_command(&mut self, cmd: &str, arg: &str) -> Result<()> {
        match cmd {
            "a" | "angle" => {
                self.angle = parse_angle(arg)?;
                Ok(())
            }
            _ => Err(NativeError::NotSupported(format!(
                "rotate does not accept command '{cmd}'"
            ))),
        }
    }
}

/// Inverse-map every destination sample of one component into the source
/// and sample it bilinearly. Coordinates are taken in luma units so that
/// subsampled planes rotate about the same centre.
fn rotate_component(
    src: &NativeFrame,
    dst: &mut NativeFrame,
    comp: &CompLayout,
    fill: f32,
    sin: f64,
    cos: f64,
) -> Result<()> {
    let (sw, sh) = comp.dims(src.width, src.height);
    let (dw, dh) = comp.dims(dst.width, dst.height);
    let bw = (1u32 << comp.log2_w) as f64;
    let bh = (1u32 << comp.log2_h) as f64;
    let (in_cx, in_cy) = (src.width as f64 / 2.0, src.height as f64 / 2.0);
    let (out_cx, out_cy) = (dst.width as f64 / 2.0, dst.height as f64 / 2.0);
    let src_stride = src.stride(comp.plane);
    let src_plane = src
        .plane(comp.plane)
        .ok_or_else(|| NativeError::InvalidArgument(format!("rotate: no plane {}", comp.plane)))?;
    let dst_stride = dst.stride(comp.plane);
    let dst_plane = dst.plane_mut(comp.plane)?;

    let sample = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x as usize >= sw || y as usize >= sh {
            fill
        } else {
            comp.read(&src_plane[y as usize * src_stride..], x as usize)
        }
    };

    dst_plane
        .par_chunks_mut(dst_stride)
        .take(dh)
        .enumerate()
        .for_each(|(oy, row)| {
            let py = (oy as f64 + 0.5) * bh - out_cy;
            for ox in 0..dw {
                let px = (ox as f64 + 0.5) * bw - out_cx;
                let sx = (px * cos + py * sin + in_cx) / bw - 0.5;
                let sy = (-px * sin + py * cos + in_cy) / bh - 0.5;
                let (x0, y0) = (sx.floor(), sy.floor());
                let (fx, fy) = ((sx - x0) as f32, (sy - y0) as f32);
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = sample(x0, y0) * (1.0 - fx) + sample(x0 + 1, y0) * fx;
                let bottom = sample(x0, y0 + 1) * (1.0 - fx) + sample(x0 + 1, y0 + 1) * fx;
                comp.write(row, ox, top * (1.0 - fy) + bottom * fy);
            }
        });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FilterGraph;
    use crate::pixfmt::PixelFormat;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

    fn run(desc: &str, frame: NativeFrame) -> NativeFrame {
        let mut graph = FilterGraph::parse(desc).unwrap();
        let (src, sink) = (graph.source("in").unwrap(), graph.sink("out").unwrap());
        graph.push_frame(src, frame).unwrap();
        graph.pull_frame(sink).unwrap()
    }

    fn numbered_3x3() -> NativeFrame {
        let mut frame = NativeFrame::alloc(3, 3, PixelFormat::Gray8).unwrap();
        let stride = frame.stride(0);
        let plane = frame.plane_mut(0).unwrap();
        for y in 0..3 {
            for x in 0..3 {
                plane[y * stride + x] = (y * 3 + x + 1) as u8;
            }
        }
        frame
    }

    #[test]
    fn test_quarter_turn_is_clockwise() {
        let desc = format!("buffer@in=video_size=3x3:pix_fmt=gray,rotate=a={FRAC_PI_2},buffersink@out");
        let out = run(&desc, numbered_3x3());
        assert_eq!(out.row(0, 0).unwrap(), &[7, 4, 1]);
        assert_eq!(out.row(0, 1).unwrap(), &[8, 5, 2]);
        assert_eq!(out.row(0, 2).unwrap(), &[9, 6, 3]);
    }

    #[test]
    fn test_zero_angle_is_identity() {
        let mut frame = numbered_3x3();
        frame.pts = Some(11);
        let out = run("buffer@in=video_size=3x3:pix_fmt=gray,rotate=0,buffersink@out", frame);
        assert_eq!(out.row(0, 1).unwrap(), &[4, 5, 6]);
        assert_eq!(out.pts, Some(11));
    }

    #[test]
    fn test_fill_alpha_follows_fillcolor() {
        let opaque_rgba = || {
            let mut frame = NativeFrame::alloc(4, 4, PixelFormat::Rgba).unwrap();
            frame.plane_mut(0).unwrap().fill(255);
            frame
        };
        let desc = |c: &str| {
            format!(
                "buffer@in=video_size=4x4:pix_fmt=rgba,rotate=a={FRAC_PI_4}:ow=8:oh=8:c={c},buffersink@out"
            )
        };
        let out = run(&desc("none"), opaque_rgba());
        assert_eq!((out.width, out.height), (8, 8));
        assert_eq!(out.row(0, 0).unwrap()[..4], [0, 0, 0, 0]);
        let out = run(&desc("black"), opaque_rgba());
        assert_eq!(out.row(0, 0).unwrap()[..4], [0, 0, 0, 255]);
        // The centre stays covered by the source.
        assert_eq!(out.row(0, 4).unwrap()[16..20], [255, 255, 255, 255]);
    }

    #[test]
    fn test_angle_command_keeps_output_size() {
        let mut graph = FilterGraph::parse(
            "buffer@in=video_size=3x3:pix_fmt=gray,rotate@r=a=1:ow=diag:oh=diag,buffersink@out",
        )
        .unwrap();
        let sink = graph.sink("out").unwrap();
        assert_eq!(graph.output_format(sink).unwrap().width, 5);
        graph.send_command("r", "angle", "2.5").unwrap();
        assert_eq!(graph.output_format(sink).unwrap().width, 5);
        assert!(graph.send_command("r", "a", "inf").is_err());
        assert!(graph.send_command("r", "a", "fast").is_err());
    }
}
