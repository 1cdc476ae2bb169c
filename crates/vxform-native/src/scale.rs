//! Resize and colour-convert context.
//!
//! Frames are unpacked into a normalised four-channel float canvas, resampled
//! separably, converted between RGB and YUV matrices/ranges and packed into
//! the destination layout. Chroma is replicated when unpacking subsampled
//! formats and box-averaged when packing them, so a same-size conversion
//! between equal layouts is lossless.

use rayon::prelude::*;

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::pixfmt::{NativeColorRange, NativeColorSpace, PixelFormat};
use crate::sample::CompLayout;

/// Resampling kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Area,
}

impl Interpolation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "neighbor",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Area => "area",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "neighbor" | "nearest" | "point" => Some(Self::Nearest),
            "bilinear" | "fast_bilinear" => Some(Self::Bilinear),
            "bicubic" => Some(Self::Bicubic),
            "area" => Some(Self::Area),
            _ => None,
        }
    }

    fn radius(self) -> f64 {
        match self {
            Self::Nearest | Self::Area => 0.5,
            Self::Bilinear => 1.0,
            Self::Bicubic => 2.0,
        }
    }

    fn kernel(self, x: f64) -> f64 {
        let x = x.abs();
        match self {
            Self::Nearest | Self::Area => {
                if x < 0.5 {
                    1.0
                } else if x == 0.5 {
                    0.5
                } else {
                    0.0
                }
            }
            Self::Bilinear => (1.0 - x).max(0.0),
            // Catmull-Rom, a = -0.5
            Self::Bicubic => {
                if x < 1.0 {
                    1.5 * x * x * x - 2.5 * x * x + 1.0
                } else if x < 2.0 {
                    -0.5 * x * x * x + 2.5 * x * x - 4.0 * x + 2.0
                } else {
                    0.0
                }
            }
        }
    }
}

/// Source or destination shape of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameShape {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl FrameShape {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    pub fn of(frame: &NativeFrame) -> Self {
        Self::new(frame.width, frame.height, frame.format)
    }
}

/// Colour tags applied on each side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ColorDetails {
    pub src_space: NativeColorSpace,
    pub src_range: NativeColorRange,
    pub dst_space: NativeColorSpace,
    pub dst_range: NativeColorRange,
}

/// Precomputed filter taps for one axis.
#[derive(Debug, Clone)]
struct Taps {
    per_output: usize,
    indices: Vec<usize>,
    coeffs: Vec<f32>,
}

impl Taps {
    fn new(src: usize, dst: usize, interp: Interpolation) -> Self {
        let scale = src as f64 / dst as f64;
        if interp == Interpolation::Nearest {
            let indices = (0..dst)
                .map(|i| (((i as f64 + 0.5) * scale) as usize).min(src - 1))
                .collect();
            return Self {
                per_output: 1,
                indices,
                coeffs: vec![1.0; dst],
            };
        }
        let filter_scale = scale.max(1.0);
        let radius = interp.radius() * filter_scale;
        let per_output = (2.0 * radius).ceil() as usize + 1;
        let mut indices = Vec::with_capacity(dst * per_output);
        let mut coeffs = Vec::with_capacity(dst * per_output);
        for i in 0..dst {
            let center = (i as f64 + 0.5) * scale - 0.5;
            let left = (center - radius).ceil() as isize;
            let mut row = Vec::with_capacity(per_output);
            let mut sum = 0.0;
            for k in 0..per_output as isize {
                let pos = left + k;
                let w = interp.kernel((pos as f64 - center) / filter_scale);
                sum += w;
                row.push((pos.clamp(0, src as isize - 1) as usize, w));
            }
            if sum.abs() < 1e-12 {
                let nearest = (center.round().max(0.0) as usize).min(src - 1);
                row.iter_mut().for_each(|t| *t = (nearest, 0.0));
                row[0].1 = 1.0;
                sum = 1.0;
            }
            for (idx, w) in row {
                indices.push(idx);
                coeffs.push((w / sum) as f32);
            }
        }
        Self {
            per_output,
            indices,
            coeffs,
        }
    }

    #[inline]
    fn apply(&self, out_index: usize, fetch: impl Fn(usize) -> f32) -> f32 {
        let base = out_index * self.per_output;
        (base..base + self.per_output)
            .map(|t| self.coeffs[t] * fetch(self.indices[t]))
            .sum()
    }
}

/// Planar float image, channels 0..3 hold R,G,B or Y,Cb,Cr; channel 3 is alpha.
struct Canvas {
    width: usize,
    height: usize,
    channels: [Vec<f32>; 4],
}

impl Canvas {
    fn new(width: usize, height: usize) -> Result<Self> {
        let len = width * height;
        let alloc = |fill: f32| -> Result<Vec<f32>> {
            let mut v = Vec::new();
            v.try_reserve_exact(len)
                .map_err(|e| NativeError::OutOfMemory(format!("scale canvas: {e}")))?;
            v.resize(len, fill);
            Ok(v)
        };
        Ok(Self {
            width,
            height,
            channels: [alloc(0.0)?, alloc(0.0)?, alloc(0.0)?, alloc(1.0)?],
        })
    }
}

/// Normalised YUV range parameters for one side.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    y_off: f32,
    y_scale: f32,
    c_off: f32,
    c_scale: f32,
}

impl Range {
    fn new(depth: u8, full: bool) -> Self {
        let depth = depth.clamp(8, 16) as u32;
        let max = ((1u32 << depth) - 1) as f32;
        let unit = (1u32 << (depth - 8)) as f32;
        let c_off = (1u32 << (depth - 1)) as f32 / max;
        if full {
            Self {
                y_off: 0.0,
                y_scale: 1.0,
                c_off,
                c_scale: 1.0,
            }
        } else {
            Self {
                y_off: 16.0 * unit / max,
                y_scale: 219.0 * unit / max,
                c_off,
                c_scale: 224.0 * unit / max,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Domain {
    Rgb,
    Gray,
    Yuv { kr: f32, kb: f32, range: Range },
}

impl Domain {
    fn of(format: PixelFormat, space: NativeColorSpace, range: NativeColorRange) -> Self {
        if format.is_gray() {
            Self::Gray
        } else if format.is_rgb() {
            Self::Rgb
        } else {
            let (kr, kb) = space.luma_coefficients();
            let full = format.is_full_range_alias() || range == NativeColorRange::Jpeg;
            Self::Yuv {
                kr,
                kb,
                range: Range::new(format.max_depth(), full),
            }
        }
    }
}

/// A reusable conversion between two frame shapes.
#[derive(Debug, Clone)]
pub struct ScaleContext {
    src: FrameShape,
    dst: FrameShape,
    interp: Interpolation,
    colors: ColorDetails,
    h_taps: Taps,
    v_taps: Taps,
}

impl ScaleContext {
    pub fn new(src: FrameShape, dst: FrameShape, interp: Interpolation) -> Result<Self> {
        for (side, shape) in [("source", src), ("destination", dst)] {
            if shape.width == 0 || shape.height == 0 {
                return Err(NativeError::InvalidArgument(format!(
                    "{side} size {}x{} is empty",
                    shape.width, shape.height
                )));
            }
            if shape.format.is_hw() {
                return Err(NativeError::NotSupported(format!(
                    "{side} format {} is not addressable",
                    shape.format
                )));
            }
        }
        tracing::debug!(
            "Creating scale context {}x{} {} -> {}x{} {} ({})",
            src.width,
            src.height,
            src.format,
            dst.width,
            dst.height,
            dst.format,
            interp.name()
        );
        Ok(Self {
            src,
            dst,
            interp,
            colors: ColorDetails::default(),
            h_taps: Taps::new(src.width as usize, dst.width as usize, interp),
            v_taps: Taps::new(src.height as usize, dst.height as usize, interp),
        })
    }

    pub fn set_color_details(&mut self, colors: ColorDetails) {
        self.colors = colors;
    }

    pub fn source(&self) -> FrameShape {
        self.src
    }

    pub fn destination(&self) -> FrameShape {
        self.dst
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interp
    }

    pub fn color_details(&self) -> ColorDetails {
        self.colors
    }

    /// Convert `src` into a newly allocated frame.
    pub fn scale_new(&self, src: &NativeFrame) -> Result<NativeFrame> {
        let mut dst = NativeFrame::alloc(self.dst.width, self.dst.height, self.dst.format)?;
        self.scale(src, &mut dst)?;
        Ok(dst)
    }

    /// Convert `src` into `dst`; both must match the context's shapes.
    pub fn scale(&self, src: &NativeFrame, dst: &mut NativeFrame) -> Result<()> {
        if FrameShape::of(src) != self.src || FrameShape::of(dst) != self.dst {
            return Err(NativeError::InvalidArgument(format!(
                "frames {}x{} {} -> {}x{} {} do not match the context",
                src.width, src.height, src.format, dst.width, dst.height, dst.format
            )));
        }
        dst.pts = src.pts;
        dst.color_space = self.colors.dst_space;
        dst.color_range = self.colors.dst_range;

        let src_domain = Domain::of(src.format, self.colors.src_space, self.colors.src_range);
        let dst_domain = Domain::of(dst.format, self.colors.dst_space, self.colors.dst_range);
        if self.src == self.dst && src_domain == dst_domain {
            return copy_planes(src, dst);
        }

        let mut canvas = unpack(src)?;
        to_working(&mut canvas, src_domain, dst_domain);
        let mut canvas = self.resample(canvas)?;
        from_working(&mut canvas, src_domain, dst_domain);
        pack(&canvas, dst)
    }

    fn resample(&self, src: Canvas) -> Result<Canvas> {
        let (dw, dh) = (self.dst.width as usize, self.dst.height as usize);
        if src.width == dw && src.height == dh {
            return Ok(src);
        }
        let mut tmp = Canvas::new(dw, src.height)?;
        for (c, out) in tmp.channels.iter_mut().enumerate() {
            let input = &src.channels[c];
            out.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                let line = &input[y * src.width..(y + 1) * src.width];
                for (x, v) in row.iter_mut().enumerate() {
                    *v = self.h_taps.apply(x, |i| line[i]);
                }
            });
        }
        let mut out = Canvas::new(dw, dh)?;
        for (c, dest) in out.channels.iter_mut().enumerate() {
            let input = &tmp.channels[c];
            dest.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
                for (x, v) in row.iter_mut().enumerate() {
                    *v = self.v_taps.apply(y, |i| input[i * dw + x]);
                }
            });
        }
        Ok(out)
    }
}

/// Row-by-row copy between frames of identical shape.
pub fn copy_planes(src: &NativeFrame, dst: &mut NativeFrame) -> Result<()> {
    if !src.same_shape(dst) {
        return Err(NativeError::InvalidArgument("plane copy between different shapes".into()));
    }
    for p in 0..src.plane_count() {
        let row_bytes = src.format.plane_row_bytes(p, src.width);
        let rows = src.format.plane_rows(p, src.height);
        let (ss, ds) = (src.stride(p), dst.stride(p));
        let input = src
            .plane(p)
            .ok_or_else(|| NativeError::InvalidArgument(format!("missing plane {p}")))?;
        let out = dst.plane_mut(p)?;
        for y in 0..rows {
            out[y * ds..y * ds + row_bytes].copy_from_slice(&input[y * ss..y * ss + row_bytes]);
        }
    }
    Ok(())
}

// ── Unpack / pack ──────────────────────────────────────────────────

fn unpack(frame: &NativeFrame) -> Result<Canvas> {
    let (w, h) = (frame.width as usize, frame.height as usize);
    let mut canvas = Canvas::new(w, h)?;
    let gray = frame.format.is_gray();
    for (index, layout) in CompLayout::all(frame.format).into_iter().enumerate() {
        let plane = frame
            .plane(layout.plane)
            .ok_or_else(|| NativeError::InvalidArgument(format!("missing plane {}", layout.plane)))?;
        let stride = frame.stride(layout.plane);
        let targets: &[usize] = if gray { &[0, 1, 2] } else { &[index] };
        for &ch in targets {
            canvas.channels[ch]
                .par_chunks_mut(w)
                .enumerate()
                .for_each(|(y, row)| {
                    let line = &plane[(y >> layout.log2_h) * stride..];
                    for (x, v) in row.iter_mut().enumerate() {
                        *v = layout.read(line, x >> layout.log2_w) / layout.max;
                    }
                });
        }
    }
    Ok(canvas)
}

fn pack(canvas: &Canvas, frame: &mut NativeFrame) -> Result<()> {
    let (w, h) = (canvas.width, canvas.height);
    let (fw, fh) = (frame.width, frame.height);
    for (index, layout) in CompLayout::all(frame.format).into_iter().enumerate() {
        let (cw, ch) = layout.dims(fw, fh);
        let stride = frame.stride(layout.plane);
        let source = &canvas.channels[index];
        let plane = frame.plane_mut(layout.plane)?;
        let (bw, bh) = (1usize << layout.log2_w, 1usize << layout.log2_h);
        plane
            .par_chunks_mut(stride)
            .take(ch)
            .enumerate()
            .for_each(|(cy, row)| {
                for cx in 0..cw {
                    let (x0, y0) = (cx * bw, cy * bh);
                    let (x1, y1) = ((x0 + bw).min(w), (y0 + bh).min(h));
                    let mut sum = 0.0;
                    for y in y0..y1 {
                        sum += source[y * w + x0..y * w + x1].iter().sum::<f32>();
                    }
                    let n = ((x1 - x0) * (y1 - y0)) as f32;
                    layout.write(row, cx, sum / n * layout.max);
                }
            });
    }
    Ok(())
}

// ── Colour domains ─────────────────────────────────────────────────

/// Bring unpacked samples into the working domain: full-range YUV with
/// centred chroma when both sides share a matrix, RGB otherwise.
fn to_working(canvas: &mut Canvas, src: Domain, dst: Domain) {
    let Domain::Yuv { kr, kb, range } = src else {
        return;
    };
    let keep_yuv = matches!(dst, Domain::Yuv { kr: dkr, kb: dkb, .. } if dkr == kr && dkb == kb)
        || matches!(dst, Domain::Gray);
    let [y, u, v, _] = &mut canvas.channels;
    y.par_iter_mut()
        .zip(u.par_iter_mut())
        .zip(v.par_iter_mut())
        .for_each(|((y, u), v)| {
            let yy = (*y - range.y_off) / range.y_scale;
            let cb = (*u - range.c_off) / range.c_scale;
            let cr = (*v - range.c_off) / range.c_scale;
            if keep_yuv {
                (*y, *u, *v) = (yy, cb, cr);
            } else {
                (*y, *u, *v) = yuv_to_rgb(yy, cb, cr, kr, kb);
            }
        });
}

fn from_working(canvas: &mut Canvas, src: Domain, dst: Domain) {
    let src_yuv = matches!(src, Domain::Yuv { .. });
    let [c0, c1, c2, _] = &mut canvas.channels;
    match dst {
        Domain::Rgb => {}
        Domain::Gray => {
            if !src_yuv {
                let (kr, kb) = NativeColorSpace::Bt709.luma_coefficients();
                c0.par_iter_mut()
                    .zip(c1.par_iter())
                    .zip(c2.par_iter())
                    .for_each(|((r, g), b)| *r = kr * *r + (1.0 - kr - kb) * *g + kb * *b);
            }
        }
        Domain::Yuv { kr, kb, range } => {
            let same_matrix =
                matches!(src, Domain::Yuv { kr: skr, kb: skb, .. } if skr == kr && skb == kb);
            c0.par_iter_mut()
                .zip(c1.par_iter_mut())
                .zip(c2.par_iter_mut())
                .for_each(|((a, b), c)| {
                    let (y, cb, cr) = if same_matrix {
                        (*a, *b, *c)
                    } else {
                        rgb_to_yuv(*a, *b, *c, kr, kb)
                    };
                    *a = y * range.y_scale + range.y_off;
                    *b = cb * range.c_scale + range.c_off;
                    *c = cr * range.c_scale + range.c_off;
                });
        }
    }
}

#[inline]
fn yuv_to_rgb(y: f32, cb: f32, cr: f32, kr: f32, kb: f32) -> (f32, f32, f32) {
    let kg = 1.0 - kr - kb;
    let r = y + 2.0 * (1.0 - kr) * cr;
    let b = y + 2.0 * (1.0 - kb) * cb;
    let g = (y - kr * r - kb * b) / kg;
    (r, g, b)
}

#[inline]
fn rgb_to_yuv(r: f32, g: f32, b: f32, kr: f32, kb: f32) -> (f32, f32, f32) {
    let y = kr * r + (1.0 - kr - kb) * g + kb * b;
    let cb = (b - y) / (2.0 * (1.0 - kb));
    let cr = (r - y) / (2.0 * (1.0 - kr));
    (y, cb, cr)
}
