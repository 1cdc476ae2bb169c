//! Transform filter: crop, scale, rotate and position one frame onto a
//! fixed-size canvas.
//!
//! Stages run in that order and only touch native frames when one of them
//! needs pixel access. Scale and rotate go through managed filter graphs;
//! positioning copies rows onto a blank canvas. Setters and
//! [`TransformFilter::filter_image`] serialize on one re-entrant lock, so a
//! frame always sees a complete parameter snapshot.

use std::cell::RefCell;

use parking_lot::ReentrantMutex;
use tracing::{debug, trace, warn};
use vxform_core::{ColorFormat, ElementType, FrameBuffer, LastError, Result, Size, VxError};
use vxform_media::{from_native, native_pixel_format_of, resolve_native, BufferToNative, NativeToBuffer};
use vxform_native::{FrameShape, Interpolation, NativeFrame};

use crate::config::TransformConfig;
use crate::geometry::{CacheState, Geometry, GeometryCache};
use crate::graph_manager::{GraphParam, GraphStats, ManagedGraph};
use crate::params::{
    check_margin, check_offset, check_rotation, check_scale_ratio, float_from_value,
    margin_from_value, margin_to_value, offset_from_value, offset_to_value, CropMargins, Margin,
    Offset, ParamValue, ParamVersion, ScaleType, Stage, StageSet, TransformParameters,
};
use crate::FrameFilter;

struct Inner {
    config: TransformConfig,
    canvas: Size,
    params: TransformParameters,
    geometry: GeometryCache,
    to_native: BufferToNative,
    to_buffer: NativeToBuffer,
    scale_graph: ManagedGraph,
    rotate_graph: ManagedGraph,
    input_size: Option<Size>,
    last_error: LastError,
}

/// Geometry transform onto a canvas fixed at construction.
pub struct TransformFilter {
    inner: ReentrantMutex<RefCell<Inner>>,
}

impl TransformFilter {
    pub fn new(canvas_width: u32, canvas_height: u32, config: TransformConfig) -> Result<Self> {
        if canvas_width == 0 || canvas_height == 0 {
            return Err(VxError::InvalidParameter(format!(
                "canvas size {canvas_width}x{canvas_height} is empty"
            )));
        }
        if let Some((format, element)) = config.output_format {
            check_output_format(format, element)?;
        }
        let mut to_native = BufferToNative::new();
        to_native.set_zero_copy(config.zero_copy);
        to_native.set_interpolation(config.interpolation);
        let mut to_buffer = NativeToBuffer::new();
        to_buffer.set_zero_copy(config.zero_copy);
        to_buffer.set_interpolation(config.interpolation);
        debug!(
            version = ?config.version,
            "Transform filter on a {canvas_width}x{canvas_height} canvas"
        );
        Ok(Self {
            inner: ReentrantMutex::new(RefCell::new(Inner {
                config,
                canvas: Size::new(canvas_width, canvas_height),
                params: TransformParameters::default(),
                geometry: GeometryCache::new(),
                to_native,
                to_buffer,
                scale_graph: ManagedGraph::new("scale"),
                rotate_graph: ManagedGraph::new("rotate"),
                input_size: None,
                last_error: LastError::new(),
            })),
        })
    }

    fn with_inner<T>(&self, f: impl FnOnce(&mut Inner) -> Result<T>) -> Result<T> {
        let guard = self.inner.lock();
        let mut inner = guard.borrow_mut();
        let result = f(&mut inner);
        inner.last_error.track(result)
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        let guard = self.inner.lock();
        let inner = guard.borrow();
        f(&inner)
    }

    /// Apply a parameter edit, marking `stage` only if something changed.
    fn change(
        &self,
        stage: Stage,
        edit: impl FnOnce(&mut TransformParameters, ParamVersion) -> Result<()>,
    ) -> Result<()> {
        self.with_inner(|inner| {
            let mut next = inner.params.clone();
            edit(&mut next, inner.config.version)?;
            if next != inner.params {
                inner.params = next;
                inner.geometry.mark(stage);
            }
            Ok(())
        })
    }

    // ── Setters ────────────────────────────────────────────────────

    pub fn set_scale_type(&self, scale_type: ScaleType) -> Result<()> {
        self.change(Stage::Scale, |p, _| {
            p.scale_type = scale_type;
            Ok(())
        })
    }

    pub fn set_crop_margin_left(&self, margin: Margin) -> Result<()> {
        self.change(Stage::Crop, |p, v| {
            p.crop.left = check_margin("crop_left", margin, v)?;
            Ok(())
        })
    }

    pub fn set_crop_margin_top(&self, margin: Margin) -> Result<()> {
        self.change(Stage::Crop, |p, v| {
            p.crop.top = check_margin("crop_top", margin, v)?;
            Ok(())
        })
    }

    pub fn set_crop_margin_right(&self, margin: Margin) -> Result<()> {
        self.change(Stage::Crop, |p, v| {
            p.crop.right = check_margin("crop_right", margin, v)?;
            Ok(())
        })
    }

    pub fn set_crop_margin_bottom(&self, margin: Margin) -> Result<()> {
        self.change(Stage::Crop, |p, v| {
            p.crop.bottom = check_margin("crop_bottom", margin, v)?;
            Ok(())
        })
    }

    pub fn set_crop_margins(&self, margins: CropMargins) -> Result<()> {
        self.change(Stage::Crop, |p, v| {
            p.crop = CropMargins {
                left: check_margin("crop_left", margins.left, v)?,
                top: check_margin("crop_top", margins.top, v)?,
                right: check_margin("crop_right", margins.right, v)?,
                bottom: check_margin("crop_bottom", margins.bottom, v)?,
            };
            Ok(())
        })
    }

    /// Clockwise rotation in degrees; any finite angle is accepted and
    /// normalized into [0, 360).
    pub fn set_rotation(&self, degrees: f64) -> Result<()> {
        self.change(Stage::Rotate, |p, _| {
            p.rotation = check_rotation(degrees)?;
            Ok(())
        })
    }

    pub fn set_position_offset_h(&self, offset: Offset) -> Result<()> {
        self.change(Stage::Position, |p, v| {
            p.position_h = check_offset("position_h", offset, v)?;
            Ok(())
        })
    }

    pub fn set_position_offset_v(&self, offset: Offset) -> Result<()> {
        self.change(Stage::Position, |p, v| {
            p.position_v = check_offset("position_v", offset, v)?;
            Ok(())
        })
    }

    /// Horizontal scale ratio; also sets the vertical one when the aspect
    /// ratio is locked.
    pub fn set_scale_h(&self, ratio: f64) -> Result<()> {
        self.change(Stage::Scale, |p, _| {
            p.scale_h = check_scale_ratio("scale_h", ratio)?;
            if p.keep_aspect_ratio {
                p.scale_v = p.scale_h;
            }
            Ok(())
        })
    }

    pub fn set_scale_v(&self, ratio: f64) -> Result<()> {
        self.change(Stage::Scale, |p, _| {
            p.scale_v = check_scale_ratio("scale_v", ratio)?;
            if p.keep_aspect_ratio {
                p.scale_h = p.scale_v;
            }
            Ok(())
        })
    }

    /// Lock both scale ratios together, starting from the horizontal one.
    pub fn set_keep_aspect_ratio(&self, keep: bool) -> Result<()> {
        self.change(Stage::Scale, |p, _| {
            p.keep_aspect_ratio = keep;
            if keep {
                p.scale_v = p.scale_h;
            }
            Ok(())
        })
    }

    pub fn set_interpolation(&self, interpolation: Interpolation) -> Result<()> {
        self.with_inner(|inner| {
            inner.config.interpolation = interpolation;
            inner.to_native.set_interpolation(interpolation);
            inner.to_buffer.set_interpolation(interpolation);
            Ok(())
        })
    }

    /// Produce `format` buffers with `element` samples instead of the
    /// input's layout.
    pub fn set_output_format(&self, format: ColorFormat, element: ElementType) -> Result<()> {
        self.with_inner(|inner| {
            check_output_format(format, element)?;
            inner.config.output_format = Some((format, element));
            Ok(())
        })
    }

    /// Replace every parameter at once.
    pub fn apply_parameters(&self, params: TransformParameters) -> Result<()> {
        self.with_inner(|inner| {
            let params = params.validated(inner.config.version)?;
            if params != inner.params {
                inner.params = params;
                inner.geometry.invalidate();
            }
            Ok(())
        })
    }

    /// Set a parameter by descriptor name.
    pub fn set_param(&self, name: &str, value: ParamValue) -> Result<()> {
        let result = self.apply_param(name, &value);
        self.with_inner(|_| result)
    }

    fn apply_param(&self, name: &str, value: &ParamValue) -> Result<()> {
        match name {
            "scale_type" => {
                let scale_type = match value {
                    ParamValue::Choice(s) => ScaleType::from_name(s),
                    _ => None,
                };
                let scale_type = scale_type.ok_or_else(|| {
                    VxError::InvalidParameter(format!("scale_type: unexpected {value:?}"))
                })?;
                self.set_scale_type(scale_type)
            }
            "crop_left" => self.set_crop_margin_left(margin_from_value(name, value)?),
            "crop_top" => self.set_crop_margin_top(margin_from_value(name, value)?),
            "crop_right" => self.set_crop_margin_right(margin_from_value(name, value)?),
            "crop_bottom" => self.set_crop_margin_bottom(margin_from_value(name, value)?),
            "scale_h" => self.set_scale_h(float_from_value(name, value)?),
            "scale_v" => self.set_scale_v(float_from_value(name, value)?),
            "rotation" => self.set_rotation(float_from_value(name, value)?),
            "position_h" => self.set_position_offset_h(offset_from_value(name, value)?),
            "position_v" => self.set_position_offset_v(offset_from_value(name, value)?),
            "keep_aspect_ratio" => match value {
                ParamValue::Bool(keep) => self.set_keep_aspect_ratio(*keep),
                other => Err(VxError::InvalidParameter(format!(
                    "keep_aspect_ratio: unexpected {other:?}"
                ))),
            },
            "interpolation" => {
                let interpolation = match value {
                    ParamValue::Choice(s) => Interpolation::from_name(s),
                    _ => None,
                };
                let interpolation = interpolation.ok_or_else(|| {
                    VxError::InvalidParameter(format!("interpolation: unexpected {value:?}"))
                })?;
                self.set_interpolation(interpolation)
            }
            _ => Err(VxError::InvalidParameter(format!("unknown parameter '{name}'"))),
        }
    }

    // ── Read-back ──────────────────────────────────────────────────

    pub fn get_param(&self, name: &str) -> Option<ParamValue> {
        self.read(|inner| {
            let p = &inner.params;
            Some(match name {
                "scale_type" => ParamValue::Choice(p.scale_type.name().into()),
                "crop_left" => margin_to_value(p.crop.left),
                "crop_top" => margin_to_value(p.crop.top),
                "crop_right" => margin_to_value(p.crop.right),
                "crop_bottom" => margin_to_value(p.crop.bottom),
                "scale_h" => ParamValue::Float(p.scale_h),
                "scale_v" => ParamValue::Float(p.scale_v),
                "rotation" => ParamValue::Float(p.rotation),
                "position_h" => offset_to_value(p.position_h),
                "position_v" => offset_to_value(p.position_v),
                "keep_aspect_ratio" => ParamValue::Bool(p.keep_aspect_ratio),
                "interpolation" => ParamValue::Choice(inner.config.interpolation.name().into()),
                _ => return None,
            })
        })
    }

    pub fn parameters(&self) -> TransformParameters {
        self.read(|inner| inner.params.clone())
    }

    pub fn config(&self) -> TransformConfig {
        self.read(|inner| inner.config.clone())
    }

    pub fn scale_type(&self) -> ScaleType {
        self.read(|inner| inner.params.scale_type)
    }

    pub fn crop_margins(&self) -> CropMargins {
        self.read(|inner| inner.params.crop)
    }

    pub fn rotation(&self) -> f64 {
        self.read(|inner| inner.params.rotation)
    }

    pub fn position_offset(&self) -> (Offset, Offset) {
        self.read(|inner| (inner.params.position_h, inner.params.position_v))
    }

    pub fn scale(&self) -> (f64, f64) {
        self.read(|inner| (inner.params.scale_h, inner.params.scale_v))
    }

    pub fn keep_aspect_ratio(&self) -> bool {
        self.read(|inner| inner.params.keep_aspect_ratio)
    }

    pub fn interpolation(&self) -> Interpolation {
        self.read(|inner| inner.config.interpolation)
    }

    pub fn output_format(&self) -> Option<(ColorFormat, ElementType)> {
        self.read(|inner| inner.config.output_format)
    }

    /// Output size, fixed at construction.
    pub fn output_size(&self) -> Size {
        self.read(|inner| inner.canvas)
    }

    /// Size of the last successfully transformed input.
    pub fn input_size(&self) -> Option<Size> {
        self.read(|inner| inner.input_size)
    }

    /// Geometry used by the last successful frame.
    pub fn geometry(&self) -> Option<Geometry> {
        self.read(|inner| inner.geometry.committed().copied())
    }

    pub fn cache_state(&self) -> CacheState {
        self.read(|inner| inner.geometry.state())
    }

    /// Stages with parameter changes not yet applied to a frame.
    pub fn pending_stages(&self) -> StageSet {
        self.read(|inner| inner.geometry.pending())
    }

    pub fn scale_graph_stats(&self) -> GraphStats {
        self.read(|inner| inner.scale_graph.stats())
    }

    pub fn rotate_graph_stats(&self) -> GraphStats {
        self.read(|inner| inner.rotate_graph.stats())
    }

    // ── Processing ─────────────────────────────────────────────────

    /// Transform `input` onto the canvas, stamping the result with `pts`.
    ///
    /// When no stage changes the picture the input itself is returned
    /// (sharing its storage, timestamp untouched).
    pub fn filter_image(&self, input: &FrameBuffer, pts: Option<i64>) -> Result<FrameBuffer> {
        self.with_inner(|inner| {
            inner.process(input, pts).map_err(|e| {
                warn!("Transform of {}x{} frame failed: {e}", input.width, input.height);
                e
            })
        })
    }
}

impl FrameFilter for TransformFilter {
    fn name(&self) -> &str {
        "transform"
    }

    fn filter_image(&self, input: &FrameBuffer, pts: Option<i64>) -> Result<FrameBuffer> {
        TransformFilter::filter_image(self, input, pts)
    }

    fn last_error(&self) -> String {
        self.read(|inner| inner.last_error.message().to_string())
    }
}

fn check_output_format(format: ColorFormat, element: ElementType) -> Result<()> {
    match native_pixel_format_of(format, element) {
        Some(_) => Ok(()),
        None => Err(VxError::UnsupportedFormat(format!(
            "{format:?} with {element:?} elements"
        ))),
    }
}

impl Inner {
    fn process(&mut self, input: &FrameBuffer, pts: Option<i64>) -> Result<FrameBuffer> {
        if input.is_empty() {
            return Err(VxError::InvalidParameter("cannot transform an empty buffer".into()));
        }
        let native = resolve_native(input)?;
        let size = Size::new(input.width, input.height);
        let geometry = self.geometry.resolve(
            size,
            self.canvas,
            native.crop_alignment(),
            &self.params,
            &self.config,
        )?;
        if self.geometry.committed() != Some(&geometry) {
            debug!(
                source = ?geometry.source_rect(),
                scaled = ?geometry.scale_output(),
                rotation = geometry.rotation,
                roi = geometry.roi.is_some(),
                "Recomputed transform geometry"
            );
        }
        let layout = self.config.output_format.unwrap_or((input.format, input.element));
        let reformat = layout != (input.format, input.element);

        if geometry.is_identity() && !reformat {
            trace!("Identity transform");
            self.commit(geometry, size);
            return Ok(input.clone());
        }

        let output = if geometry.is_empty() {
            blank_canvas(self.canvas, layout, input)?.with_pts(pts)
        } else {
            let image = self.render(input, &geometry, layout, reformat, pts)?;
            if geometry.needs_position() {
                position(&image, self.canvas, geometry.placement())?.with_pts(pts)
            } else {
                image.with_pts(pts)
            }
        };
        self.commit(geometry, size);
        Ok(output)
    }

    fn commit(&mut self, geometry: Geometry, input: Size) {
        self.geometry.commit(geometry);
        self.input_size = Some(input);
    }

    /// Run the native stages that `geometry` needs. Without any, the input
    /// is used as is.
    fn render(
        &mut self,
        input: &FrameBuffer,
        geometry: &Geometry,
        (format, element): (ColorFormat, ElementType),
        reformat: bool,
        pts: Option<i64>,
    ) -> Result<FrameBuffer> {
        let mut frame: Option<NativeFrame> = None;
        if geometry.needs_crop() {
            let rect = geometry.source_rect();
            let wrapped = self.to_native.convert(input, pts)?;
            let cropped = wrapped
                .crop_view(rect.x, rect.y, rect.width, rect.height)
                .map_err(from_native)?;
            frame = Some(cropped);
        }
        if geometry.needs_scale() {
            let source = match frame.take() {
                Some(f) => f,
                None => self.to_native.convert(input, pts)?,
            };
            frame = Some(self.scale(source, geometry.scale_output())?);
        }
        if geometry.needs_rotate() {
            let source = match frame.take() {
                Some(f) => f,
                None => self.to_native.convert(input, pts)?,
            };
            frame = Some(self.rotate(source, geometry.rotation)?);
        }
        let frame = match frame {
            Some(f) => f,
            None if reformat => self.to_native.convert(input, pts)?,
            None => return Ok(input.clone()),
        };
        self.to_buffer.set_output_format(format, element)?;
        self.to_buffer.convert(&frame, pts)
    }

    fn scale(&mut self, frame: NativeFrame, target: Size) -> Result<NativeFrame> {
        let shape = FrameShape::of(&frame);
        let flags = self.config.interpolation.name();
        let params = [
            GraphParam::new("scale", "w", target.width),
            GraphParam::new("scale", "h", target.height),
            GraphParam::new("scale", "flags", flags),
        ];
        self.scale_graph.prepare(&[shape], &params, || {
            format!(
                "buffer@in0=video_size={}x{}:pix_fmt={},scale@scale=w={}:h={}:flags={flags},buffersink@out",
                shape.width, shape.height, shape.format, target.width, target.height
            )
        })?;
        self.scale_graph.run(vec![frame])
    }

    fn rotate(&mut self, frame: NativeFrame, degrees: f64) -> Result<NativeFrame> {
        let shape = FrameShape::of(&frame);
        let radians = degrees.to_radians();
        let params = [GraphParam::new("rotate", "a", radians)];
        self.rotate_graph.prepare(&[shape], &params, || {
            format!(
                "buffer@in0=video_size={}x{}:pix_fmt={},rotate@rotate=a={radians}:ow=diag:oh=diag:c=none,buffersink@out",
                shape.width, shape.height, shape.format
            )
        })?;
        self.rotate_graph.run(vec![frame])
    }
}

/// A zeroed canvas with neutral chroma, tagged like `like`.
fn blank_canvas(
    canvas: Size,
    (format, element): (ColorFormat, ElementType),
    like: &FrameBuffer,
) -> Result<FrameBuffer> {
    let mut buffer = FrameBuffer::new(canvas.width, canvas.height, format, element)?;
    if format == like.format {
        buffer = buffer
            .with_bit_depth(like.bit_depth)
            .with_color(like.color_space, like.color_range);
    }
    if format.is_yuv() {
        let chroma_planes: &[usize] = match format {
            ColorFormat::Nv12 | ColorFormat::Nv21 => &[1],
            _ => &[1, 2],
        };
        let depth = buffer.bit_depth.clamp(8, 16);
        for &p in chroma_planes {
            let Some(plane) = buffer.plane_mut(p) else {
                continue;
            };
            match element {
                ElementType::U8 => plane.fill(128),
                _ => {
                    let mid = (1u16 << (depth - 1)).to_le_bytes();
                    for sample in plane.chunks_exact_mut(2) {
                        sample.copy_from_slice(&mid);
                    }
                }
            }
        }
    }
    Ok(buffer)
}

/// Copy `image` onto a blank canvas with its top-left corner at `at`,
/// clipping what falls outside.
fn position(image: &FrameBuffer, canvas: Size, at: (i64, i64)) -> Result<FrameBuffer> {
    let mut out = blank_canvas(canvas, (image.format, image.element), image)?;
    let (sx, sy) = image.format.chroma_shift();
    let x = at.0.div_euclid(1 << sx) << sx;
    let y = at.1.div_euclid(1 << sy) << sy;
    let dx0 = x.max(0);
    let dy0 = y.max(0);
    let dx1 = (x + image.width as i64).min(canvas.width as i64);
    let dy1 = (y + image.height as i64).min(canvas.height as i64);
    if dx1 <= dx0 || dy1 <= dy0 {
        return Ok(out);
    }
    let (w, h) = ((dx1 - dx0) as u32, (dy1 - dy0) as u32);
    let (src_x, src_y) = ((dx0 - x) as u32, (dy0 - y) as u32);

    let elem = image.element.size();
    let src_layouts = image.plane_layouts();
    let dst_layouts = out.plane_layouts();
    let src_at = image.format.plane_shapes(src_x, src_y);
    let dst_at = image.format.plane_shapes(dx0 as u32, dy0 as u32);
    let span = image.format.plane_shapes(w, h);
    let src = image.data();
    let dst = out.data_mut();
    for (p, (sl, dl)) in src_layouts.iter().zip(dst_layouts.iter()).enumerate() {
        let row_len = span[p].0 * elem;
        for row in 0..span[p].1 {
            let s = sl.offset + (src_at[p].1 + row) * sl.row_bytes + src_at[p].0 * elem;
            let d = dl.offset + (dst_at[p].1 + row) * dl.row_bytes + dst_at[p].0 * elem;
            dst[d..d + row_len].copy_from_slice(&src[s..s + row_len]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_manager::GraphState;
    use vxform_core::PixelRect;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> FrameBuffer {
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            for x in 0..w {
                data.push(f(x, y));
            }
        }
        FrameBuffer::from_vec(w, h, ColorFormat::Gray, ElementType::U8, data).unwrap()
    }

    #[test]
    fn test_identity_returns_input_storage() {
        let filter = TransformFilter::new(16, 8, TransformConfig::default()).unwrap();
        let input = FrameBuffer::test_pattern(16, 8).unwrap();
        let out = filter.filter_image(&input, Some(4)).unwrap();
        assert!(out.shares_storage_with(&input));
        assert_eq!(filter.scale_graph_stats().state, GraphState::Absent);
        assert_eq!(filter.rotate_graph_stats().state, GraphState::Absent);
        assert_eq!(filter.cache_state(), CacheState::Clean);
    }

    #[test]
    fn test_crop_then_position() {
        let filter = TransformFilter::new(4, 4, TransformConfig::default()).unwrap();
        filter.set_crop_margin_left(Margin::Pixels(2)).unwrap();
        filter.set_scale_type(ScaleType::Stretch).unwrap();
        filter.set_scale_h(0.5).unwrap();
        let input = gray(4, 4, |x, _| x as u8 * 10 + 1);
        let out = filter.filter_image(&input, None).unwrap();
        // The 2x4 crop stretches to 4x4 and is halved back to 2x4, centred.
        assert_eq!((out.width, out.height), (4, 4));
        assert_eq!(&out.data()[..4], &[0, 21, 31, 0]);
        assert_eq!(
            filter.geometry().unwrap().crop,
            PixelRect::new(2, 0, 2, 4)
        );
    }

    #[test]
    fn test_position_only_stays_on_buffers() {
        let filter = TransformFilter::new(4, 2, TransformConfig::default()).unwrap();
        filter.set_position_offset_h(Offset::Pixels(1)).unwrap();
        let input = gray(4, 2, |_, _| 9);
        let out = filter.filter_image(&input, Some(1)).unwrap();
        assert_eq!(&out.data()[..4], &[0, 9, 9, 9]);
        assert_eq!(out.pts, Some(1));
        assert_eq!(filter.scale_graph_stats().build_count, 0);
    }

    #[test]
    fn test_rotation_patch_does_not_rebuild() {
        let filter = TransformFilter::new(8, 8, TransformConfig::default()).unwrap();
        let input = gray(8, 8, |x, y| (x * 8 + y) as u8);
        filter.set_rotation(30.0).unwrap();
        filter.filter_image(&input, None).unwrap();
        let first = filter.rotate_graph_stats();
        assert_eq!(first.build_count, 1);
        filter.set_rotation(45.0).unwrap();
        filter.filter_image(&input, None).unwrap();
        let second = filter.rotate_graph_stats();
        assert_eq!(second.graph_id, first.graph_id);
        assert_eq!(second.build_count, 1);
    }

    #[test]
    fn test_failed_frame_keeps_pending() {
        let filter = TransformFilter::new(8, 8, TransformConfig::default()).unwrap();
        filter.set_rotation(10.0).unwrap();
        let bad = FrameBuffer::new(8, 8, ColorFormat::Rgba, ElementType::U32).unwrap();
        assert!(matches!(
            filter.filter_image(&bad, None),
            Err(VxError::UnsupportedFormat(_))
        ));
        assert!(filter.pending_stages().contains(Stage::Rotate));
        assert!(filter.last_error().starts_with("Unsupported format"));
        filter.filter_image(&gray(8, 8, |_, _| 1), None).unwrap();
        assert!(filter.pending_stages().is_empty());
    }

    #[test]
    fn test_unchanged_value_is_noop() {
        let filter = TransformFilter::new(8, 8, TransformConfig::default()).unwrap();
        filter.filter_image(&gray(8, 8, |_, _| 1), None).unwrap();
        filter.set_rotation(360.0).unwrap();
        filter.set_scale_type(ScaleType::Fit).unwrap();
        assert_eq!(filter.cache_state(), CacheState::Clean);
        filter.set_rotation(90.0).unwrap();
        assert_eq!(filter.cache_state(), CacheState::Dirty);
    }

    #[test]
    fn test_params_by_name() {
        let filter = TransformFilter::new(8, 8, TransformConfig::default()).unwrap();
        filter.set_param("rotation", ParamValue::Float(-90.0)).unwrap();
        assert_eq!(filter.get_param("rotation"), Some(ParamValue::Float(270.0)));
        filter.set_param("crop_top", ParamValue::Float(0.25)).unwrap();
        assert_eq!(filter.crop_margins().top, Margin::Ratio(0.25));
        filter.set_param("keep_aspect_ratio", ParamValue::Bool(true)).unwrap();
        filter.set_param("scale_h", ParamValue::Float(2.0)).unwrap();
        assert_eq!(filter.scale(), (2.0, 2.0));
        assert!(filter.set_param("opacity", ParamValue::Float(1.0)).is_err());
        assert!(filter.last_error().contains("opacity"));
        assert_eq!(filter.get_param("opacity"), None);
    }

    #[test]
    fn test_legacy_rejects_ratios() {
        let filter = TransformFilter::new(8, 8, TransformConfig::legacy()).unwrap();
        assert!(filter.set_crop_margin_left(Margin::Ratio(0.1)).is_err());
        assert!(filter.set_crop_margin_left(Margin::Pixels(1)).is_ok());
        assert!(filter.set_scale_h(0.0).is_err());
        assert!(TransformFilter::new(0, 8, TransformConfig::legacy()).is_err());
    }

    #[test]
    fn test_output_format_conversion() {
        let filter = TransformFilter::new(4, 4, TransformConfig::default()).unwrap();
        filter.set_output_format(ColorFormat::Rgb, ElementType::U8).unwrap();
        let out = filter.filter_image(&gray(4, 4, |_, _| 77), None).unwrap();
        assert_eq!(out.format, ColorFormat::Rgb);
        assert!(out.data().iter().all(|&v| v == 77));
        assert!(filter
            .set_output_format(ColorFormat::Argb, ElementType::F32)
            .is_err());
    }

    #[test]
    fn test_position_clips_chroma_aligned() {
        let image = FrameBuffer::new(4, 4, ColorFormat::Yuv420, ElementType::U8).unwrap();
        let out = position(&image, Size::new(6, 6), (3, -1)).unwrap();
        let y_plane = out.plane(0).unwrap();
        // x aligns down to 2, y to -2: luma rows 0..2 covered from column 2.
        assert_eq!(&y_plane[..6], &[0, 0, 0, 0, 0, 0]);
        let u_plane = out.plane(1).unwrap();
        assert_eq!(u_plane, &[128, 0, 0, 128, 128, 128, 128, 128, 128]);
    }
}
