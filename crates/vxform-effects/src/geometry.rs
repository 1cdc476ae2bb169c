//! Geometry engine: derives crop, scale, ROI window and position
//! compensation from the transform parameters.
//!
//! The steps run in a fixed order and their results are cached together.
//! A parameter change invalidates the whole cache; a new result is only
//! committed after a frame was produced with it.

use vxform_core::{rotate, PixelRect, Result, Size, Vec2, VxError};

use crate::config::TransformConfig;
use crate::params::{CropMargins, Margin, ScaleType, Stage, StageSet, TransformParameters};

/// Part of the cropped image that is actually scaled when the full scaled
/// image would exceed the working bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiWindow {
    /// Largest scaled size processed
    pub bound: Size,
    /// Window in cropped-image coordinates
    pub input: PixelRect,
    /// Scaled size of the window
    pub output: Size,
    /// Window centre minus scaled image centre, in canvas pixels
    pub center_offset: Vec2,
}

/// Derived geometry for one input size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub input: Size,
    pub canvas: Size,
    /// Crop alignment of the input's pixel format
    pub align: (u32, u32),
    pub crop: PixelRect,
    pub scale_factor: Vec2,
    /// Size of the whole cropped image after scaling
    pub scaled: Size,
    pub roi: Option<RoiWindow>,
    /// Clockwise degrees in [0, 360)
    pub rotation: f64,
    /// User position offset in canvas pixels
    pub position: Vec2,
    /// Offset that keeps a windowed image where the full image would land
    pub compensation: Vec2,
}

impl Geometry {
    /// Compute the geometry of a `input` frame placed on `canvas`.
    pub fn compute(
        input: Size,
        canvas: Size,
        align: (u32, u32),
        params: &TransformParameters,
        config: &TransformConfig,
    ) -> Result<Self> {
        if input.is_empty() || canvas.is_empty() {
            return Err(VxError::InvalidParameter(format!(
                "cannot place a {}x{} input on a {}x{} canvas",
                input.width, input.height, canvas.width, canvas.height
            )));
        }
        let params = params.clone().validated(config.version)?;
        let align = (align.0.max(1), align.1.max(1));
        let crop = crop_rect(input, &params.crop, align);
        let position = Vec2::new(
            params.position_h.resolve(canvas.width),
            params.position_v.resolve(canvas.height),
        );
        let mut geometry = Self {
            input,
            canvas,
            align,
            crop,
            scale_factor: Vec2::ZERO,
            scaled: Size::default(),
            roi: None,
            rotation: params.rotation,
            position,
            compensation: Vec2::ZERO,
        };
        if crop.is_empty() {
            return Ok(geometry);
        }

        let k = fit_factor(crop.size(), canvas, params.scale_type)
            * Vec2::new(params.scale_h, params.scale_v);
        geometry.scale_factor = k;
        geometry.scaled = Size::new(scaled_len(crop.width, k.x), scaled_len(crop.height, k.y));

        let bound = match (params.scale_type, params.rotation) {
            (ScaleType::Crop, r) if r == 0.0 => Some(canvas),
            _ if config.version.bounds_roi() => {
                let d = (canvas.diagonal().ceil() as u32).saturating_add(config.roi_padding);
                Some(Size::new(d, d))
            }
            _ => None,
        };
        geometry.roi = bound.and_then(|b| {
            roi_window(crop.size(), geometry.scaled, k, b, params.rotation, position, align)
        });
        if let Some(window) = geometry.roi {
            geometry.compensation = rotate(window.center_offset, params.rotation);
        }
        Ok(geometry)
    }

    /// Region of the input that feeds the scale stage.
    pub fn source_rect(&self) -> PixelRect {
        match self.roi {
            Some(w) => PixelRect::new(
                self.crop.x + w.input.x,
                self.crop.y + w.input.y,
                w.input.width,
                w.input.height,
            ),
            None => self.crop,
        }
    }

    /// Output size of the scale stage.
    pub fn scale_output(&self) -> Size {
        self.roi.map_or(self.scaled, |w| w.output)
    }

    /// Output size of the rotate stage. Rotated frames are square with a
    /// side of the scaled diagonal so every angle fits.
    pub fn rotated_size(&self) -> Size {
        let scaled = self.scale_output();
        if self.rotation == 0.0 {
            scaled
        } else {
            let d = scaled.diagonal().ceil() as u32;
            Size::new(d, d)
        }
    }

    /// Canvas position of the rotated image's top-left corner.
    pub fn placement(&self) -> (i64, i64) {
        let center = self.canvas.as_vec2() * 0.5 + self.position + self.compensation;
        let top_left = center - self.rotated_size().as_vec2() * 0.5;
        (top_left.x.round() as i64, top_left.y.round() as i64)
    }

    /// Nothing survives the crop.
    pub fn is_empty(&self) -> bool {
        self.crop.is_empty()
    }

    pub fn needs_crop(&self) -> bool {
        self.source_rect() != PixelRect::full(self.input)
    }

    pub fn needs_scale(&self) -> bool {
        self.scale_output() != self.source_rect().size()
    }

    pub fn needs_rotate(&self) -> bool {
        self.rotation != 0.0
    }

    pub fn needs_position(&self) -> bool {
        self.rotated_size() != self.canvas || self.placement() != (0, 0)
    }

    /// The input is already the output.
    pub fn is_identity(&self) -> bool {
        !self.is_empty()
            && !self.needs_crop()
            && !self.needs_scale()
            && !self.needs_rotate()
            && !self.needs_position()
    }
}

/// Clamp margins to the input. Inverted margins collapse onto the trailing
/// edge, leaving a zero-area rectangle.
fn crop_rect(input: Size, margins: &CropMargins, align: (u32, u32)) -> PixelRect {
    let (x, width) = crop_axis(input.width, margins.left, margins.right, align.0);
    let (y, height) = crop_axis(input.height, margins.top, margins.bottom, align.1);
    PixelRect::new(x, y, width, height)
}

fn crop_axis(len: u32, lead: Margin, trail: Margin, align: u32) -> (u32, u32) {
    let start = lead.resolve(len).min(len);
    let end = len.saturating_sub(trail.resolve(len));
    let (start, end) = if end < start { (end, end) } else { (start, end) };
    (start - start % align, end - start)
}

fn fit_factor(src: Size, canvas: Size, scale_type: ScaleType) -> Vec2 {
    let rx = canvas.width as f64 / src.width as f64;
    let ry = canvas.height as f64 / src.height as f64;
    match scale_type {
        ScaleType::Fit => Vec2::splat(rx.min(ry)),
        ScaleType::Fill | ScaleType::Crop => Vec2::splat(rx.max(ry)),
        ScaleType::Stretch => Vec2::new(rx, ry),
    }
}

fn scaled_len(len: u32, factor: f64) -> u32 {
    (len as f64 * factor).round().clamp(1.0, u32::MAX as f64) as u32
}

/// Window of the cropped image whose scaled size stays within `bound`,
/// centred on the image point that lands on the canvas centre.
fn roi_window(
    src: Size,
    scaled: Size,
    k: Vec2,
    bound: Size,
    rotation: f64,
    position: Vec2,
    align: (u32, u32),
) -> Option<RoiWindow> {
    if scaled.width <= bound.width && scaled.height <= bound.height {
        return None;
    }
    let full = src.as_vec2() * k;
    let wanted = full.min(bound.as_vec2());
    let target = full * 0.5 + rotate(-position, -rotation);
    let top_left = (target - wanted * 0.5).clamp(Vec2::ZERO, full - wanted);
    let (x, width) = window_axis(top_left.x, wanted.x, k.x, src.width, align.0);
    let (y, height) = window_axis(top_left.y, wanted.y, k.y, src.height, align.1);
    let center = Vec2::new(
        (x as f64 + width as f64 * 0.5) * k.x,
        (y as f64 + height as f64 * 0.5) * k.y,
    );
    Some(RoiWindow {
        bound,
        input: PixelRect::new(x, y, width, height),
        output: Size::new(scaled_len(width, k.x), scaled_len(height, k.y)),
        center_offset: center - full * 0.5,
    })
}

/// Project a scaled-space span back onto `len` input pixels.
fn window_axis(start: f64, extent: f64, k: f64, len: u32, align: u32) -> (u32, u32) {
    let first = ((start / k).floor().max(0.0) as u32).min(len - 1);
    let last = (((start + extent) / k).ceil() as u32).clamp(first + 1, len);
    let first = first - first % align;
    (first, last - first)
}

// ── Cache ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Clean,
    Dirty,
}

/// Last committed geometry plus the stages changed since.
#[derive(Debug, Clone, Default)]
pub struct GeometryCache {
    committed: Option<Geometry>,
    pending: StageSet,
}

impl GeometryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CacheState {
        if self.committed.is_none() || !self.pending.is_empty() {
            CacheState::Dirty
        } else {
            CacheState::Clean
        }
    }

    /// Record a parameter change to `stage`.
    pub fn mark(&mut self, stage: Stage) {
        self.pending.insert(StageSet::affected_by(stage));
    }

    pub fn invalidate(&mut self) {
        self.pending.insert(StageSet::ALL);
    }

    pub fn pending(&self) -> StageSet {
        self.pending
    }

    pub fn committed(&self) -> Option<&Geometry> {
        self.committed.as_ref()
    }

    /// The committed geometry when it is clean and matches `input`,
    /// otherwise a fresh computation (not yet committed).
    pub fn resolve(
        &self,
        input: Size,
        canvas: Size,
        align: (u32, u32),
        params: &TransformParameters,
        config: &TransformConfig,
    ) -> Result<Geometry> {
        match self.committed {
            Some(g)
                if self.pending.is_empty()
                    && g.input == input
                    && g.canvas == canvas
                    && g.align == (align.0.max(1), align.1.max(1)) =>
            {
                Ok(g)
            }
            _ => Geometry::compute(input, canvas, align, params, config),
        }
    }

    /// Store `geometry` after a frame succeeded with it.
    pub fn commit(&mut self, geometry: Geometry) {
        self.committed = Some(geometry);
        self.pending.clear();
    }
}
