//! Converters between generic buffers and native frames.
//!
//! Each converter holds its target size, format and colour tags plus a
//! lazily created [`ScaleContext`]. A setter that changes a value drops the
//! context; setting the same value again keeps it.

use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, trace};
use vxform_core::{
    ColorFormat, ColorRange, ColorSpace, Device, ElementType, FrameBuffer, LastError, ReleaseGuard,
    Result, SharedBytes, VxError,
};
use vxform_native::{
    transfer_to_host, ColorDetails, FrameShape, Interpolation, NativeFrame, PixelFormat,
    PlaneBuffer, ScaleContext,
};

use crate::error::from_native;
use crate::format_map::{
    bit_depth_of, color_format_of, color_space_of, effective_range, element_type_of,
    native_color_range_of, native_color_space_of, native_pixel_format_for_depth, resolve_native,
};
use crate::plane_copy::{copy_buffer_to_frame, copy_frame_to_buffer, sample_shift};

/// Replace `slot` and drop the cached context if the value changed.
fn update<T: PartialEq>(slot: &mut T, value: T, ctx: &mut Option<ScaleContext>) {
    if *slot != value {
        *slot = value;
        *ctx = None;
    }
}

fn check_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(VxError::InvalidParameter(format!(
            "output size {width}x{height} is empty"
        )));
    }
    Ok(())
}

/// Return the cached context if it converts `src` to `dst` with `interp`,
/// creating a new one otherwise.
fn context_for<'a>(
    ctx: &'a mut Option<ScaleContext>,
    builds: &mut u64,
    src: FrameShape,
    dst: FrameShape,
    interp: Interpolation,
) -> Result<&'a mut ScaleContext> {
    let stale = ctx.as_ref().map_or(true, |c| {
        c.source() != src || c.destination() != dst || c.interpolation() != interp
    });
    if stale {
        debug!(
            "Recreating conversion context {}x{} {} -> {}x{} {}",
            src.width, src.height, src.format, dst.width, dst.height, dst.format
        );
        *ctx = Some(ScaleContext::new(src, dst, interp).map_err(from_native)?);
        *builds += 1;
    }
    ctx.as_mut()
        .ok_or_else(|| VxError::InvalidParameter("conversion context unavailable".into()))
}

// ── Buffer → NativeFrame ───────────────────────────────────────────

/// Converts generic buffers into native frames.
#[derive(Debug)]
pub struct BufferToNative {
    output_size: Option<(u32, u32)>,
    output_format: Option<PixelFormat>,
    color_space: Option<ColorSpace>,
    color_range: Option<ColorRange>,
    interpolation: Interpolation,
    zero_copy: bool,
    ctx: Option<ScaleContext>,
    context_builds: u64,
    last_error: LastError,
}

impl Default for BufferToNative {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferToNative {
    /// Keeps the input size and picks the canonical native format.
    pub fn new() -> Self {
        Self {
            output_size: None,
            output_format: None,
            color_space: None,
            color_range: None,
            interpolation: Interpolation::Bilinear,
            zero_copy: true,
            ctx: None,
            context_builds: 0,
            last_error: LastError::new(),
        }
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) -> Result<()> {
        let checked = check_size(width, height);
        self.last_error.track(checked)?;
        update(&mut self.output_size, Some((width, height)), &mut self.ctx);
        Ok(())
    }

    pub fn set_output_format(&mut self, format: PixelFormat) -> Result<()> {
        if format.is_hw() {
            return self.last_error.track(Err(VxError::InvalidParameter(format!(
                "{format} cannot be produced from a buffer"
            ))));
        }
        update(&mut self.output_format, Some(format), &mut self.ctx);
        Ok(())
    }

    pub fn set_color_space(&mut self, space: ColorSpace) {
        update(&mut self.color_space, Some(space), &mut self.ctx);
    }

    pub fn set_color_range(&mut self, range: ColorRange) {
        update(&mut self.color_range, Some(range), &mut self.ctx);
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        update(&mut self.interpolation, interpolation, &mut self.ctx);
    }

    /// Allow wrapping CPU buffers without copying (on by default).
    pub fn set_zero_copy(&mut self, zero_copy: bool) {
        self.zero_copy = zero_copy;
    }

    pub fn has_context(&self) -> bool {
        self.ctx.is_some()
    }

    /// How many conversion contexts have been created so far.
    pub fn context_builds(&self) -> u64 {
        self.context_builds
    }

    pub fn last_error(&self) -> &str {
        self.last_error.message()
    }

    /// Convert `input`, stamping the result with `pts`.
    pub fn convert(&mut self, input: &FrameBuffer, pts: Option<i64>) -> Result<NativeFrame> {
        let result = self.convert_inner(input, pts);
        self.last_error.track(result)
    }

    fn convert_inner(&mut self, input: &FrameBuffer, pts: Option<i64>) -> Result<NativeFrame> {
        if input.is_empty() {
            return Err(VxError::InvalidParameter("cannot convert an empty buffer".into()));
        }
        let native = resolve_native(input)?;
        let wrap = self.zero_copy && input.device == Device::Cpu && sample_shift(native) == 0;
        let mut frame = if wrap {
            wrap_buffer(input, native)?
        } else {
            let mut frame =
                NativeFrame::alloc(input.width, input.height, native).map_err(from_native)?;
            copy_buffer_to_frame(input, &mut frame)?;
            frame
        };
        frame.pts = pts;
        frame.color_space = native_color_space_of(input.color_space);
        frame.color_range = native_color_range_of(input.color_range);

        let (width, height) = self.output_size.unwrap_or((input.width, input.height));
        let target = FrameShape::new(width, height, self.output_format.unwrap_or(native));
        let dst_space = native_color_space_of(self.color_space.unwrap_or(input.color_space));
        let dst_range = native_color_range_of(self.color_range.unwrap_or(input.color_range));
        if target == FrameShape::of(&frame)
            && dst_space == frame.color_space
            && dst_range == frame.color_range
        {
            return Ok(frame);
        }

        let ctx = context_for(
            &mut self.ctx,
            &mut self.context_builds,
            FrameShape::of(&frame),
            target,
            self.interpolation,
        )?;
        ctx.set_color_details(ColorDetails {
            src_space: frame.color_space,
            src_range: frame.color_range,
            dst_space,
            dst_range,
        });
        ctx.scale_new(&frame).map_err(from_native)
    }
}

/// View `buffer`'s planes as a native frame without copying.
fn wrap_buffer(buffer: &FrameBuffer, format: PixelFormat) -> Result<NativeFrame> {
    let (source, base, _) = buffer.share_bytes();
    let mut planes = SmallVec::new();
    let mut strides = SmallVec::new();
    for (p, layout) in buffer.plane_layouts().iter().enumerate() {
        let release: Option<Box<dyn FnOnce() + Send + Sync>> = if p == 0 {
            let (w, h) = (buffer.width, buffer.height);
            Some(Box::new(move || trace!("Released zero-copy view of {w}x{h} buffer")))
        } else {
            None
        };
        let plane = PlaneBuffer::from_external(source.clone(), base + layout.offset, layout.len(), release)
            .map_err(from_native)?;
        planes.push(plane);
        strides.push(layout.row_bytes);
    }
    NativeFrame::from_planes(buffer.width, buffer.height, format, planes, strides).map_err(from_native)
}

// ── NativeFrame → Buffer ───────────────────────────────────────────

/// Converts native frames (host or device resident) into generic buffers.
#[derive(Debug)]
pub struct NativeToBuffer {
    output_size: Option<(u32, u32)>,
    output_format: Option<(ColorFormat, ElementType)>,
    color_space: Option<ColorSpace>,
    color_range: Option<ColorRange>,
    interpolation: Interpolation,
    zero_copy: bool,
    ctx: Option<ScaleContext>,
    context_builds: u64,
    last_error: LastError,
}

impl Default for NativeToBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeToBuffer {
    /// Keeps the input size and the generic equivalent of the input format.
    pub fn new() -> Self {
        Self {
            output_size: None,
            output_format: None,
            color_space: None,
            color_range: None,
            interpolation: Interpolation::Bilinear,
            zero_copy: true,
            ctx: None,
            context_builds: 0,
            last_error: LastError::new(),
        }
    }

    pub fn set_output_size(&mut self, width: u32, height: u32) -> Result<()> {
        let checked = check_size(width, height);
        self.last_error.track(checked)?;
        update(&mut self.output_size, Some((width, height)), &mut self.ctx);
        Ok(())
    }

    /// Produce `format` buffers with `element` samples.
    pub fn set_output_format(&mut self, format: ColorFormat, element: ElementType) -> Result<()> {
        if native_pixel_format_for_depth(format, element, element.full_depth()).is_none() {
            return self.last_error.track(Err(VxError::UnsupportedFormat(format!(
                "{format:?} with {element:?} elements"
            ))));
        }
        update(&mut self.output_format, Some((format, element)), &mut self.ctx);
        Ok(())
    }

    pub fn set_color_space(&mut self, space: ColorSpace) {
        update(&mut self.color_space, Some(space), &mut self.ctx);
    }

    pub fn set_color_range(&mut self, range: ColorRange) {
        update(&mut self.color_range, Some(range), &mut self.ctx);
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        update(&mut self.interpolation, interpolation, &mut self.ctx);
    }

    /// Allow aliasing single-plane frames without copying (on by default).
    pub fn set_zero_copy(&mut self, zero_copy: bool) {
        self.zero_copy = zero_copy;
    }

    pub fn has_context(&self) -> bool {
        self.ctx.is_some()
    }

    pub fn context_builds(&self) -> u64 {
        self.context_builds
    }

    pub fn last_error(&self) -> &str {
        self.last_error.message()
    }

    /// Convert `input`, stamping the result with `pts`. Device frames are
    /// transferred to host memory first.
    pub fn convert(&mut self, input: &NativeFrame, pts: Option<i64>) -> Result<FrameBuffer> {
        let result = self.convert_inner(input, pts);
        self.last_error.track(result)
    }

    fn convert_inner(&mut self, input: &NativeFrame, pts: Option<i64>) -> Result<FrameBuffer> {
        let host = if input.is_hw() {
            transfer_to_host(input).map_err(from_native)?
        } else {
            input.clone()
        };

        let (format, element, bit_depth) = match self.output_format {
            Some((format, element)) => {
                let same = color_format_of(host.format) == Some(format)
                    && element_type_of(host.format) == Some(element);
                let depth = if same {
                    bit_depth_of(host.format)
                } else {
                    element.full_depth()
                };
                (format, element, depth)
            }
            None => match (color_format_of(host.format), element_type_of(host.format)) {
                (Some(format), Some(element)) => (format, element, bit_depth_of(host.format)),
                _ => {
                    return Err(VxError::UnsupportedFormat(format!(
                        "native format {} has no generic equivalent",
                        host.format
                    )))
                }
            },
        };
        let native = native_pixel_format_for_depth(format, element, bit_depth).ok_or_else(|| {
            VxError::UnsupportedFormat(format!("{format:?} with {element:?} elements"))
        })?;

        let (space, range) = if format.is_yuv() {
            (
                self.color_space.unwrap_or_else(|| color_space_of(host.color_space)),
                self.color_range
                    .unwrap_or_else(|| effective_range(host.format, host.color_range)),
            )
        } else {
            (
                self.color_space.unwrap_or(ColorSpace::Srgb),
                self.color_range.unwrap_or(ColorRange::Full),
            )
        };

        let (width, height) = self.output_size.unwrap_or((host.width, host.height));
        let target = FrameShape::new(width, height, native);
        let converted = if target == FrameShape::of(&host) {
            host
        } else {
            let ctx = context_for(
                &mut self.ctx,
                &mut self.context_builds,
                FrameShape::of(&host),
                target,
                self.interpolation,
            )?;
            let src_range = native_color_range_of(effective_range(host.format, host.color_range));
            ctx.set_color_details(ColorDetails {
                src_space: host.color_space,
                src_range,
                dst_space: native_color_space_of(space),
                dst_range: native_color_range_of(range),
            });
            ctx.scale_new(&host).map_err(from_native)?
        };

        let buffer = match self.alias(&converted, format, element)? {
            Some(buffer) => buffer,
            None => {
                let mut buffer =
                    FrameBuffer::new(converted.width, converted.height, format, element)?;
                copy_frame_to_buffer(&converted, &mut buffer)?;
                buffer
            }
        };
        Ok(buffer
            .with_pts(pts)
            .with_color(space, range)
            .with_bit_depth(bit_depth))
    }

    /// Borrow a tightly packed single-plane frame as a buffer.
    fn alias(
        &self,
        frame: &NativeFrame,
        format: ColorFormat,
        element: ElementType,
    ) -> Result<Option<FrameBuffer>> {
        if !self.zero_copy || frame.plane_count() != 1 {
            return Ok(None);
        }
        let row_bytes = frame.format.plane_row_bytes(0, frame.width);
        let Some(plane) = frame.plane_buffer(0) else {
            return Ok(None);
        };
        if frame.stride(0) != row_bytes {
            return Ok(None);
        }
        let source: SharedBytes = Arc::new(plane.clone());
        let (w, h) = (frame.width, frame.height);
        let release = ReleaseGuard::new(move || trace!("Released borrowed {w}x{h} native plane"));
        FrameBuffer::borrow_external(w, h, format, element, source, 0, Some(release)).map(Some)
    }
}
