//! Mapping between generic buffer formats and native pixel formats.
//!
//! The mapping is partial and not symmetric. Several native formats fold
//! onto one generic colour format (padded RGB onto its alpha sibling, the
//! `yuvj*` full-range aliases onto plain YUV, every bit depth of a YUV
//! layout onto the same tag). The inverse always picks one canonical native
//! format per (colour format, element type, bit depth).

use vxform_core::{ColorFormat, ColorRange, ColorSpace, ElementType, FrameBuffer, Result, VxError};
use vxform_native::{NativeColorRange, NativeColorSpace, PixelFormat};

/// Generic colour format of a native pixel format, `None` when unmapped.
pub fn color_format_of(format: PixelFormat) -> Option<ColorFormat> {
    use PixelFormat as P;
    Some(match format {
        P::Gray8 | P::Gray16le | P::Grayf32le => ColorFormat::Gray,
        P::Rgb24 | P::Rgb48le | P::Rgbf32le => ColorFormat::Rgb,
        P::Bgr24 | P::Bgr48le => ColorFormat::Bgr,
        P::Rgba | P::Rgb0 | P::Rgba64le | P::Rgbaf32le => ColorFormat::Rgba,
        P::Bgra | P::Bgr0 | P::Bgra64le => ColorFormat::Bgra,
        P::Argb | P::ZeroRgb => ColorFormat::Argb,
        P::Abgr | P::ZeroBgr => ColorFormat::Abgr,
        P::Yuv420p | P::Yuvj420p | P::Yuv420p10le | P::Yuv420p12le | P::Yuv420p16le => {
            ColorFormat::Yuv420
        }
        P::Yuv422p | P::Yuvj422p | P::Yuv422p10le | P::Yuv422p12le | P::Yuv422p16le => {
            ColorFormat::Yuv422
        }
        P::Yuv444p | P::Yuvj444p | P::Yuv444p10le | P::Yuv444p12le | P::Yuv444p16le => {
            ColorFormat::Yuv444
        }
        P::Yuva420p | P::Yuva420p16le => ColorFormat::Yuva420,
        P::Yuva444p | P::Yuva444p16le => ColorFormat::Yuva444,
        P::Nv12 | P::P010le | P::P016le => ColorFormat::Nv12,
        P::Nv21 => ColorFormat::Nv21,
        P::Yuyv422 | P::Uyvy422 | P::HwSurface => return None,
    })
}

/// Element type holding one sample of `format`.
pub fn element_type_of(format: PixelFormat) -> Option<ElementType> {
    color_format_of(format)?;
    Some(if format.is_float() {
        ElementType::F32
    } else if format.max_depth() > 8 {
        ElementType::U16
    } else {
        ElementType::U8
    })
}

/// Significant bits per sample of `format`.
pub fn bit_depth_of(format: PixelFormat) -> u8 {
    if format.is_float() {
        32
    } else {
        format.max_depth()
    }
}

/// Canonical native format for a colour format and element type, assuming
/// every bit of the element is significant.
pub fn native_pixel_format_of(format: ColorFormat, element: ElementType) -> Option<PixelFormat> {
    native_pixel_format_for_depth(format, element, element.full_depth())
}

/// Like [`native_pixel_format_of`], choosing 10 and 12-bit layouts for
/// `U16` YUV buffers with that many significant bits.
pub fn native_pixel_format_for_depth(
    format: ColorFormat,
    element: ElementType,
    bit_depth: u8,
) -> Option<PixelFormat> {
    use ColorFormat as C;
    use ElementType as E;
    use PixelFormat as P;
    Some(match (format, element) {
        (C::Gray, E::U8) => P::Gray8,
        (C::Gray, E::U16) => P::Gray16le,
        (C::Gray, E::F32) => P::Grayf32le,
        (C::Rgb, E::U8) => P::Rgb24,
        (C::Rgb, E::U16) => P::Rgb48le,
        (C::Rgb, E::F32) => P::Rgbf32le,
        (C::Bgr, E::U8) => P::Bgr24,
        (C::Bgr, E::U16) => P::Bgr48le,
        (C::Rgba, E::U8) => P::Rgba,
        (C::Rgba, E::U16) => P::Rgba64le,
        (C::Rgba, E::F32) => P::Rgbaf32le,
        (C::Bgra, E::U8) => P::Bgra,
        (C::Bgra, E::U16) => P::Bgra64le,
        (C::Argb, E::U8) => P::Argb,
        (C::Abgr, E::U8) => P::Abgr,
        (C::Yuv420, E::U8) => P::Yuv420p,
        (C::Yuv422, E::U8) => P::Yuv422p,
        (C::Yuv444, E::U8) => P::Yuv444p,
        (C::Yuv420, E::U16) => by_depth(bit_depth, P::Yuv420p10le, P::Yuv420p12le, P::Yuv420p16le),
        (C::Yuv422, E::U16) => by_depth(bit_depth, P::Yuv422p10le, P::Yuv422p12le, P::Yuv422p16le),
        (C::Yuv444, E::U16) => by_depth(bit_depth, P::Yuv444p10le, P::Yuv444p12le, P::Yuv444p16le),
        (C::Yuva420, E::U8) => P::Yuva420p,
        (C::Yuva420, E::U16) => P::Yuva420p16le,
        (C::Yuva444, E::U8) => P::Yuva444p,
        (C::Yuva444, E::U16) => P::Yuva444p16le,
        (C::Nv12, E::U8) => P::Nv12,
        (C::Nv12, E::U16) if bit_depth == 10 => P::P010le,
        (C::Nv12, E::U16) => P::P016le,
        (C::Nv21, E::U8) => P::Nv21,
        _ => return None,
    })
}

fn by_depth(bit_depth: u8, d10: PixelFormat, d12: PixelFormat, d16: PixelFormat) -> PixelFormat {
    match bit_depth {
        10 => d10,
        12 => d12,
        _ => d16,
    }
}

/// Native format for `buffer`, or `UnsupportedFormat`.
pub fn resolve_native(buffer: &FrameBuffer) -> Result<PixelFormat> {
    native_pixel_format_for_depth(buffer.format, buffer.element, buffer.bit_depth).ok_or_else(|| {
        VxError::UnsupportedFormat(format!(
            "no native format for {:?} with {:?} elements",
            buffer.format, buffer.element
        ))
    })
}

/// Generic layout of a native format, or `UnsupportedFormat`.
pub fn resolve_generic(format: PixelFormat) -> Result<(ColorFormat, ElementType)> {
    match (color_format_of(format), element_type_of(format)) {
        (Some(color), Some(element)) => Ok((color, element)),
        _ => Err(VxError::UnsupportedFormat(format!(
            "native format {format} has no generic equivalent"
        ))),
    }
}

// ── Colour metadata ────────────────────────────────────────────────

/// Unspecified folds to BT.709.
pub fn color_space_of(space: NativeColorSpace) -> ColorSpace {
    match space {
        NativeColorSpace::Rgb => ColorSpace::Srgb,
        NativeColorSpace::Fcc | NativeColorSpace::Bt470bg | NativeColorSpace::Smpte170m => {
            ColorSpace::Bt601
        }
        NativeColorSpace::Bt2020Ncl | NativeColorSpace::Bt2020Cl => ColorSpace::Bt2020,
        NativeColorSpace::Bt709 | NativeColorSpace::Smpte240m | NativeColorSpace::Unspecified => {
            ColorSpace::Bt709
        }
    }
}

pub fn native_color_space_of(space: ColorSpace) -> NativeColorSpace {
    match space {
        ColorSpace::Srgb => NativeColorSpace::Rgb,
        ColorSpace::Bt601 => NativeColorSpace::Smpte170m,
        ColorSpace::Bt709 => NativeColorSpace::Bt709,
        ColorSpace::Bt2020 => NativeColorSpace::Bt2020Ncl,
    }
}

/// Unspecified folds to narrow range.
pub fn color_range_of(range: NativeColorRange) -> ColorRange {
    match range {
        NativeColorRange::Jpeg => ColorRange::Full,
        NativeColorRange::Mpeg | NativeColorRange::Unspecified => ColorRange::Narrow,
    }
}

pub fn native_color_range_of(range: ColorRange) -> NativeColorRange {
    match range {
        ColorRange::Full => NativeColorRange::Jpeg,
        ColorRange::Narrow => NativeColorRange::Mpeg,
    }
}

/// Range of a native frame, honouring the `yuvj*` full-range aliases.
pub fn effective_range(format: PixelFormat, range: NativeColorRange) -> ColorRange {
    if format.is_full_range_alias() {
        ColorRange::Full
    } else {
        color_range_of(range)
    }
}
