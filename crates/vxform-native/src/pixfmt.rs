//! Native pixel formats and their layout descriptors.
//!
//! Every format carries a descriptor listing, per colour component, which
//! plane it lives in, the byte step between horizontally adjacent samples,
//! the byte offset of the first sample, the bit shift inside the element and
//! the number of significant bits. All plane geometry is derived from it.

use std::fmt;
use std::str::FromStr;

use crate::error::NativeError;

pub const FLAG_PLANAR: u32 = 1 << 0;
pub const FLAG_RGB: u32 = 1 << 1;
pub const FLAG_ALPHA: u32 = 1 << 2;
pub const FLAG_FLOAT: u32 = 1 << 3;
pub const FLAG_HWACCEL: u32 = 1 << 4;

/// Location of one colour component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Component {
    pub plane: u8,
    /// Bytes between two horizontally adjacent samples
    pub step: u8,
    /// Bytes before the first sample of a row
    pub offset: u8,
    /// Bits to shift right to get the value
    pub shift: u8,
    /// Significant bits
    pub depth: u8,
}

const fn c(plane: u8, step: u8, offset: u8, shift: u8, depth: u8) -> Component {
    Component {
        plane,
        step,
        offset,
        shift,
        depth,
    }
}

const NONE: Component = c(0, 0, 0, 0, 0);

/// Layout descriptor of a pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFmtDescriptor {
    pub name: &'static str,
    pub nb_components: u8,
    pub log2_chroma_w: u8,
    pub log2_chroma_h: u8,
    pub flags: u32,
    /// Components in R, G, B, A or Y, U, V, A order
    pub comp: [Component; 4],
}

const fn desc(
    name: &'static str,
    nb_components: u8,
    log2_chroma: (u8, u8),
    flags: u32,
    comp: [Component; 4],
) -> PixFmtDescriptor {
    PixFmtDescriptor {
        name,
        nb_components,
        log2_chroma_w: log2_chroma.0,
        log2_chroma_h: log2_chroma.1,
        flags,
        comp,
    }
}

/// Native pixel formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Gray16le,
    Grayf32le,
    Rgb24,
    Bgr24,
    Rgb48le,
    Bgr48le,
    Rgba,
    Bgra,
    Argb,
    Abgr,
    Rgb0,
    Bgr0,
    ZeroRgb,
    ZeroBgr,
    Rgba64le,
    Bgra64le,
    Rgbf32le,
    Rgbaf32le,
    Yuv420p,
    Yuv422p,
    Yuv444p,
    Yuvj420p,
    Yuvj422p,
    Yuvj444p,
    Yuv420p10le,
    Yuv422p10le,
    Yuv444p10le,
    Yuv420p12le,
    Yuv422p12le,
    Yuv444p12le,
    Yuv420p16le,
    Yuv422p16le,
    Yuv444p16le,
    Yuva420p,
    Yuva444p,
    Yuva420p16le,
    Yuva444p16le,
    Nv12,
    Nv21,
    P010le,
    P016le,
    Yuyv422,
    Uyvy422,
    /// Opaque frame resident in device memory
    HwSurface,
}

impl PixelFormat {
    pub const ALL: &'static [PixelFormat] = &[
        Self::Gray8,
        Self::Gray16le,
        Self::Grayf32le,
        Self::Rgb24,
        Self::Bgr24,
        Self::Rgb48le,
        Self::Bgr48le,
        Self::Rgba,
        Self::Bgra,
        Self::Argb,
        Self::Abgr,
        Self::Rgb0,
        Self::Bgr0,
        Self::ZeroRgb,
        Self::ZeroBgr,
        Self::Rgba64le,
        Self::Bgra64le,
        Self::Rgbf32le,
        Self::Rgbaf32le,
        Self::Yuv420p,
        Self::Yuv422p,
        Self::Yuv444p,
        Self::Yuvj420p,
        Self::Yuvj422p,
        Self::Yuvj444p,
        Self::Yuv420p10le,
        Self::Yuv422p10le,
        Self::Yuv444p10le,
        Self::Yuv420p12le,
        Self::Yuv422p12le,
        Self::Yuv444p12le,
        Self::Yuv420p16le,
        Self::Yuv422p16le,
        Self::Yuv444p16le,
        Self::Yuva420p,
        Self::Yuva444p,
        Self::Yuva420p16le,
        Self::Yuva444p16le,
        Self::Nv12,
        Self::Nv21,
        Self::P010le,
        Self::P016le,
        Self::Yuyv422,
        Self::Uyvy422,
        Self::HwSurface,
    ];

    pub fn descriptor(self) -> PixFmtDescriptor {
        const RGB: u32 = FLAG_RGB;
        const RGBA: u32 = FLAG_RGB | FLAG_ALPHA;
        const P: u32 = FLAG_PLANAR;
        match self {
            Self::Gray8 => desc("gray", 1, (0, 0), 0, [c(0, 1, 0, 0, 8), NONE, NONE, NONE]),
            Self::Gray16le => desc("gray16le", 1, (0, 0), 0, [c(0, 2, 0, 0, 16), NONE, NONE, NONE]),
            Self::Grayf32le => desc(
                "grayf32le",
                1,
                (0, 0),
                FLAG_FLOAT,
                [c(0, 4, 0, 0, 32), NONE, NONE, NONE],
            ),
            Self::Rgb24 => desc(
                "rgb24",
                3,
                (0, 0),
                RGB,
                [c(0, 3, 0, 0, 8), c(0, 3, 1, 0, 8), c(0, 3, 2, 0, 8), NONE],
            ),
            Self::Bgr24 => desc(
                "bgr24",
                3,
                (0, 0),
                RGB,
                [c(0, 3, 2, 0, 8), c(0, 3, 1, 0, 8), c(0, 3, 0, 0, 8), NONE],
            ),
            Self::Rgb48le => desc(
                "rgb48le",
                3,
                (0, 0),
                RGB,
                [c(0, 6, 0, 0, 16), c(0, 6, 2, 0, 16), c(0, 6, 4, 0, 16), NONE],
            ),
            Self::Bgr48le => desc(
                "bgr48le",
                3,
                (0, 0),
                RGB,
                [c(0, 6, 4, 0, 16), c(0, 6, 2, 0, 16), c(0, 6, 0, 0, 16), NONE],
            ),
            Self::Rgba => desc(
                "rgba",
                4,
                (0, 0),
                RGBA,
                [c(0, 4, 0, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 2, 0, 8), c(0, 4, 3, 0, 8)],
            ),
            Self::Bgra => desc(
                "bgra",
                4,
                (0, 0),
                RGBA,
                [c(0, 4, 2, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 0, 0, 8), c(0, 4, 3, 0, 8)],
            ),
            Self::Argb => desc(
                "argb",
                4,
                (0, 0),
                RGBA,
                [c(0, 4, 1, 0, 8), c(0, 4, 2, 0, 8), c(0, 4, 3, 0, 8), c(0, 4, 0, 0, 8)],
            ),
            Self::Abgr => desc(
                "abgr",
                4,
                (0, 0),
                RGBA,
                [c(0, 4, 3, 0, 8), c(0, 4, 2, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 0, 0, 8)],
            ),
            Self::Rgb0 => desc(
                "rgb0",
                3,
                (0, 0),
                RGB,
                [c(0, 4, 0, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 2, 0, 8), NONE],
            ),
            Self::Bgr0 => desc(
                "bgr0",
                3,
                (0, 0),
                RGB,
                [c(0, 4, 2, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 0, 0, 8), NONE],
            ),
            Self::ZeroRgb => desc(
                "0rgb",
                3,
                (0, 0),
                RGB,
                [c(0, 4, 1, 0, 8), c(0, 4, 2, 0, 8), c(0, 4, 3, 0, 8), NONE],
            ),
            Self::ZeroBgr => desc(
                "0bgr",
                3,
                (0, 0),
                RGB,
                [c(0, 4, 3, 0, 8), c(0, 4, 2, 0, 8), c(0, 4, 1, 0, 8), NONE],
            ),
            Self::Rgba64le => desc(
                "rgba64le",
                4,
                (0, 0),
                RGBA,
                [c(0, 8, 0, 0, 16), c(0, 8, 2, 0, 16), c(0, 8, 4, 0, 16), c(0, 8, 6, 0, 16)],
            ),
            Self::Bgra64le => desc(
                "bgra64le",
                4,
                (0, 0),
                RGBA,
                [c(0, 8, 4, 0, 16), c(0, 8, 2, 0, 16), c(0, 8, 0, 0, 16), c(0, 8, 6, 0, 16)],
            ),
            Self::Rgbf32le => desc(
                "rgbf32le",
                3,
                (0, 0),
                RGB | FLAG_FLOAT,
                [c(0, 12, 0, 0, 32), c(0, 12, 4, 0, 32), c(0, 12, 8, 0, 32), NONE],
            ),
            Self::Rgbaf32le => desc(
                "rgbaf32le",
                4,
                (0, 0),
                RGBA | FLAG_FLOAT,
                [
                    c(0, 16, 0, 0, 32),
                    c(0, 16, 4, 0, 32),
                    c(0, 16, 8, 0, 32),
                    c(0, 16, 12, 0, 32),
                ],
            ),
            Self::Yuv420p => planar_yuv("yuv420p", (1, 1), 1, 8),
            Self::Yuv422p => planar_yuv("yuv422p", (1, 0), 1, 8),
            Self::Yuv444p => planar_yuv("yuv444p", (0, 0), 1, 8),
            Self::Yuvj420p => planar_yuv("yuvj420p", (1, 1), 1, 8),
            Self::Yuvj422p => planar_yuv("yuvj422p", (1, 0), 1, 8),
            Self::Yuvj444p => planar_yuv("yuvj444p", (0, 0), 1, 8),
            Self::Yuv420p10le => planar_yuv("yuv420p10le", (1, 1), 2, 10),
            Self::Yuv422p10le => planar_yuv("yuv422p10le", (1, 0), 2, 10),
            Self::Yuv444p10le => planar_yuv("yuv444p10le", (0, 0), 2, 10),
            Self::Yuv420p12le => planar_yuv("yuv420p12le", (1, 1), 2, 12),
            Self::Yuv422p12le => planar_yuv("yuv422p12le", (1, 0), 2, 12),
            Self::Yuv444p12le => planar_yuv("yuv444p12le", (0, 0), 2, 12),
            Self::Yuv420p16le => planar_yuv("yuv420p16le", (1, 1), 2, 16),
            Self::Yuv422p16le => planar_yuv("yuv422p16le", (1, 0), 2, 16),
            Self::Yuv444p16le => planar_yuv("yuv444p16le", (0, 0), 2, 16),
            Self::Yuva420p => planar_yuva("yuva420p", (1, 1), 1, 8),
            Self::Yuva444p => planar_yuva("yuva444p", (0, 0), 1, 8),
            Self::Yuva420p16le => planar_yuva("yuva420p16le", (1, 1), 2, 16),
            Self::Yuva444p16le => planar_yuva("yuva444p16le", (0, 0), 2, 16),
            Self::Nv12 => desc(
                "nv12",
                3,
                (1, 1),
                P,
                [c(0, 1, 0, 0, 8), c(1, 2, 0, 0, 8), c(1, 2, 1, 0, 8), NONE],
            ),
            Self::Nv21 => desc(
                "nv21",
                3,
                (1, 1),
                P,
                [c(0, 1, 0, 0, 8), c(1, 2, 1, 0, 8), c(1, 2, 0, 0, 8), NONE],
            ),
            Self::P010le => desc(
                "p010le",
                3,
                (1, 1),
                P,
                [c(0, 2, 0, 6, 10), c(1, 4, 0, 6, 10), c(1, 4, 2, 6, 10), NONE],
            ),
            Self::P016le => desc(
                "p016le",
                3,
                (1, 1),
                P,
                [c(0, 2, 0, 0, 16), c(1, 4, 0, 0, 16), c(1, 4, 2, 0, 16), NONE],
            ),
            Self::Yuyv422 => desc(
                "yuyv422",
                3,
                (1, 0),
                0,
                [c(0, 2, 0, 0, 8), c(0, 4, 1, 0, 8), c(0, 4, 3, 0, 8), NONE],
            ),
            Self::Uyvy422 => desc(
                "uyvy422",
                3,
                (1, 0),
                0,
                [c(0, 2, 1, 0, 8), c(0, 4, 0, 0, 8), c(0, 4, 2, 0, 8), NONE],
            ),
            Self::HwSurface => desc("hwsurface", 0, (0, 0), FLAG_HWACCEL, [NONE; 4]),
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    // ── Classification ─────────────────────────────────────────────

    pub fn is_rgb(self) -> bool {
        self.descriptor().flags & FLAG_RGB != 0
    }

    pub fn is_gray(self) -> bool {
        self.descriptor().nb_components == 1
    }

    pub fn is_yuv(self) -> bool {
        !self.is_rgb() && !self.is_gray() && !self.is_hw()
    }

    pub fn has_alpha(self) -> bool {
        self.descriptor().flags & FLAG_ALPHA != 0
    }

    pub fn is_float(self) -> bool {
        self.descriptor().flags & FLAG_FLOAT != 0
    }

    pub fn is_hw(self) -> bool {
        self.descriptor().flags & FLAG_HWACCEL != 0
    }

    /// `yuvj*` formats imply full range regardless of the frame's range tag.
    pub fn is_full_range_alias(self) -> bool {
        matches!(self, Self::Yuvj420p | Self::Yuvj422p | Self::Yuvj444p)
    }

    /// Largest component depth in bits.
    pub fn max_depth(self) -> u8 {
        let d = self.descriptor();
        d.comp[..d.nb_components as usize]
            .iter()
            .map(|c| c.depth)
            .max()
            .unwrap_or(0)
    }

    // ── Plane geometry ─────────────────────────────────────────────

    pub fn plane_count(self) -> usize {
        let d = self.descriptor();
        d.comp[..d.nb_components as usize]
            .iter()
            .map(|c| c.plane as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Log2 subsampling of component `index`.
    pub fn comp_shift(self, index: usize) -> (u32, u32) {
        let d = self.descriptor();
        if self.is_yuv() && (index == 1 || index == 2) {
            (d.log2_chroma_w as u32, d.log2_chroma_h as u32)
        } else {
            (0, 0)
        }
    }

    /// Bytes needed for one row of `plane` in a `width` pixels wide image.
    pub fn plane_row_bytes(self, plane: usize, width: u32) -> usize {
        let d = self.descriptor();
        (0..d.nb_components as usize)
            .filter(|&i| d.comp[i].plane as usize == plane)
            .map(|i| {
                let (sx, _) = self.comp_shift(i);
                ceil_shift(width, sx) as usize * d.comp[i].step as usize
            })
            .max()
            .unwrap_or(0)
    }

    /// Number of rows of `plane` in a `height` pixels tall image.
    pub fn plane_rows(self, plane: usize, height: u32) -> usize {
        let d = self.descriptor();
        (0..d.nb_components as usize)
            .filter(|&i| d.comp[i].plane as usize == plane)
            .map(|i| ceil_shift(height, self.comp_shift(i).1) as usize)
            .max()
            .unwrap_or(0)
    }

    /// Horizontal and vertical alignment required for crop offsets.
    pub fn crop_alignment(self) -> (u32, u32) {
        if self.is_yuv() {
            let d = self.descriptor();
            (1 << d.log2_chroma_w, 1 << d.log2_chroma_h)
        } else {
            (1, 1)
        }
    }
}

fn planar_yuv(name: &'static str, log2: (u8, u8), step: u8, depth: u8) -> PixFmtDescriptor {
    desc(
        name,
        3,
        log2,
        FLAG_PLANAR,
        [
            c(0, step, 0, 0, depth),
            c(1, step, 0, 0, depth),
            c(2, step, 0, 0, depth),
            NONE,
        ],
    )
}

fn planar_yuva(name: &'static str, log2: (u8, u8), step: u8, depth: u8) -> PixFmtDescriptor {
    desc(
        name,
        4,
        log2,
        FLAG_PLANAR | FLAG_ALPHA,
        [
            c(0, step, 0, 0, depth),
            c(1, step, 0, 0, depth),
            c(2, step, 0, 0, depth),
            c(3, step, 0, 0, depth),
        ],
    )
}

/// Right shift rounding up.
#[inline]
pub fn ceil_shift(value: u32, shift: u32) -> u32 {
    ((value as u64 + (1u64 << shift) - 1) >> shift) as u32
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = NativeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| NativeError::InvalidArgument(format!("unknown pixel format '{s}'")))
    }
}

// ── Colour metadata ────────────────────────────────────────────────

/// Native colour space (matrix coefficients) codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NativeColorSpace {
    Rgb,
    Bt709,
    #[default]
    Unspecified,
    Fcc,
    Bt470bg,
    Smpte170m,
    Smpte240m,
    Bt2020Ncl,
    Bt2020Cl,
}

impl NativeColorSpace {
    pub fn name(self) -> &'static str {
        match self {
            Self::Rgb => "gbr",
            Self::Bt709 => "bt709",
            Self::Unspecified => "unknown",
            Self::Fcc => "fcc",
            Self::Bt470bg => "bt470bg",
            Self::Smpte170m => "smpte170m",
            Self::Smpte240m => "smpte240m",
            Self::Bt2020Ncl => "bt2020nc",
            Self::Bt2020Cl => "bt2020c",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Rgb,
            Self::Bt709,
            Self::Unspecified,
            Self::Fcc,
            Self::Bt470bg,
            Self::Smpte170m,
            Self::Smpte240m,
            Self::Bt2020Ncl,
            Self::Bt2020Cl,
        ]
        .into_iter()
        .find(|s| s.name() == name)
    }

    /// Luma coefficients (Kr, Kb) of the YUV matrix.
    pub fn luma_coefficients(self) -> (f32, f32) {
        match self {
            Self::Fcc => (0.30, 0.11),
            Self::Bt470bg | Self::Smpte170m => (0.299, 0.114),
            Self::Smpte240m => (0.212, 0.087),
            Self::Bt2020Ncl | Self::Bt2020Cl => (0.2627, 0.0593),
            Self::Rgb | Self::Bt709 | Self::Unspecified => (0.2126, 0.0722),
        }
    }
}

/// Native colour range codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NativeColorRange {
    #[default]
    Unspecified,
    /// Limited range
    Mpeg,
    /// Full range
    Jpeg,
}

impl NativeColorRange {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unspecified => "unknown",
            Self::Mpeg => "tv",
            Self::Jpeg => "pc",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "unknown" | "unspecified" => Some(Self::Unspecified),
            "tv" | "mpeg" | "limited" => Some(Self::Mpeg),
            "pc" | "jpeg" | "full" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for &fmt in PixelFormat::ALL {
            assert_eq!(PixelFormat::from_name(fmt.name()), Some(fmt));
        }
        assert!("nope".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn test_yuv420p_geometry() {
        let f = PixelFormat::Yuv420p;
        assert_eq!(f.plane_count(), 3);
        assert_eq!(f.plane_row_bytes(0, 5), 5);
        assert_eq!(f.plane_row_bytes(1, 5), 3);
        assert_eq!(f.plane_rows(2, 5), 3);
        assert_eq!(f.crop_alignment(), (2, 2));
    }

    #[test]
    fn test_packed_and_semi_planar_geometry() {
        assert_eq!(PixelFormat::Rgb24.plane_row_bytes(0, 10), 30);
        assert_eq!(PixelFormat::Rgba64le.plane_row_bytes(0, 10), 80);
        assert_eq!(PixelFormat::Nv12.plane_count(), 2);
        assert_eq!(PixelFormat::Nv12.plane_row_bytes(1, 7), 8);
        assert_eq!(PixelFormat::P010le.plane_row_bytes(1, 8), 16);
        assert_eq!(PixelFormat::Yuyv422.plane_row_bytes(0, 3), 8);
        assert_eq!(PixelFormat::Yuva420p.plane_rows(3, 5), 5);
    }

    #[test]
    fn test_classification() {
        assert!(PixelFormat::Bgra.has_alpha());
        assert!(!PixelFormat::Rgb0.has_alpha());
        assert!(PixelFormat::Yuva444p.has_alpha());
        assert!(PixelFormat::Nv21.is_yuv());
        assert!(PixelFormat::Gray16le.is_gray());
        assert!(PixelFormat::HwSurface.is_hw());
        assert_eq!(PixelFormat::HwSurface.plane_count(), 0);
        assert_eq!(PixelFormat::P010le.max_depth(), 10);
    }
}
