//! Generic frame buffers in application memory.
//!
//! Planes are stored back to back with tight rows (no padding). Chroma plane
//! sizes round up, so odd dimensions keep their last chroma sample.

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};

use crate::color::{ColorRange, ColorSpace};
use crate::error::{Result, VxError};
use crate::storage::{Ownership, PixelStorage, ReleaseGuard, SharedBytes};

/// Sample element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ElementType {
    #[default]
    U8,
    U16,
    U32,
    F32,
}

impl ElementType {
    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }

    /// Bit depth when every bit of the element is significant.
    pub fn full_depth(self) -> u8 {
        (self.size() * 8) as u8
    }
}

/// Colour model and channel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ColorFormat {
    Gray,
    Rgb,
    Bgr,
    #[default]
    Rgba,
    Bgra,
    Argb,
    Abgr,
    /// Planar YUV 4:2:0
    Yuv420,
    /// Planar YUV 4:2:2
    Yuv422,
    /// Planar YUV 4:4:4
    Yuv444,
    /// Planar YUV 4:2:0 with full resolution alpha
    Yuva420,
    /// Planar YUV 4:4:4 with alpha
    Yuva444,
    /// Luma plane + interleaved UV plane, 4:2:0
    Nv12,
    /// Luma plane + interleaved VU plane, 4:2:0
    Nv21,
}

impl ColorFormat {
    /// Number of colour channels (alpha included).
    pub fn channels(self) -> u32 {
        match self {
            Self::Gray => 1,
            Self::Rgb | Self::Bgr | Self::Yuv420 | Self::Yuv422 | Self::Yuv444 => 3,
            Self::Nv12 | Self::Nv21 => 3,
            Self::Rgba | Self::Bgra | Self::Argb | Self::Abgr => 4,
            Self::Yuva420 | Self::Yuva444 => 4,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::Rgba | Self::Bgra | Self::Argb | Self::Abgr | Self::Yuva420 | Self::Yuva444
        )
    }

    pub fn is_yuv(self) -> bool {
        matches!(
            self,
            Self::Yuv420
                | Self::Yuv422
                | Self::Yuv444
                | Self::Yuva420
                | Self::Yuva444
                | Self::Nv12
                | Self::Nv21
        )
    }

    pub fn is_planar(self) -> bool {
        self.is_yuv()
    }

    /// Log2 chroma subsampling (horizontal, vertical).
    pub fn chroma_shift(self) -> (u32, u32) {
        match self {
            Self::Yuv420 | Self::Yuva420 | Self::Nv12 | Self::Nv21 => (1, 1),
            Self::Yuv422 => (1, 0),
            _ => (0, 0),
        }
    }

    /// Per-plane shape: (samples per row, rows) for a `width`x`height` image.
    pub fn plane_shapes(self, width: u32, height: u32) -> SmallVec<[(usize, usize); 4]> {
        let (sx, sy) = self.chroma_shift();
        let (w, h) = (width as usize, height as usize);
        let cw = ceil_shift(width, sx) as usize;
        let ch = ceil_shift(height, sy) as usize;
        match self {
            Self::Gray => smallvec![(w, h)],
            Self::Rgb | Self::Bgr => smallvec![(w * 3, h)],
            Self::Rgba | Self::Bgra | Self::Argb | Self::Abgr => smallvec![(w * 4, h)],
            Self::Yuv420 | Self::Yuv422 | Self::Yuv444 => smallvec![(w, h), (cw, ch), (cw, ch)],
            Self::Yuva420 | Self::Yuva444 => smallvec![(w, h), (cw, ch), (cw, ch), (w, h)],
            Self::Nv12 | Self::Nv21 => smallvec![(w, h), (cw * 2, ch)],
        }
    }
}

/// Right shift rounding up, used for chroma plane dimensions.
#[inline]
pub fn ceil_shift(value: u32, shift: u32) -> u32 {
    ((value as u64 + (1u64 << shift) - 1) >> shift) as u32
}

/// Where the buffer's pixels are resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Gpu,
}

/// Byte layout of one plane inside a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Offset of the first row in the buffer's bytes
    pub offset: usize,
    /// Bytes per row
    pub row_bytes: usize,
    /// Number of rows
    pub rows: usize,
}

impl PlaneLayout {
    pub fn len(&self) -> usize {
        self.row_bytes * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A generic video frame.
///
/// Cloning is cheap: clones share storage until one of them writes.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    pub width: u32,
    pub height: u32,
    pub format: ColorFormat,
    pub element: ElementType,
    /// Significant bits per sample (10 for 10-bit video in `U16` elements)
    pub bit_depth: u8,
    pub color_space: ColorSpace,
    pub color_range: ColorRange,
    pub device: Device,
    /// Presentation timestamp
    pub pts: Option<i64>,
    storage: PixelStorage,
}

impl FrameBuffer {
    /// Allocate a zero-filled buffer.
    pub fn new(width: u32, height: u32, format: ColorFormat, element: ElementType) -> Result<Self> {
        let len = Self::required_len(width, height, format, element);
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            VxError::AllocationFailure(format!("{len} bytes for {width}x{height} {format:?}: {e}"))
        })?;
        data.resize(len, 0);
        Ok(Self::with_storage(width, height, format, element, PixelStorage::owned(data)))
    }

    /// Build a buffer around existing tightly packed bytes.
    pub fn from_vec(
        width: u32,
        height: u32,
        format: ColorFormat,
        element: ElementType,
        data: Vec<u8>,
    ) -> Result<Self> {
        let len = Self::required_len(width, height, format, element);
        if data.len() != len {
            return Err(VxError::InvalidParameter(format!(
                "{width}x{height} {format:?}/{element:?} needs {len} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self::with_storage(width, height, format, element, PixelStorage::owned(data)))
    }

    /// Alias `len` bytes of `source` starting at `offset` without copying.
    ///
    /// `release` runs once the last buffer (or zero-copy view) referring to
    /// the window is dropped.
    pub fn borrow_external(
        width: u32,
        height: u32,
        format: ColorFormat,
        element: ElementType,
        source: SharedBytes,
        offset: usize,
        release: Option<ReleaseGuard>,
    ) -> Result<Self> {
        let len = Self::required_len(width, height, format, element);
        let storage = PixelStorage::borrowed(source, offset, len, release).ok_or_else(|| {
            VxError::InvalidParameter(format!(
                "external window of {len} bytes at offset {offset} exceeds source"
            ))
        })?;
        Ok(Self::with_storage(width, height, format, element, storage))
    }

    fn with_storage(
        width: u32,
        height: u32,
        format: ColorFormat,
        element: ElementType,
        storage: PixelStorage,
    ) -> Self {
        Self {
            width,
            height,
            format,
            element,
            bit_depth: element.full_depth(),
            color_space: if format.is_yuv() {
                ColorSpace::Bt709
            } else {
                ColorSpace::Srgb
            },
            color_range: if format.is_yuv() {
                ColorRange::Narrow
            } else {
                ColorRange::Full
            },
            device: Device::Cpu,
            pts: None,
            storage,
        }
    }

    /// Total bytes for a tight buffer of the given shape.
    pub fn required_len(width: u32, height: u32, format: ColorFormat, element: ElementType) -> usize {
        format
            .plane_shapes(width, height)
            .iter()
            .map(|&(w, h)| w * h * element.size())
            .sum()
    }

    // ── Builders ───────────────────────────────────────────────────

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn with_color(mut self, space: ColorSpace, range: ColorRange) -> Self {
        self.color_space = space;
        self.color_range = range;
        self
    }

    pub fn with_bit_depth(mut self, depth: u8) -> Self {
        self.bit_depth = depth;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    // ── Layout ─────────────────────────────────────────────────────

    pub fn channels(&self) -> u32 {
        self.format.channels()
    }

    pub fn plane_count(&self) -> usize {
        self.format.plane_shapes(self.width, self.height).len()
    }

    pub fn plane_layouts(&self) -> SmallVec<[PlaneLayout; 4]> {
        let mut offset = 0;
        self.format
            .plane_shapes(self.width, self.height)
            .iter()
            .map(|&(w, h)| {
                let layout = PlaneLayout {
                    offset,
                    row_bytes: w * self.element.size(),
                    rows: h,
                };
                offset += layout.len();
                layout
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    // ── Pixel access ───────────────────────────────────────────────

    pub fn data(&self) -> &[u8] {
        self.storage.bytes()
    }

    /// Mutable pixels; detaches shared or borrowed storage first.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.storage.bytes_mut()
    }

    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let layout = *self.plane_layouts().get(index)?;
        self.data().get(layout.offset..layout.offset + layout.len())
    }

    pub fn plane_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let layout = *self.plane_layouts().get(index)?;
        self.data_mut()
            .get_mut(layout.offset..layout.offset + layout.len())
    }

    /// Typed view of the pixels, `None` if the element size or alignment
    /// does not fit `T`.
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.data()).ok()
    }

    // ── Ownership ──────────────────────────────────────────────────

    pub fn ownership(&self) -> Ownership {
        self.storage.ownership()
    }

    pub fn shares_storage_with(&self, other: &Self) -> bool {
        self.storage.same_bytes(&other.storage)
    }

    /// A zero-copy handle to this buffer's bytes (source, offset, len).
    pub fn share_bytes(&self) -> (SharedBytes, usize, usize) {
        self.storage.share()
    }

    /// Colour bars, RGBA/U8 only.
    pub fn test_pattern(width: u32, height: u32) -> Result<Self> {
        const BARS: [[u8; 4]; 8] = [
            [255, 255, 255, 255],
            [255, 255, 0, 255],
            [0, 255, 255, 255],
            [0, 255, 0, 255],
            [255, 0, 255, 255],
            [255, 0, 0, 255],
            [0, 0, 255, 255],
            [0, 0, 0, 255],
        ];
        let mut frame = Self::new(width, height, ColorFormat::Rgba, ElementType::U8)?;
        let row_bytes = width as usize * 4;
        if row_bytes == 0 {
            return Ok(frame);
        }
        for row in frame.data_mut().chunks_exact_mut(row_bytes) {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let bar = x * 8 / width as usize;
                px.copy_from_slice(&BARS[bar]);
            }
        }
        Ok(frame)
    }
}
