//! Native frames with reference-counted plane buffers.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{NativeError, Result};
use crate::hw::HwSurface;
use crate::pixfmt::{NativeColorRange, NativeColorSpace, PixelFormat};

/// Row alignment of allocated planes.
pub const STRIDE_ALIGN: usize = 64;

/// Bytes lent to a plane buffer from outside the library.
pub type ExternalBytes = Arc<dyn AsRef<[u8]> + Send + Sync>;

enum BufferData {
    Owned(Vec<u8>),
    External {
        source: ExternalBytes,
        release: Option<Box<dyn FnOnce() + Send + Sync>>,
    },
}

struct BufferInner {
    data: BufferData,
}

impl BufferInner {
    fn bytes(&self) -> &[u8] {
        match &self.data {
            BufferData::Owned(v) => v,
            BufferData::External { source, .. } => (**source).as_ref(),
        }
    }
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        if let BufferData::External { release, .. } = &mut self.data {
            if let Some(release) = release.take() {
                release();
            }
        }
    }
}

/// A reference-counted view into a plane's bytes.
///
/// Clones share the underlying memory; the memory (and, for external
/// memory, its release callback) goes away with the last reference.
#[derive(Clone)]
pub struct PlaneBuffer {
    inner: Arc<BufferInner>,
    offset: usize,
    len: usize,
}

impl PlaneBuffer {
    /// Allocate `len` zeroed bytes.
    pub fn alloc(len: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| NativeError::OutOfMemory(format!("{len} bytes: {e}")))?;
        data.resize(len, 0);
        Ok(Self::from_vec(data))
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        let len = data.len();
        Self {
            inner: Arc::new(BufferInner {
                data: BufferData::Owned(data),
            }),
            offset: 0,
            len,
        }
    }

    /// Wrap external memory without copying. `release` runs when the last
    /// reference is dropped.
    pub fn from_external(
        source: ExternalBytes,
        offset: usize,
        len: usize,
        release: Option<Box<dyn FnOnce() + Send + Sync>>,
    ) -> Result<Self> {
        let available = (*source).as_ref().len();
        if offset.checked_add(len).map_or(true, |end| end > available) {
            return Err(NativeError::InvalidArgument(format!(
                "external window {offset}+{len} exceeds {available} bytes"
            )));
        }
        Ok(Self {
            inner: Arc::new(BufferInner {
                data: BufferData::External { source, release },
            }),
            offset,
            len,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.inner.bytes()[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of live references to the underlying memory.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Writable when owned by the library and referenced only here.
    pub fn is_writable(&self) -> bool {
        matches!(self.inner.data, BufferData::Owned(_)) && Arc::strong_count(&self.inner) == 1
    }

    /// Ensure exclusive owned memory, copying if shared or external.
    pub fn make_writable(&mut self) -> Result<&mut [u8]> {
        if !self.is_writable() {
            let mut copy = Self::alloc(self.len)?;
            if let Some(dst) = copy.owned_mut() {
                dst.copy_from_slice(self.data());
            }
            *self = copy;
        }
        self.owned_mut()
            .ok_or_else(|| NativeError::InvalidArgument("buffer is not writable".into()))
    }

    fn owned_mut(&mut self) -> Option<&mut [u8]> {
        let (offset, len) = (self.offset, self.len);
        match Arc::get_mut(&mut self.inner).map(|inner| &mut inner.data) {
            Some(BufferData::Owned(v)) => Some(&mut v[offset..offset + len]),
            _ => None,
        }
    }

    /// A sub-view sharing the same memory.
    pub fn slice(&self, offset: usize, len: usize) -> Result<Self> {
        if offset.checked_add(len).map_or(true, |end| end > self.len) {
            return Err(NativeError::InvalidArgument(format!(
                "slice {offset}+{len} exceeds buffer of {} bytes",
                self.len
            )));
        }
        Ok(Self {
            inner: self.inner.clone(),
            offset: self.offset + offset,
            len,
        })
    }

    /// Whether both views point at the same memory.
    pub fn same_memory(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl AsRef<[u8]> for PlaneBuffer {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl fmt::Debug for PlaneBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaneBuffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("refs", &self.ref_count())
            .field(
                "external",
                &matches!(self.inner.data, BufferData::External { .. }),
            )
            .finish()
    }
}

/// A video frame in the native library's representation.
#[derive(Clone)]
pub struct NativeFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub color_space: NativeColorSpace,
    pub color_range: NativeColorRange,
    pub pts: Option<i64>,
    planes: SmallVec<[PlaneBuffer; 4]>,
    strides: SmallVec<[usize; 4]>,
    hw: Option<Arc<dyn HwSurface>>,
}

impl NativeFrame {
    /// Allocate a zeroed frame with 64-byte aligned strides.
    pub fn alloc(width: u32, height: u32, format: PixelFormat) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(NativeError::InvalidArgument(format!(
                "cannot allocate a {width}x{height} frame"
            )));
        }
        if format.is_hw() {
            return Err(NativeError::InvalidArgument(
                "hardware frames cannot be allocated in host memory".into(),
            ));
        }
        let mut planes = SmallVec::new();
        let mut strides = SmallVec::new();
        for p in 0..format.plane_count() {
            let stride = align(format.plane_row_bytes(p, width), STRIDE_ALIGN);
            let rows = format.plane_rows(p, height);
            let len = stride
                .checked_mul(rows)
                .ok_or_else(|| NativeError::OutOfMemory(format!("plane {p} size overflows")))?;
            planes.push(PlaneBuffer::alloc(len)?);
            strides.push(stride);
        }
        Ok(Self {
            width,
            height,
            format,
            color_space: NativeColorSpace::Unspecified,
            color_range: NativeColorRange::Unspecified,
            pts: None,
            planes,
            strides,
            hw: None,
        })
    }

    /// Assemble a frame from existing plane buffers.
    pub fn from_planes(
        width: u32,
        height: u32,
        format: PixelFormat,
        planes: SmallVec<[PlaneBuffer; 4]>,
        strides: SmallVec<[usize; 4]>,
    ) -> Result<Self> {
        if planes.len() != format.plane_count() || strides.len() != planes.len() {
            return Err(NativeError::InvalidArgument(format!(
                "{format} needs {} planes, got {}",
                format.plane_count(),
                planes.len()
            )));
        }
        for (p, (buf, &stride)) in planes.iter().zip(strides.iter()).enumerate() {
            let row_bytes = format.plane_row_bytes(p, width);
            let rows = format.plane_rows(p, height);
            if stride < row_bytes || buf.len() < required_len(stride, row_bytes, rows) {
                return Err(NativeError::InvalidArgument(format!(
                    "plane {p} of {width}x{height} {format}: stride {stride}, {} bytes",
                    buf.len()
                )));
            }
        }
        Ok(Self {
            width,
            height,
            format,
            color_space: NativeColorSpace::Unspecified,
            color_range: NativeColorRange::Unspecified,
            pts: None,
            planes,
            strides,
            hw: None,
        })
    }

    /// A frame whose pixels live on a device surface.
    pub fn from_hw(width: u32, height: u32, surface: Arc<dyn HwSurface>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::HwSurface,
            color_space: NativeColorSpace::Unspecified,
            color_range: NativeColorRange::Unspecified,
            pts: None,
            planes: SmallVec::new(),
            strides: SmallVec::new(),
            hw: Some(surface),
        }
    }

    pub fn is_hw(&self) -> bool {
        self.hw.is_some()
    }

    pub fn hw_surface(&self) -> Option<&Arc<dyn HwSurface>> {
        self.hw.as_ref()
    }

    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    pub fn stride(&self, plane: usize) -> usize {
        self.strides.get(plane).copied().unwrap_or(0)
    }

    pub fn plane_buffer(&self, plane: usize) -> Option<&PlaneBuffer> {
        self.planes.get(plane)
    }

    pub fn plane(&self, plane: usize) -> Option<&[u8]> {
        self.planes.get(plane).map(PlaneBuffer::data)
    }

    /// Mutable plane bytes, copying first if the buffer is shared.
    pub fn plane_mut(&mut self, plane: usize) -> Result<&mut [u8]> {
        let buf = self
            .planes
            .get_mut(plane)
            .ok_or_else(|| NativeError::InvalidArgument(format!("no plane {plane}")))?;
        buf.make_writable()
    }

    /// Row `y` of `plane`, trimmed to the image width.
    pub fn row(&self, plane: usize, y: usize) -> Option<&[u8]> {
        let stride = self.stride(plane);
        let row_bytes = self.format.plane_row_bytes(plane, self.width);
        let start = y.checked_mul(stride)?;
        self.plane(plane)?.get(start..start + row_bytes)
    }

    /// Make every plane exclusively owned.
    pub fn make_writable(&mut self) -> Result<()> {
        for buf in self.planes.iter_mut() {
            buf.make_writable()?;
        }
        Ok(())
    }

    pub fn is_writable(&self) -> bool {
        self.planes.iter().all(PlaneBuffer::is_writable)
    }

    /// References held on the first plane's memory.
    pub fn ref_count(&self) -> usize {
        self.planes.first().map_or(0, PlaneBuffer::ref_count)
    }

    /// Copy timestamp and colour metadata from `other`.
    pub fn copy_props(&mut self, other: &NativeFrame) {
        self.pts = other.pts;
        self.color_space = other.color_space;
        self.color_range = other.color_range;
    }

    /// Zero-copy view of a sub-rectangle.
    ///
    /// `x` and `y` are rounded down to the format's chroma alignment so that
    /// every plane starts on a whole sample.
    pub fn crop_view(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Self> {
        if self.is_hw() {
            return Err(NativeError::NotSupported("cropping a hardware frame".into()));
        }
        if matches!(self.format, PixelFormat::Yuyv422 | PixelFormat::Uyvy422) && x % 2 != 0 {
            return Err(NativeError::InvalidArgument(format!(
                "{} crop x must be even",
                self.format
            )));
        }
        let (ax, ay) = self.format.crop_alignment();
        let x = x - x % ax;
        let y = y - y % ay;
        if width == 0
            || height == 0
            || x as u64 + width as u64 > self.width as u64
            || y as u64 + height as u64 > self.height as u64
        {
            return Err(NativeError::InvalidArgument(format!(
                "crop {width}x{height}+{x}+{y} outside {}x{}",
                self.width, self.height
            )));
        }
        let mut planes = SmallVec::new();
        for (p, buf) in self.planes.iter().enumerate() {
            let stride = self.strides[p];
            let x_bytes = self.format.plane_row_bytes(p, x);
            let y_rows = self.format.plane_rows(p, y);
            let row_bytes = self.format.plane_row_bytes(p, width);
            let rows = self.format.plane_rows(p, height);
            let start = y_rows * stride + x_bytes;
            planes.push(buf.slice(start, required_len(stride, row_bytes, rows))?);
        }
        let mut out = Self::from_planes(width, height, self.format, planes, self.strides.clone())?;
        out.copy_props(self);
        Ok(out)
    }

    /// Whether two frames have the same size and format.
    pub fn same_shape(&self, other: &NativeFrame) -> bool {
        self.width == other.width && self.height == other.height && self.format == other.format
    }
}

impl fmt::Debug for NativeFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFrame")
            .field("size", &(self.width, self.height))
            .field("format", &self.format)
            .field("color_space", &self.color_space)
            .field("color_range", &self.color_range)
            .field("pts", &self.pts)
            .field("strides", &self.strides)
            .field("hw", &self.hw.is_some())
            .finish()
    }
}

#[inline]
fn align(value: usize, to: usize) -> usize {
    (value + to - 1) & !(to - 1)
}

/// Bytes spanned by `rows` rows: full strides except the last row.
#[inline]
pub fn required_len(stride: usize, row_bytes: usize, rows: usize) -> usize {
    if rows == 0 {
        0
    } else {
        stride * (rows - 1) + row_bytes
    }
}
