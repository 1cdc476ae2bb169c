//! Hardware surfaces and device-to-host transfer.

use std::fmt;

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::pixfmt::PixelFormat;

/// A frame resident in device memory.
pub trait HwSurface: Send + Sync + fmt::Debug {
    /// Device the surface belongs to.
    fn device(&self) -> &str;

    /// Host pixel format the surface downloads into.
    fn sw_format(&self) -> PixelFormat;

    /// Copy the surface contents into `dst`, allocated by the caller with
    /// `sw_format` and the frame's size.
    fn download(&self, dst: &mut NativeFrame) -> Result<()>;
}

/// Surface backed by host-mapped memory, for devices that expose their
/// frames through a CPU mapping.
#[derive(Debug)]
pub struct HostMappedSurface {
    device: String,
    mapped: NativeFrame,
}

impl HostMappedSurface {
    pub fn new(device: impl Into<String>, mapped: NativeFrame) -> Result<Self> {
        if mapped.is_hw() {
            return Err(NativeError::InvalidArgument(
                "mapped frame must be host-resident".into(),
            ));
        }
        Ok(Self {
            device: device.into(),
            mapped,
        })
    }

    /// Wrap a host frame as a device frame of the same size.
    pub fn upload(device: impl Into<String>, frame: NativeFrame) -> Result<NativeFrame> {
        let (width, height) = (frame.width, frame.height);
        let (pts, space, range) = (frame.pts, frame.color_space, frame.color_range);
        let surface = Self::new(device, frame)?;
        let mut hw = NativeFrame::from_hw(width, height, std::sync::Arc::new(surface));
        hw.pts = pts;
        hw.color_space = space;
        hw.color_range = range;
        Ok(hw)
    }
}

impl HwSurface for HostMappedSurface {
    fn device(&self) -> &str {
        &self.device
    }

    fn sw_format(&self) -> PixelFormat {
        self.mapped.format
    }

    fn download(&self, dst: &mut NativeFrame) -> Result<()> {
        if !dst.same_shape(&self.mapped) {
            return Err(NativeError::HwTransfer(format!(
                "destination {}x{} {} does not match surface {}x{} {}",
                dst.width,
                dst.height,
                dst.format,
                self.mapped.width,
                self.mapped.height,
                self.mapped.format
            )));
        }
        for p in 0..self.mapped.plane_count() {
            let row_bytes = self.mapped.format.plane_row_bytes(p, self.mapped.width);
            let rows = self.mapped.format.plane_rows(p, self.mapped.height);
            let src_stride = self.mapped.stride(p);
            let dst_stride = dst.stride(p);
            let src = self
                .mapped
                .plane(p)
                .ok_or_else(|| NativeError::HwTransfer(format!("surface lost plane {p}")))?;
            let out = dst.plane_mut(p)?;
            for y in 0..rows {
                out[y * dst_stride..y * dst_stride + row_bytes]
                    .copy_from_slice(&src[y * src_stride..y * src_stride + row_bytes]);
            }
        }
        Ok(())
    }
}

/// Transfer a hardware frame into a newly allocated host frame.
///
/// Timestamp and colour metadata are carried over.
pub fn transfer_to_host(src: &NativeFrame) -> Result<NativeFrame> {
    let surface = src
        .hw_surface()
        .ok_or_else(|| NativeError::InvalidArgument("frame is not hardware-backed".into()))?;
    let mut dst = NativeFrame::alloc(src.width, src.height, surface.sw_format())
        .map_err(|e| NativeError::HwTransfer(format!("allocating host frame: {e}")))?;
    surface.download(&mut dst)?;
    dst.copy_props(src);
    tracing::trace!(
        device = surface.device(),
        format = %dst.format,
        "Transferred {}x{} frame to host",
        dst.width,
        dst.height
    );
    Ok(dst)
}
