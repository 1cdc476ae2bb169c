//! VxForm Native - In-process native media library
//!
//! The boundary the transform pipeline talks to:
//! - Pixel formats with per-component descriptors
//! - Native frames with reference-counted, copy-on-write plane buffers
//! - Device surface transfer to host memory
//! - A resize / colour-convert context
//! - Textual filter graphs with a runtime command channel

pub mod error;
pub mod filters;
pub mod frame;
pub mod graph;
pub mod hw;
pub mod pixfmt;
pub mod sample;
pub mod scale;

pub use error::{NativeError, Result};
pub use frame::{ExternalBytes, NativeFrame, PlaneBuffer, STRIDE_ALIGN};
pub use graph::{registry, Filter, FilterGraph, FilterRegistry, LinkFormat, NodeId};
pub use hw::{transfer_to_host, HostMappedSurface, HwSurface};
pub use pixfmt::{NativeColorRange, NativeColorSpace, PixFmtDescriptor, PixelFormat};
pub use scale::{ColorDetails, FrameShape, Interpolation, ScaleContext};

/// Populate the filter registry ahead of first use.
pub fn init() {
    let filters = registry().names();
    tracing::info!("Native media library ready: {} filters", filters.len());
}
