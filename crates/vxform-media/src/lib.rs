//! VxForm Media - Bridging generic buffers and native frames
//!
//! This crate handles:
//! - Mapping colour formats, element types and colour tags to native formats
//! - Plane-by-plane copies between tight buffers and strided frames
//! - Buffer to native frame conversion (zero-copy where possible)
//! - Native frame to buffer conversion, including device frames

pub mod convert;
pub mod error;
pub mod format_map;
pub mod plane_copy;

pub use convert::{BufferToNative, NativeToBuffer};
pub use error::{from_native, graph_build, graph_runtime};
pub use format_map::{
    color_format_of, color_range_of, color_space_of, element_type_of, native_color_range_of,
    native_color_space_of, native_pixel_format_for_depth, native_pixel_format_of, resolve_generic,
    resolve_native,
};
pub use plane_copy::{copy_buffer_to_frame, copy_frame_to_buffer};

/// Initialize the native library (call once at startup).
pub fn init() {
    vxform_native::init();
    tracing::info!("VxForm Media initialized");
}
