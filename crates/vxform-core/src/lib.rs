//! VxForm Core - Foundation types for the frame transform pipeline
//!
//! This crate provides the fundamental types used throughout VxForm:
//! - Generic frame buffers with colour format, element type and device tags
//! - Pixel storage with explicit owned / borrowed ownership
//! - Colour space and range tags
//! - Geometric primitives
//! - The error taxonomy and the last-error slot

pub mod color;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod storage;

pub use color::{ColorRange, ColorSpace};
pub use error::{LastError, Result, VxError};
pub use frame::{ceil_shift, ColorFormat, Device, ElementType, FrameBuffer, PlaneLayout};
pub use geometry::{normalize_degrees, rotate, rotated_bounds, PixelRect, Size, Vec2};
pub use storage::{Ownership, PixelStorage, ReleaseGuard, SharedBytes};
