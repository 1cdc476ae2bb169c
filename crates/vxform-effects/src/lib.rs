//! VxForm Effects - Geometry transform and overlay compositing
//!
//! Provides:
//! - The geometry engine (crop, fit, ROI window, rotation compensation)
//! - Lazily built native filter graphs patched through runtime commands
//! - The transform filter (crop, scale, rotate, position onto a canvas)
//! - The two-input overlay blender

pub mod blend;
pub mod config;
pub mod geometry;
pub mod graph_manager;
pub mod params;
pub mod transform;

pub use blend::OverlayBlender;
pub use config::{TransformConfig, DEFAULT_ROI_PADDING};
pub use geometry::{CacheState, Geometry, GeometryCache, RoiWindow};
pub use graph_manager::{GraphParam, GraphState, GraphStats, ManagedGraph};
pub use params::{
    descriptors, CropMargins, Margin, Offset, ParamDescriptor, ParamValue, ParamVersion,
    ScaleType, Stage, StageSet, TransformParameters,
};
pub use transform::TransformFilter;

use vxform_core::{FrameBuffer, Result};

/// A single-input per-frame filter.
pub trait FrameFilter: Send + Sync {
    /// Get the filter name.
    fn name(&self) -> &str;

    /// Process one frame; `pts` stamps the output.
    fn filter_image(&self, input: &FrameBuffer, pts: Option<i64>) -> Result<FrameBuffer>;

    /// Message of the most recent failure, empty if none occurred.
    fn last_error(&self) -> String;
}
