//! Overlay blender: composites one buffer over another through a
//! two-input native graph.

use tracing::warn;
use vxform_core::{FrameBuffer, LastError, Result, VxError};
use vxform_media::{resolve_native, BufferToNative, NativeToBuffer};
use vxform_native::{FrameShape, PixelFormat};

use crate::graph_manager::{GraphParam, GraphStats, ManagedGraph};

/// Draws an overlay buffer onto a base buffer at a pixel offset.
///
/// The result has the base's size and layout. The overlay is converted to
/// the base's native format when the two differ.
#[derive(Debug)]
pub struct OverlayBlender {
    graph: ManagedGraph,
    base_to_native: BufferToNative,
    overlay_to_native: BufferToNative,
    to_buffer: NativeToBuffer,
    last_error: LastError,
}

impl Default for OverlayBlender {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayBlender {
    pub fn new() -> Self {
        Self {
            graph: ManagedGraph::new("overlay"),
            base_to_native: BufferToNative::new(),
            overlay_to_native: BufferToNative::new(),
            to_buffer: NativeToBuffer::new(),
            last_error: LastError::new(),
        }
    }

    /// Build (or patch) the graph for these inputs without blending.
    pub fn init(&mut self, base: &FrameBuffer, overlay: &FrameBuffer, x: i64, y: i64) -> Result<()> {
        let result = self.prepare(base, overlay, x, y).map(|_| ());
        self.last_error.track(result)
    }

    /// Blend `overlay` onto `base` with its top-left corner at (`x`, `y`).
    /// Offsets may be negative; what falls outside the base is clipped.
    pub fn blend(
        &mut self,
        base: &FrameBuffer,
        overlay: &FrameBuffer,
        x: i64,
        y: i64,
    ) -> Result<FrameBuffer> {
        let result = self.composite(base, overlay, x, y).map_err(|e| {
            warn!(
                "Blending {}x{} over {}x{} failed: {e}",
                overlay.width, overlay.height, base.width, base.height
            );
            e
        });
        self.last_error.track(result)
    }

    pub fn graph_stats(&self) -> GraphStats {
        self.graph.stats()
    }

    pub fn last_error(&self) -> &str {
        self.last_error.message()
    }

    fn prepare(
        &mut self,
        base: &FrameBuffer,
        overlay: &FrameBuffer,
        x: i64,
        y: i64,
    ) -> Result<PixelFormat> {
        if base.is_empty() || overlay.is_empty() {
            return Err(VxError::InvalidParameter("cannot blend an empty buffer".into()));
        }
        let format = resolve_native(base)?;
        resolve_native(overlay)?;
        let inputs = [
            FrameShape::new(base.width, base.height, format),
            FrameShape::new(overlay.width, overlay.height, format),
        ];
        let params = [
            GraphParam::new("overlay", "x", x),
            GraphParam::new("overlay", "y", y),
        ];
        self.graph.prepare(&inputs, &params, || {
            format!(
                "buffer@in0=video_size={}x{}:pix_fmt={format}[main];\
                 buffer@in1=video_size={}x{}:pix_fmt={format}[top];\
                 [main][top]overlay@overlay=x={x}:y={y},buffersink@out",
                base.width, base.height, overlay.width, overlay.height
            )
        })?;
        Ok(format)
    }

    fn composite(
        &mut self,
        base: &FrameBuffer,
        overlay: &FrameBuffer,
        x: i64,
        y: i64,
    ) -> Result<FrameBuffer> {
        let format = self.prepare(base, overlay, x, y)?;
        let main = self.base_to_native.convert(base, base.pts)?;
        self.overlay_to_native.set_output_format(format)?;
        self.overlay_to_native.set_color_space(base.color_space);
        self.overlay_to_native.set_color_range(base.color_range);
        let top = self.overlay_to_native.convert(overlay, base.pts)?;
        let out = self.graph.run(vec![main, top])?;
        self.to_buffer.set_output_format(base.format, base.element)?;
        Ok(self
            .to_buffer
            .convert(&out, base.pts)?
            .with_bit_depth(base.bit_depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_manager::GraphState;
    use vxform_core::{ColorFormat, ElementType};

    fn gray(w: u32, h: u32, value: u8) -> FrameBuffer {
        FrameBuffer::from_vec(w, h, ColorFormat::Gray, ElementType::U8, vec![value; (w * h) as usize])
            .unwrap()
    }

    #[test]
    fn test_opaque_overlay_replaces_pixels() {
        let mut blender = OverlayBlender::new();
        let out = blender.blend(&gray(4, 2, 10), &gray(2, 1, 200), 1, 1).unwrap();
        assert_eq!(out.data(), &[10, 10, 10, 10, 10, 200, 200, 10]);
        assert_eq!(out.format, ColorFormat::Gray);
        assert_eq!(blender.graph_stats().state, GraphState::Built);
    }

    #[test]
    fn test_offset_change_patches_graph() {
        let mut blender = OverlayBlender::new();
        let (base, top) = (gray(8, 4, 0), gray(2, 2, 255));
        blender.blend(&base, &top, 0, 0).unwrap();
        let id = blender.graph_stats().graph_id;
        let out = blender.blend(&base, &top, 3, 0).unwrap();
        assert_eq!(blender.graph_stats().graph_id, id);
        assert_eq!(blender.graph_stats().build_count, 1);
        assert_eq!(&out.data()[..8], &[0, 0, 0, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_size_change_rebuilds() {
        let mut blender = OverlayBlender::new();
        blender.init(&gray(8, 4, 0), &gray(2, 2, 1), 0, 0).unwrap();
        blender.init(&gray(8, 4, 0), &gray(3, 2, 1), 0, 0).unwrap();
        assert_eq!(blender.graph_stats().build_count, 2);
    }

    #[test]
    fn test_overlay_converted_to_base_format() {
        let mut blender = OverlayBlender::new();
        let base = FrameBuffer::new(4, 4, ColorFormat::Rgba, ElementType::U8).unwrap();
        let top = gray(2, 2, 90);
        let out = blender.blend(&base, &top, 0, 0).unwrap();
        assert_eq!(out.format, ColorFormat::Rgba);
        assert_eq!(&out.data()[..4], &[90, 90, 90, 255]);
    }

    #[test]
    fn test_errors_reach_last_error() {
        let mut blender = OverlayBlender::new();
        let empty = FrameBuffer::new(0, 0, ColorFormat::Gray, ElementType::U8).unwrap();
        assert!(blender.blend(&empty, &gray(1, 1, 0), 0, 0).is_err());
        assert!(blender.last_error().starts_with("Invalid parameter"));
        assert_eq!(blender.graph_stats().state, GraphState::Absent);
    }
}
