//! Integration tests for the overlay blender.

use anyhow::Result;
use vxform_core::{ColorFormat, ElementType, FrameBuffer};
use vxform_effects::{GraphState, OverlayBlender};

const RED: [u8; 4] = [255, 0, 0, 255];

fn solid(w: u32, h: u32, pixel: [u8; 4]) -> FrameBuffer {
    let data = pixel.repeat((w * h) as usize);
    FrameBuffer::from_vec(w, h, ColorFormat::Rgba, ElementType::U8, data).unwrap()
}

fn pixel(buffer: &FrameBuffer, x: u32, y: u32) -> &[u8] {
    let i = (y * buffer.width + x) as usize * 4;
    &buffer.data()[i..i + 4]
}

/// Base pixels with an opaque `size`-square overlay at (`ox`, `oy`).
fn assert_composited(out: &FrameBuffer, base: &FrameBuffer, ox: u32, oy: u32, size: u32) {
    for y in 0..base.height {
        for x in 0..base.width {
            let inside = (ox..ox + size).contains(&x) && (oy..oy + size).contains(&y);
            let expected = if inside { &RED[..] } else { pixel(base, x, y) };
            assert_eq!(pixel(out, x, y), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn offset_update_moves_overlay_without_rebuild() -> Result<()> {
    crate::init_tracing();
    let base = FrameBuffer::test_pattern(800, 600)?;
    let overlay = solid(200, 200, RED);
    let mut blender = OverlayBlender::new();

    let first = blender.blend(&base, &overlay, 50, 50)?;
    let stats = blender.graph_stats();
    assert_eq!(stats.state, GraphState::Built);
    assert_eq!(stats.build_count, 1);

    let second = blender.blend(&base, &overlay, 60, 50)?;
    let after = blender.graph_stats();
    assert_eq!(after.graph_id, stats.graph_id);
    assert_eq!(after.build_count, 1);

    assert_eq!((second.width, second.height), (800, 600));
    assert_composited(&first, &base, 50, 50, 200);
    assert_composited(&second, &base, 60, 50, 200);
    // Rows the overlay never touches are identical.
    let row_bytes = 800 * 4;
    assert_eq!(&first.data()[..50 * row_bytes], &second.data()[..50 * row_bytes]);
    Ok(())
}

#[test]
fn base_format_change_rebuilds() -> Result<()> {
    let mut blender = OverlayBlender::new();
    let overlay = solid(16, 16, RED);
    blender.blend(&solid(64, 64, [0, 0, 0, 255]), &overlay, 0, 0)?;
    let first = blender.graph_stats().graph_id;

    let gray = FrameBuffer::new(64, 64, ColorFormat::Gray, ElementType::U8)?;
    let out = blender.blend(&gray, &overlay, 0, 0)?;
    assert_eq!(out.format, ColorFormat::Gray);
    assert_ne!(blender.graph_stats().graph_id, first);
    assert_eq!(blender.graph_stats().build_count, 2);
    Ok(())
}

#[test]
fn overlay_is_clipped_at_base_edges() -> Result<()> {
    let mut blender = OverlayBlender::new();
    let base = solid(8, 8, [0, 0, 0, 255]);
    let out = blender.blend(&base, &solid(4, 4, RED), -2, 6)?;
    assert_eq!(pixel(&out, 0, 7), &RED);
    assert_eq!(pixel(&out, 1, 6), &RED);
    assert_eq!(pixel(&out, 2, 7), &[0, 0, 0, 255]);
    assert_eq!(pixel(&out, 0, 5), &[0, 0, 0, 255]);
    Ok(())
}

#[test]
fn init_prepares_graph_before_first_blend() -> Result<()> {
    let mut blender = OverlayBlender::new();
    let (base, overlay) = (solid(32, 32, [0, 0, 0, 255]), solid(8, 8, RED));
    blender.init(&base, &overlay, 4, 4)?;
    let id = blender.graph_stats().graph_id;
    assert!(id.is_some());
    blender.blend(&base, &overlay, 4, 4)?;
    assert_eq!(blender.graph_stats().graph_id, id);
    assert!(blender.last_error().is_empty());
    Ok(())
}
