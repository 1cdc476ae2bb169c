//! Integration tests for the transform filter.
//!
//! Exercises vxform-effects end to end: parameters, geometry, managed
//! graphs in vxform-native and conversion through vxform-media.

use anyhow::Result;
use proptest::prelude::*;
use vxform_core::{ColorFormat, ElementType, FrameBuffer, Size};
use vxform_effects::{
    CacheState, FrameFilter, GraphState, Margin, Offset, ScaleType, Stage, TransformConfig,
    TransformFilter,
};
use vxform_native::Interpolation;

// ── Helpers ────────────────────────────────────────────────────

fn gradient(w: u32, h: u32) -> FrameBuffer {
    let mut data = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            data.push(((x * 13 + y * 7) % 256) as u8);
        }
    }
    FrameBuffer::from_vec(w, h, ColorFormat::Gray, ElementType::U8, data).unwrap()
}

/// Gray ramp rising by 4 per pixel along one axis.
fn ramp(size: u32, horizontal: bool) -> FrameBuffer {
    let mut data = Vec::with_capacity((size * size) as usize);
    for y in 0..size {
        for x in 0..size {
            let along = if horizontal { x } else { y };
            data.push((along * 4).min(255) as u8);
        }
    }
    FrameBuffer::from_vec(size, size, ColorFormat::Gray, ElementType::U8, data).unwrap()
}

/// A buffer with every sample set to `value`.
fn flat_u16(w: u32, h: u32, format: ColorFormat, value: u16) -> FrameBuffer {
    let mut buffer = FrameBuffer::new(w, h, format, ElementType::U16)
        .unwrap()
        .with_bit_depth(10);
    for sample in buffer.data_mut().chunks_exact_mut(2) {
        sample.copy_from_slice(&value.to_le_bytes());
    }
    buffer
}

fn u16_at(buffer: &FrameBuffer, index: usize) -> u16 {
    let data = buffer.data();
    u16::from_le_bytes([data[2 * index], data[2 * index + 1]])
}

fn row(buffer: &FrameBuffer, y: u32) -> &[u8] {
    let row_bytes = buffer.width as usize * 4;
    let start = y as usize * row_bytes;
    &buffer.data()[start..start + row_bytes]
}

// ── Identity ───────────────────────────────────────────────────

#[test]
fn default_parameters_return_input_untouched() -> Result<()> {
    crate::init_tracing();
    let filter = TransformFilter::new(64, 36, TransformConfig::default())?;
    let input = FrameBuffer::test_pattern(64, 36)?.with_pts(Some(5));
    let out = filter.filter_image(&input, Some(5))?;
    assert!(out.shares_storage_with(&input));
    assert_eq!(out.data(), input.data());
    assert_eq!(filter.scale_graph_stats().build_count, 0);
    assert_eq!(filter.rotate_graph_stats().build_count, 0);
    assert_eq!(filter.input_size(), Some(Size::new(64, 36)));
    Ok(())
}

#[test]
fn full_turn_is_identity() -> Result<()> {
    let filter = TransformFilter::new(16, 16, TransformConfig::default())?;
    filter.set_rotation(720.0)?;
    let input = gradient(16, 16);
    let out = filter.filter_image(&input, None)?;
    assert!(out.shares_storage_with(&input));
    assert_eq!(filter.rotate_graph_stats().state, GraphState::Absent);
    Ok(())
}

// ── Periodicity ────────────────────────────────────────────────

#[test]
fn equivalent_angles_give_identical_pixels() -> Result<()> {
    let input = gradient(24, 16);
    let render = |degrees: f64| -> Result<FrameBuffer> {
        let filter = TransformFilter::new(32, 32, TransformConfig::default())?;
        filter.set_rotation(degrees)?;
        Ok(filter.filter_image(&input, Some(0))?)
    };
    let reference = render(10.0)?;
    for degrees in [370.0, -350.0, 730.0] {
        let out = render(degrees)?;
        assert_eq!(out.data(), reference.data(), "{degrees} degrees");
    }
    Ok(())
}

#[test]
fn quarter_turn_moves_corners() -> Result<()> {
    let filter = TransformFilter::new(4, 4, TransformConfig::default())?;
    filter.set_rotation(90.0)?;
    let mut data = vec![0u8; 16];
    data[0] = 255;
    let input = FrameBuffer::from_vec(4, 4, ColorFormat::Gray, ElementType::U8, data)?;
    let out = filter.filter_image(&input, None)?;
    // Clockwise: the top-left pixel ends up top-right.
    assert_eq!(out.data()[3], 255);
    assert_eq!(out.data()[0], 0);
    Ok(())
}

// ── Graph reuse ────────────────────────────────────────────────

#[test]
fn rotation_change_patches_live_graph() -> Result<()> {
    let filter = TransformFilter::new(32, 32, TransformConfig::default())?;
    let input = gradient(32, 32);
    filter.set_rotation(15.0)?;
    filter.filter_image(&input, None)?;
    let before = filter.rotate_graph_stats();

    for degrees in [30.0, 45.0, 300.0] {
        filter.set_rotation(degrees)?;
        filter.filter_image(&input, None)?;
        let stats = filter.rotate_graph_stats();
        assert_eq!(stats.graph_id, before.graph_id);
        assert_eq!(stats.build_count, 1);
        assert_eq!(stats.state, GraphState::Built);
    }
    Ok(())
}

#[test]
fn scale_target_change_patches_live_graph() -> Result<()> {
    let filter = TransformFilter::new(64, 64, TransformConfig::windowed())?;
    let input = gradient(32, 32);
    filter.filter_image(&input, None)?;
    let first = filter.scale_graph_stats();
    assert_eq!(first.build_count, 1);

    filter.set_keep_aspect_ratio(true)?;
    filter.set_scale_h(0.75)?;
    filter.set_interpolation(Interpolation::Bicubic)?;
    filter.filter_image(&input, None)?;
    let second = filter.scale_graph_stats();
    assert_eq!(second.graph_id, first.graph_id);
    assert_eq!(second.build_count, 1);
    assert_eq!(filter.geometry().map(|g| g.scaled), Some(Size::new(48, 48)));
    Ok(())
}

#[test]
fn input_shape_change_rebuilds_graph() -> Result<()> {
    let filter = TransformFilter::new(32, 32, TransformConfig::default())?;
    filter.set_rotation(20.0)?;
    filter.filter_image(&gradient(16, 16), None)?;
    let first = filter.rotate_graph_stats().graph_id;

    filter.filter_image(&gradient(16, 12), None)?;
    let resized = filter.rotate_graph_stats().graph_id;
    assert_ne!(resized, first);

    // Same size, different pixel format.
    filter.filter_image(&FrameBuffer::test_pattern(16, 12)?, None)?;
    let reformatted = filter.rotate_graph_stats();
    assert_ne!(reformatted.graph_id, resized);
    assert_eq!(reformatted.build_count, 3);
    Ok(())
}

// ── Scenarios ──────────────────────────────────────────────────

#[test]
fn full_hd_fits_onto_720p_canvas() -> Result<()> {
    crate::init_tracing();
    let filter = TransformFilter::new(1280, 720, TransformConfig::default())?;
    filter.set_scale_type(ScaleType::Fit)?;
    let input = FrameBuffer::test_pattern(1920, 1080)?;
    let out = filter.filter_image(&input, Some(0))?;

    assert_eq!((out.width, out.height), (1280, 720));
    assert_eq!(out.format, ColorFormat::Rgba);
    let geometry = filter.geometry().unwrap();
    assert_eq!(geometry.scaled, Size::new(1280, 720));
    // The diagonal bound (1469 + padding) exceeds the scaled size.
    assert!(geometry.roi.is_none());
    assert_eq!(filter.scale_graph_stats().build_count, 1);
    assert_eq!(filter.rotate_graph_stats().build_count, 0);
    assert!(out.data().chunks_exact(4).all(|px| px[3] == 255));
    assert_eq!(&row(&out, 360)[..4], &[255, 255, 255, 255]);
    Ok(())
}

#[test]
fn wide_input_is_letterboxed() -> Result<()> {
    let filter = TransformFilter::new(1280, 720, TransformConfig::default())?;
    let out = filter.filter_image(&FrameBuffer::test_pattern(1920, 800)?, None)?;
    let geometry = filter.geometry().unwrap();
    assert_eq!(geometry.scaled, Size::new(1280, 533));
    assert_eq!(geometry.placement(), (0, 94));

    assert!(row(&out, 0).iter().all(|&v| v == 0));
    assert!(row(&out, 93).iter().all(|&v| v == 0));
    assert!(row(&out, 360).chunks_exact(4).all(|px| px[3] == 255));
    assert!(row(&out, 719).iter().all(|&v| v == 0));
    Ok(())
}

#[test]
fn oversized_scale_is_windowed() -> Result<()> {
    let filter = TransformFilter::new(100, 100, TransformConfig::compensated())?;
    filter.set_keep_aspect_ratio(true)?;
    filter.set_scale_h(4.0)?;
    let out = filter.filter_image(&gradient(100, 100), None)?;
    assert_eq!((out.width, out.height), (100, 100));

    let geometry = filter.geometry().unwrap();
    assert_eq!(geometry.scaled, Size::new(400, 400));
    let roi = geometry.roi.expect("scaled size exceeds the diagonal bound");
    assert_eq!(roi.bound, Size::new(150, 150));
    assert!(roi.output.width <= 150 && roi.output.height <= 150);

    // Without bounding the whole 400x400 image is scaled.
    let unbounded = TransformFilter::new(100, 100, TransformConfig::windowed())?;
    unbounded.set_keep_aspect_ratio(true)?;
    unbounded.set_scale_h(4.0)?;
    unbounded.filter_image(&gradient(100, 100), None)?;
    assert!(unbounded.geometry().unwrap().roi.is_none());
    Ok(())
}

#[test]
fn windowing_keeps_rotated_content_in_place() -> Result<()> {
    let render = |config: TransformConfig, input: &FrameBuffer, degrees: f64, at: (i64, i64)| {
        let filter = TransformFilter::new(50, 50, config)?;
        filter.set_keep_aspect_ratio(true)?;
        filter.set_scale_h(4.0)?;
        filter.set_rotation(degrees)?;
        filter.set_position_offset_h(Offset::Pixels(at.0))?;
        filter.set_position_offset_v(Offset::Pixels(at.1))?;
        let out = filter.filter_image(input, None)?;
        Ok::<_, anyhow::Error>((out, filter.geometry().unwrap().roi.is_some()))
    };
    for (degrees, at) in [(30.0, (0, 0)), (90.0, (12, 0)), (200.0, (-8, 15))] {
        for horizontal in [true, false] {
            let input = ramp(50, horizontal);
            let (full, full_windowed) = render(TransformConfig::windowed(), &input, degrees, at)?;
            let (bounded, windowed) = render(TransformConfig::compensated(), &input, degrees, at)?;
            assert!(!full_windowed);
            assert!(windowed, "{degrees} degrees is windowed");

            // One level per output pixel: a difference is a drift in pixels.
            let (mut worst, mut total, mut count) = (0i32, 0i32, 0i32);
            for y in 15..35 {
                for x in 15..35 {
                    let i = (y * 50 + x) as usize;
                    let d = (full.data()[i] as i32 - bounded.data()[i] as i32).abs();
                    worst = worst.max(d);
                    total += d;
                    count += 1;
                }
            }
            let label = format!("{degrees} degrees at {at:?}, horizontal={horizontal}");
            assert!(worst <= 3, "{label}: worst drift {worst}");
            assert!(2 * total <= 3 * count, "{label}: mean drift {}", total as f64 / count as f64);
        }
    }
    Ok(())
}

#[test]
fn huge_roi_padding_disables_windowing() -> Result<()> {
    let config = TransformConfig::from_json(r#"{"roi_padding":4294967295}"#)?;
    let filter = TransformFilter::new(100, 100, config)?;
    filter.set_keep_aspect_ratio(true)?;
    filter.set_scale_h(4.0)?;
    let out = filter.filter_image(&gradient(100, 100), None)?;
    assert_eq!((out.width, out.height), (100, 100));
    assert!(filter.geometry().unwrap().roi.is_none());
    Ok(())
}

#[test]
fn ten_bit_samples_survive_scaling() -> Result<()> {
    for format in [ColorFormat::Nv12, ColorFormat::Yuv420] {
        let filter = TransformFilter::new(8, 8, TransformConfig::default())?;
        filter.set_scale_type(ScaleType::Stretch)?;
        let out = filter.filter_image(&flat_u16(4, 4, format, 700), None)?;
        assert_eq!(filter.scale_graph_stats().build_count, 1);
        assert_eq!((out.format, out.bit_depth), (format, 10));
        let samples = out.data().len() / 2;
        assert!((0..samples).all(|i| u16_at(&out, i) == 700), "{format:?}");
    }
    // Values below 64 would vanish if the high-bit layout leaked.
    let filter = TransformFilter::new(8, 8, TransformConfig::default())?;
    filter.set_scale_type(ScaleType::Stretch)?;
    let out = filter.filter_image(&flat_u16(4, 4, ColorFormat::Nv12, 40), None)?;
    assert_eq!(u16_at(&out, 0), 40);
    Ok(())
}

#[test]
fn crop_position_and_format_combine() -> Result<()> {
    let filter = TransformFilter::new(64, 48, TransformConfig::default())?;
    filter.set_crop_margin_left(Margin::Ratio(0.25))?;
    filter.set_crop_margin_right(Margin::Pixels(16))?;
    filter.set_scale_type(ScaleType::Stretch)?;
    filter.set_scale_h(0.5)?;
    filter.set_position_offset_h(Offset::Pixels(-8))?;
    filter.set_output_format(ColorFormat::Yuv420, ElementType::U8)?;

    let out = filter.filter_image(&FrameBuffer::test_pattern(64, 48)?, Some(2))?;
    assert_eq!(out.format, ColorFormat::Yuv420);
    assert_eq!((out.width, out.height), (64, 48));
    assert_eq!(out.pts, Some(2));
    let geometry = filter.geometry().unwrap();
    assert_eq!(geometry.crop.x, 16);
    assert_eq!(geometry.crop.width, 32);
    assert_eq!(geometry.scaled, Size::new(32, 48));
    assert_eq!(geometry.placement(), (8, 0));
    Ok(())
}

#[test]
fn fully_cropped_input_gives_blank_canvas() -> Result<()> {
    let filter = TransformFilter::new(8, 8, TransformConfig::default())?;
    filter.set_crop_margin_left(Margin::Pixels(10))?;
    let out = filter.filter_image(&gradient(8, 8), None)?;
    assert!(out.data().iter().all(|&v| v == 0));
    assert!(filter.geometry().unwrap().is_empty());
    Ok(())
}

// ── Failure handling ───────────────────────────────────────────

#[test]
fn failed_frame_leaves_changes_pending() -> Result<()> {
    let filter = TransformFilter::new(16, 16, TransformConfig::default())?;
    filter.filter_image(&gradient(16, 16), None)?;
    filter.set_rotation(33.0)?;
    assert_eq!(filter.cache_state(), CacheState::Dirty);

    let unsupported = FrameBuffer::new(16, 16, ColorFormat::Abgr, ElementType::U16)?;
    assert!(filter.filter_image(&unsupported, None).is_err());
    assert!(filter.pending_stages().contains(Stage::Rotate));
    assert!(filter.last_error().starts_with("Unsupported format"));
    assert_eq!(filter.geometry().unwrap().rotation, 0.0);

    filter.filter_image(&gradient(16, 16), None)?;
    assert_eq!(filter.cache_state(), CacheState::Clean);
    assert_eq!(filter.geometry().unwrap().rotation, 33.0);
    // A later success does not clear the message.
    assert!(!filter.last_error().is_empty());
    Ok(())
}

#[test]
fn rejected_setters_keep_previous_values() {
    let filter = TransformFilter::new(16, 16, TransformConfig::legacy()).unwrap();
    assert!(filter.set_position_offset_v(Offset::Ratio(0.5)).is_err());
    assert!(filter.set_scale_v(f64::NAN).is_err());
    assert!(filter.set_rotation(f64::INFINITY).is_err());
    assert_eq!(filter.position_offset().1, Offset::Pixels(0));
    assert_eq!(filter.scale(), (1.0, 1.0));
    assert_eq!(filter.rotation(), 0.0);
    assert!(filter.last_error().starts_with("Invalid parameter"));
}

// ── Concurrency ────────────────────────────────────────────────

#[test]
fn setters_race_with_frames() -> Result<()> {
    let filter = TransformFilter::new(32, 32, TransformConfig::default())?;
    let input = gradient(24, 24);
    std::thread::scope(|s| {
        s.spawn(|| {
            for step in 0..50 {
                filter.set_rotation(step as f64 * 7.0).unwrap();
                filter.set_position_offset_h(Offset::Pixels(step % 5)).unwrap();
            }
        });
        for _ in 0..20 {
            let out = filter.filter_image(&input, None).unwrap();
            assert_eq!((out.width, out.height), (32, 32));
        }
    });
    filter.filter_image(&input, None)?;
    assert_eq!(filter.cache_state(), CacheState::Clean);
    assert_eq!(filter.rotate_graph_stats().build_count, 1);
    Ok(())
}

#[test]
fn filters_are_usable_as_trait_objects() -> Result<()> {
    let filters: Vec<Box<dyn FrameFilter>> = vec![
        Box::new(TransformFilter::new(8, 8, TransformConfig::legacy())?),
        Box::new(TransformFilter::new(8, 8, TransformConfig::compensated())?),
    ];
    for filter in &filters {
        let out = filter.filter_image(&gradient(4, 4), Some(1))?;
        assert_eq!((out.width, out.height), (8, 8));
        assert_eq!(out.pts, Some(1));
    }
    Ok(())
}

// ── Crop containment ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_crop_stays_inside_input(
        w in 2u32..48,
        h in 2u32..48,
        margins in prop::array::uniform4(0u32..64),
        yuv in any::<bool>(),
    ) {
        let filter = TransformFilter::new(16, 16, TransformConfig::legacy()).unwrap();
        filter.set_crop_margin_left(Margin::Pixels(margins[0])).unwrap();
        filter.set_crop_margin_top(Margin::Pixels(margins[1])).unwrap();
        filter.set_crop_margin_right(Margin::Pixels(margins[2])).unwrap();
        filter.set_crop_margin_bottom(Margin::Pixels(margins[3])).unwrap();
        let format = if yuv { ColorFormat::Yuv420 } else { ColorFormat::Gray };
        let input = FrameBuffer::new(w, h, format, ElementType::U8).unwrap();
        let out = filter.filter_image(&input, None).unwrap();
        prop_assert_eq!((out.width, out.height), (16, 16));

        let crop = filter.geometry().unwrap().crop;
        prop_assert!(crop.is_within(Size::new(w, h)));
        if margins[0] + margins[2] >= w {
            prop_assert_eq!(crop.width, 0);
        }
        if margins[1] + margins[3] >= h {
            prop_assert_eq!(crop.height, 0);
        }
    }
}
