//! Integration tests for buffer/native-frame conversion.
//!
//! Exercises vxform-core buffers through the vxform-media converters and
//! the vxform-native frame and device-transfer types.

use anyhow::Result;
use tracing::info;
use vxform_core::{ColorFormat, Device, ElementType, FrameBuffer, Ownership};
use vxform_media::{native_pixel_format_for_depth, BufferToNative, NativeToBuffer};
use vxform_native::{transfer_to_host, HostMappedSurface, NativeFrame};

// ── Helpers ────────────────────────────────────────────────────

const FORMATS: [ColorFormat; 14] = [
    ColorFormat::Gray,
    ColorFormat::Rgb,
    ColorFormat::Bgr,
    ColorFormat::Rgba,
    ColorFormat::Bgra,
    ColorFormat::Argb,
    ColorFormat::Abgr,
    ColorFormat::Yuv420,
    ColorFormat::Yuv422,
    ColorFormat::Yuv444,
    ColorFormat::Yuva420,
    ColorFormat::Yuva444,
    ColorFormat::Nv12,
    ColorFormat::Nv21,
];

const ELEMENTS: [ElementType; 4] = [ElementType::U8, ElementType::U16, ElementType::U32, ElementType::F32];

/// Every (format, element, bit depth) with a native counterpart, including
/// the reduced-depth YUV layouts.
fn supported_layouts() -> Vec<(ColorFormat, ElementType, u8)> {
    let mut layouts = Vec::new();
    for format in FORMATS {
        for element in ELEMENTS {
            let full = element.full_depth();
            let Some(canonical) = native_pixel_format_for_depth(format, element, full) else {
                continue;
            };
            layouts.push((format, element, full));
            // Reduced depths count only where they select their own layout.
            for depth in [10, 12] {
                match native_pixel_format_for_depth(format, element, depth) {
                    Some(native) if native != canonical => layouts.push((format, element, depth)),
                    _ => {}
                }
            }
        }
    }
    layouts
}

/// A buffer whose samples count up, kept within `depth` bits.
fn numbered(w: u32, h: u32, format: ColorFormat, element: ElementType, depth: u8) -> FrameBuffer {
    let len = FrameBuffer::required_len(w, h, format, element);
    let samples = len / element.size();
    let mut data = Vec::with_capacity(len);
    for i in 0..samples {
        match element {
            ElementType::U8 => data.push((i * 7 % 251) as u8),
            ElementType::U16 => {
                let max = (1u32 << depth.min(16)) - 1;
                data.extend_from_slice(&((i as u32 * 131 % max) as u16).to_le_bytes());
            }
            ElementType::F32 => data.extend_from_slice(&((i % 97) as f32 / 96.0).to_le_bytes()),
            ElementType::U32 => data.extend_from_slice(&(i as u32).to_le_bytes()),
        }
    }
    FrameBuffer::from_vec(w, h, format, element, data)
        .unwrap()
        .with_bit_depth(depth)
}

fn round_trip(buffer: &FrameBuffer, zero_copy: bool) -> Result<FrameBuffer> {
    let mut to_native = BufferToNative::new();
    to_native.set_zero_copy(zero_copy);
    let mut to_buffer = NativeToBuffer::new();
    to_buffer.set_zero_copy(zero_copy);
    let frame = to_native.convert(buffer, buffer.pts)?;
    Ok(to_buffer.convert(&frame, buffer.pts)?)
}

// ── Round trip ─────────────────────────────────────────────────

#[test]
fn every_supported_layout_round_trips() -> Result<()> {
    crate::init_tracing();
    let layouts = supported_layouts();
    info!(count = layouts.len(), "Round-tripping supported layouts");
    assert!(layouts.len() >= 30);
    for &(format, element, depth) in &layouts {
        // Odd sizes exercise the rounded-up chroma planes.
        for (w, h) in [(8, 6), (7, 5)] {
            for zero_copy in [true, false] {
                let buffer = numbered(w, h, format, element, depth).with_pts(Some(11));
                let back = round_trip(&buffer, zero_copy)?;
                let label = format!("{format:?}/{element:?}/{depth} {w}x{h} zero_copy={zero_copy}");
                assert_eq!(back.format, format, "{label}");
                assert_eq!(back.element, element, "{label}");
                assert_eq!(back.bit_depth, depth, "{label}");
                assert_eq!((back.width, back.height), (w, h), "{label}");
                assert_eq!(back.pts, Some(11), "{label}");
                assert_eq!(back.data(), buffer.data(), "{label}");
            }
        }
    }
    Ok(())
}

#[test]
fn every_subsampling_family_is_covered() {
    let layouts = supported_layouts();
    for shift in [(0, 0), (1, 0), (1, 1)] {
        for depth in [8, 10, 12, 16] {
            assert!(
                layouts
                    .iter()
                    .any(|&(f, _, d)| f.is_yuv() && f.chroma_shift() == shift && d == depth),
                "missing {shift:?} at {depth} bits"
            );
        }
    }
}

#[test]
fn unsupported_layouts_are_rejected() {
    let mut conv = BufferToNative::new();
    let buffer = numbered(4, 4, ColorFormat::Rgba, ElementType::U32, 32);
    let err = conv.convert(&buffer, None).unwrap_err();
    assert!(err.to_string().starts_with("Unsupported format"));
    assert_eq!(conv.last_error(), err.to_string());
}

// ── Ownership ──────────────────────────────────────────────────

#[test]
fn packed_round_trip_borrows_source_storage() -> Result<()> {
    let buffer = FrameBuffer::test_pattern(64, 16)?;
    let back = round_trip(&buffer, true)?;
    assert_eq!(back.ownership(), Ownership::Borrowed);
    assert!(back.shares_storage_with(&buffer));

    let copied = round_trip(&buffer, false)?;
    assert_eq!(copied.ownership(), Ownership::Owned);
    assert!(!copied.shares_storage_with(&buffer));
    assert_eq!(copied.data(), buffer.data());
    Ok(())
}

#[test]
fn borrowed_frame_outlives_source_buffer() -> Result<()> {
    let mut to_native = BufferToNative::new();
    let frame: NativeFrame = {
        let buffer = FrameBuffer::test_pattern(8, 2)?;
        to_native.convert(&buffer, None)?
    };
    // The frame keeps the storage alive after the buffer is gone.
    assert_eq!(&frame.plane(0).unwrap()[..4], &[255, 255, 255, 255]);
    Ok(())
}

#[test]
fn device_buffers_come_back_to_host() -> Result<()> {
    let gpu = numbered(6, 4, ColorFormat::Nv12, ElementType::U8, 8).with_device(Device::Gpu);
    let frame = BufferToNative::new().convert(&gpu, Some(3))?;
    let hw = HostMappedSurface::upload("gpu0", frame)?;
    assert!(transfer_to_host(&hw)?.plane(0).is_some());

    let back = NativeToBuffer::new().convert(&hw, Some(3))?;
    assert_eq!(back.device, Device::Cpu);
    assert_eq!(back.format, ColorFormat::Nv12);
    assert_eq!(back.data(), gpu.data());
    Ok(())
}

// ── Scaling ────────────────────────────────────────────────────

#[test]
fn converter_context_is_reused_across_frames() -> Result<()> {
    let mut conv = BufferToNative::new();
    conv.set_output_size(32, 18)?;
    for pts in 0..5 {
        let frame = conv.convert(&FrameBuffer::test_pattern(64, 36)?, Some(pts))?;
        assert_eq!((frame.width, frame.height), (32, 18));
        assert_eq!(frame.pts, Some(pts));
    }
    assert_eq!(conv.context_builds(), 1);
    conv.set_output_size(16, 9)?;
    conv.convert(&FrameBuffer::test_pattern(64, 36)?, None)?;
    assert_eq!(conv.context_builds(), 2);
    Ok(())
}
