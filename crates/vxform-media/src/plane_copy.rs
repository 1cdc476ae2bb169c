//! Plane-by-plane copies between generic buffers and native frames.
//!
//! Buffers keep tight rows; native planes are strided. Both directions
//! derive plane widths and heights from the native format descriptor, so a
//! copy there and back reproduces every byte.
//!
//! Buffer samples are always LSB-aligned. Native formats that store samples
//! in the high bits of their element (`p010le`) are shifted on the way.

use smallvec::SmallVec;
use vxform_core::{FrameBuffer, PlaneLayout, Result, VxError};
use vxform_native::{NativeFrame, PixelFormat};

use crate::error::from_native;

/// Check that `buffer` and `frame` describe the same picture and return the
/// buffer's plane layouts.
fn matching_layouts(buffer: &FrameBuffer, frame: &NativeFrame) -> Result<SmallVec<[PlaneLayout; 4]>> {
    if frame.is_hw() {
        return Err(VxError::UnsupportedFormat(
            "hardware frames must be transferred before plane access".into(),
        ));
    }
    if buffer.width != frame.width || buffer.height != frame.height {
        return Err(VxError::InvalidParameter(format!(
            "buffer is {}x{}, frame is {}x{}",
            buffer.width, buffer.height, frame.width, frame.height
        )));
    }
    let layouts = buffer.plane_layouts();
    if layouts.len() != frame.plane_count() {
        return Err(VxError::UnsupportedFormat(format!(
            "{:?} has {} planes, {} has {}",
            buffer.format,
            layouts.len(),
            frame.format,
            frame.plane_count()
        )));
    }
    for (p, layout) in layouts.iter().enumerate() {
        let row_bytes = frame.format.plane_row_bytes(p, frame.width);
        let rows = frame.format.plane_rows(p, frame.height);
        if layout.row_bytes != row_bytes || layout.rows != rows {
            return Err(VxError::UnsupportedFormat(format!(
                "plane {p}: buffer {}x{} bytes, {} needs {row_bytes}x{rows}",
                layout.row_bytes, layout.rows, frame.format
            )));
        }
    }
    Ok(layouts)
}

/// Bits every 16-bit sample of `format` sits above the LSB, or 0.
pub fn sample_shift(format: PixelFormat) -> u32 {
    let d = format.descriptor();
    d.comp[..d.nb_components as usize]
        .iter()
        .find(|c| c.step % 2 == 0 && c.depth > 8)
        .map_or(0, |c| c.shift as u32)
}

fn shift_left(dst: &mut [u8], src: &[u8], shift: u32) {
    for (out, sample) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let v = u16::from_le_bytes([sample[0], sample[1]]);
        out.copy_from_slice(&(v << shift).to_le_bytes());
    }
}

fn shift_right(dst: &mut [u8], src: &[u8], shift: u32) {
    for (out, sample) in dst.chunks_exact_mut(2).zip(src.chunks_exact(2)) {
        let v = u16::from_le_bytes([sample[0], sample[1]]);
        out.copy_from_slice(&(v >> shift).to_le_bytes());
    }
}

/// Copy the pixels of `src` into the planes of `dst`.
pub fn copy_buffer_to_frame(src: &FrameBuffer, dst: &mut NativeFrame) -> Result<()> {
    if src.is_empty() {
        return Ok(());
    }
    let layouts = matching_layouts(src, dst)?;
    let shift = sample_shift(dst.format);
    let data = src.data();
    for (p, layout) in layouts.iter().enumerate() {
        let stride = dst.stride(p);
        let plane = dst.plane_mut(p).map_err(from_native)?;
        let rows = data[layout.offset..layout.offset + layout.len()].chunks_exact(layout.row_bytes);
        for (y, row) in rows.enumerate() {
            let line = &mut plane[y * stride..y * stride + layout.row_bytes];
            if shift == 0 {
                line.copy_from_slice(row);
            } else {
                shift_left(line, row, shift);
            }
        }
    }
    Ok(())
}

/// Copy the planes of `src` into the tight pixel storage of `dst`.
pub fn copy_frame_to_buffer(src: &NativeFrame, dst: &mut FrameBuffer) -> Result<()> {
    if dst.is_empty() {
        return Ok(());
    }
    let layouts = matching_layouts(dst, src)?;
    let shift = sample_shift(src.format);
    let data = dst.data_mut();
    for (p, layout) in layouts.iter().enumerate() {
        let out = &mut data[layout.offset..layout.offset + layout.len()];
        for (y, row) in out.chunks_exact_mut(layout.row_bytes).enumerate() {
            let line = src.row(p, y).ok_or_else(|| {
                VxError::InvalidParameter(format!("plane {p} of {} is short", src.format))
            })?;
            if shift == 0 {
                row.copy_from_slice(line);
            } else {
                shift_right(row, line, shift);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_map::native_pixel_format_for_depth;
    use proptest::prelude::*;
    use vxform_core::{ColorFormat, ElementType};
    use vxform_native::PixelFormat;

    fn numbered(w: u32, h: u32, format: ColorFormat, element: ElementType) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(w, h, format, element).unwrap();
        for (i, b) in buffer.data_mut().iter_mut().enumerate() {
            *b = (i * 7 % 251) as u8;
        }
        buffer
    }

    fn round_trip(buffer: &FrameBuffer) -> FrameBuffer {
        let native =
            native_pixel_format_for_depth(buffer.format, buffer.element, buffer.bit_depth).unwrap();
        let mut frame = NativeFrame::alloc(buffer.width, buffer.height, native).unwrap();
        copy_buffer_to_frame(buffer, &mut frame).unwrap();
        let mut back = FrameBuffer::new(buffer.width, buffer.height, buffer.format, buffer.element).unwrap();
        copy_frame_to_buffer(&frame, &mut back).unwrap();
        back
    }

    #[test]
    fn test_chroma_planes_land_at_stride() {
        let buffer = numbered(5, 3, ColorFormat::Yuv420, ElementType::U8);
        let mut frame = NativeFrame::alloc(5, 3, PixelFormat::Yuv420p).unwrap();
        copy_buffer_to_frame(&buffer, &mut frame).unwrap();
        // 3x2 chroma for 5x3 luma.
        let u = buffer.plane(1).unwrap();
        assert_eq!(frame.row(1, 1).unwrap(), &u[3..6]);
        assert_eq!(round_trip(&buffer).data(), buffer.data());
    }

    #[test]
    fn test_layout_mismatch_is_rejected() {
        let buffer = numbered(4, 4, ColorFormat::Rgb, ElementType::U8);
        let mut frame = NativeFrame::alloc(4, 4, PixelFormat::Rgba).unwrap();
        assert!(matches!(
            copy_buffer_to_frame(&buffer, &mut frame),
            Err(VxError::UnsupportedFormat(_))
        ));
        let mut small = NativeFrame::alloc(2, 2, PixelFormat::Rgb24).unwrap();
        assert!(copy_buffer_to_frame(&buffer, &mut small).is_err());
    }

    #[test]
    fn test_empty_roi_is_noop() {
        let buffer = FrameBuffer::new(0, 0, ColorFormat::Rgba, ElementType::U8).unwrap();
        let mut frame = NativeFrame::alloc(2, 2, PixelFormat::Rgba).unwrap();
        assert!(copy_buffer_to_frame(&buffer, &mut frame).is_ok());
    }

    #[test]
    fn test_p010_samples_move_to_high_bits() {
        let mut buffer = FrameBuffer::new(2, 2, ColorFormat::Nv12, ElementType::U16)
            .unwrap()
            .with_bit_depth(10);
        for sample in buffer.data_mut().chunks_exact_mut(2) {
            sample.copy_from_slice(&700u16.to_le_bytes());
        }
        let mut frame = NativeFrame::alloc(2, 2, PixelFormat::P010le).unwrap();
        copy_buffer_to_frame(&buffer, &mut frame).unwrap();
        let luma = frame.row(0, 0).unwrap();
        assert_eq!(u16::from_le_bytes([luma[0], luma[1]]), 700 << 6);
        assert_eq!(round_trip(&buffer).data(), buffer.data());
        assert_eq!(sample_shift(PixelFormat::P010le), 6);
        assert_eq!(sample_shift(PixelFormat::Yuv420p10le), 0);
        assert_eq!(sample_shift(PixelFormat::Nv12), 0);
    }

    fn layout_strategy() -> impl Strategy<Value = (ColorFormat, ElementType, u8)> {
        prop_oneof![
            Just((ColorFormat::Gray, ElementType::U8, 8)),
            Just((ColorFormat::Rgb, ElementType::U16, 16)),
            Just((ColorFormat::Bgra, ElementType::U8, 8)),
            Just((ColorFormat::Rgba, ElementType::F32, 32)),
            Just((ColorFormat::Yuv420, ElementType::U8, 8)),
            Just((ColorFormat::Yuv422, ElementType::U16, 10)),
            Just((ColorFormat::Yuv444, ElementType::U16, 12)),
            Just((ColorFormat::Yuva420, ElementType::U8, 8)),
            Just((ColorFormat::Nv12, ElementType::U8, 8)),
            Just((ColorFormat::Nv12, ElementType::U16, 10)),
            Just((ColorFormat::Nv21, ElementType::U8, 8)),
        ]
    }

    proptest! {
        #[test]
        fn prop_copy_round_trips(
            (format, element, depth) in layout_strategy(),
            w in 1u32..40,
            h in 1u32..40,
        ) {
            let mut buffer = numbered(w, h, format, element).with_bit_depth(depth);
            if element == ElementType::U16 {
                let max = ((1u32 << depth) - 1) as u16;
                for sample in buffer.data_mut().chunks_exact_mut(2) {
                    let v = u16::from_le_bytes([sample[0], sample[1]]) & max;
                    sample.copy_from_slice(&v.to_le_bytes());
                }
            }
            let back = round_trip(&buffer);
            prop_assert_eq!(back.data(), buffer.data());
        }
    }
}
