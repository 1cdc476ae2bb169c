//! Benchmarks for buffer and native frame conversion.
//!
//! Run with: cargo bench -p vxform-media

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vxform_core::{ColorFormat, ElementType, FrameBuffer};
use vxform_media::{copy_buffer_to_frame, BufferToNative, NativeToBuffer};
use vxform_native::{NativeFrame, PixelFormat};

fn bench_plane_copy(c: &mut Criterion) {
    let rgba = FrameBuffer::test_pattern(1920, 1080).unwrap();
    let mut rgba_frame = NativeFrame::alloc(1920, 1080, PixelFormat::Rgba).unwrap();
    c.bench_function("plane_copy_rgba_1080p", |bencher| {
        bencher.iter(|| copy_buffer_to_frame(black_box(&rgba), &mut rgba_frame).unwrap());
    });

    let yuv = FrameBuffer::new(1920, 1080, ColorFormat::Yuv420, ElementType::U8).unwrap();
    let mut yuv_frame = NativeFrame::alloc(1920, 1080, PixelFormat::Yuv420p).unwrap();
    c.bench_function("plane_copy_yuv420_1080p", |bencher| {
        bencher.iter(|| copy_buffer_to_frame(black_box(&yuv), &mut yuv_frame).unwrap());
    });
}

fn bench_conversion(c: &mut Criterion) {
    let buffer = FrameBuffer::test_pattern(1920, 1080).unwrap();

    let mut wrap = BufferToNative::new();
    c.bench_function("buffer_to_native_zero_copy", |bencher| {
        bencher.iter(|| wrap.convert(black_box(&buffer), Some(0)).unwrap());
    });

    let mut downscale = BufferToNative::new();
    downscale.set_output_size(1280, 720).unwrap();
    c.bench_function("buffer_to_native_downscale_720p", |bencher| {
        bencher.iter(|| downscale.convert(black_box(&buffer), Some(0)).unwrap());
    });

    let frame = BufferToNative::new().convert(&buffer, None).unwrap();
    let mut to_yuv = NativeToBuffer::new();
    to_yuv
        .set_output_format(ColorFormat::Yuv420, ElementType::U8)
        .unwrap();
    c.bench_function("native_to_buffer_yuv420", |bencher| {
        bencher.iter(|| to_yuv.convert(black_box(&frame), None).unwrap());
    });
}

criterion_group!(benches, bench_plane_copy, bench_conversion);
criterion_main!(benches);
