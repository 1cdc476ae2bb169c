//! Per-component sample access driven by the format descriptor.
//!
//! Values are exchanged as `f32` in raw units (0..=max for integer
//! components, the stored value for float components).

use crate::pixfmt::{PixelFormat, FLAG_FLOAT};

/// Storage width of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    U8,
    U16,
    F32,
}

/// Resolved location of one component inside a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompLayout {
    pub plane: usize,
    pub step: usize,
    pub offset: usize,
    pub shift: u32,
    pub kind: SampleKind,
    /// Largest representable value in raw units
    pub max: f32,
    pub log2_w: u32,
    pub log2_h: u32,
}

impl CompLayout {
    pub fn of(format: PixelFormat, index: usize) -> Option<Self> {
        let d = format.descriptor();
        if index >= d.nb_components as usize {
            return None;
        }
        let comp = d.comp[index];
        let float = d.flags & FLAG_FLOAT != 0;
        let kind = if float {
            SampleKind::F32
        } else if comp.depth + comp.shift > 8 {
            SampleKind::U16
        } else {
            SampleKind::U8
        };
        let (log2_w, log2_h) = format.comp_shift(index);
        Some(Self {
            plane: comp.plane as usize,
            step: comp.step as usize,
            offset: comp.offset as usize,
            shift: comp.shift as u32,
            kind,
            max: if float {
                1.0
            } else {
                ((1u32 << comp.depth) - 1) as f32
            },
            log2_w,
            log2_h,
        })
    }

    /// All components of a format, in descriptor order.
    pub fn all(format: PixelFormat) -> Vec<Self> {
        (0..format.descriptor().nb_components as usize)
            .filter_map(|i| Self::of(format, i))
            .collect()
    }

    /// Component grid size for a `width`x`height` image.
    #[inline]
    pub fn dims(&self, width: u32, height: u32) -> (usize, usize) {
        (
            crate::pixfmt::ceil_shift(width, self.log2_w) as usize,
            crate::pixfmt::ceil_shift(height, self.log2_h) as usize,
        )
    }

    /// Read sample `x` of a plane row.
    #[inline]
    pub fn read(&self, row: &[u8], x: usize) -> f32 {
        let i = x * self.step + self.offset;
        match self.kind {
            SampleKind::U8 => (row[i] >> self.shift) as f32,
            SampleKind::U16 => {
                let raw = u16::from_le_bytes([row[i], row[i + 1]]);
                (raw >> self.shift) as f32
            }
            SampleKind::F32 => f32::from_le_bytes([row[i], row[i + 1], row[i + 2], row[i + 3]]),
        }
    }

    /// Write sample `x` of a plane row, rounding and clamping integers.
    #[inline]
    pub fn write(&self, row: &mut [u8], x: usize, value: f32) {
        let i = x * self.step + self.offset;
        match self.kind {
            SampleKind::U8 => {
                let v = value.round().clamp(0.0, self.max) as u8;
                row[i] = v << self.shift;
            }
            SampleKind::U16 => {
                let v = (value.round().clamp(0.0, self.max) as u16) << self.shift;
                row[i..i + 2].copy_from_slice(&v.to_le_bytes());
            }
            SampleKind::F32 => row[i..i + 4].copy_from_slice(&value.to_le_bytes()),
        }
    }
}
