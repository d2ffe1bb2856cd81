//! NV21 to rotated-RGBA conversion.
//!
//! The transform is the fixed-point BT.601 variant used by camera preview
//! pipelines: integer coefficients, arithmetic shift by 10, luma floored at
//! 16 and every channel clamped to `[0, 255]`. The output is written rotated
//! 90 degrees into portrait orientation so a landscape sensor frame lands
//! upright on the destination surface.

use crate::image::Nv21Frame;

/// Pixel layout of a destination surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// Packed 32-bit pixels, written as `0xAARRGGBB` words.
    Rgba8888,
    /// Packed 16-bit pixels. Not supported by the converter.
    Rgb565,
}

/// Errors produced by [`yuv_to_rgba_rotated`]. All of them are reported
/// before the first pixel is written.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("surface buffer holds {got} pixels, header claims {width}x{height}")]
    SurfaceBufferMismatch { width: u32, height: u32, got: usize },

    #[error("surface holds {surface} pixels, frame needs {frame}")]
    PixelCountMismatch { surface: usize, frame: usize },

    #[error("unsupported surface format {0:?} (expected Rgba8888)")]
    UnsupportedFormat(SurfaceFormat),
}

/// Mutable view over a caller-owned packed-32-bit surface.
///
/// The converter only ever writes into it; allocation and locking stay with
/// the caller.
#[derive(Debug)]
pub struct RgbaSurfaceMut<'a> {
    width: usize,
    height: usize,
    format: SurfaceFormat,
    pixels: &'a mut [u32],
}

impl<'a> RgbaSurfaceMut<'a> {
    pub fn new(
        pixels: &'a mut [u32],
        width: u32,
        height: u32,
        format: SurfaceFormat,
    ) -> Result<Self, ConvertError> {
        let w = width as usize;
        let h = height as usize;
        if w.checked_mul(h) != Some(pixels.len()) {
            return Err(ConvertError::SurfaceBufferMismatch {
                width,
                height,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width: w,
            height: h,
            format,
            pixels,
        })
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    #[inline]
    pub fn pixels(&self) -> &[u32] {
        self.pixels
    }
}

#[inline]
fn clamp_channel(v: i32) -> u32 {
    v.clamp(0, 255) as u32
}

/// Convert an NV21 frame into `dst`, rotating 90 degrees into portrait.
///
/// Source pixel `(col, row)` lands at destination linear index
/// `(col + 1) * height - row - 1`. Every output word carries full opacity.
///
/// The destination must hold exactly `width * height` packed-32-bit pixels;
/// any precondition violation aborts before a single write, leaving the
/// surface untouched. The conversion keeps no state, so independent buffer
/// pairs can be converted concurrently.
pub fn yuv_to_rgba_rotated(
    src: &Nv21Frame<'_>,
    dst: &mut RgbaSurfaceMut<'_>,
) -> Result<(), ConvertError> {
    if dst.format != SurfaceFormat::Rgba8888 {
        return Err(ConvertError::UnsupportedFormat(dst.format));
    }
    let frame = src.width() * src.height();
    if dst.pixels.len() != frame {
        return Err(ConvertError::PixelCountMismatch {
            surface: dst.pixels.len(),
            frame,
        });
    }

    let width = src.width();
    let height = src.height();
    for row in 0..height {
        for col in 0..width {
            let (v, u) = src.chroma_at(col, row);
            let y = i32::from(src.luma_at(col, row)).max(16);
            let u = i32::from(u) - 128;
            let v = i32::from(v) - 128;

            let a0 = 1192 * (y - 16);
            let r = clamp_channel((a0 + 1634 * v) >> 10);
            let g = clamp_channel((a0 - 832 * v - 400 * u) >> 10);
            let b = clamp_channel((a0 + 2066 * u) >> 10);

            dst.pixels[(col + 1) * height - row - 1] = 0xff00_0000 | (r << 16) | (g << 8) | b;
        }
    }
    Ok(())
}
