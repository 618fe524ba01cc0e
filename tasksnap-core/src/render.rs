//! Frame rendering and PNG encoding
//!
//! Turns the raw pixels held by a playback surface into an RGBA raster at
//! the stream's native resolution, then encodes that raster as PNG.

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::error::{Result, SnapError};
use crate::types::{PixelFormat, RawFrame};

/// Renders frames to rasters and encodes them
pub trait FrameRenderer: Send + Sync {
    /// Draw the frame onto an RGBA raster of the same size
    fn render(&self, frame: &RawFrame) -> Result<RgbaImage>;

    /// Encode a raster as an image file
    fn encode(&self, raster: &RgbaImage) -> Result<Vec<u8>>;
}

/// PNG renderer backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct PngRenderer;

impl PngRenderer {
    /// Create a new PNG renderer
    pub fn new() -> Self {
        Self
    }
}

impl FrameRenderer for PngRenderer {
    fn render(&self, frame: &RawFrame) -> Result<RgbaImage> {
        if !frame.is_complete() {
            return Err(SnapError::encode(format!(
                "Frame buffer too small for {}x{} stride {} ({} bytes)",
                frame.width,
                frame.height,
                frame.stride,
                frame.data.len()
            )));
        }

        let bpp = frame.format.bytes_per_pixel() as usize;
        let row_len = frame.width as usize * bpp;
        let mut rgba = Vec::with_capacity(frame.width as usize * frame.height as usize * 4);

        for row in frame
            .data
            .chunks(frame.stride as usize)
            .take(frame.height as usize)
        {
            for px in row[..row_len].chunks_exact(bpp) {
                let pixel = match frame.format {
                    PixelFormat::Bgrx => [px[2], px[1], px[0], 255],
                    PixelFormat::Bgra => [px[2], px[1], px[0], px[3]],
                    PixelFormat::Rgbx => [px[0], px[1], px[2], 255],
                    PixelFormat::Rgba => [px[0], px[1], px[2], px[3]],
                    PixelFormat::Rgb => [px[0], px[1], px[2], 255],
                    PixelFormat::Bgr => [px[2], px[1], px[0], 255],
                };
                rgba.extend_from_slice(&pixel);
            }
        }

        RgbaImage::from_raw(frame.width, frame.height, rgba)
            .ok_or_else(|| SnapError::encode("Raster size mismatch"))
    }

    fn encode(&self, raster: &RgbaImage) -> Result<Vec<u8>> {
        let mut png = Vec::new();
        PngEncoder::new(&mut png).write_image(
            raster.as_raw(),
            raster.width(),
            raster.height(),
            ExtendedColorType::Rgba8,
        )?;
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgrx_swizzle() {
        let frame = RawFrame::packed(1, 1, PixelFormat::Bgrx, vec![10, 20, 30, 0]);
        let raster = PngRenderer.render(&frame).unwrap();
        assert_eq!(raster.get_pixel(0, 0).0, [30, 20, 10, 255]);
    }

    #[test]
    fn test_stride_padding_ignored() {
        // 1x2 RGB with 2 bytes of row padding
        let frame = RawFrame {
            width: 1,
            height: 2,
            stride: 5,
            format: PixelFormat::Rgb,
            data: vec![1, 2, 3, 0, 0, 4, 5, 6],
        };
        let raster = PngRenderer.render(&frame).unwrap();
        assert_eq!(raster.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(raster.get_pixel(0, 1).0, [4, 5, 6, 255]);
    }

    #[test]
    fn test_truncated_frame_rejected() {
        let frame = RawFrame::packed(4, 4, PixelFormat::Bgra, vec![0; 10]);
        assert!(PngRenderer.render(&frame).is_err());
    }

    #[test]
    fn test_png_round_trip_keeps_native_size() {
        let frame = RawFrame::packed(3, 2, PixelFormat::Rgba, vec![200; 24]);
        let raster = PngRenderer.render(&frame).unwrap();
        let png = PngRenderer.encode(&raster).unwrap();

        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
