use std::time::Duration;

use image::{ImageBuffer, Luma};
use rayon::prelude::*;

use crate::enums::Orientation;

/// Linear mapping from stored pixel values back to calibrated intensities:
/// `value = pixel * slope + intercept`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rescale {
    pub slope: f32,
    pub intercept: f32,
}

impl Rescale {
    pub const IDENTITY: Rescale = Rescale {
        slope: 1.0,
        intercept: 0.0,
    };

    /// Calibrated intensity of a stored pixel.
    #[inline]
    pub fn apply(&self, pixel: u16) -> f32 {
        f32::from(pixel).mul_add(self.slope, self.intercept)
    }
}

/// Display window width and center in calibrated units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindowLevel {
    pub width: f32,
    pub center: f32,
}

/// Window applied to every reconstructed view, so the three orientations
/// stay visually comparable regardless of per-slice intensity ranges.
pub const DEFAULT_WINDOW_LEVEL: WindowLevel = WindowLevel {
    width: 400.0,
    center: 40.0,
};

/// Capability surface an external renderer needs from a slice; rendering
/// code depends on this rather than on the concrete descriptor.
pub trait Renderable {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Stored pixel at (x, y). Out-of-range reads return 0.
    fn pixel(&self, x: usize, y: usize) -> u16;
    /// Pixel-to-intensity calibration.
    fn calibration(&self) -> Rescale;
}

/// A reconstructed or synthetic 2D view, ready for display.
#[derive(Clone, Debug)]
pub struct SliceDescriptor {
    pub orientation: Orientation,
    pub width: usize,
    pub height: usize,
    /// Normalized position along the slicing axis, clamped to [0, 1].
    pub position: f32,
    /// Discrete index selected on the slicing axis.
    pub slice_index: usize,
    /// Quantized samples, row-major.
    pub pixels: Vec<u16>,
    /// Smallest non-zero intensity in the slice.
    pub min_value: f32,
    /// Largest non-zero intensity in the slice.
    pub max_value: f32,
    /// Inverse of the quantization applied to `pixels`.
    pub rescale: Rescale,
    pub window: WindowLevel,
    /// Physical width of one pixel column.
    pub column_spacing: f32,
    /// Physical height of one pixel row.
    pub row_spacing: f32,
    /// Non-zero fraction of the plane; coarse reconstruction quality score
    /// in [0, 1].
    pub quality_score: f32,
    pub processing_time: Duration,
    /// True for synthetic fallback patterns.
    pub is_fallback: bool,
}

impl SliceDescriptor {
    /// Raw byte view of the pixel buffer (native endianness) for texture
    /// upload.
    pub fn pixel_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    pub fn size_in_bytes(&self) -> usize {
        self.pixels.len() * size_of::<u16>()
    }

    /// Renders through the slice's window into an 8-bit grayscale image.
    pub fn to_image(&self) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let low = self.window.center - self.window.width / 2.0;
        let pixel_data: Vec<u8> = self
            .pixels
            .par_iter()
            .map(|&pixel| {
                let value = self.rescale.apply(pixel);
                let t = ((value - low) / self.window.width).clamp(0.0, 1.0);
                (t * 255.0) as u8
            })
            .collect();
        ImageBuffer::from_raw(self.width as u32, self.height as u32, pixel_data)
    }
}

impl Renderable for SliceDescriptor {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixel(&self, x: usize, y: usize) -> u16 {
        if x >= self.width {
            return 0;
        }
        self.pixels.get(y * self.width + x).copied().unwrap_or(0)
    }

    fn calibration(&self) -> Rescale {
        self.rescale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(pixels: Vec<u16>, width: usize, height: usize) -> SliceDescriptor {
        SliceDescriptor {
            orientation: Orientation::Axial,
            width,
            height,
            position: 0.5,
            slice_index: 0,
            pixels,
            min_value: 0.0,
            max_value: 100.0,
            rescale: Rescale::IDENTITY,
            window: WindowLevel {
                width: 100.0,
                center: 50.0,
            },
            column_spacing: 1.0,
            row_spacing: 1.0,
            quality_score: 1.0,
            processing_time: Duration::ZERO,
            is_fallback: false,
        }
    }

    #[test]
    fn rescale_recovers_calibrated_values() {
        let rescale = Rescale {
            slope: 0.5,
            intercept: -1000.0,
        };
        assert_eq!(rescale.apply(0), -1000.0);
        assert_eq!(rescale.apply(2000), 0.0);
        assert_eq!(Rescale::IDENTITY.apply(42), 42.0);
    }

    #[test]
    fn renderable_pixel_returns_zero_out_of_range() {
        let slice = descriptor(vec![1, 2, 3, 4, 5, 6], 3, 2);
        assert_eq!(slice.pixel(0, 0), 1);
        assert_eq!(slice.pixel(2, 1), 6);
        assert_eq!(slice.pixel(3, 0), 0);
        assert_eq!(slice.pixel(0, 2), 0);
    }

    #[test]
    fn pixel_bytes_cover_the_whole_buffer() {
        let slice = descriptor(vec![0x0102, 0x0304], 2, 1);
        assert_eq!(slice.size_in_bytes(), 4);
        assert_eq!(slice.pixel_bytes().len(), 4);
    }

    #[test]
    fn to_image_maps_the_window_to_full_contrast() {
        // Window 100 centered at 50 maps 0..100 onto 0..255.
        let slice = descriptor(vec![0, 50, 100, 200], 2, 2);
        let image = slice.to_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0[0], 0);
        assert_eq!(image.get_pixel(1, 0).0[0], 127);
        assert_eq!(image.get_pixel(0, 1).0[0], 255);
        assert_eq!(image.get_pixel(1, 1).0[0], 255);
    }

    #[test]
    fn to_image_handles_zero_width_window() {
        let mut slice = descriptor(vec![10, 20], 2, 1);
        slice.window = WindowLevel {
            width: 0.0,
            center: 15.0,
        };
        // Degenerate window must not panic; NaN ratios render as black.
        assert!(slice.to_image().is_some());
    }
}
