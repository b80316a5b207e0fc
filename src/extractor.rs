//! Plane extraction and quantization. Axial planes are copied straight out
//! of volume storage; sagittal and coronal planes are resampled through the
//! interpolator one output row at a time.

use log::{debug, warn};
use rayon::prelude::*;
use web_time::Instant;

use crate::enums::Orientation;
use crate::quality::QualityProfile;
use crate::sampler::VolumeSampler;
use crate::slice::{DEFAULT_WINDOW_LEVEL, Rescale, SliceDescriptor};
use crate::volume::Volume;

/// Minimum non-zero fraction a reconstructed plane must reach to count as
/// renderable.
pub(crate) const MIN_FILL_RATIO: f32 = 0.05;

pub(crate) fn extract_slice(
    volume: &Volume,
    profile: &QualityProfile,
    orientation: Orientation,
    position: f32,
) -> Option<SliceDescriptor> {
    let started = Instant::now();
    let dims = volume.dims();
    let position = position.clamp(0.0, 1.0);

    let axis_len = orientation.axis_len(dims);
    let slice_index = (position * (axis_len - 1) as f32).round() as usize;
    let (width, height) = orientation.plane_dims(dims);

    let samples = match orientation {
        Orientation::Axial => volume.axial_plane(slice_index)?.to_vec(),
        Orientation::Sagittal => resample_sagittal(volume, profile, slice_index),
        Orientation::Coronal => resample_coronal(volume, profile, slice_index),
    };

    let non_zero = samples.iter().filter(|&&value| value != 0.0).count();
    let fill_ratio = non_zero as f32 / samples.len() as f32;
    if fill_ratio < MIN_FILL_RATIO {
        warn!(
            "{orientation} slice {slice_index} is only {:.1}% filled, rejecting",
            fill_ratio * 100.0
        );
        return None;
    }

    let quantized = quantize(&samples)?;
    let (column_spacing, row_spacing) = orientation.plane_spacing(volume.spacing());
    let processing_time = started.elapsed();
    debug!(
        "extracted {orientation} slice {slice_index} ({width}x{height}) in {processing_time:.2?}"
    );

    Some(SliceDescriptor {
        orientation,
        width,
        height,
        position,
        slice_index,
        pixels: quantized.pixels,
        min_value: quantized.min,
        max_value: quantized.max,
        rescale: Rescale {
            slope: quantized.slope,
            intercept: quantized.intercept,
        },
        window: DEFAULT_WINDOW_LEVEL,
        column_spacing,
        row_spacing,
        quality_score: fill_ratio,
        processing_time,
        is_fallback: false,
    })
}

// Output rows either run serially or split across the rayon pool; row
// results are concatenated in index order, so both paths produce identical
// buffers.
fn collect_rows<F>(rows: usize, threads: usize, row: F) -> Vec<f32>
where
    F: Fn(usize) -> Vec<f32> + Sync + Send,
{
    if threads > 1 {
        (0..rows).into_par_iter().flat_map(row).collect()
    } else {
        (0..rows).flat_map(row).collect()
    }
}

// The z axis is mirrored in both reformatted views so the volume top lands
// at the image edge the viewer expects.
// TODO: check the mirror against the radiological display convention and
// document which image edge is superior in each view.
fn resample_sagittal(volume: &Volume, profile: &QualityProfile, x_index: usize) -> Vec<f32> {
    let dims = volume.dims();
    let sampler = VolumeSampler::new(volume, profile.interpolation);
    let (depth, height) = (dims.depth, dims.height);

    collect_rows(height, profile.threads, |y| {
        (0..depth)
            .map(|column| {
                sampler.sample(x_index as f32, y as f32, (depth - 1 - column) as f32)
            })
            .collect()
    })
}

// Same z mirror as the sagittal path, applied along output rows.
fn resample_coronal(volume: &Volume, profile: &QualityProfile, y_index: usize) -> Vec<f32> {
    let dims = volume.dims();
    let sampler = VolumeSampler::new(volume, profile.interpolation);
    let (depth, width) = (dims.depth, dims.width);

    collect_rows(depth, profile.threads, |row| {
        let z = (depth - 1 - row) as f32;
        (0..width)
            .map(|x| sampler.sample(x as f32, y_index as f32, z))
            .collect()
    })
}

struct Quantized {
    pixels: Vec<u16>,
    min: f32,
    max: f32,
    slope: f32,
    intercept: f32,
}

// Quantize into u16 against this slice's own non-zero extremes. Zero stays
// zero so empty padding neither shifts the range nor gains intensity.
fn quantize(samples: &[f32]) -> Option<Quantized> {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    let mut non_zero = 0usize;
    for &value in samples {
        if value != 0.0 {
            non_zero += 1;
            if value < min {
                min = value;
            }
            if value > max {
                max = value;
            }
        }
    }
    if non_zero == 0 {
        return None;
    }

    let range = max - min;
    let scale = if range > 0.0 {
        f32::from(u16::MAX) / range
    } else {
        1.0
    };
    let pixels = samples
        .iter()
        .map(|&value| {
            if value == 0.0 {
                0
            } else {
                ((value - min) * scale).round().clamp(0.0, f32::from(u16::MAX)) as u16
            }
        })
        .collect();

    Some(Quantized {
        pixels,
        min,
        max,
        slope: range / f32::from(u16::MAX),
        intercept: min,
    })
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;

    use crate::enums::QualityMode;

    use super::*;

    fn test_volume() -> Volume {
        // 6x6x6 with a bright 4x4x4 core so every mid-volume plane passes
        // the fill gate.
        let data = Array3::from_shape_fn((6, 6, 6), |(z, y, x)| {
            if (1..5).contains(&x) && (1..5).contains(&y) && (1..5).contains(&z) {
                100.0 + x as f32 + 10.0 * y as f32 + 100.0 * z as f32
            } else {
                0.0
            }
        });
        Volume::new(data, (0.5, 0.5, 2.0), (0.0, 0.0, 0.0))
    }

    fn medium() -> QualityProfile {
        QualityMode::Medium.profile()
    }

    #[test]
    fn axial_extraction_copies_the_native_plane() {
        let volume = test_volume();
        let slice = extract_slice(&volume, &medium(), Orientation::Axial, 0.5).unwrap();
        assert_eq!((slice.width, slice.height), (6, 6));
        assert_eq!(slice.slice_index, 3);
        assert!(!slice.is_fallback);

        // Quantization must invert back to the stored plane values.
        let plane = volume.axial_plane(3).unwrap();
        for (pixel, want) in slice.pixels.iter().zip(plane) {
            let got = slice.rescale.apply(*pixel);
            if *want == 0.0 {
                assert_eq!(*pixel, 0);
            } else {
                assert!((got - want).abs() < slice.rescale.slope + 1e-3);
            }
        }
    }

    #[test]
    fn axial_is_identical_across_quality_tiers() {
        let volume = test_volume();
        let low = extract_slice(&volume, &QualityMode::Low.profile(), Orientation::Axial, 0.5);
        let high = extract_slice(&volume, &QualityMode::High.profile(), Orientation::Axial, 0.5);
        assert_eq!(low.unwrap().pixels, high.unwrap().pixels);
    }

    #[test]
    fn extraction_is_idempotent() {
        let volume = test_volume();
        for orientation in Orientation::ALL {
            let first = extract_slice(&volume, &medium(), orientation, 0.4).unwrap();
            let second = extract_slice(&volume, &medium(), orientation, 0.4).unwrap();
            assert_eq!(first.pixels, second.pixels, "{orientation}");
            assert_eq!(first.slice_index, second.slice_index);
        }
    }

    #[test]
    fn serial_and_parallel_paths_agree() {
        let volume = test_volume();
        let serial = QualityProfile {
            threads: 1,
            ..medium()
        };
        let parallel = QualityProfile {
            threads: 4,
            ..medium()
        };
        for orientation in [Orientation::Sagittal, Orientation::Coronal] {
            let a = extract_slice(&volume, &serial, orientation, 0.5).unwrap();
            let b = extract_slice(&volume, &parallel, orientation, 0.5).unwrap();
            assert_eq!(a.pixels, b.pixels, "{orientation}");
        }
    }

    #[test]
    fn position_clamps_to_the_axis_ends() {
        let volume = test_volume();
        let start = extract_slice(&volume, &medium(), Orientation::Sagittal, -0.5);
        let first = extract_slice(&volume, &medium(), Orientation::Sagittal, 0.0);
        // Index 0 is empty in the test volume, both must reject it the same
        // way.
        assert!(start.is_none());
        assert!(first.is_none());

        let full = Volume::new(
            Array3::from_elem((6, 6, 6), 50.0),
            (1.0, 1.0, 1.0),
            (0.0, 0.0, 0.0),
        );
        let end = extract_slice(&full, &medium(), Orientation::Axial, 7.0).unwrap();
        assert_eq!(end.slice_index, 5);
        assert_eq!(end.position, 1.0);
    }

    #[test]
    fn sagittal_plane_flips_z_and_spans_depth_by_height() {
        let volume = test_volume();
        let profile = QualityProfile {
            threads: 1,
            ..QualityMode::Low.profile()
        };
        let slice = extract_slice(&volume, &profile, Orientation::Sagittal, 0.5).unwrap();
        assert_eq!((slice.width, slice.height), (6, 6));
        // x is fixed at round(0.5 * 5) = 3. Output (column, row) reads voxel
        // (3, row, depth - 1 - column) under nearest interpolation.
        let column = 1;
        let row = 2;
        let want = volume.voxel(3, row, 6 - 1 - column);
        let got = slice.rescale.apply(slice.pixels[row * 6 + column]);
        assert!((got - want).abs() < slice.rescale.slope + 1e-3);
    }

    #[test]
    fn coronal_plane_flips_z_and_spans_width_by_depth() {
        let volume = test_volume();
        let profile = QualityProfile {
            threads: 1,
            ..QualityMode::Low.profile()
        };
        let slice = extract_slice(&volume, &profile, Orientation::Coronal, 0.5).unwrap();
        assert_eq!((slice.width, slice.height), (6, 6));
        let column = 2;
        let row = 1;
        let want = volume.voxel(column, 3, 6 - 1 - row);
        let got = slice.rescale.apply(slice.pixels[row * 6 + column]);
        assert!((got - want).abs() < slice.rescale.slope + 1e-3);
    }

    #[test]
    fn nearly_empty_planes_are_rejected() {
        let mut data = Array3::zeros((6, 6, 6));
        data[[3, 3, 3]] = 500.0;
        let volume = Volume::new(data, (1.0, 1.0, 1.0), (0.0, 0.0, 0.0));
        // One voxel in 36 is under the 5% gate.
        assert!(extract_slice(&volume, &medium(), Orientation::Axial, 0.5).is_none());
    }

    #[test]
    fn fill_ratio_becomes_the_quality_score() {
        let volume = test_volume();
        let slice = extract_slice(&volume, &medium(), Orientation::Axial, 0.5).unwrap();
        // 16 bright voxels out of 36.
        assert!((slice.quality_score - 16.0 / 36.0).abs() < 1e-6);
    }

    #[test]
    fn quantization_spans_the_u16_range_over_non_zero_values() {
        let quantized = quantize(&[0.0, 10.0, 20.0, 30.0]).unwrap();
        assert_eq!(quantized.pixels, vec![0, 0, 32768, 65535]);
        assert_eq!(quantized.min, 10.0);
        assert_eq!(quantized.max, 30.0);
        assert_eq!(quantized.intercept, 10.0);
        assert!((quantized.slope - 20.0 / 65535.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_slices_quantize_without_dividing_by_zero() {
        let quantized = quantize(&[25.0; 16]).unwrap();
        assert!(quantized.pixels.iter().all(|&pixel| pixel == 0));
        assert_eq!(quantized.slope, 0.0);
        assert_eq!(quantized.intercept, 25.0);
        // Rescale still recovers the original value.
        let rescale = Rescale {
            slope: quantized.slope,
            intercept: quantized.intercept,
        };
        assert_eq!(rescale.apply(quantized.pixels[0]), 25.0);
    }

    #[test]
    fn all_zero_buffers_yield_no_quantization() {
        assert!(quantize(&[0.0; 8]).is_none());
        assert!(quantize(&[]).is_none());
    }
}
