//! Non-invasive health checks over a built session: buffer statistics, a
//! transform round-trip check over the volume corners, and a
//! three-orientation extraction smoke test. Nothing here mutates the
//! session or invalidates it; failures are reported, not thrown.

use std::fmt;
use std::time::Duration;

use log::info;
use web_time::Instant;

use crate::enums::Orientation;
use crate::geometry::Dimensions;
use crate::slice::{Rescale, SliceDescriptor, WindowLevel};
use crate::volume::VolumeSession;

pub struct Diagnostics;

/// Summary statistics over a sample buffer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BufferStatistics {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub non_zero: usize,
    pub fill_ratio: f32,
}

/// Outcome of the forward-then-inverse transform check over the eight
/// volume corners.
#[derive(Clone, Copy, Debug)]
pub struct TransformCheck {
    pub corners: usize,
    pub failures: usize,
    pub max_error: f32,
    pub tolerance: f32,
}

impl TransformCheck {
    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// Result of probing one orientation at mid-volume.
#[derive(Clone, Copy, Debug)]
pub struct SliceProbe {
    pub orientation: Orientation,
    pub success: bool,
    pub processing_time: Option<Duration>,
    pub quality_score: Option<f32>,
}

/// Per-orientation results of the extraction smoke test.
#[derive(Clone, Debug)]
pub struct SmokeTest {
    pub probes: [SliceProbe; 3],
}

impl SmokeTest {
    pub fn all_passed(&self) -> bool {
        self.probes.iter().all(|probe| probe.success)
    }
}

/// Aggregate health report for a session.
#[derive(Clone, Debug)]
pub struct DiagnosticsReport {
    pub dimensions: Dimensions,
    pub spacing: (f32, f32, f32),
    pub dropped_slices: usize,
    pub volume: BufferStatistics,
    pub invertible: bool,
    pub transform: TransformCheck,
    pub smoke: SmokeTest,
}

impl Diagnostics {
    /// Worst acceptable voxel round-trip error, in voxel units.
    pub const ROUND_TRIP_TOLERANCE: f32 = 0.1;

    /// Min, max, mean and non-zero share of any sample buffer. Empty input
    /// yields all-zero statistics.
    pub fn statistics<'a, I>(values: I) -> BufferStatistics
    where
        I: IntoIterator<Item = &'a f32>,
    {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        let mut sum = 0.0f64;
        let mut count = 0usize;
        let mut non_zero = 0usize;

        for &value in values {
            if value != 0.0 {
                non_zero += 1;
            }
            if value < min {
                min = value;
            }
            if value > max {
                max = value;
            }
            sum += f64::from(value);
            count += 1;
        }

        if count == 0 {
            return BufferStatistics {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
                non_zero: 0,
                fill_ratio: 0.0,
            };
        }

        BufferStatistics {
            min,
            max,
            mean: (sum / count as f64) as f32,
            non_zero,
            fill_ratio: non_zero as f32 / count as f32,
        }
    }

    /// Runs voxel -> patient -> voxel over the eight volume corners and
    /// reports the worst error against the tolerance. A singular transform
    /// fails here loudly but still never invalidates the session.
    pub fn verify_geometry(session: &VolumeSession) -> TransformCheck {
        let geometry = session.geometry();
        let dims = geometry.dimensions;
        let mx = (dims.width - 1) as f32;
        let my = (dims.height - 1) as f32;
        let mz = (dims.depth - 1) as f32;

        let corners = [
            [0.0, 0.0, 0.0],
            [mx, 0.0, 0.0],
            [0.0, my, 0.0],
            [0.0, 0.0, mz],
            [mx, my, 0.0],
            [mx, 0.0, mz],
            [0.0, my, mz],
            [mx, my, mz],
        ];

        let mut failures = 0;
        let mut max_error = 0.0f32;
        for corner in corners {
            let round_trip = geometry.patient_to_voxel(geometry.voxel_to_patient(corner));
            let error = distance(corner, round_trip);
            if error > Self::ROUND_TRIP_TOLERANCE {
                failures += 1;
            }
            max_error = max_error.max(error);
        }

        TransformCheck {
            corners: corners.len(),
            failures,
            max_error,
            tolerance: Self::ROUND_TRIP_TOLERANCE,
        }
    }

    /// Extracts a mid-volume slice per orientation, recording success,
    /// timing and quality for each.
    pub fn smoke_test(session: &VolumeSession) -> SmokeTest {
        let probes = Orientation::ALL.map(|orientation| {
            match session.extract_slice(orientation, 0.5) {
                Some(slice) => SliceProbe {
                    orientation,
                    success: true,
                    processing_time: Some(slice.processing_time),
                    quality_score: Some(slice.quality_score),
                },
                None => SliceProbe {
                    orientation,
                    success: false,
                    processing_time: None,
                    quality_score: None,
                },
            }
        });
        SmokeTest { probes }
    }

    /// Synthetic checkerboard standing in for a failed extraction, sized
    /// like the requested view so the rendering path downstream stays
    /// exercised.
    pub fn fallback_slice(
        session: &VolumeSession,
        orientation: Orientation,
        position: f32,
    ) -> SliceDescriptor {
        let started = Instant::now();
        let dims = session.volume().dims();
        let position = position.clamp(0.0, 1.0);
        let (width, height) = orientation.plane_dims(dims);

        let pixels: Vec<u16> = (0..width * height)
            .map(|i| {
                let x = i % width;
                let y = i / width;
                ((x + y) % 2) as u16 * 30000 + 5000
            })
            .collect();

        let (column_spacing, row_spacing) = orientation.plane_spacing(session.volume().spacing());
        info!("substituting a fallback {orientation} pattern at position {position:.2}");

        SliceDescriptor {
            orientation,
            width,
            height,
            position,
            slice_index: (position * (dims.depth - 1) as f32).round() as usize,
            pixels,
            min_value: 5000.0,
            max_value: 35000.0,
            rescale: Rescale::IDENTITY,
            window: WindowLevel {
                width: 30000.0,
                center: 20000.0,
            },
            column_spacing,
            row_spacing,
            quality_score: 1.0,
            processing_time: started.elapsed(),
            is_fallback: true,
        }
    }

    /// Full health report: volume statistics, the corner round-trip check
    /// and the smoke test.
    pub fn report(session: &VolumeSession) -> DiagnosticsReport {
        DiagnosticsReport {
            dimensions: session.volume().dims(),
            spacing: session.volume().spacing(),
            dropped_slices: session.dropped_slices(),
            volume: Self::statistics(session.volume().data().iter()),
            invertible: session.geometry().invertible,
            transform: Self::verify_geometry(session),
            smoke: Self::smoke_test(session),
        }
    }
}

fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

impl fmt::Display for DiagnosticsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Volume Diagnostics")?;
        writeln!(f, "==================")?;
        writeln!(
            f,
            "Dimensions:     {}x{}x{}",
            self.dimensions.width, self.dimensions.height, self.dimensions.depth
        )?;
        writeln!(
            f,
            "Spacing:        {:.3} x {:.3} x {:.3}",
            self.spacing.0, self.spacing.1, self.spacing.2
        )?;
        writeln!(f, "Dropped slices: {}", self.dropped_slices)?;
        writeln!(
            f,
            "Intensities:    {:.1} .. {:.1} (mean {:.1})",
            self.volume.min, self.volume.max, self.volume.mean
        )?;
        writeln!(f, "Fill ratio:     {:.1}%", self.volume.fill_ratio * 100.0)?;
        writeln!(
            f,
            "Transform:      invertible={}, {}/{} corners within {} (max error {:.4})",
            self.invertible,
            self.transform.corners - self.transform.failures,
            self.transform.corners,
            self.transform.tolerance,
            self.transform.max_error
        )?;
        for probe in &self.smoke.probes {
            match (probe.processing_time, probe.quality_score) {
                (Some(time), Some(score)) if probe.success => writeln!(
                    f,
                    "{:<9} ok     {:>10.2?}  quality {:.2}",
                    probe.orientation, time, score
                )?,
                _ => writeln!(f, "{:<9} FAILED", probe.orientation)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{Array2, Array3};

    use crate::builder::VolumeBuilder;
    use crate::geometry::VolumeGeometry;
    use crate::loader::{LoadError, SliceImage, SliceSource};
    use crate::volume::{Volume, VolumeSession};

    use super::*;

    struct StubSource(Vec<SliceImage>);

    impl SliceSource for StubSource {
        type Id = usize;

        async fn resolve(&self, id: &usize) -> Result<SliceImage, LoadError> {
            Ok(self.0[*id].clone())
        }
    }

    async fn bright_session() -> VolumeSession {
        let slices: Vec<_> = (0..4)
            .map(|z| SliceImage {
                pixels: Array2::from_elem((4, 4), 100.0 + z as f32),
                position: Some([0.0, 0.0, z as f32 * 2.0]),
                pixel_spacing: Some((0.5, 0.5)),
                ..SliceImage::default()
            })
            .collect();
        let builder = VolumeBuilder::new(StubSource(slices));
        builder.build(&[0, 1, 2, 3]).await.unwrap()
    }

    fn empty_session() -> VolumeSession {
        let first = SliceImage {
            pixels: Array2::zeros((4, 4)),
            ..SliceImage::default()
        };
        let geometry = VolumeGeometry::from_slices(&first, &first, 4);
        let volume = Volume::new(
            Array3::zeros((4, 4, 4)),
            geometry.spacing,
            geometry.origin,
        );
        VolumeSession::new(volume, geometry, 0)
    }

    #[test]
    fn statistics_cover_min_max_mean_and_fill() {
        let values = [0.0, 2.0, 4.0, 0.0, 6.0, 0.0];
        let stats = Diagnostics::statistics(values.iter());
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 6.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(stats.non_zero, 3);
        assert_eq!(stats.fill_ratio, 0.5);
    }

    #[test]
    fn statistics_of_nothing_are_zero() {
        let empty: &[f32] = &[];
        let stats = Diagnostics::statistics(empty);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.max, 0.0);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.fill_ratio, 0.0);
    }

    #[tokio::test]
    async fn geometry_check_passes_on_a_regular_stack() {
        let session = bright_session().await;
        let check = Diagnostics::verify_geometry(&session);
        assert!(check.passed());
        assert_eq!(check.corners, 8);
        assert!(check.max_error <= check.tolerance);
    }

    #[tokio::test]
    async fn smoke_test_passes_on_a_filled_volume() {
        let session = bright_session().await;
        let smoke = Diagnostics::smoke_test(&session);
        assert!(smoke.all_passed());
        for probe in &smoke.probes {
            assert!(probe.quality_score.unwrap() > 0.99);
        }
    }

    #[test]
    fn smoke_test_reports_failures_on_an_empty_volume() {
        let session = empty_session();
        let smoke = Diagnostics::smoke_test(&session);
        assert!(!smoke.all_passed());
        for probe in &smoke.probes {
            assert!(!probe.success);
            assert!(probe.processing_time.is_none());
        }
    }

    #[test]
    fn fallback_slice_is_a_marked_checkerboard() {
        let session = empty_session();
        let slice = Diagnostics::fallback_slice(&session, Orientation::Coronal, 0.5);

        assert!(slice.is_fallback);
        assert_eq!((slice.width, slice.height), (4, 4));
        assert_eq!(slice.pixels[0], 5000);
        assert_eq!(slice.pixels[1], 35000);
        assert_eq!(slice.pixels[4], 35000);
        assert_eq!(slice.pixels[5], 5000);
        assert_eq!(slice.min_value, 5000.0);
        assert_eq!(slice.max_value, 35000.0);
        assert_eq!(slice.window.width, 30000.0);
        assert_eq!(slice.window.center, 20000.0);
        // The synthetic pattern always renders.
        assert!(slice.to_image().is_some());
    }

    #[tokio::test]
    async fn report_aggregates_all_sections() {
        let session = bright_session().await;
        let report = Diagnostics::report(&session);

        assert_eq!(report.dimensions.depth, 4);
        assert_eq!(report.dropped_slices, 0);
        assert!(report.invertible);
        assert!(report.volume.fill_ratio > 0.99);
        assert!(report.transform.passed());
        assert!(report.smoke.all_passed());

        let text = report.to_string();
        assert!(text.contains("Volume Diagnostics"));
        assert!(text.contains("Dimensions:     4x4x4"));
        assert!(text.contains("axial"));
        assert!(text.contains("ok"));
    }
}
