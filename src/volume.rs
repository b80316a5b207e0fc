use ndarray::Array3;

use crate::enums::{Orientation, QualityMode};
use crate::extractor;
use crate::geometry::{Dimensions, VolumeGeometry};
use crate::quality::QualityProfile;
use crate::sampler::VolumeSampler;
use crate::slice::SliceDescriptor;

/// Dense calibrated scalar grid reconstructed from one slice series.
///
/// Data lives in `(depth, height, width)` axis order, so every axial plane
/// is one contiguous run of `width * height` values.
#[derive(Clone, Debug)]
pub struct Volume {
    data: Array3<f32>,
    spacing: (f32, f32, f32),
    origin: (f32, f32, f32),
}

impl Volume {
    pub(crate) fn new(data: Array3<f32>, spacing: (f32, f32, f32), origin: (f32, f32, f32)) -> Self {
        Volume {
            data,
            spacing,
            origin,
        }
    }

    /// Reference to the underlying data.
    pub fn data(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn dims(&self) -> Dimensions {
        let (depth, height, width) = self.data.dim();
        Dimensions {
            width,
            height,
            depth,
        }
    }

    /// Physical units per voxel along (x, y, z).
    pub fn spacing(&self) -> (f32, f32, f32) {
        self.spacing
    }

    pub fn origin(&self) -> (f32, f32, f32) {
        self.origin
    }

    /// Value at a voxel index. Callers keep indices in range.
    #[inline]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        self.data[[z, y, x]]
    }

    /// Contiguous view of the axial plane at depth `z`.
    pub fn axial_plane(&self, z: usize) -> Option<&[f32]> {
        let (depth, height, width) = self.data.dim();
        if z >= depth {
            return None;
        }
        let plane = height * width;
        self.data.as_slice()?.get(z * plane..(z + 1) * plane)
    }
}

/// Reconstruction state for one loaded series: the built volume, its
/// resolved geometry and the active quality tier.
///
/// A session is produced by a successful build and owns everything it
/// needs; dropping it releases the volume. Extraction takes `&self`, so
/// slices of an unchanged session are reproducible and may run from
/// multiple threads at once.
#[derive(Debug)]
pub struct VolumeSession {
    volume: Volume,
    geometry: VolumeGeometry,
    quality: QualityMode,
    dropped_slices: usize,
}

impl VolumeSession {
    pub(crate) fn new(volume: Volume, geometry: VolumeGeometry, dropped_slices: usize) -> Self {
        VolumeSession {
            volume,
            geometry,
            quality: QualityMode::default(),
            dropped_slices,
        }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    /// Slices requested but not incorporated: load failures plus grid
    /// mismatches.
    pub fn dropped_slices(&self) -> usize {
        self.dropped_slices
    }

    pub fn quality(&self) -> QualityMode {
        self.quality
    }

    /// Switches the active quality tier. Only extractions made afterwards
    /// observe the new profile.
    pub fn set_quality(&mut self, quality: QualityMode) {
        self.quality = quality;
    }

    pub fn profile(&self) -> QualityProfile {
        self.quality.profile()
    }

    /// Sampler bound to the active tier's interpolation method.
    pub fn sampler(&self) -> VolumeSampler<'_> {
        VolumeSampler::new(&self.volume, self.profile().interpolation)
    }

    /// Samples the volume at a continuous voxel coordinate with the active
    /// interpolation method.
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        self.sampler().sample(x, y, z)
    }

    /// Number of discrete positions along the slicing axis of
    /// `orientation`.
    pub fn slice_count(&self, orientation: Orientation) -> usize {
        orientation.axis_len(self.volume.dims())
    }

    /// Extracts a renderable 2D view at a normalized position in [0, 1]
    /// along the slicing axis. Returns `None` when the reconstructed plane
    /// holds too little content to display; callers can substitute
    /// [`Diagnostics::fallback_slice`](crate::diagnostics::Diagnostics::fallback_slice).
    pub fn extract_slice(&self, orientation: Orientation, position: f32) -> Option<SliceDescriptor> {
        extractor::extract_slice(&self.volume, &self.profile(), orientation, position)
    }
}
