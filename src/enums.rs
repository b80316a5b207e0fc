use std::fmt;

use crate::geometry::Dimensions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Axial,
    Sagittal,
    Coronal,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Axial,
        Orientation::Sagittal,
        Orientation::Coronal,
    ];

    /// Length of the volume axis this orientation slices along.
    pub fn axis_len(&self, dims: Dimensions) -> usize {
        match self {
            Orientation::Axial => dims.depth,
            Orientation::Sagittal => dims.width,
            Orientation::Coronal => dims.height,
        }
    }

    pub fn plane_dims(&self, dims: Dimensions) -> (usize, usize) {
        // Always return (width, height) - standard image convention
        match self {
            Orientation::Axial => (dims.width, dims.height),
            Orientation::Sagittal => (dims.depth, dims.height),
            Orientation::Coronal => (dims.width, dims.depth),
        }
    }

    /// Physical spacing of the output plane as (column spacing, row spacing).
    pub fn plane_spacing(&self, spacing: (f32, f32, f32)) -> (f32, f32) {
        match self {
            Orientation::Axial => (spacing.0, spacing.1),
            Orientation::Sagittal => (spacing.2, spacing.1),
            Orientation::Coronal => (spacing.0, spacing.2),
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Axial => "axial",
            Orientation::Sagittal => "sagittal",
            Orientation::Coronal => "coronal",
        };
        f.pad(name)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
    Cubic,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityMode {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for QualityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QualityMode::Low => "low",
            QualityMode::Medium => "medium",
            QualityMode::High => "high",
        };
        f.pad(name)
    }
}
