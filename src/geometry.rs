use log::warn;

use crate::loader::SliceImage;

/// Determinant magnitude below which a transform is treated as singular.
const DET_EPSILON: f32 = 1e-10;

/// Direction cosines of a plain axial acquisition, used when a series
/// carries no orientation metadata.
pub(crate) const DEFAULT_ORIENTATION: [f32; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// Volume extents in voxels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
}

impl Dimensions {
    pub fn voxel_count(&self) -> usize {
        self.width * self.height * self.depth
    }

    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }
}

/// Row-major 4x4 affine transform between voxel indices and patient space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix4(pub [f32; 16]);

impl Matrix4 {
    pub const IDENTITY: Matrix4 = Matrix4([
        1.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    ]);

    /// Applies the affine to a 3D point. The implicit fourth component is 1.
    pub fn transform_point(&self, p: [f32; 3]) -> [f32; 3] {
        let m = &self.0;
        [
            m[0] * p[0] + m[1] * p[1] + m[2] * p[2] + m[3],
            m[4] * p[0] + m[5] * p[1] + m[6] * p[2] + m[7],
            m[8] * p[0] + m[9] * p[1] + m[10] * p[2] + m[11],
        ]
    }

    /// Closed-form cofactor inverse. Returns `None` when the determinant
    /// magnitude falls below 1e-10. Expanded by hand rather than routed
    /// through a linear algebra crate so the arithmetic stays auditable
    /// term by term.
    pub fn inverse(&self) -> Option<Matrix4> {
        let m = &self.0;
        let mut inv = [0.0f32; 16];

        inv[0] = m[5] * m[10] * m[15] - m[5] * m[11] * m[14] - m[9] * m[6] * m[15]
            + m[9] * m[7] * m[14] + m[13] * m[6] * m[11] - m[13] * m[7] * m[10];
        inv[4] = -m[4] * m[10] * m[15] + m[4] * m[11] * m[14] + m[8] * m[6] * m[15]
            - m[8] * m[7] * m[14] - m[12] * m[6] * m[11] + m[12] * m[7] * m[10];
        inv[8] = m[4] * m[9] * m[15] - m[4] * m[11] * m[13] - m[8] * m[5] * m[15]
            + m[8] * m[7] * m[13] + m[12] * m[5] * m[11] - m[12] * m[7] * m[9];
        inv[12] = -m[4] * m[9] * m[14] + m[4] * m[10] * m[13] + m[8] * m[5] * m[14]
            - m[8] * m[6] * m[13] - m[12] * m[5] * m[10] + m[12] * m[6] * m[9];
        inv[1] = -m[1] * m[10] * m[15] + m[1] * m[11] * m[14] + m[9] * m[2] * m[15]
            - m[9] * m[3] * m[14] - m[13] * m[2] * m[11] + m[13] * m[3] * m[10];
        inv[5] = m[0] * m[10] * m[15] - m[0] * m[11] * m[14] - m[8] * m[2] * m[15]
            + m[8] * m[3] * m[14] + m[12] * m[2] * m[11] - m[12] * m[3] * m[10];
        inv[9] = -m[0] * m[9] * m[15] + m[0] * m[11] * m[13] + m[8] * m[1] * m[15]
            - m[8] * m[3] * m[13] - m[12] * m[1] * m[11] + m[12] * m[3] * m[9];
        inv[13] = m[0] * m[9] * m[14] - m[0] * m[10] * m[13] - m[8] * m[1] * m[14]
            + m[8] * m[2] * m[13] + m[12] * m[1] * m[10] - m[12] * m[2] * m[9];
        inv[2] = m[1] * m[6] * m[15] - m[1] * m[7] * m[14] - m[5] * m[2] * m[15]
            + m[5] * m[3] * m[14] + m[13] * m[2] * m[7] - m[13] * m[3] * m[6];
        inv[6] = -m[0] * m[6] * m[15] + m[0] * m[7] * m[14] + m[4] * m[2] * m[15]
            - m[4] * m[3] * m[14] - m[12] * m[2] * m[7] + m[12] * m[3] * m[6];
        inv[10] = m[0] * m[5] * m[15] - m[0] * m[7] * m[13] - m[4] * m[1] * m[15]
            + m[4] * m[3] * m[13] + m[12] * m[1] * m[7] - m[12] * m[3] * m[5];
        inv[14] = -m[0] * m[5] * m[14] + m[0] * m[6] * m[13] + m[4] * m[1] * m[14]
            - m[4] * m[2] * m[13] - m[12] * m[1] * m[6] + m[12] * m[2] * m[5];
        inv[3] = -m[1] * m[6] * m[11] + m[1] * m[7] * m[10] + m[5] * m[2] * m[11]
            - m[5] * m[3] * m[10] - m[9] * m[2] * m[7] + m[9] * m[3] * m[6];
        inv[7] = m[0] * m[6] * m[11] - m[0] * m[7] * m[10] - m[4] * m[2] * m[11]
            + m[4] * m[3] * m[10] + m[8] * m[2] * m[7] - m[8] * m[3] * m[6];
        inv[11] = -m[0] * m[5] * m[11] + m[0] * m[7] * m[9] + m[4] * m[1] * m[11]
            - m[4] * m[3] * m[9] - m[8] * m[1] * m[7] + m[8] * m[3] * m[5];
        inv[15] = m[0] * m[5] * m[10] - m[0] * m[6] * m[9] - m[4] * m[1] * m[10]
            + m[4] * m[2] * m[9] + m[8] * m[1] * m[6] - m[8] * m[2] * m[5];

        let det = m[0] * inv[0] + m[1] * inv[4] + m[2] * inv[8] + m[3] * inv[12];
        if det.abs() < DET_EPSILON {
            return None;
        }

        let det_inv = 1.0 / det;
        for value in &mut inv {
            *value *= det_inv;
        }
        Some(Matrix4(inv))
    }
}

pub(crate) fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

/// Unit slice normal from the six direction cosines (row vector first, then
/// column vector). Degenerate orientations fall back to +z.
pub(crate) fn slice_normal(orientation: [f32; 6]) -> [f32; 3] {
    let row = [orientation[0], orientation[1], orientation[2]];
    let col = [orientation[3], orientation[4], orientation[5]];
    let normal = cross(row, col);
    let length = dot(normal, normal).sqrt();
    if length > 0.0 {
        [normal[0] / length, normal[1] / length, normal[2] / length]
    } else {
        [0.0, 0.0, 1.0]
    }
}

/// Spatial metadata resolved from a depth-sorted slice stack: everything
/// needed to place voxels in patient space and back.
#[derive(Clone, Debug)]
pub struct VolumeGeometry {
    pub dimensions: Dimensions,
    /// Physical units per voxel along (x, y, z).
    pub spacing: (f32, f32, f32),
    /// Patient-space location of voxel (0, 0, 0).
    pub origin: (f32, f32, f32),
    /// Unit vector along image rows.
    pub row_dir: [f32; 3],
    /// Unit vector along image columns.
    pub col_dir: [f32; 3],
    /// Slice normal.
    pub normal: [f32; 3],
    /// Voxel-to-patient affine.
    pub forward: Matrix4,
    /// Patient-to-voxel affine; identity when `forward` is singular.
    pub inverse: Matrix4,
    /// False when the forward transform could not be inverted.
    pub invertible: bool,
}

impl VolumeGeometry {
    /// Resolves geometry from the first and last slice of a depth-sorted
    /// stack of `count` slices. Missing metadata degrades to defaults
    /// (unit spacing, zero origin, axial orientation) instead of failing;
    /// a singular transform is flagged and its inverse replaced by the
    /// identity.
    pub fn from_slices(first: &SliceImage, last: &SliceImage, count: usize) -> VolumeGeometry {
        let (rows, cols) = first.pixels.dim();
        let dimensions = Dimensions {
            width: cols,
            height: rows,
            depth: count,
        };

        let (sx, sy) = first.pixel_spacing.unwrap_or((1.0, 1.0));
        let orientation = first.orientation.unwrap_or(DEFAULT_ORIENTATION);
        let row_dir = [orientation[0], orientation[1], orientation[2]];
        let col_dir = [orientation[3], orientation[4], orientation[5]];
        let normal = slice_normal(orientation);

        // Depth spacing: measured span over the stack when both endpoint
        // positions exist, declared slice thickness otherwise.
        let sz = match (first.position, last.position) {
            (Some(a), Some(b)) if count > 1 => {
                let span = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
                dot(span, span).sqrt() / (count - 1) as f32
            }
            _ => first.slice_thickness.unwrap_or(1.0),
        };

        let origin = match first.position {
            Some(p) => (p[0], p[1], p[2]),
            None => (0.0, 0.0, 0.0),
        };

        let forward = Matrix4([
            row_dir[0] * sx, col_dir[0] * sy, normal[0] * sz, origin.0, //
            row_dir[1] * sx, col_dir[1] * sy, normal[1] * sz, origin.1, //
            row_dir[2] * sx, col_dir[2] * sy, normal[2] * sz, origin.2, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let (inverse, invertible) = match forward.inverse() {
            Some(inverse) => (inverse, true),
            None => {
                warn!("voxel-to-patient transform is singular, substituting identity inverse");
                (Matrix4::IDENTITY, false)
            }
        };

        VolumeGeometry {
            dimensions,
            spacing: (sx, sy, sz),
            origin,
            row_dir,
            col_dir,
            normal,
            forward,
            inverse,
            invertible,
        }
    }

    /// Maps a voxel index to patient coordinates.
    pub fn voxel_to_patient(&self, p: [f32; 3]) -> [f32; 3] {
        self.forward.transform_point(p)
    }

    /// Maps patient coordinates to a voxel index. When the forward
    /// transform was singular this is the identity.
    pub fn patient_to_voxel(&self, p: [f32; 3]) -> [f32; 3] {
        self.inverse.transform_point(p)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn slice_at(position: Option<[f32; 3]>) -> SliceImage {
        SliceImage {
            pixels: Array2::zeros((32, 64)),
            position,
            pixel_spacing: Some((0.5, 0.5)),
            slice_thickness: Some(2.5),
            ..SliceImage::default()
        }
    }

    #[test]
    fn identity_inverts_to_identity() {
        let inverse = Matrix4::IDENTITY.inverse();
        assert_eq!(inverse, Some(Matrix4::IDENTITY));
    }

    #[test]
    fn scale_translation_inverse_is_exact() {
        let m = Matrix4([
            2.0, 0.0, 0.0, 5.0, //
            0.0, 4.0, 0.0, -6.0, //
            0.0, 0.0, 0.5, 7.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let inverse = m.inverse().unwrap();
        let expected = [
            0.5, 0.0, 0.0, -2.5, //
            0.0, 0.25, 0.0, 1.5, //
            0.0, 0.0, 2.0, -14.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        for (got, want) in inverse.0.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn singular_matrix_has_no_inverse() {
        let mut flat = [0.0; 16];
        flat[15] = 1.0;
        assert_eq!(Matrix4(flat).inverse(), None);
    }

    #[test]
    fn transform_point_applies_rotation_and_translation() {
        // 90 degree rotation about z plus a shift.
        let m = Matrix4([
            0.0, -1.0, 0.0, 10.0, //
            1.0, 0.0, 0.0, 20.0, //
            0.0, 0.0, 1.0, 30.0, //
            0.0, 0.0, 0.0, 1.0,
        ]);
        let p = m.transform_point([1.0, 2.0, 3.0]);
        assert_eq!(p, [8.0, 21.0, 33.0]);
    }

    #[test]
    fn depth_spacing_prefers_measured_span() {
        let first = slice_at(Some([0.0, 0.0, 0.0]));
        let last = slice_at(Some([0.0, 0.0, 18.0]));
        let geometry = VolumeGeometry::from_slices(&first, &last, 10);
        assert_eq!(geometry.spacing, (0.5, 0.5, 2.0));
        assert_eq!(
            geometry.dimensions,
            Dimensions {
                width: 64,
                height: 32,
                depth: 10
            }
        );
        assert!(geometry.invertible);
    }

    #[test]
    fn depth_spacing_falls_back_to_thickness() {
        let first = slice_at(None);
        let last = slice_at(None);
        let geometry = VolumeGeometry::from_slices(&first, &last, 10);
        assert_eq!(geometry.spacing.2, 2.5);
        assert_eq!(geometry.origin, (0.0, 0.0, 0.0));
    }

    #[test]
    fn round_trip_stays_within_tolerance() {
        let first = slice_at(Some([-12.5, 4.0, -30.0]));
        let last = slice_at(Some([-12.5, 4.0, -12.0]));
        let geometry = VolumeGeometry::from_slices(&first, &last, 10);
        for corner in [[0.0, 0.0, 0.0], [63.0, 31.0, 9.0], [12.0, 7.0, 3.0]] {
            let round_trip = geometry.patient_to_voxel(geometry.voxel_to_patient(corner));
            for (a, b) in corner.iter().zip(round_trip) {
                assert!((a - b).abs() < 0.1);
            }
        }
    }

    #[test]
    fn zero_spacing_flags_singular_transform() {
        let mut first = slice_at(Some([0.0, 0.0, 0.0]));
        first.pixel_spacing = Some((0.0, 0.5));
        let last = slice_at(Some([0.0, 0.0, 18.0]));
        let geometry = VolumeGeometry::from_slices(&first, &last, 10);
        assert!(!geometry.invertible);
        assert_eq!(geometry.inverse, Matrix4::IDENTITY);
    }

    #[test]
    fn degenerate_orientation_normal_defaults_to_z() {
        assert_eq!(slice_normal([0.0; 6]), [0.0, 0.0, 1.0]);
        assert_eq!(slice_normal(DEFAULT_ORIENTATION), [0.0, 0.0, 1.0]);
    }
}
