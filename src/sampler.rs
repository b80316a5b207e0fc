use crate::enums::Interpolation;
use crate::volume::Volume;

/// Margin subtracted from the axis length when clamping, so the +1 corner
/// reads of trilinear interpolation stay inside the grid.
const UPPER_MARGIN: f32 = 1.001;

fn clamp_axis(value: f32, len: usize) -> f32 {
    // min before max: a one-voxel axis clamps to 0, not to a negative bound.
    value.min(len as f32 - UPPER_MARGIN).max(0.0)
}

/// Reads scalar values at continuous voxel coordinates.
///
/// Sampling is total: every coordinate, including NaN and values far outside
/// the grid, clamps into range and produces a value. The blend order inside
/// each method is fixed so repeated extractions are reproducible
/// bit-for-bit, independent of thread count.
pub struct VolumeSampler<'a> {
    volume: &'a Volume,
    method: Interpolation,
}

impl<'a> VolumeSampler<'a> {
    pub fn new(volume: &'a Volume, method: Interpolation) -> Self {
        VolumeSampler { volume, method }
    }

    pub fn method(&self) -> Interpolation {
        self.method
    }

    /// Samples the volume at a continuous voxel coordinate with the
    /// configured method.
    pub fn sample(&self, x: f32, y: f32, z: f32) -> f32 {
        match self.method {
            Interpolation::Nearest => self.nearest(x, y, z),
            Interpolation::Trilinear => self.trilinear(x, y, z),
            Interpolation::Cubic => self.cubic(x, y, z),
        }
    }

    fn clamp(&self, x: f32, y: f32, z: f32) -> (f32, f32, f32) {
        let dims = self.volume.dims();
        (
            clamp_axis(x, dims.width),
            clamp_axis(y, dims.height),
            clamp_axis(z, dims.depth),
        )
    }

    fn nearest(&self, x: f32, y: f32, z: f32) -> f32 {
        let (x, y, z) = self.clamp(x, y, z);
        let dims = self.volume.dims();
        let xi = (x.round() as usize).min(dims.width - 1);
        let yi = (y.round() as usize).min(dims.height - 1);
        let zi = (z.round() as usize).min(dims.depth - 1);
        self.volume.voxel(xi, yi, zi)
    }

    fn trilinear(&self, x: f32, y: f32, z: f32) -> f32 {
        let (x, y, z) = self.clamp(x, y, z);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let z0 = z.floor() as usize;
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;
        let fz = z - z0 as f32;

        let v000 = self.corner(x0, y0, z0);
        let v100 = self.corner(x0 + 1, y0, z0);
        let v010 = self.corner(x0, y0 + 1, z0);
        let v110 = self.corner(x0 + 1, y0 + 1, z0);
        let v001 = self.corner(x0, y0, z0 + 1);
        let v101 = self.corner(x0 + 1, y0, z0 + 1);
        let v011 = self.corner(x0, y0 + 1, z0 + 1);
        let v111 = self.corner(x0 + 1, y0 + 1, z0 + 1);

        // Blend along x, then y, then z, with plain multiply-add in exactly
        // this order. Reordering or fusing changes the rounding and breaks
        // reproducibility of stored outputs.
        let v00 = v000 * (1.0 - fx) + v100 * fx;
        let v01 = v001 * (1.0 - fx) + v101 * fx;
        let v10 = v010 * (1.0 - fx) + v110 * fx;
        let v11 = v011 * (1.0 - fx) + v111 * fx;
        let v0 = v00 * (1.0 - fy) + v10 * fy;
        let v1 = v01 * (1.0 - fy) + v11 * fy;
        v0 * (1.0 - fz) + v1 * fz
    }

    // Corner reads clamp each index separately so the +1 neighbours of a
    // boundary cell stay in range.
    fn corner(&self, x: usize, y: usize, z: usize) -> f32 {
        let dims = self.volume.dims();
        self.volume.voxel(
            x.min(dims.width - 1),
            y.min(dims.height - 1),
            z.min(dims.depth - 1),
        )
    }

    /// Smoothing blend: 0.7 times the trilinear value at the point plus 0.3
    /// times the mean of six trilinear probes offset half a voxel along each
    /// axis. An approximation of cubic filtering kept for output
    /// compatibility; this is not a separable tricubic kernel.
    fn cubic(&self, x: f32, y: f32, z: f32) -> f32 {
        let center = self.trilinear(x, y, z);
        let neighbours = [
            self.trilinear(x - 0.5, y, z),
            self.trilinear(x + 0.5, y, z),
            self.trilinear(x, y - 0.5, z),
            self.trilinear(x, y + 0.5, z),
            self.trilinear(x, y, z - 0.5),
            self.trilinear(x, y, z + 0.5),
        ];
        let mean = neighbours.iter().sum::<f32>() / neighbours.len() as f32;
        center * 0.7 + mean * 0.3
    }
}
