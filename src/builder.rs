use std::sync::atomic::{AtomicBool, Ordering::SeqCst};

use log::{info, warn};
use ndarray::{Array3, s};
use thiserror::Error;

use crate::geometry::{self, VolumeGeometry};
use crate::loader::{SliceImage, SliceSource};
use crate::volume::{Volume, VolumeSession};

/// Minimum number of resolvable slices a series needs before a volume is
/// assembled.
pub const MIN_SLICES: usize = 3;

/// Errors surfaced by [`VolumeBuilder::build`]. A failed build leaves no
/// partial state behind; everything assembled so far is dropped before the
/// error propagates.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Another build is running on this builder. The call was rejected, not
    /// queued.
    #[error("a volume build is already in progress")]
    InProgress,

    /// Too few slices survived loading.
    #[error(
        "insufficient slices to build a volume: {loaded} of {requested} loaded, at least {MIN_SLICES} required"
    )]
    InsufficientSlices { loaded: usize, requested: usize },

    /// Resolved metadata produced a zero-sized dimension.
    #[error("cannot allocate a {width}x{height}x{depth} volume")]
    Allocation {
        width: usize,
        height: usize,
        depth: usize,
    },
}

/// Assembles [`VolumeSession`]s from series of slice identifiers.
///
/// Slices are resolved strictly one at a time; the per-slice await is the
/// only suspension point, which keeps peak memory bounded by the stack
/// under assembly rather than a batch of in-flight decodes. One build may
/// run per builder at a time, and concurrent calls are rejected with
/// [`BuildError::InProgress`] rather than queued.
pub struct VolumeBuilder<S> {
    source: S,
    building: AtomicBool,
}

impl<S: SliceSource> VolumeBuilder<S> {
    pub fn new(source: S) -> Self {
        VolumeBuilder {
            source,
            building: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// True while a build is running.
    pub fn in_progress(&self) -> bool {
        self.building.load(SeqCst)
    }

    /// Builds a session without progress reporting.
    pub async fn build(&self, ids: &[S::Id]) -> Result<VolumeSession, BuildError> {
        self.build_with_progress(ids, |_, _| {}).await
    }

    /// Builds a session. `progress` receives a phase label and a percentage
    /// in [0, 100], twice per slice: the load phase maps to 0..50% and the
    /// volume fill phase to 50..100%.
    pub async fn build_with_progress<F>(
        &self,
        ids: &[S::Id],
        mut progress: F,
    ) -> Result<VolumeSession, BuildError>
    where
        F: FnMut(&str, f32),
    {
        if self.building.swap(true, SeqCst) {
            warn!("volume build already in progress, rejecting call");
            return Err(BuildError::InProgress);
        }
        let _guard = BuildGuard {
            flag: &self.building,
        };

        let result = self.assemble(ids, &mut progress).await;
        match &result {
            Ok(session) => {
                let dims = session.volume().dims();
                info!(
                    "volume ready: {}x{}x{}, {} of {} slices dropped",
                    dims.width,
                    dims.height,
                    dims.depth,
                    session.dropped_slices(),
                    ids.len()
                );
            }
            Err(error) => warn!("volume build failed: {error}"),
        }
        result
    }

    async fn assemble<F>(
        &self,
        ids: &[S::Id],
        progress: &mut F,
    ) -> Result<VolumeSession, BuildError>
    where
        F: FnMut(&str, f32),
    {
        let requested = ids.len();
        let mut slices: Vec<SliceImage> = Vec::new();
        let mut dropped = 0usize;

        for (index, id) in ids.iter().enumerate() {
            match self.source.resolve(id).await {
                Ok(slice) => match slices.first() {
                    Some(first) if slice.pixels.dim() != first.pixels.dim() => {
                        warn!(
                            "slice {} has grid {:?}, expected {:?}, dropping",
                            index + 1,
                            slice.pixels.dim(),
                            first.pixels.dim()
                        );
                        dropped += 1;
                    }
                    _ => slices.push(slice),
                },
                Err(error) => {
                    warn!("failed to load slice {}: {error}, dropping", index + 1);
                    dropped += 1;
                }
            }
            progress(
                &format!("Loading slice {}/{}", index + 1, requested),
                (index + 1) as f32 / requested as f32 * 50.0,
            );
        }

        if slices.len() < MIN_SLICES {
            return Err(BuildError::InsufficientSlices {
                loaded: slices.len(),
                requested,
            });
        }

        sort_by_depth(&mut slices);

        let geometry =
            VolumeGeometry::from_slices(&slices[0], &slices[slices.len() - 1], slices.len());
        let dims = geometry.dimensions;
        if dims.is_degenerate() {
            return Err(BuildError::Allocation {
                width: dims.width,
                height: dims.height,
                depth: dims.depth,
            });
        }

        let mut data = Array3::<f32>::zeros((dims.depth, dims.height, dims.width));
        let loaded = slices.len();

        // Consume the stack plane by plane so each slice buffer is released
        // right after it is written into the volume.
        for (z, slice) in slices.into_iter().enumerate() {
            let SliceImage {
                pixels,
                rescale_slope,
                rescale_intercept,
                ..
            } = slice;
            let calibrated = pixels.mapv(|raw| raw.mul_add(rescale_slope, rescale_intercept));
            data.slice_mut(s![z, .., ..]).assign(&calibrated);
            progress(
                "Building volume",
                50.0 + (z + 1) as f32 / loaded as f32 * 50.0,
            );
        }

        let volume = Volume::new(data, geometry.spacing, geometry.origin);
        Ok(VolumeSession::new(volume, geometry, dropped))
    }
}

struct BuildGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, SeqCst);
    }
}

// Ascending projected depth along the stack normal when every slice has a
// position; declared instance order for the whole stack as soon as one
// lacks it. One key per sort keeps the comparison a total order; mixing
// keys per pair does not. The sort is stable, so ties keep their request
// order.
fn sort_by_depth(slices: &mut [SliceImage]) {
    let orientation = slices
        .first()
        .and_then(|slice| slice.orientation)
        .unwrap_or(geometry::DEFAULT_ORIENTATION);
    let normal = geometry::slice_normal(orientation);

    let missing = slices
        .iter()
        .filter(|slice| slice.position.is_none())
        .count();
    if missing > 0 {
        warn!(
            "{missing} of {} slices lack position metadata, ordering the stack by instance number",
            slices.len()
        );
        slices.sort_by_key(SliceImage::instance_order);
        return;
    }

    slices.sort_by(|a, b| {
        depth_of(a, normal)
            .partial_cmp(&depth_of(b, normal))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn depth_of(slice: &SliceImage, normal: [f32; 3]) -> Option<f32> {
    slice
        .position
        .map(|position| geometry::dot(position, normal))
}
