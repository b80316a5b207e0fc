use std::time::Duration;

use crate::enums::{Interpolation, QualityMode};

/// Operational parameters bound to a quality tier.
///
/// `threads` decides whether reformatted planes are resampled serially or
/// split across the rayon pool. `cache_slices` and `processing_delay` are
/// sizing and pacing hints for an embedding viewer; the engine itself does
/// not cache or sleep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QualityProfile {
    pub interpolation: Interpolation,
    pub threads: usize,
    pub cache_slices: usize,
    pub processing_delay: Duration,
}

impl QualityMode {
    /// Fixed tier table. Switching tiers only affects extractions made
    /// afterwards.
    pub fn profile(&self) -> QualityProfile {
        match self {
            QualityMode::Low => QualityProfile {
                interpolation: Interpolation::Nearest,
                threads: 1,
                cache_slices: 50,
                processing_delay: Duration::ZERO,
            },
            QualityMode::Medium => QualityProfile {
                interpolation: Interpolation::Trilinear,
                threads: 2,
                cache_slices: 100,
                processing_delay: Duration::from_millis(50),
            },
            QualityMode::High => QualityProfile {
                interpolation: Interpolation::Cubic,
                threads: 4,
                cache_slices: 200,
                processing_delay: Duration::from_millis(100),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(QualityMode::Low, Interpolation::Nearest, 1, 50, 0)]
    #[case(QualityMode::Medium, Interpolation::Trilinear, 2, 100, 50)]
    #[case(QualityMode::High, Interpolation::Cubic, 4, 200, 100)]
    fn tier_table_is_fixed(
        #[case] mode: QualityMode,
        #[case] interpolation: Interpolation,
        #[case] threads: usize,
        #[case] cache_slices: usize,
        #[case] delay_ms: u64,
    ) {
        let profile = mode.profile();
        assert_eq!(profile.interpolation, interpolation);
        assert_eq!(profile.threads, threads);
        assert_eq!(profile.cache_slices, cache_slices);
        assert_eq!(profile.processing_delay, Duration::from_millis(delay_ms));
    }

    #[test]
    fn default_mode_is_medium() {
        assert_eq!(QualityMode::default(), QualityMode::Medium);
    }
}
