//! # DICOM-mpr library
//!
//! This crate provides multi-planar reconstruction for DICOM series: it
//! assembles a stack of parallel cross-sectional images into a single 3D
//! scalar volume and extracts axial, coronal and sagittal views from it.
//!
//! This library is part of the dicom-rs ecosystem and leverages its
//! components to decode pixel data and spatial metadata. Slices are loaded
//! strictly one at a time through an awaitable [`SliceSource`], sorted by
//! their projected position along the stack normal (instance order when
//! positions are missing) and written plane by plane into the volume.
//! Unreadable slices are dropped and counted rather than failing the
//! build; at least three usable slices are required.
//!
//! A successful build yields a [`VolumeSession`] that owns the volume, its
//! voxel-to-patient geometry and the active [`QualityMode`]:
//!  - Axial views are copied directly out of volume storage
//!  - Coronal and sagittal views are resampled through nearest, trilinear
//!    or smoothed-trilinear interpolation, serially or across the rayon
//!    pool depending on the tier
//!  - Extracted views arrive as [`SliceDescriptor`]s: quantized 16-bit
//!    pixels plus the rescale, window and spacing needed to display them
//!
//! Reconstructions that produce almost no content are rejected instead of
//! rendered; [`Diagnostics`] supplies a recognizable fallback pattern along
//! with geometry verification and an extraction smoke test.
//!
//! # Examples
//!
//! ## Reconstructing the three standard views from a directory
//!
//! Read all DICOM files from the dicom/ directory, build a volume, then
//! save the sagittal view at the center of the volume.
//!
//! ```no_run
//! # use dicom_mpr::{Diagnostics, DicomFileSource, Orientation, VolumeBuilder, scan_directory};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let paths = scan_directory("dicom")?;
//! let builder = VolumeBuilder::new(DicomFileSource);
//! let session = builder.build(&paths).await?;
//!
//! let slice = session
//!     .extract_slice(Orientation::Sagittal, 0.5)
//!     .unwrap_or_else(|| Diagnostics::fallback_slice(&session, Orientation::Sagittal, 0.5));
//! if let Some(image) = slice.to_image() {
//!     image.save("sagittal.png")?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod diagnostics;
pub mod enums;
mod extractor;
pub mod geometry;
pub mod loader;
pub mod quality;
pub mod sampler;
pub mod slice;
pub mod volume;

pub use builder::{BuildError, MIN_SLICES, VolumeBuilder};
pub use diagnostics::{
    BufferStatistics, Diagnostics, DiagnosticsReport, SliceProbe, SmokeTest, TransformCheck,
};
pub use enums::{Interpolation, Orientation, QualityMode};
pub use geometry::{Dimensions, Matrix4, VolumeGeometry};
pub use loader::{DicomFileSource, LoadError, SliceImage, SliceSource, scan_directory};
pub use quality::QualityProfile;
pub use sampler::VolumeSampler;
pub use slice::{DEFAULT_WINDOW_LEVEL, Renderable, Rescale, SliceDescriptor, WindowLevel};
pub use volume::{Volume, VolumeSession};
