use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::object::{FileDicomObject, InMemDicomObject, open_file};
use dicom::pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption};
use dicom_dictionary_std::tags;
use ndarray::{Array2, s};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("no DICOM files found")]
    NoDicomFiles,
    #[error("undecodable or unsupported pixel data")]
    PixelData,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// One resolved cross-sectional image: the raw pixel grid plus whatever
/// geometric and calibration metadata the acquisition recorded. Every
/// optional field really is optional in the wild; the builder degrades
/// instead of requiring them.
#[derive(Clone, Debug)]
pub struct SliceImage {
    /// Raw stored samples, `(rows, cols)`, before rescale calibration.
    pub pixels: Array2<f32>,
    /// Patient-space location of the first transmitted pixel.
    pub position: Option<[f32; 3]>,
    /// Direction cosines of the first row and first column.
    pub orientation: Option<[f32; 6]>,
    /// In-plane spacing as (x, y).
    pub pixel_spacing: Option<(f32, f32)>,
    /// Declared nominal thickness, the depth-spacing fallback when endpoint
    /// positions are missing.
    pub slice_thickness: Option<f32>,
    pub rescale_slope: f32,
    pub rescale_intercept: f32,
    /// Declared acquisition order.
    pub instance_number: Option<i32>,
}

impl Default for SliceImage {
    fn default() -> Self {
        SliceImage {
            pixels: Array2::zeros((0, 0)),
            position: None,
            orientation: None,
            pixel_spacing: None,
            slice_thickness: None,
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            instance_number: None,
        }
    }
}

impl SliceImage {
    /// Sort key for stacks without position metadata; slices that also lack
    /// an instance number order as 0.
    pub fn instance_order(&self) -> i32 {
        self.instance_number.unwrap_or(0)
    }
}

/// Resolves slice identifiers into images.
///
/// This is the loading collaborator boundary: the volume builder awaits
/// `resolve` once per identifier, strictly in sequence, and drops failed
/// slices instead of aborting the build.
#[allow(async_fn_in_trait)]
pub trait SliceSource {
    type Id;

    async fn resolve(&self, id: &Self::Id) -> Result<SliceImage, LoadError>;
}

/// [`SliceSource`] reading `.dcm` files from disk.
#[derive(Clone, Copy, Debug, Default)]
pub struct DicomFileSource;

impl SliceSource for DicomFileSource {
    type Id = PathBuf;

    async fn resolve(&self, id: &PathBuf) -> Result<SliceImage, LoadError> {
        let object = open_file(id)?;
        decode_slice(&object)
    }
}

fn decode_slice(object: &FileDicomObject<InMemDicomObject>) -> Result<SliceImage, LoadError> {
    let options = ConvertOptions::new().with_voi_lut(VoiLutOption::First);
    // First frame, first sample only.
    let pixels = object
        .decode_pixel_data()
        .ok()
        .and_then(|decoded| decoded.to_ndarray_with_options::<u16>(&options).ok())
        .ok_or(LoadError::PixelData)?
        .slice_move(s![0, .., .., 0])
        .mapv(f32::from);

    Ok(SliceImage {
        pixels,
        position: position_of(object),
        orientation: orientation_of(object),
        pixel_spacing: pixel_spacing_of(object),
        slice_thickness: float_tag(object, tags::SLICE_THICKNESS),
        rescale_slope: float_tag(object, tags::RESCALE_SLOPE).unwrap_or(1.0),
        rescale_intercept: float_tag(object, tags::RESCALE_INTERCEPT).unwrap_or(0.0),
        instance_number: int_tag(object, tags::INSTANCE_NUMBER),
    })
}

fn position_of(object: &FileDicomObject<InMemDicomObject>) -> Option<[f32; 3]> {
    let values = object
        .element(tags::IMAGE_POSITION_PATIENT)
        .ok()?
        .to_multi_float32()
        .ok()?;
    values.get(..3)?.try_into().ok()
}

fn orientation_of(object: &FileDicomObject<InMemDicomObject>) -> Option<[f32; 6]> {
    let values = object
        .element(tags::IMAGE_ORIENTATION_PATIENT)
        .ok()?
        .to_multi_float32()
        .ok()?;
    values.get(..6)?.try_into().ok()
}

fn pixel_spacing_of(object: &FileDicomObject<InMemDicomObject>) -> Option<(f32, f32)> {
    let values = object
        .element(tags::PIXEL_SPACING)
        .ok()?
        .to_multi_float32()
        .ok()?;
    Some((*values.first()?, *values.get(1)?))
}

fn float_tag(object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<f32> {
    object.element(tag).ok()?.to_float32().ok()
}

fn int_tag(object: &FileDicomObject<InMemDicomObject>, tag: Tag) -> Option<i32> {
    object.element(tag).ok()?.to_int::<i32>().ok()
}

/// Collects the `.dcm` files directly inside `path`, sorted by file name so
/// runs are deterministic even when position metadata is missing.
pub fn scan_directory(path: impl AsRef<Path>) -> Result<Vec<PathBuf>, LoadError> {
    let mut paths: Vec<PathBuf> = fs::read_dir(path.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| extension.eq_ignore_ascii_case("dcm"))
        })
        .collect();

    if paths.is_empty() {
        return Err(LoadError::NoDicomFiles);
    }

    paths.sort();
    Ok(paths)
}
