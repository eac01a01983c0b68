//
// error.rs
// Chaos-Tools-rs
//
// Error kinds raised while turning one patient's slices into volumes. Every variant is fatal for the
// patient being processed; the batch layer decides whether to continue.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use thiserror::Error;

use crate::volume::PixelType;

pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Expected exactly one DICOM series in {dir:?}, found {count}")]
    AmbiguousSeries { dir: PathBuf, count: usize },

    #[error("No DICOM slices found in {0:?}")]
    NoSlices(PathBuf),

    #[error("Multiple slice thicknesses in one acquisition: {thicknesses:?}")]
    InconsistentAcquisition { thicknesses: Vec<Option<f64>> },

    #[error("Slice {index} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Slice {index} has pixel type {found:?}, expected {expected:?}")]
    PixelTypeMismatch {
        index: usize,
        expected: PixelType,
        found: PixelType,
    },

    #[error("Mask stack has {found} slice(s) but the intensity volume has {expected}")]
    DepthMismatch { expected: usize, found: usize },

    #[error("Cannot assemble a volume from zero slices")]
    EmptyStack,

    #[error("Sequence {sequence} produced {found} echo time group(s), expected {expected}")]
    UnexpectedEchoTimeCount {
        sequence: String,
        expected: usize,
        found: usize,
    },

    #[error("Missing or unreadable {tag} in {path:?}")]
    MissingTag { tag: &'static str, path: PathBuf },

    #[error("Unsupported pixel format in {path:?}: {detail}")]
    UnsupportedPixelFormat { path: PathBuf, detail: String },

    #[error("Mask file {path:?}: {detail}")]
    MaskKey { path: PathBuf, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to walk directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("DICOM read error in {path:?}: {source}")]
    Dicom {
        path: PathBuf,
        #[source]
        source: dicom::object::ReadError,
    },

    #[error("Pixel decode error in {path:?}: {source}")]
    PixelDecode {
        path: PathBuf,
        #[source]
        source: dicom_pixeldata::Error,
    },

    #[error("PNG decode error in {path:?}: {source}")]
    Png {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Failed to serialize manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}
