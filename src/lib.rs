//
// lib.rs
// Chaos-Tools-rs
//
// Exposes the conversion stages of the CHAOS dataset tools for the binaries and for library consumers.
//
// Thales Matheus Mendonça Santos - November 2025

// Modules follow the data flow: slices -> volume -> labels -> pipeline -> writer.
pub mod batch;
pub mod cli;
pub mod dicom_access;
pub mod error;
pub mod labels;
pub mod models;
pub mod pipeline;
pub mod slices;
pub mod volume;
pub mod writer;

pub use error::{ConvertError, Result};
pub use pipeline::{build_case, Case, CaseOptions, Modality, MrVariant};
