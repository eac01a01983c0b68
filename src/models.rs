//
// models.rs
// Chaos-Tools-rs
//
// Serializable summaries written next to each converted patient.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::volume::PixelType;

/// Whether a written volume holds intensities or canonical labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    Image,
    Mask,
}

/// One file written for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub file: String,
    pub kind: VolumeKind,
    pub pixel_type: PixelType,
    /// `[depth, height, width]`
    pub shape: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    pub direction: Option<[[f64; 3]; 3]>,
    /// SHA-256 of the little-endian voxel bytes.
    pub sha256: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub class_counts: BTreeMap<String, u64>,
}

/// Contents of `manifest.json` in a patient output folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseManifest {
    pub patient: String,
    pub modality: String,
    pub volumes: Vec<VolumeRecord>,
}
