//
// labels.rs
// Chaos-Tools-rs
//
// Canonical class labels and the grey-value encodings used by the CHAOS ground truth masks.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;

use crate::error::{ConvertError, Result};
use crate::volume::{PixelType, Volume, VoxelData};

/// Fixed output label space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ClassLabel {
    Background = 0,
    Liver = 1,
    RightKidney = 2,
    LeftKidney = 3,
    Spleen = 4,
}

impl ClassLabel {
    pub const ALL: [ClassLabel; 5] = [
        ClassLabel::Background,
        ClassLabel::Liver,
        ClassLabel::RightKidney,
        ClassLabel::LeftKidney,
        ClassLabel::Spleen,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Background => "background",
            ClassLabel::Liver => "liver",
            ClassLabel::RightKidney => "right_kidney",
            ClassLabel::LeftKidney => "left_kidney",
            ClassLabel::Spleen => "spleen",
        }
    }
}

/// How raw mask grey values encode classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelScheme {
    /// Contiguous ranges, exclusive low and inclusive high.
    Bucketed,
    /// Exact grey values 80/160/240/255.
    ExactTable,
    /// Any non-zero value is liver.
    LiverOnly,
}

const BUCKETS: [(u8, u8, ClassLabel); 4] = [
    (55, 70, ClassLabel::Liver),
    (110, 135, ClassLabel::RightKidney),
    (175, 200, ClassLabel::LeftKidney),
    (240, 255, ClassLabel::Spleen),
];

const EXACT: [(u8, ClassLabel); 5] = [
    (0, ClassLabel::Background),
    (80, ClassLabel::Liver),
    (160, ClassLabel::RightKidney),
    (240, ClassLabel::LeftKidney),
    (255, ClassLabel::Spleen),
];

impl LabelScheme {
    pub fn classify(self, raw: u8) -> ClassLabel {
        match self {
            LabelScheme::Bucketed => BUCKETS
                .iter()
                .find(|(low, high, _)| *low < raw && raw <= *high)
                .map(|(_, _, label)| *label)
                .unwrap_or(ClassLabel::Background),
            LabelScheme::ExactTable => EXACT
                .iter()
                .find(|(value, _)| *value == raw)
                .map(|(_, label)| *label)
                .unwrap_or(ClassLabel::Background),
            LabelScheme::LiverOnly => {
                if raw == 0 {
                    ClassLabel::Background
                } else {
                    ClassLabel::Liver
                }
            }
        }
    }

    pub fn class_index(self, raw: u8) -> u8 {
        self.classify(raw).index()
    }

    /// Total map over every 8-bit raw value.
    pub fn lookup_table(self) -> [u8; 256] {
        let mut table = [0u8; 256];
        for (raw, slot) in table.iter_mut().enumerate() {
            *slot = self.class_index(raw as u8);
        }
        table
    }
}

/// Canonicalise a raw mask stack into a label volume carrying `reference`'s geometry.
///
/// `raw_mask` must already be ordered so that depth `d` matches depth `d` of
/// `reference`. The input is left untouched.
pub fn remap(raw_mask: &Volume, scheme: LabelScheme, reference: &Volume) -> Result<Volume> {
    let raw = raw_mask
        .data()
        .as_u8()
        .ok_or(ConvertError::PixelTypeMismatch {
            index: 0,
            expected: PixelType::U8,
            found: raw_mask.pixel_type(),
        })?;

    let (depth, height, width) = reference.dim();
    let (mask_depth, mask_height, mask_width) = raw.dim();
    if (mask_height, mask_width) != (height, width) {
        return Err(ConvertError::ShapeMismatch {
            index: 0,
            expected: (height, width),
            found: (mask_height, mask_width),
        });
    }
    if mask_depth != depth {
        return Err(ConvertError::DepthMismatch {
            expected: depth,
            found: mask_depth,
        });
    }

    let table = scheme.lookup_table();
    let labels = raw.mapv(|v| table[v as usize]);

    Ok(Volume::new(
        VoxelData::U8(labels),
        reference.geometry().clone(),
    ))
}

/// Voxel count per canonical class, skipping classes that never occur.
pub fn class_counts(labels: &Volume) -> BTreeMap<&'static str, u64> {
    let mut counts = [0u64; 5];
    if let Some(data) = labels.data().as_u8() {
        for &v in data.iter() {
            if let Some(slot) = counts.get_mut(v as usize) {
                *slot += 1;
            }
        }
    }

    ClassLabel::ALL
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(label, count)| (label.name(), count))
        .collect()
}
