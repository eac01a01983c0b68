//
// pipeline.rs
// Chaos-Tools-rs
//
// Builds every volume of one patient: slice loading, assembly and label remapping for the CT and
// MR layouts of the CHAOS dataset.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::labels::{remap, LabelScheme};
use crate::models::VolumeKind;
use crate::slices::{load_echo_groups, load_mask_stack, load_single_series, MaskOrder};
use crate::volume::Volume;

const DICOM_DIR: &str = "DICOM_anon";
const MASK_DIR: &str = "Ground";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Ct,
    Mr,
}

impl FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CT" => Ok(Modality::Ct),
            "MR" => Ok(Modality::Mr),
            _ => Err("Choose MR or CT as modality.".to_string()),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Modality::Ct => write!(f, "CT"),
            Modality::Mr => write!(f, "MR"),
        }
    }
}

/// Mask encoding used for MR ground truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrVariant {
    /// Grey-value buckets, shared with the CT/MR converter.
    Combined,
    /// Exact 80/160/240/255 table of the MR-only converter.
    MriOnly,
}

impl MrVariant {
    pub fn scheme(self) -> LabelScheme {
        match self {
            MrVariant::Combined => LabelScheme::Bucketed,
            MrVariant::MriOnly => LabelScheme::ExactTable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaseOptions {
    pub ct_mask_order: MaskOrder,
    pub mr_variant: MrVariant,
}

impl Default for CaseOptions {
    fn default() -> Self {
        Self {
            ct_mask_order: MaskOrder::Reversed,
            mr_variant: MrVariant::Combined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MrSequence {
    T1Dual,
    T2Spir,
}

impl MrSequence {
    const ALL: [MrSequence; 2] = [MrSequence::T1Dual, MrSequence::T2Spir];

    fn dir_name(self) -> &'static str {
        match self {
            MrSequence::T1Dual => "T1DUAL",
            MrSequence::T2Spir => "T2SPIR",
        }
    }

    /// Output names per echo-time group, shortest echo time first.
    fn image_names(self) -> &'static [&'static str] {
        match self {
            // Shorter echo time is the out-of-phase acquisition.
            MrSequence::T1Dual => &["T1DUAL_out_phase_image", "T1DUAL_in_phase_image"],
            MrSequence::T2Spir => &["T2SPIR_image"],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedVolume {
    pub name: String,
    pub kind: VolumeKind,
    pub volume: Volume,
}

/// All volumes of one patient, in the order they are written.
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    patient: String,
    modality: Modality,
    volumes: Vec<NamedVolume>,
}

impl Case {
    pub fn patient(&self) -> &str {
        &self.patient
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }

    pub fn volumes(&self) -> &[NamedVolume] {
        &self.volumes
    }

    pub fn get(&self, name: &str) -> Option<&Volume> {
        self.volumes
            .iter()
            .find(|v| v.name == name)
            .map(|v| &v.volume)
    }
}

pub fn build_case(
    modality: Modality,
    patient_dir: &Path,
    patient: &str,
    options: &CaseOptions,
) -> Result<Case> {
    match modality {
        Modality::Ct => build_ct_case(patient_dir, patient, options),
        Modality::Mr => build_mr_case(patient_dir, patient, options),
    }
}

/// One CT series plus its liver mask.
pub fn build_ct_case(patient_dir: &Path, patient: &str, options: &CaseOptions) -> Result<Case> {
    let series = load_single_series(&patient_dir.join(DICOM_DIR))?;
    let image = series.load_volume()?;

    let raw_mask = load_mask_stack(&patient_dir.join(MASK_DIR), options.ct_mask_order)?;
    let mask = remap(&raw_mask, LabelScheme::LiverOnly, &image)?;
    debug!("Patient {}: CT volume {:?}", patient, image.dim());

    Ok(Case {
        patient: patient.to_string(),
        modality: Modality::Ct,
        volumes: vec![
            NamedVolume {
                name: "CT_image".to_string(),
                kind: VolumeKind::Image,
                volume: image,
            },
            NamedVolume {
                name: "liver_mask".to_string(),
                kind: VolumeKind::Mask,
                volume: mask,
            },
        ],
    })
}

/// T1DUAL (in/out of phase) and T2SPIR volumes with one mask per sequence.
pub fn build_mr_case(patient_dir: &Path, patient: &str, options: &CaseOptions) -> Result<Case> {
    let scheme = options.mr_variant.scheme();
    let mut images = Vec::new();
    let mut masks = Vec::new();

    for sequence in MrSequence::ALL {
        let sequence_dir = patient_dir.join(sequence.dir_name());
        let groups = load_echo_groups(&sequence_dir.join(DICOM_DIR))?;

        let names = sequence.image_names();
        if groups.len() != names.len() {
            return Err(ConvertError::UnexpectedEchoTimeCount {
                sequence: sequence.dir_name().to_string(),
                expected: names.len(),
                found: groups.len(),
            });
        }

        let volumes = groups
            .iter()
            .map(|g| g.load_volume())
            .collect::<Result<Vec<_>>>()?;

        // The mask follows the first (shortest echo time) volume of its sequence.
        let raw_mask = load_mask_stack(&sequence_dir.join(MASK_DIR), MaskOrder::AsListed)?;
        let mask = remap(&raw_mask, scheme, &volumes[0])?;
        debug!(
            "Patient {}: {} with {} echo group(s)",
            patient,
            sequence.dir_name(),
            volumes.len()
        );

        images.extend(names.iter().zip(volumes).map(|(name, volume)| NamedVolume {
            name: name.to_string(),
            kind: VolumeKind::Image,
            volume,
        }));
        masks.push(NamedVolume {
            name: format!("{}_mask", sequence.dir_name()),
            kind: VolumeKind::Mask,
            volume: mask,
        });
    }

    images.extend(masks);
    Ok(Case {
        patient: patient.to_string(),
        modality: Modality::Mr,
        volumes: images,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_parsing_is_exact() {
        assert_eq!("CT".parse::<Modality>(), Ok(Modality::Ct));
        assert_eq!("MR".parse::<Modality>(), Ok(Modality::Mr));
        assert_eq!(
            "ct".parse::<Modality>(),
            Err("Choose MR or CT as modality.".to_string())
        );
    }

    #[test]
    fn mr_variants_pick_their_scheme() {
        assert_eq!(MrVariant::Combined.scheme(), LabelScheme::Bucketed);
        assert_eq!(MrVariant::MriOnly.scheme(), LabelScheme::ExactTable);
    }

    #[test]
    fn ct_masks_are_reversed_by_default() {
        assert_eq!(CaseOptions::default().ct_mask_order, MaskOrder::Reversed);
    }
}
