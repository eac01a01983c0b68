use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::pipeline::{build_case, CaseOptions, Modality};
use crate::writer::{write_case, VolumeWriter};

/// Outcome of a run over a dataset root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    /// Patient id and the error that stopped it.
    pub failed: Vec<(String, String)>,
}

/// Patient folders are the direct subdirectories with all-digit names, in numeric order.
pub fn find_patients(root: &Path) -> Result<Vec<String>> {
    let mut patients = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("Failed to list {:?}", root))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
                patients.push(name.to_string());
            }
        }
    }

    patients.sort_by(|a, b| numeric_key(a).cmp(&numeric_key(b)).then_with(|| a.cmp(b)));
    Ok(patients)
}

/// Orders all-digit names by value without parsing, so long ids cannot overflow.
fn numeric_key(name: &str) -> (usize, &str) {
    let digits = name.trim_start_matches('0');
    (digits.len(), digits)
}

/// Convert one patient: build every volume first, then write.
///
/// Nothing is written for a patient whose case fails to build.
pub fn process_patient(
    root: &Path,
    write_to: &Path,
    patient: &str,
    modality: Modality,
    options: &CaseOptions,
    writer: &dyn VolumeWriter,
) -> crate::error::Result<PathBuf> {
    let case = build_case(modality, &root.join(patient), patient, options)?;
    write_case(&case, write_to, writer)
}

pub fn process_root(
    root: &Path,
    write_to: &Path,
    modality: Modality,
    options: &CaseOptions,
    writer: &dyn VolumeWriter,
    jobs: usize,
) -> Result<BatchReport> {
    let patients = find_patients(root)?;
    info!(
        "Processing {:?} | Modality: {} | {} patient(s)",
        root,
        modality,
        patients.len()
    );

    let run = |patient: &String| {
        let res = process_patient(root, write_to, patient, modality, options, writer);
        let outcome = match res {
            Ok(folder) => {
                info!("Patient {} done: {:?}", patient, folder);
                Ok(())
            }
            Err(e) => {
                error!("Patient {} failed: {}", patient, e);
                Err(e.to_string())
            }
        };
        (patient.clone(), outcome)
    };

    let results: Vec<_> = if jobs > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build()
            .context("Failed to start worker pool")?;
        pool.install(|| patients.par_iter().map(run).collect())
    } else {
        patients.iter().map(run).collect()
    };

    let mut report = BatchReport::default();
    for (patient, res) in results {
        match res {
            Ok(_) => report.succeeded.push(patient),
            Err(e) => report.failed.push((patient, e)),
        }
    }

    if report.failed.is_empty() {
        info!("Converted {} patient(s)", report.succeeded.len());
    } else {
        warn!(
            "Converted {} patient(s), {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
    }
    Ok(report)
}
