//
// writer.rs
// Chaos-Tools-rs
//
// Persists assembled volumes as gzip-compressed NRRD files and records a manifest per patient.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::labels::class_counts;
use crate::models::{CaseManifest, VolumeKind, VolumeRecord};
use crate::pipeline::Case;
use crate::volume::Volume;

/// Encodes one volume with its geometry into a file.
pub trait VolumeWriter: Send + Sync {
    /// File extension without the leading dot.
    fn extension(&self) -> &'static str;

    fn write(&self, path: &Path, volume: &Volume) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
pub struct NrrdWriter {
    compression: Compression,
}

impl Default for NrrdWriter {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl NrrdWriter {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    pub fn header(volume: &Volume) -> String {
        let (depth, height, width) = volume.dim();
        let geometry = volume.geometry();
        let axes = geometry.direction_or_identity();

        let directions: Vec<String> = axes
            .iter()
            .zip(geometry.spacing)
            .map(|(axis, spacing)| {
                format!(
                    "({},{},{})",
                    axis[0] * spacing,
                    axis[1] * spacing,
                    axis[2] * spacing
                )
            })
            .collect();
        let [ox, oy, oz] = geometry.origin;

        format!(
            "NRRD0004\n\
             # Complete NRRD file format specification at:\n\
             # http://teem.sourceforge.net/nrrd/format.html\n\
             type: {}\n\
             dimension: 3\n\
             space: left-posterior-superior\n\
             sizes: {} {} {}\n\
             space directions: {}\n\
             kinds: domain domain domain\n\
             endian: little\n\
             encoding: gzip\n\
             space origin: ({},{},{})\n\n",
            volume.pixel_type().nrrd_name(),
            width,
            height,
            depth,
            directions.join(" "),
            ox,
            oy,
            oz
        )
    }

    pub fn encode(&self, volume: &Volume) -> Result<Vec<u8>> {
        let mut bytes = Self::header(volume).into_bytes();

        // Gzip header carries mtime 0, so identical volumes give identical files.
        let mut encoder = GzEncoder::new(Vec::new(), self.compression);
        encoder.write_all(&volume.data().to_le_bytes())?;
        bytes.extend(encoder.finish()?);
        Ok(bytes)
    }
}

impl VolumeWriter for NrrdWriter {
    fn extension(&self) -> &'static str {
        "nrrd"
    }

    fn write(&self, path: &Path, volume: &Volume) -> Result<()> {
        fs::write(path, self.encode(volume)?)?;
        Ok(())
    }
}

pub fn patient_dir_name(patient: &str) -> String {
    format!("Patient_{}", patient)
}

/// Write every volume of `case` plus `manifest.json` under `out_root/Patient_<id>`.
///
/// Files go to a `Patient_<id>.partial` folder that replaces the final folder only once every
/// write succeeded; a failed write leaves no patient folder behind.
pub fn write_case(case: &Case, out_root: &Path, writer: &dyn VolumeWriter) -> Result<PathBuf> {
    let name = patient_dir_name(case.patient());
    let folder = out_root.join(&name);
    let staging = out_root.join(format!("{}.partial", name));

    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(e) = write_files(case, &staging, writer) {
        if let Err(cleanup) = fs::remove_dir_all(&staging) {
            warn!("Could not remove {:?}: {}", staging, cleanup);
        }
        return Err(e);
    }

    if folder.exists() {
        fs::remove_dir_all(&folder)?;
    }
    fs::rename(&staging, &folder)?;
    info!("Saved {} volume(s) to {:?}", case.volumes().len(), folder);
    Ok(folder)
}

fn write_files(case: &Case, folder: &Path, writer: &dyn VolumeWriter) -> Result<()> {
    let mut records = Vec::with_capacity(case.volumes().len());
    for named in case.volumes() {
        let file = format!("{}.{}", named.name, writer.extension());
        writer.write(&folder.join(&file), &named.volume)?;
        debug!("Wrote {}", file);
        records.push(record(&file, named.kind, &named.volume));
    }

    let manifest = CaseManifest {
        patient: case.patient().to_string(),
        modality: case.modality().to_string(),
        volumes: records,
    };
    fs::write(
        folder.join("manifest.json"),
        serde_json::to_string_pretty(&manifest)?,
    )?;
    Ok(())
}

fn record(file: &str, kind: VolumeKind, volume: &Volume) -> VolumeRecord {
    let (depth, height, width) = volume.dim();
    let geometry = volume.geometry();
    let class_counts = match kind {
        VolumeKind::Mask => class_counts(volume)
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect(),
        VolumeKind::Image => Default::default(),
    };

    VolumeRecord {
        file: file.to_string(),
        kind,
        pixel_type: volume.pixel_type(),
        shape: [depth, height, width],
        spacing: geometry.spacing,
        origin: geometry.origin,
        direction: geometry.direction,
        sha256: hex::encode(Sha256::digest(volume.data().to_le_bytes())),
        class_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::{Geometry, VoxelData};
    use flate2::read::GzDecoder;
    use ndarray::Array3;
    use std::io::Read;

    fn sample() -> Volume {
        let data = Array3::from_shape_vec((2, 1, 3), vec![1i16, -1, 2, 300, 4, 5]).unwrap();
        Volume::new(
            VoxelData::I16(data),
            Geometry {
                spacing: [0.5, 0.5, 2.0],
                origin: [-10.0, 4.5, 7.0],
                direction: None,
            },
        )
    }

    #[test]
    fn header_lists_sizes_width_first() {
        let header = NrrdWriter::header(&sample());
        assert!(header.starts_with("NRRD0004\n"));
        assert!(header.contains("type: int16\n"));
        assert!(header.contains("sizes: 3 1 2\n"));
        assert!(header.contains("space directions: (0.5,0,0) (0,0.5,0) (0,0,2)\n"));
        assert!(header.contains("space origin: (-10,4.5,7)\n"));
        assert!(header.ends_with("\n\n"));
    }

    #[test]
    fn payload_is_gzip_of_voxels() {
        let volume = sample();
        let bytes = NrrdWriter::default().encode(&volume).unwrap();
        let header_len = NrrdWriter::header(&volume).len();

        let mut decoded = Vec::new();
        GzDecoder::new(&bytes[header_len..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, volume.data().to_le_bytes());
    }

    #[test]
    fn encoding_is_deterministic() {
        let writer = NrrdWriter::default();
        assert_eq!(writer.encode(&sample()).unwrap(), writer.encode(&sample()).unwrap());
    }
}
