//
// slices.rs
// Chaos-Tools-rs
//
// Discovers DICOM and PNG slices on disk, reads their ordering keys and groups them into
// acquisition-consistent, spatially ordered stacks.
//
// Thales Matheus Mendonça Santos - November 2025

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dicom::object::{open_file, OpenFileOptions};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use dicom_pixeldata::{ConvertOptions, ModalityLutOption, PixelRepresentation, VoiLutOption};
use ndarray::{s, Array2};
use tracing::debug;
use walkdir::WalkDir;

use crate::dicom_access::{element_array, ElementAccess};
use crate::error::{ConvertError, Result};
use crate::volume::{assemble, Geometry, Plane, PixelType, Volume};

/// Which header value orders slices along the depth axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Slice Location (0020,1041).
    SliceLocation,
    /// Image Position (Patient) projected onto the slice normal.
    ImagePosition,
}

/// Direction in which mask PNGs are stacked relative to their filename keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOrder {
    AsListed,
    /// CHAOS CT masks run opposite to the CT series depth axis.
    Reversed,
}

/// File naming conventions of the dataset's DICOM folders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DicomNaming {
    /// Every `*.dcm` directly inside the folder (CT series).
    SeriesFiles,
    /// `IMG*.dcm` anywhere below the folder (MR sequences with nested phase folders).
    ImgPrefixed,
}

/// Header-level view of one DICOM slice; pixel data is only read on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceHeader {
    pub path: PathBuf,
    pub series_uid: Option<String>,
    pub slice_thickness: Option<f64>,
    pub echo_time: Option<f64>,
    pub slice_location: Option<f64>,
    pub image_position: Option<[f64; 3]>,
    pub image_orientation: Option<[f64; 6]>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
}

impl SliceHeader {
    /// Parse the header of `path`, stopping before Pixel Data.
    pub fn read(path: &Path) -> Result<Self> {
        let obj = OpenFileOptions::new()
            .read_until(tags::PIXEL_DATA)
            .open_file(path)
            .map_err(|source| ConvertError::Dicom {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            series_uid: obj.element_str(tags::SERIES_INSTANCE_UID),
            slice_thickness: obj.element_f64(tags::SLICE_THICKNESS),
            echo_time: obj.element_f64(tags::ECHO_TIME),
            slice_location: obj.element_f64(tags::SLICE_LOCATION),
            image_position: element_array(&obj, tags::IMAGE_POSITION_PATIENT),
            image_orientation: element_array(&obj, tags::IMAGE_ORIENTATION_PATIENT),
            pixel_spacing: element_array(&obj, tags::PIXEL_SPACING),
            rows: obj.element_u32(tags::ROWS),
            columns: obj.element_u32(tags::COLUMNS),
        })
    }

    /// Row direction, column direction and their cross product.
    pub fn axes(&self) -> Option<[[f64; 3]; 3]> {
        let o = self.image_orientation?;
        let row = [o[0], o[1], o[2]];
        let col = [o[3], o[4], o[5]];
        let normal = [
            row[1] * col[2] - row[2] * col[1],
            row[2] * col[0] - row[0] * col[2],
            row[0] * col[1] - row[1] * col[0],
        ];
        Some([row, col, normal])
    }

    /// Geometry a volume inherits when this slice is its first plane.
    pub fn geometry(&self) -> Geometry {
        // PixelSpacing is (row spacing, column spacing); volume spacing is column-first.
        let [row_spacing, col_spacing] = self.pixel_spacing.unwrap_or([1.0, 1.0]);
        Geometry {
            spacing: [
                col_spacing,
                row_spacing,
                self.slice_thickness.unwrap_or(1.0),
            ],
            origin: self.image_position.unwrap_or([0.0; 3]),
            direction: self.axes(),
        }
    }

    /// Image Position (Patient) projected onto the slice normal.
    fn normal_position(&self) -> Option<f64> {
        let p = self.image_position?;
        let [_, _, n] = self.axes()?;
        Some(p[0] * n[0] + p[1] * n[1] + p[2] * n[2])
    }

    pub fn spatial_key(&self, key: SortKey) -> Result<f64> {
        let value = match key {
            SortKey::SliceLocation => self.slice_location,
            SortKey::ImagePosition => self
                .normal_position()
                .or_else(|| self.image_position.map(|p| p[2])),
        };
        value.ok_or_else(|| ConvertError::MissingTag {
            tag: match key {
                SortKey::SliceLocation => "SliceLocation",
                SortKey::ImagePosition => "ImagePositionPatient",
            },
            path: self.path.clone(),
        })
    }

    /// Decode the first frame of this slice with stored values left untouched.
    pub fn read_plane(&self) -> Result<Plane> {
        let path = self.path.as_path();
        let obj = open_file(path).map_err(|source| ConvertError::Dicom {
            path: path.to_path_buf(),
            source,
        })?;
        let decoded = obj
            .decode_pixel_data()
            .map_err(|source| ConvertError::PixelDecode {
                path: path.to_path_buf(),
                source,
            })?;

        if decoded.samples_per_pixel() != 1 {
            return Err(ConvertError::UnsupportedPixelFormat {
                path: path.to_path_buf(),
                detail: format!("{} samples per pixel", decoded.samples_per_pixel()),
            });
        }

        let signed = decoded.pixel_representation() == PixelRepresentation::Signed;
        let pixel_type = PixelType::from_encoding(decoded.bits_allocated(), signed).ok_or_else(
            || ConvertError::UnsupportedPixelFormat {
                path: path.to_path_buf(),
                detail: format!("{} bits allocated", decoded.bits_allocated()),
            },
        )?;

        let options = ConvertOptions::new()
            .with_modality_lut(ModalityLutOption::None)
            .with_voi_lut(VoiLutOption::Identity);

        macro_rules! frame {
            ($ty:ty, $variant:ident) => {
                Plane::$variant(
                    decoded
                        .to_ndarray_with_options::<$ty>(&options)
                        .map_err(|source| ConvertError::PixelDecode {
                            path: path.to_path_buf(),
                            source,
                        })?
                        .slice_move(s![0, .., .., 0]),
                )
            };
        }

        let plane = match pixel_type {
            PixelType::U8 => frame!(u8, U8),
            PixelType::I8 => frame!(i8, I8),
            PixelType::U16 => frame!(u16, U16),
            PixelType::I16 => frame!(i16, I16),
            PixelType::U32 => frame!(u32, U32),
            PixelType::I32 => frame!(i32, I32),
        };
        Ok(plane)
    }
}

/// Slices sharing one acquisition parameter, ordered along depth.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceGroup {
    /// `None` for single-series CT stacks.
    pub echo_time: Option<f64>,
    pub slices: Vec<SliceHeader>,
}

impl SequenceGroup {
    /// Geometry of the first slice, with the depth axis pointing from the first slice to the last.
    pub fn geometry(&self) -> Option<Geometry> {
        let first = self.slices.first()?;
        let mut geometry = first.geometry();
        let last = self.slices.last()?;
        if let (Some(direction), Some(start), Some(end)) = (
            geometry.direction.as_mut(),
            first.normal_position(),
            last.normal_position(),
        ) {
            if end < start {
                direction[2] = direction[2].map(|v| -v);
            }
        }
        Some(geometry)
    }

    /// Decode every slice and stack them in group order.
    pub fn load_volume(&self) -> Result<Volume> {
        let geometry = self.geometry().ok_or(ConvertError::EmptyStack)?;
        check_shapes(&self.slices)?;
        let planes = self
            .slices
            .iter()
            .map(SliceHeader::read_plane)
            .collect::<Result<Vec<_>>>()?;
        assemble(&planes, geometry)
    }
}

/// List the DICOM files under `dir` following `naming`, sorted by path.
pub fn find_dicom_files(dir: &Path, naming: DicomNaming) -> Result<Vec<PathBuf>> {
    let walker = match naming {
        DicomNaming::SeriesFiles => WalkDir::new(dir).max_depth(1),
        DicomNaming::ImgPrefixed => WalkDir::new(dir),
    };

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_dcm = entry
            .path()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("dcm"));
        let matches = match naming {
            DicomNaming::SeriesFiles => is_dcm,
            DicomNaming::ImgPrefixed => {
                is_dcm && entry.file_name().to_string_lossy().starts_with("IMG")
            }
        };
        if matches {
            files.push(entry.into_path());
        }
    }

    if files.is_empty() {
        return Err(ConvertError::NoSlices(dir.to_path_buf()));
    }
    files.sort();
    Ok(files)
}

pub fn read_headers(paths: &[PathBuf]) -> Result<Vec<SliceHeader>> {
    paths.iter().map(|p| SliceHeader::read(p)).collect()
}

/// Fail unless every slice reports the same slice thickness.
pub fn check_thickness(headers: &[SliceHeader]) -> Result<()> {
    let mut thicknesses: Vec<Option<f64>> = Vec::new();
    for header in headers {
        if !thicknesses.contains(&header.slice_thickness) {
            thicknesses.push(header.slice_thickness);
        }
    }
    if thicknesses.len() > 1 {
        return Err(ConvertError::InconsistentAcquisition { thicknesses });
    }
    Ok(())
}

/// Fail before any pixel decoding when the Rows/Columns headers disagree.
pub fn check_shapes(headers: &[SliceHeader]) -> Result<()> {
    let shape = |h: &SliceHeader| match (h.rows, h.columns) {
        (Some(rows), Some(columns)) => Some((rows as usize, columns as usize)),
        _ => None,
    };
    let Some(expected) = headers.first().and_then(shape) else {
        return Ok(());
    };
    for (index, header) in headers.iter().enumerate().skip(1) {
        match shape(header) {
            Some(found) if found != expected => {
                return Err(ConvertError::ShapeMismatch {
                    index,
                    expected,
                    found,
                })
            }
            _ => {}
        }
    }
    Ok(())
}

/// Order slices ascending by `key`, ties broken by path.
pub fn sort_slices(headers: Vec<SliceHeader>, key: SortKey) -> Result<Vec<SliceHeader>> {
    let mut keyed = headers
        .into_iter()
        .map(|h| Ok((h.spatial_key(key)?, h)))
        .collect::<Result<Vec<_>>>()?;
    keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
    Ok(keyed.into_iter().map(|(_, h)| h).collect())
}

/// Load the one series a CT `DICOM_anon` folder must contain.
pub fn load_single_series(dir: &Path) -> Result<SequenceGroup> {
    let headers = read_headers(&find_dicom_files(dir, DicomNaming::SeriesFiles)?)?;

    let mut series: BTreeMap<String, Vec<SliceHeader>> = BTreeMap::new();
    for header in headers {
        series
            .entry(header.series_uid.clone().unwrap_or_default())
            .or_default()
            .push(header);
    }
    if series.len() != 1 {
        return Err(ConvertError::AmbiguousSeries {
            dir: dir.to_path_buf(),
            count: series.len(),
        });
    }
    let headers = series.into_values().next().unwrap_or_default();

    check_thickness(&headers)?;
    let slices = sort_slices(headers, SortKey::ImagePosition)?;
    debug!("{:?}: single series with {} slice(s)", dir, slices.len());

    Ok(SequenceGroup {
        echo_time: None,
        slices,
    })
}

/// Load an MR sequence folder as one group per echo time, shortest echo time first.
pub fn load_echo_groups(dir: &Path) -> Result<Vec<SequenceGroup>> {
    let headers = read_headers(&find_dicom_files(dir, DicomNaming::ImgPrefixed)?)?;
    check_thickness(&headers)?;

    let mut by_echo: Vec<(f64, Vec<SliceHeader>)> = Vec::new();
    for header in headers {
        let echo_time = header.echo_time.ok_or_else(|| ConvertError::MissingTag {
            tag: "EchoTime",
            path: header.path.clone(),
        })?;
        match by_echo.iter_mut().find(|(te, _)| *te == echo_time) {
            Some((_, members)) => members.push(header),
            None => by_echo.push((echo_time, vec![header])),
        }
    }
    by_echo.sort_by(|a, b| a.0.total_cmp(&b.0));

    by_echo
        .into_iter()
        .map(|(echo_time, members)| {
            let slices = sort_slices(members, SortKey::SliceLocation)?;
            debug!(
                "{:?}: echo time {} with {} slice(s)",
                dir,
                echo_time,
                slices.len()
            );
            Ok(SequenceGroup {
                echo_time: Some(echo_time),
                slices,
            })
        })
        .collect()
}

/// Ordering key of a mask PNG: the last run of digits in its file stem.
pub fn mask_key(path: &Path) -> Result<u64> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    if digits.is_empty() {
        return Err(ConvertError::MaskKey {
            path: path.to_path_buf(),
            detail: "no slice number in file name".to_string(),
        });
    }
    digits.parse().map_err(|_| ConvertError::MaskKey {
        path: path.to_path_buf(),
        detail: format!("slice number {} out of range", digits),
    })
}

/// List `*.png` masks in `dir` sorted by their numeric key.
pub fn find_masks(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut keyed = Vec::new();
    for entry in WalkDir::new(dir).max_depth(1) {
        let entry = entry?;
        let is_png = entry
            .path()
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("png"));
        if entry.file_type().is_file() && is_png {
            let path = entry.into_path();
            keyed.push((mask_key(&path)?, path));
        }
    }
    keyed.sort();

    if let Some(pair) = keyed.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(ConvertError::MaskKey {
            path: pair[1].1.clone(),
            detail: format!("slice number {} also used by {:?}", pair[1].0, pair[0].1),
        });
    }
    Ok(keyed.into_iter().map(|(_, p)| p).collect())
}

pub fn read_mask_plane(path: &Path) -> Result<Plane> {
    let image = image::open(path)
        .map_err(|source| ConvertError::Png {
            path: path.to_path_buf(),
            source,
        })?
        .into_luma8();
    let (width, height) = image.dimensions();
    let array = Array2::from_shape_vec((height as usize, width as usize), image.into_raw())
        .map_err(|e| ConvertError::UnsupportedPixelFormat {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    Ok(Plane::U8(array))
}

/// Stack the raw mask PNGs of `dir`. The result carries no meaningful geometry.
pub fn load_mask_stack(dir: &Path, order: MaskOrder) -> Result<Volume> {
    let mut paths = find_masks(dir)?;
    if paths.is_empty() {
        return Err(ConvertError::NoSlices(dir.to_path_buf()));
    }
    if order == MaskOrder::Reversed {
        paths.reverse();
    }
    debug!("{:?}: {} mask slice(s), {:?}", dir, paths.len(), order);

    let planes = paths
        .iter()
        .map(|p| read_mask_plane(p))
        .collect::<Result<Vec<_>>>()?;
    assemble(&planes, Geometry::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, thickness: f64, location: f64) -> SliceHeader {
        SliceHeader {
            path: PathBuf::from(name),
            series_uid: Some("1.2.3".to_string()),
            slice_thickness: Some(thickness),
            echo_time: None,
            slice_location: Some(location),
            image_position: None,
            image_orientation: None,
            pixel_spacing: None,
            rows: Some(2),
            columns: Some(3),
        }
    }

    fn positioned(name: &str, location: f64, z: f64) -> SliceHeader {
        let mut h = header(name, 5.0, location);
        h.image_position = Some([0.0, 0.0, z]);
        h.image_orientation = Some([1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        h
    }

    #[test]
    fn mask_key_uses_trailing_number() {
        assert_eq!(mask_key(Path::new("Ground/liver_GT_007.png")).unwrap(), 7);
        assert_eq!(mask_key(Path::new("IMG-0004-00031.png")).unwrap(), 31);
        assert_eq!(mask_key(Path::new("slice_12_final.png")).unwrap(), 12);
        assert!(mask_key(Path::new("notes.png")).is_err());
    }

    #[test]
    fn thickness_mismatch_is_inconsistent() {
        let headers = vec![
            header("a", 5.0, 0.0),
            header("b", 5.0, 1.0),
            header("c", 7.0, 2.0),
        ];
        match check_thickness(&headers) {
            Err(ConvertError::InconsistentAcquisition { thicknesses }) => {
                assert_eq!(thicknesses, vec![Some(5.0), Some(7.0)]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(check_thickness(&headers[..2]).is_ok());
    }

    #[test]
    fn slices_sort_by_location_ascending() {
        let headers = vec![
            header("c", 5.0, 30.0),
            header("a", 5.0, -10.0),
            header("b", 5.0, 12.5),
        ];
        let sorted = sort_slices(headers, SortKey::SliceLocation).unwrap();
        let names: Vec<_> = sorted.iter().map(|h| h.path.to_str().unwrap()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn image_position_projects_onto_normal() {
        let mut h = header("a", 5.0, 0.0);
        h.image_position = Some([10.0, 20.0, 30.0]);
        h.image_orientation = Some([1.0, 0.0, 0.0, 0.0, 0.0, -1.0]);
        // normal of (x, -z) is +y
        assert_eq!(h.spatial_key(SortKey::ImagePosition).unwrap(), 20.0);

        h.image_orientation = None;
        assert_eq!(h.spatial_key(SortKey::ImagePosition).unwrap(), 30.0);
    }

    #[test]
    fn missing_sort_key_is_reported() {
        let mut h = header("a", 5.0, 0.0);
        h.slice_location = None;
        assert!(matches!(
            h.spatial_key(SortKey::SliceLocation),
            Err(ConvertError::MissingTag { tag: "SliceLocation", .. })
        ));
    }

    #[test]
    fn geometry_swaps_pixel_spacing_order() {
        let mut h = header("a", 4.5, 0.0);
        h.pixel_spacing = Some([0.6, 0.8]);
        h.image_position = Some([-100.0, -50.0, 12.0]);
        let geometry = h.geometry();
        assert_eq!(geometry.spacing, [0.8, 0.6, 4.5]);
        assert_eq!(geometry.origin, [-100.0, -50.0, 12.0]);
        assert_eq!(geometry.direction, None);
    }

    #[test]
    fn header_shapes_are_checked_before_decoding() {
        let mut headers = vec![
            header("a", 5.0, 0.0),
            header("b", 5.0, 1.0),
            header("c", 5.0, 2.0),
        ];
        assert!(check_shapes(&headers).is_ok());

        headers[2].columns = Some(4);
        assert!(matches!(
            check_shapes(&headers),
            Err(ConvertError::ShapeMismatch {
                index: 2,
                expected: (2, 3),
                found: (2, 4),
            })
        ));
    }

    #[test]
    fn depth_axis_follows_slice_order() {
        // SliceLocation rises while the positions descend along the normal.
        let group = SequenceGroup {
            echo_time: Some(2.3),
            slices: vec![
                positioned("a", 0.0, 16.0),
                positioned("b", 8.0, 8.0),
                positioned("c", 16.0, 0.0),
            ],
        };
        let geometry = group.geometry().unwrap();
        assert_eq!(geometry.origin, [0.0, 0.0, 16.0]);
        assert_eq!(geometry.direction.unwrap()[2], [0.0, 0.0, -1.0]);
        assert_eq!(geometry.direction.unwrap()[0], [1.0, 0.0, 0.0]);

        let ascending = SequenceGroup {
            echo_time: None,
            slices: vec![positioned("a", 0.0, 0.0), positioned("b", 8.0, 8.0)],
        };
        assert_eq!(ascending.geometry().unwrap().direction.unwrap()[2], [0.0, 0.0, 1.0]);
    }
}
