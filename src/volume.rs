//
// volume.rs
// Chaos-Tools-rs
//
// Stacks ordered 2D planes into one 3D array and attaches the reference slice's geometry.
//
// Thales Matheus Mendonça Santos - November 2025

use ndarray::{s, Array2, Array3, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};

/// Voxel encodings a slice can carry (BitsAllocated x PixelRepresentation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
}

impl PixelType {
    pub fn from_encoding(bits_allocated: u16, signed: bool) -> Option<Self> {
        match (bits_allocated, signed) {
            (8, false) => Some(PixelType::U8),
            (8, true) => Some(PixelType::I8),
            (16, false) => Some(PixelType::U16),
            (16, true) => Some(PixelType::I16),
            (32, false) => Some(PixelType::U32),
            (32, true) => Some(PixelType::I32),
            _ => None,
        }
    }

    /// Type name as spelled in NRRD headers.
    pub fn nrrd_name(self) -> &'static str {
        match self {
            PixelType::U8 => "uint8",
            PixelType::I8 => "int8",
            PixelType::U16 => "uint16",
            PixelType::I16 => "int16",
            PixelType::U32 => "uint32",
            PixelType::I32 => "int32",
        }
    }
}

/// One decoded 2D raster, indexed `(row, column)`.
#[derive(Debug, Clone, PartialEq)]
pub enum Plane {
    U8(Array2<u8>),
    I8(Array2<i8>),
    U16(Array2<u16>),
    I16(Array2<i16>),
    U32(Array2<u32>),
    I32(Array2<i32>),
}

impl Plane {
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Plane::U8(a) => a.dim(),
            Plane::I8(a) => a.dim(),
            Plane::U16(a) => a.dim(),
            Plane::I16(a) => a.dim(),
            Plane::U32(a) => a.dim(),
            Plane::I32(a) => a.dim(),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            Plane::U8(_) => PixelType::U8,
            Plane::I8(_) => PixelType::I8,
            Plane::U16(_) => PixelType::U16,
            Plane::I16(_) => PixelType::I16,
            Plane::U32(_) => PixelType::U32,
            Plane::I32(_) => PixelType::I32,
        }
    }
}

/// Voxel storage of a volume, indexed `(depth, row, column)`.
#[derive(Debug, Clone, PartialEq)]
pub enum VoxelData {
    U8(Array3<u8>),
    I8(Array3<i8>),
    U16(Array3<u16>),
    I16(Array3<i16>),
    U32(Array3<u32>),
    I32(Array3<i32>),
}

macro_rules! le_bytes {
    ($arr:expr) => {
        $arr.iter().flat_map(|v| v.to_le_bytes()).collect()
    };
}

impl VoxelData {
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            VoxelData::U8(a) => a.dim(),
            VoxelData::I8(a) => a.dim(),
            VoxelData::U16(a) => a.dim(),
            VoxelData::I16(a) => a.dim(),
            VoxelData::U32(a) => a.dim(),
            VoxelData::I32(a) => a.dim(),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            VoxelData::U8(_) => PixelType::U8,
            VoxelData::I8(_) => PixelType::I8,
            VoxelData::U16(_) => PixelType::U16,
            VoxelData::I16(_) => PixelType::I16,
            VoxelData::U32(_) => PixelType::U32,
            VoxelData::I32(_) => PixelType::I32,
        }
    }

    pub fn as_u8(&self) -> Option<&Array3<u8>> {
        match self {
            VoxelData::U8(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&Array3<u16>> {
        match self {
            VoxelData::U16(a) => Some(a),
            _ => None,
        }
    }

    /// Little-endian voxel bytes with the column index varying fastest.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            VoxelData::U8(a) => a.iter().copied().collect(),
            VoxelData::I8(a) => le_bytes!(a),
            VoxelData::U16(a) => le_bytes!(a),
            VoxelData::I16(a) => le_bytes!(a),
            VoxelData::U32(a) => le_bytes!(a),
            VoxelData::I32(a) => le_bytes!(a),
        }
    }
}

/// Mapping from array indices to patient space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// `[column, row, slice]` spacing in millimetres.
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// Unit axis vectors for columns, rows and slices, when the source carries orientation.
    pub direction: Option<[[f64; 3]; 3]>,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            spacing: [1.0, 1.0, 1.0],
            origin: [0.0, 0.0, 0.0],
            direction: None,
        }
    }
}

impl Geometry {
    pub const IDENTITY: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    pub fn direction_or_identity(&self) -> [[f64; 3]; 3] {
        self.direction.unwrap_or(Self::IDENTITY)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    data: VoxelData,
    geometry: Geometry,
}

impl Volume {
    pub fn new(data: VoxelData, geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn data(&self) -> &VoxelData {
        &self.data
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn pixel_type(&self) -> PixelType {
        self.data.pixel_type()
    }
}

macro_rules! stack_variant {
    ($planes:expr, $variant:ident) => {
        VoxelData::$variant(stack_planes(
            &$planes
                .iter()
                .filter_map(|p| match p {
                    Plane::$variant(a) => Some(a.view()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        ))
    };
}

/// Stack `planes` along a new leading depth axis, plane `i` landing at depth `i`.
///
/// Values are copied verbatim. Fails when the planes disagree on in-plane shape or
/// pixel type instead of padding or truncating.
pub fn assemble(planes: &[Plane], geometry: Geometry) -> Result<Volume> {
    let first = planes.first().ok_or(ConvertError::EmptyStack)?;
    let expected_dim = first.dim();
    let expected_type = first.pixel_type();

    for (index, plane) in planes.iter().enumerate() {
        if plane.dim() != expected_dim {
            return Err(ConvertError::ShapeMismatch {
                index,
                expected: expected_dim,
                found: plane.dim(),
            });
        }
        if plane.pixel_type() != expected_type {
            return Err(ConvertError::PixelTypeMismatch {
                index,
                expected: expected_type,
                found: plane.pixel_type(),
            });
        }
    }

    let data = match expected_type {
        PixelType::U8 => stack_variant!(planes, U8),
        PixelType::I8 => stack_variant!(planes, I8),
        PixelType::U16 => stack_variant!(planes, U16),
        PixelType::I16 => stack_variant!(planes, I16),
        PixelType::U32 => stack_variant!(planes, U32),
        PixelType::I32 => stack_variant!(planes, I32),
    };

    Ok(Volume::new(data, geometry))
}

fn stack_planes<T: Copy + Default>(planes: &[ArrayView2<'_, T>]) -> Array3<T> {
    let (height, width) = planes[0].dim();
    let mut volume = Array3::from_elem((planes.len(), height, width), T::default());

    for (i, plane) in planes.iter().enumerate() {
        volume.slice_mut(s![i, .., ..]).assign(plane);
    }

    volume
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn plane(seed: u16) -> Plane {
        Plane::U16(array![[seed, seed + 1, seed + 2], [seed + 3, seed + 4, seed + 5]])
    }

    #[test]
    fn depth_matches_slice_count_and_voxels_are_verbatim() {
        let planes: Vec<Plane> = (0..4).map(|d| plane(d * 10)).collect();
        let volume = assemble(&planes, Geometry::default()).expect("assemble");

        assert_eq!(volume.dim(), (4, 2, 3));
        let data = volume.data().as_u16().expect("u16 volume");
        for d in 0..4 {
            for y in 0..2 {
                for x in 0..3 {
                    assert_eq!(data[[d, y, x]], (d * 10 + y * 3 + x) as u16);
                }
            }
        }
    }

    #[test]
    fn reversing_input_reverses_depth_axis() {
        let planes: Vec<Plane> = (0..3).map(|d| plane(d * 100)).collect();
        let mut reversed = planes.clone();
        reversed.reverse();

        let forward = assemble(&planes, Geometry::default()).expect("forward");
        let backward = assemble(&reversed, Geometry::default()).expect("backward");

        let forward = forward.data().as_u16().expect("u16");
        let mut flipped = backward.data().as_u16().expect("u16").clone();
        flipped.invert_axis(ndarray::Axis(0));
        assert_eq!(forward, &flipped);
    }

    #[test]
    fn geometry_is_attached_unchanged() {
        let geometry = Geometry {
            spacing: [0.7, 0.7, 5.0],
            origin: [-120.0, -80.0, 33.5],
            direction: Some(Geometry::IDENTITY),
        };
        let volume = assemble(&[plane(0)], geometry.clone()).expect("assemble");
        assert_eq!(volume.geometry(), &geometry);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let planes = vec![plane(0), Plane::U16(array![[1, 2], [3, 4]])];
        let err = assemble(&planes, Geometry::default()).unwrap_err();
        assert!(matches!(err, ConvertError::ShapeMismatch { index: 1, .. }));
    }

    #[test]
    fn pixel_type_mismatch_is_rejected() {
        let planes = vec![plane(0), Plane::I16(array![[1, 2, 3], [4, 5, 6]])];
        let err = assemble(&planes, Geometry::default()).unwrap_err();
        assert!(matches!(err, ConvertError::PixelTypeMismatch { index: 1, .. }));
    }

    #[test]
    fn empty_stack_is_rejected() {
        assert!(matches!(
            assemble(&[], Geometry::default()),
            Err(ConvertError::EmptyStack)
        ));
    }

    #[test]
    fn signed_bytes_are_little_endian() {
        let data = VoxelData::I16(Array3::from_elem((1, 1, 2), -2));
        assert_eq!(data.to_le_bytes(), vec![0xfe, 0xff, 0xfe, 0xff]);
    }
}
