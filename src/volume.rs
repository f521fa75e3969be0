use crate::enums::DType;
use crate::error::MaskError;

use ndarray::ArrayD;
use ndarray::ArrayViewD;
use ndarray::Axis;
use ndarray::Zip;
use serde::Serialize;

/// N-dimensional voxel data of a mask, keeping track of its element type.
///
/// Boolean masks come out of label and threshold conditions, label volumes
/// from segmentations, and floating point data from scalar maps or raw files.
#[derive(Clone, Debug, PartialEq)]
pub enum MaskArray {
    Bool(ArrayD<bool>),
    Label(ArrayD<i64>),
    Float(ArrayD<f64>),
}

impl MaskArray {
    pub fn shape(&self) -> &[usize] {
        match self {
            MaskArray::Bool(data) => data.shape(),
            MaskArray::Label(data) => data.shape(),
            MaskArray::Float(data) => data.shape(),
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            MaskArray::Bool(_) => DType::Bool,
            MaskArray::Label(_) => DType::Label,
            MaskArray::Float(_) => DType::Float,
        }
    }

    /// Evaluate a voxel-wise predicate over the data, read as `f64`.
    pub fn map_predicate<F>(&self, predicate: F) -> ArrayD<bool>
    where
        F: Fn(f64) -> bool + Sync + Send,
    {
        match self {
            MaskArray::Bool(data) => {
                Zip::from(data).par_map_collect(|&v| predicate(if v { 1.0 } else { 0.0 }))
            }
            MaskArray::Label(data) => Zip::from(data).par_map_collect(|&v| predicate(v as f64)),
            MaskArray::Float(data) => Zip::from(data).par_map_collect(|&v| predicate(v)),
        }
    }

    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            MaskArray::Bool(data) => data.mapv(|v| if v { 1.0 } else { 0.0 }),
            MaskArray::Label(data) => data.mapv(|v| v as f64),
            MaskArray::Float(data) => data.clone(),
        }
    }

    /// Non-zero voxels are inside the mask.
    pub fn to_bool(&self) -> ArrayD<bool> {
        match self {
            MaskArray::Bool(data) => data.clone(),
            _ => self.map_predicate(|v| v != 0.0),
        }
    }

    /// Round interpolated values, halves to even, and cast them back to `dtype`.
    pub fn from_rounded(values: ArrayD<f64>, dtype: DType) -> Self {
        match dtype {
            DType::Bool => MaskArray::Bool(values.mapv(|v| v.round_ties_even() != 0.0)),
            DType::Label => MaskArray::Label(values.mapv(|v| v.round_ties_even() as i64)),
            DType::Float => MaskArray::Float(values.mapv_into(f64::round_ties_even)),
        }
    }
}

/// 4x4 voxel-to-world transform, row-major.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Affine(pub [[f64; 4]; 4]);

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    pub fn identity() -> Self {
        Self::scaling((1.0, 1.0, 1.0))
    }

    /// Diagonal affine with the given voxel size in mm.
    pub fn scaling(spacing: (f64, f64, f64)) -> Self {
        let (x, y, z) = spacing;
        Affine([
            [x, 0.0, 0.0, 0.0],
            [0.0, y, 0.0, 0.0],
            [0.0, 0.0, z, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    pub fn with_translation(mut self, offset: (f64, f64, f64)) -> Self {
        self.0[0][3] = offset.0;
        self.0[1][3] = offset.1;
        self.0[2][3] = offset.2;
        self
    }

    pub fn matrix(&self) -> &[[f64; 4]; 4] {
        &self.0
    }

    #[inline]
    pub fn apply(&self, point: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        let mut out = [0.0; 3];
        for (row, value) in out.iter_mut().enumerate() {
            *value = m[row][0].mul_add(
                point[0],
                m[row][1].mul_add(point[1], m[row][2].mul_add(point[2], m[row][3])),
            );
        }
        out
    }

    /// Inverse of the transform, `None` when the linear part is singular.
    pub fn inverse(&self) -> Option<Affine> {
        let m = &self.0;
        let (a, b, c) = (m[0][0], m[0][1], m[0][2]);
        let (d, e, f) = (m[1][0], m[1][1], m[1][2]);
        let (g, h, i) = (m[2][0], m[2][1], m[2][2]);

        let det = a * (e * i - f * h) - b * (d * i - f * g) + c * (d * h - e * g);
        if det.abs() < f64::EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;

        let r = [
            [
                (e * i - f * h) * inv_det,
                (c * h - b * i) * inv_det,
                (b * f - c * e) * inv_det,
            ],
            [
                (f * g - d * i) * inv_det,
                (a * i - c * g) * inv_det,
                (c * d - a * f) * inv_det,
            ],
            [
                (d * h - e * g) * inv_det,
                (b * g - a * h) * inv_det,
                (a * e - b * d) * inv_det,
            ],
        ];
        let t = [m[0][3], m[1][3], m[2][3]];

        let mut out = [[0.0; 4]; 4];
        for row in 0..3 {
            out[row][..3].copy_from_slice(&r[row]);
            out[row][3] = -(r[row][0] * t[0] + r[row][1] * t[1] + r[row][2] * t[2]);
        }
        out[3][3] = 1.0;
        Some(Affine(out))
    }
}

/// A loaded image: voxel data plus its voxel-to-world transform.
#[derive(Clone, Debug)]
pub struct Image {
    pub data: MaskArray,
    pub affine: Affine,
}

impl Image {
    pub fn new(data: MaskArray, affine: Affine) -> Self {
        Self { data, affine }
    }
}

/// Diffusion-weighted volume that masks are aligned to.
///
/// The last axis indexes gradient directions.
#[derive(Clone, Debug)]
pub struct DwiImage {
    pub data: ArrayD<f64>,
    pub affine: Affine,
}

impl DwiImage {
    pub fn new(data: ArrayD<f64>, affine: Affine) -> Self {
        Self { data, affine }
    }

    /// Shape of a single volume, i.e. every axis but the direction axis.
    pub fn spatial_shape(&self) -> &[usize] {
        let shape = self.data.shape();
        &shape[..shape.len().saturating_sub(1)]
    }

    /// First volume along the direction axis, used as the resampling reference.
    pub fn reference_volume(&self) -> Result<ArrayViewD<'_, f64>, MaskError> {
        match self.data.shape().last() {
            Some(&directions) if directions > 0 => {
                Ok(self.data.index_axis(Axis(self.data.ndim() - 1), 0))
            }
            _ => Err(MaskError::Resample(format!(
                "diffusion data of shape {:?} has no volume to resample onto",
                self.data.shape()
            ))),
        }
    }
}
