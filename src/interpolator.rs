use ndarray::Array3;
use ndarray::ArrayD;
use ndarray::ArrayView3;
use ndarray::ArrayViewD;
use ndarray::Ix3;
use ndarray::Zip;
use tracing::debug;

use crate::error::MaskError;
use crate::volume::{Affine, DwiImage, MaskArray};

/// Moves a continuous-valued volume onto another voxel grid.
///
/// Implementations return data shaped like `reference`; the caller takes care
/// of rounding back to the mask's element type.
pub trait Resampler: Send + Sync {
    fn resample(
        &self,
        source: &ArrayViewD<'_, f64>,
        reference: &ArrayViewD<'_, f64>,
        source_affine: &Affine,
        reference_affine: &Affine,
    ) -> Result<ArrayD<f64>, MaskError>;
}

/// Trilinear resampling of 3-D volumes through their affines.
///
/// Every reference voxel is mapped to world space, then into the source grid
/// with the inverse source affine. Points outside the source grid are zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct TrilinearResampler;

impl TrilinearResampler {
    const EDGE_TOLERANCE: f64 = 1e-6;

    #[inline]
    pub(crate) fn trilinear_interpolate(volume: &ArrayView3<f64>, point: [f64; 3]) -> f64 {
        let (nx, ny, nz) = volume.dim();
        let dims = [nx, ny, nz];

        let mut lower = [0usize; 3];
        let mut upper = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let max = (dims[axis] - 1) as f64;
            let coord = point[axis];
            if coord < -Self::EDGE_TOLERANCE || coord > max + Self::EDGE_TOLERANCE {
                return 0.0;
            }
            let coord = coord.clamp(0.0, max);
            let floor = coord.floor();
            lower[axis] = floor as usize;
            upper[axis] = (lower[axis] + 1).min(dims[axis] - 1);
            frac[axis] = coord - floor;
        }

        let [x0, y0, z0] = lower;
        let [x1, y1, z1] = upper;
        let [dx, dy, dz] = frac;

        let c00 = volume[[x0, y0, z0]].mul_add(1.0 - dx, volume[[x1, y0, z0]] * dx);
        let c01 = volume[[x0, y0, z1]].mul_add(1.0 - dx, volume[[x1, y0, z1]] * dx);
        let c10 = volume[[x0, y1, z0]].mul_add(1.0 - dx, volume[[x1, y1, z0]] * dx);
        let c11 = volume[[x0, y1, z1]].mul_add(1.0 - dx, volume[[x1, y1, z1]] * dx);

        let c0 = c00.mul_add(1.0 - dy, c10 * dy);
        let c1 = c01.mul_add(1.0 - dy, c11 * dy);

        c0.mul_add(1.0 - dz, c1 * dz)
    }

    fn as_3d<'a>(
        array: &ArrayViewD<'a, f64>,
        what: &str,
    ) -> Result<ArrayView3<'a, f64>, MaskError> {
        array.clone().into_dimensionality::<Ix3>().map_err(|_| {
            MaskError::Resample(format!(
                "{what} must be 3-dimensional, got shape {:?}",
                array.shape()
            ))
        })
    }
}

impl Resampler for TrilinearResampler {
    fn resample(
        &self,
        source: &ArrayViewD<'_, f64>,
        reference: &ArrayViewD<'_, f64>,
        source_affine: &Affine,
        reference_affine: &Affine,
    ) -> Result<ArrayD<f64>, MaskError> {
        let source = Self::as_3d(source, "source volume")?;
        let reference = Self::as_3d(reference, "reference volume")?;
        if source.is_empty() {
            return Err(MaskError::Resample("source volume is empty".to_string()));
        }
        let world_to_source = source_affine.inverse().ok_or_else(|| {
            MaskError::Resample(format!("source affine is singular: {source_affine:?}"))
        })?;

        let mut output = Array3::<f64>::zeros(reference.raw_dim());
        Zip::indexed(&mut output).par_for_each(|(i, j, k), value| {
            let world = reference_affine.apply([i as f64, j as f64, k as f64]);
            let point = world_to_source.apply(world);
            *value = Self::trilinear_interpolate(&source, point);
        });

        Ok(output.into_dyn())
    }
}

/// Bring a mask onto the diffusion grid when their spatial shapes differ.
///
/// Resampling happens on the already-conditioned mask, and the interpolated
/// values are rounded back to the mask's element type. Without a mask affine
/// or a reference volume, or when shapes already match, the mask is returned
/// untouched.
pub fn resample_mask(
    mask: MaskArray,
    mask_affine: Option<&Affine>,
    reference: Option<&DwiImage>,
    resampler: &dyn Resampler,
) -> Result<MaskArray, MaskError> {
    let (Some(mask_affine), Some(dwi)) = (mask_affine, reference) else {
        return Ok(mask);
    };
    if dwi.spatial_shape() == mask.shape() {
        return Ok(mask);
    }

    debug!(
        from = ?mask.shape(),
        to = ?dwi.spatial_shape(),
        "resampling mask onto diffusion grid"
    );
    let dtype = mask.dtype();
    let reference_volume = dwi.reference_volume()?;
    let resampled = resampler.resample(
        &mask.to_f64().view(),
        &reference_volume,
        mask_affine,
        &dwi.affine,
    )?;
    if resampled.shape() != dwi.spatial_shape() {
        return Err(MaskError::Resample(format!(
            "resampler returned shape {:?}, expected {:?}",
            resampled.shape(),
            dwi.spatial_shape()
        )));
    }

    Ok(MaskArray::from_rounded(resampled, dtype))
}
