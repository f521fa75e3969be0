use ndarray::ArrayD;
use ndarray::ArrayViewD;
use ndarray::IxDyn;
use ndarray::Zip;

use crate::enums::CombineOp;
use crate::error::MaskError;

/// Running boolean mask folded under a single operator.
///
/// Starts from the operator's identity, so a combiner with no folds is
/// all-false for [`CombineOp::Or`] and all-true for [`CombineOp::And`].
#[derive(Clone, Debug)]
pub struct MaskCombiner {
    op: CombineOp,
    mask: ArrayD<bool>,
}

impl MaskCombiner {
    pub fn new(shape: &[usize], op: CombineOp) -> Self {
        Self {
            op,
            mask: ArrayD::from_elem(IxDyn(shape), op.identity()),
        }
    }

    pub fn op(&self) -> CombineOp {
        self.op
    }

    pub fn shape(&self) -> &[usize] {
        self.mask.shape()
    }

    /// Fold `other` into the running mask. `other` must broadcast to its shape.
    pub fn combine_mask(&mut self, other: &ArrayViewD<'_, bool>) -> Result<(), MaskError> {
        let other = other
            .broadcast(self.mask.raw_dim())
            .ok_or_else(|| MaskError::ShapeMismatch {
                what: format!("mask folded with '{}'", self.op),
                expected: self.mask.shape().to_vec(),
                found: other.shape().to_vec(),
            })?;
        let op = self.op;
        Zip::from(&mut self.mask)
            .and(&other)
            .par_for_each(|acc, &value| *acc = op.apply(*acc, value));
        Ok(())
    }

    pub fn mask(&self) -> &ArrayD<bool> {
        &self.mask
    }

    pub fn into_mask(self) -> ArrayD<bool> {
        self.mask
    }
}
