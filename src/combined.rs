use tracing::debug;

use crate::combiner::MaskCombiner;
use crate::enums::CombineOp;
use crate::error::MaskError;
use crate::mask::{Mask, MaskMeta};
use crate::source::{DatasetQuery, MaskContext, Row};
use crate::volume::MaskArray;

/// A mask made by and-ing or or-ing other masks.
///
/// Children may themselves be combined masks. Every child must produce a
/// mask of the same shape; non-zero voxels count as inside.
#[derive(Debug)]
pub struct CombinedMask {
    masks: Vec<Box<dyn Mask>>,
    combine: CombineOp,
}

impl CombinedMask {
    pub const DEFAULT_COMBINE: CombineOp = CombineOp::And;

    pub fn new(masks: Vec<Box<dyn Mask>>, combine: CombineOp) -> Result<Self, MaskError> {
        if masks.is_empty() {
            return Err(MaskError::EmptyCombination);
        }
        Ok(Self { masks, combine })
    }

    pub fn masks(&self) -> &[Box<dyn Mask>] {
        &self.masks
    }

    pub fn combine(&self) -> CombineOp {
        self.combine
    }
}

impl Mask for CombinedMask {
    fn name(&self) -> String {
        format!(
            "combined mask ({} of {} masks)",
            self.combine,
            self.masks.len()
        )
    }

    fn find_path(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError> {
        for mask in &mut self.masks {
            mask.find_path(dataset, subject, session)?;
        }
        Ok(())
    }

    fn get_mask(&self, ctx: &MaskContext<'_>, row: &Row) -> Result<(MaskArray, MaskMeta), MaskError> {
        let mut combiner: Option<MaskCombiner> = None;
        let mut sources = Vec::with_capacity(self.masks.len());

        for (index, mask) in self.masks.iter().enumerate() {
            let (data, meta) = mask.get_mask(ctx, row)?;
            let combiner = combiner.get_or_insert_with(|| MaskCombiner::new(data.shape(), self.combine));
            if combiner.shape() != data.shape() {
                return Err(MaskError::ShapeMismatch {
                    what: format!("child {index} ({})", mask.name()),
                    expected: combiner.shape().to_vec(),
                    found: data.shape().to_vec(),
                });
            }
            combiner.combine_mask(&data.to_bool().view())?;
            sources.push(meta);
        }

        let combiner = combiner.ok_or(MaskError::EmptyCombination)?;
        debug!(
            children = sources.len(),
            combine = %self.combine,
            "combined masks"
        );
        let meta = MaskMeta::Combined {
            sources,
            combined_with: self.combine,
        };
        Ok((MaskArray::Bool(combiner.into_mask()), meta))
    }
}
