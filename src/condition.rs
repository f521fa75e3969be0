use crate::combiner::MaskCombiner;
use crate::enums::CombineOp;
use crate::error::MaskError;
use crate::mask::MaskMeta;
use crate::volume::MaskArray;

/// Turns raw source data into the mask data and its provenance.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    /// Pass the data through untouched.
    Identity,
    /// Voxels equal to an inclusive label, or different from an exclusive one.
    Labels {
        inclusive: Option<Vec<i64>>,
        exclusive: Option<Vec<i64>>,
        combine: CombineOp,
    },
    /// Voxels strictly between the given bounds.
    Threshold {
        lower: Option<f64>,
        upper: Option<f64>,
        combine: CombineOp,
    },
}

impl Condition {
    pub const DEFAULT_LABEL_COMBINE: CombineOp = CombineOp::Or;
    pub const DEFAULT_THRESHOLD_COMBINE: CombineOp = CombineOp::And;

    pub fn labels(inclusive: Option<Vec<i64>>, exclusive: Option<Vec<i64>>) -> Self {
        Condition::Labels {
            inclusive,
            exclusive,
            combine: Self::DEFAULT_LABEL_COMBINE,
        }
    }

    pub fn threshold(lower: Option<f64>, upper: Option<f64>) -> Self {
        Condition::Threshold {
            lower,
            upper,
            combine: Self::DEFAULT_THRESHOLD_COMBINE,
        }
    }

    /// Replace the operator; identity conditions have none.
    pub fn with_combine(self, op: CombineOp) -> Self {
        match self {
            Condition::Identity => Condition::Identity,
            Condition::Labels {
                inclusive,
                exclusive,
                ..
            } => Condition::Labels {
                inclusive,
                exclusive,
                combine: op,
            },
            Condition::Threshold { lower, upper, .. } => Condition::Threshold {
                lower,
                upper,
                combine: op,
            },
        }
    }

    pub(crate) fn prefix(&self) -> &'static str {
        match self {
            Condition::Identity => "",
            Condition::Labels { .. } => "labelled ",
            Condition::Threshold { .. } => "thresholded ",
        }
    }

    pub fn apply(&self, data: MaskArray, source: String) -> Result<(MaskArray, MaskMeta), MaskError> {
        match self {
            Condition::Identity => Ok((data, MaskMeta::Source { source })),
            Condition::Labels {
                inclusive,
                exclusive,
                combine,
            } => {
                let mut mask = MaskCombiner::new(data.shape(), *combine);
                for &label in inclusive.iter().flatten() {
                    let label = label as f64;
                    mask.combine_mask(&data.map_predicate(|v| v == label).view())?;
                }
                for &label in exclusive.iter().flatten() {
                    let label = label as f64;
                    mask.combine_mask(&data.map_predicate(|v| v != label).view())?;
                }

                let meta = MaskMeta::Labels {
                    source,
                    inclusive_labels: inclusive.clone(),
                    exclusive_labels: exclusive.clone(),
                    combined_with: *combine,
                };
                Ok((MaskArray::Bool(mask.into_mask()), meta))
            }
            Condition::Threshold {
                lower,
                upper,
                combine,
            } => {
                let mut mask = MaskCombiner::new(data.shape(), *combine);
                if let Some(upper) = *upper {
                    mask.combine_mask(&data.map_predicate(|v| v < upper).view())?;
                }
                if let Some(lower) = *lower {
                    mask.combine_mask(&data.map_predicate(|v| v > lower).view())?;
                }

                let meta = MaskMeta::Threshold {
                    source,
                    upper_bound: *upper,
                    lower_bound: *lower,
                    combined_with: *combine,
                };
                Ok((MaskArray::Bool(mask.into_mask()), meta))
            }
        }
    }
}
