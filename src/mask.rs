use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::condition::Condition;
use crate::enums::{CombineOp, Scalar};
use crate::error::MaskError;
use crate::interpolator::resample_mask;
use crate::source::{DatasetQuery, FileSource, MaskContext, Row, Source};
use crate::volume::MaskArray;

/// A spatial region that can be located in a dataset and built per row.
///
/// `find_path` is called once per subject/session before any `get_mask`
/// call for that pair; `get_mask` only reads what `find_path` cached and
/// returns the same mask for the same inputs.
pub trait Mask: fmt::Debug + Send + Sync {
    /// Human-readable description used in diagnostics.
    fn name(&self) -> String;

    fn find_path(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError>;

    fn get_mask(&self, ctx: &MaskContext<'_>, row: &Row) -> Result<(MaskArray, MaskMeta), MaskError>;
}

/// Provenance of a mask, serialised as a flat record.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MaskMeta {
    Labels {
        source: String,
        inclusive_labels: Option<Vec<i64>>,
        exclusive_labels: Option<Vec<i64>>,
        combined_with: CombineOp,
    },
    Threshold {
        source: String,
        upper_bound: Option<f64>,
        lower_bound: Option<f64>,
        combined_with: CombineOp,
    },
    Combined {
        sources: Vec<MaskMeta>,
        combined_with: CombineOp,
    },
    Source {
        source: String,
    },
}

impl MaskMeta {
    pub fn to_json(&self) -> Result<serde_json::Value, MaskError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// A mask built from one [`Source`] and one [`Condition`].
///
/// The pair replaces the file/labelled/thresholded/scalar variants: any
/// source can be combined with any condition through [`MaskBuilder`].
#[derive(Clone, Debug)]
pub struct SourceMask {
    source: Source,
    condition: Condition,
}

impl SourceMask {
    pub fn new(source: Source, condition: Condition) -> Self {
        Self { source, condition }
    }

    /// Raw data of a dataset file, e.g. a white matter probability map.
    pub fn file(suffix: impl Into<String>, scope: Option<String>) -> Self {
        MaskBuilder::file(suffix, scope).build()
    }

    /// Every voxel of the diffusion volume.
    pub fn full() -> Self {
        MaskBuilder::full().build()
    }

    /// Raw values of a scalar map.
    pub fn scalar(scalar: Scalar) -> Self {
        MaskBuilder::scalar(scalar).build()
    }

    pub fn labelled_file(
        suffix: impl Into<String>,
        scope: Option<String>,
        inclusive_labels: Option<Vec<i64>>,
        exclusive_labels: Option<Vec<i64>>,
        combine: CombineOp,
    ) -> Self {
        MaskBuilder::file(suffix, scope)
            .labels(inclusive_labels, exclusive_labels)
            .combine(combine)
            .build()
    }

    pub fn thresholded_file(
        suffix: impl Into<String>,
        scope: Option<String>,
        lower_bound: Option<f64>,
        upper_bound: Option<f64>,
        combine: CombineOp,
    ) -> Self {
        MaskBuilder::file(suffix, scope)
            .threshold(lower_bound, upper_bound)
            .combine(combine)
            .build()
    }

    pub fn thresholded_scalar(
        scalar: Scalar,
        lower_bound: Option<f64>,
        upper_bound: Option<f64>,
        combine: CombineOp,
    ) -> Self {
        MaskBuilder::scalar(scalar)
            .threshold(lower_bound, upper_bound)
            .combine(combine)
            .build()
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

impl Mask for SourceMask {
    fn name(&self) -> String {
        format!("{}{}", self.condition.prefix(), self.source.describe())
    }

    fn find_path(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError> {
        self.source.find_path(dataset, subject, session)
    }

    fn get_mask(&self, ctx: &MaskContext<'_>, row: &Row) -> Result<(MaskArray, MaskMeta), MaskError> {
        debug!(
            mask = %self.name(),
            subject = %row.subject,
            session = %row.session,
            "building mask"
        );
        let dwi = ctx.diffusion.dwi(row)?;
        let resolved = self.source.resolve(ctx, row, &dwi)?;

        // conditions run at the mask's native resolution
        let (data, meta) = self.condition.apply(resolved.data, resolved.source)?;

        let data = resample_mask(data, resolved.affine.as_ref(), Some(dwi.as_ref()), ctx.resampler)?;
        Ok((data, meta))
    }
}

/// Assembles a [`SourceMask`] from a source and an optional condition.
#[derive(Clone, Debug)]
pub struct MaskBuilder {
    source: Source,
    condition: Condition,
}

impl MaskBuilder {
    pub fn file(suffix: impl Into<String>, scope: Option<String>) -> Self {
        Self::from_source(Source::File(FileSource::new(suffix, scope)))
    }

    pub fn full() -> Self {
        Self::from_source(Source::Full)
    }

    pub fn scalar(scalar: Scalar) -> Self {
        Self::from_source(Source::Scalar(scalar))
    }

    pub fn from_source(source: Source) -> Self {
        Self {
            source,
            condition: Condition::Identity,
        }
    }

    /// File extension to query for. Ignored by sources without files.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        if let Source::File(file) = &mut self.source {
            file.set_extension(extension);
        }
        self
    }

    /// Keep voxels by label, or'd together unless [`combine`](Self::combine) says otherwise.
    pub fn labels(mut self, inclusive: Option<Vec<i64>>, exclusive: Option<Vec<i64>>) -> Self {
        self.condition = Condition::labels(inclusive, exclusive);
        self
    }

    /// Keep voxels within bounds, and'd together unless [`combine`](Self::combine) says otherwise.
    pub fn threshold(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.condition = Condition::threshold(lower, upper);
        self
    }

    pub fn combine(mut self, op: CombineOp) -> Self {
        self.condition = self.condition.with_combine(op);
        self
    }

    pub fn build(self) -> SourceMask {
        SourceMask::new(self.source, self.condition)
    }
}
