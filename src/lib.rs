//! # tract-mask
//!
//! Composable spatial masks for fiber tracking, derived from volumetric
//! neuroimaging data.
//!
//! A mask is built from a [`Source`] of raw voxel data and a [`Condition`]
//! turning that data into the mask:
//!  - Sources: a file located in the dataset, a derived scalar map
//!    (`dti_fa`, `dti_md`, `dki_fa`, `dki_md`) or the whole diffusion volume
//!  - Conditions: none, inclusive/exclusive labels, lower/upper thresholds
//!
//! Masks can be and'd or or'd together with [`CombinedMask`], to any depth.
//!
//! Every mask follows the same lifecycle. [`Mask::find_path`] is called once
//! per subject and session to locate and cache the files it needs. Then
//! [`Mask::get_mask`] is called per processing row: it loads the source,
//! applies the condition at the source's native resolution and, when the
//! grid differs from the diffusion data, resamples the result and rounds it
//! back to its original element type. Each mask comes with a [`MaskMeta`]
//! provenance record.
//!
//! Dataset indexing, image file formats and diffusion modelling are left to
//! the caller through the [`DatasetQuery`], [`ImageLoader`] and
//! [`DiffusionAccess`] traits. A trilinear [`Resampler`] is included.
//!
//! # Examples
//!
//! ## Seed mask from two scalar maps
//!
//! ```no_run
//! # use tract_mask::{CombineOp, CombinedMask, Mask, MaskBuilder, Scalar};
//! # use tract_mask::{DatasetQuery, DiffusionAccess, ImageLoader, MaskContext, Row};
//! # fn run(
//! #     dataset: &dyn DatasetQuery,
//! #     diffusion: &dyn DiffusionAccess,
//! #     loader: &dyn ImageLoader,
//! # ) -> Result<(), tract_mask::MaskError> {
//! let children: Vec<Box<dyn Mask>> = vec![
//!     Box::new(MaskBuilder::scalar(Scalar::DtiFa).threshold(Some(0.2), None).build()),
//!     Box::new(MaskBuilder::scalar(Scalar::DtiMd).threshold(None, Some(0.002)).build()),
//! ];
//! let mut seed_mask = CombinedMask::new(children, CombineOp::And)?;
//! seed_mask.find_path(dataset, "01", "pre")?;
//!
//! let ctx = MaskContext::new(diffusion, loader);
//! let (mask, meta) = seed_mask.get_mask(&ctx, &Row::new("01", "pre"))?;
//! println!("{:?} {}", mask.shape(), meta.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod combined;
pub mod combiner;
pub mod condition;
pub mod config;
pub mod enums;
pub mod error;
pub mod interpolator;
pub mod mask;
pub mod source;
pub mod volume;

pub use combined::CombinedMask;
pub use combiner::MaskCombiner;
pub use condition::Condition;
pub use config::{MaskConfig, MaskSet, MaskSettings, check_mask_node};
pub use enums::{CombineOp, DType, Scalar};
pub use error::{ErrorKind, MaskError};
pub use interpolator::{Resampler, TrilinearResampler, resample_mask};
pub use mask::{Mask, MaskBuilder, MaskMeta, SourceMask};
pub use source::{
    DatasetQuery, DiffusionAccess, FileQuery, FileSource, ImageLoader, MaskContext, Row, Source,
};
pub use volume::{Affine, DwiImage, Image, MaskArray};
