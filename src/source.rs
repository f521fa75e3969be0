use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ndarray::ArrayD;
use ndarray::IxDyn;
use tracing::{debug, warn};

use crate::enums::Scalar;
use crate::error::MaskError;
use crate::interpolator::{Resampler, TrilinearResampler};
use crate::volume::{Affine, DwiImage, Image, MaskArray};

/// Source identifier recorded for masks covering the whole image domain.
pub const FULL_VOLUME_SOURCE: &str = "Entire Volume";

/// Extension file-backed masks look for unless told otherwise.
pub const DEFAULT_EXTENSION: &str = ".nii.gz";

/// One processing unit of the pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Row {
    pub subject: String,
    pub session: String,
}

impl Row {
    pub fn new(subject: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            session: session.into(),
        }
    }
}

/// Parameters of a dataset lookup for a single file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileQuery<'a> {
    pub subject: &'a str,
    pub session: &'a str,
    pub suffix: &'a str,
    /// `None` searches every pipeline scope.
    pub scope: Option<&'a str>,
    pub extension: &'a str,
}

/// Indexed dataset that maps a query to matching file paths.
pub trait DatasetQuery {
    fn query(&self, query: &FileQuery<'_>) -> Result<Vec<PathBuf>, MaskError>;
}

/// Reads a volumetric image and its affine.
pub trait ImageLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Image, MaskError>;
}

/// Per-row access to the diffusion data and its derived scalar maps.
pub trait DiffusionAccess: Send + Sync {
    fn dwi(&self, row: &Row) -> Result<Arc<DwiImage>, MaskError>;

    /// Path of the scalar map for `row`, computing it if needed.
    fn scalar_path(&self, scalar: Scalar, row: &Row) -> Result<PathBuf, MaskError>;

    fn available_scalars(&self) -> &[Scalar] {
        &Scalar::ALL
    }
}

/// Collaborators a mask needs to produce its data for a row.
#[derive(Clone, Copy)]
pub struct MaskContext<'a> {
    pub diffusion: &'a dyn DiffusionAccess,
    pub loader: &'a dyn ImageLoader,
    pub resampler: &'a dyn Resampler,
}

impl<'a> MaskContext<'a> {
    pub fn new(diffusion: &'a dyn DiffusionAccess, loader: &'a dyn ImageLoader) -> Self {
        Self {
            diffusion,
            loader,
            resampler: &TrilinearResampler,
        }
    }

    pub fn with_resampler(mut self, resampler: &'a dyn Resampler) -> Self {
        self.resampler = resampler;
        self
    }
}

/// Raw mask data before any condition is applied.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub source: String,
    pub data: MaskArray,
    /// `None` when the data is already on the diffusion grid.
    pub affine: Option<Affine>,
}

/// A file located through the dataset, cached per (session, subject).
#[derive(Clone, Debug)]
pub struct FileSource {
    suffix: String,
    scope: Option<String>,
    extension: String,
    paths: HashMap<(String, String), PathBuf>,
}

impl FileSource {
    pub fn new(suffix: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            suffix: suffix.into(),
            scope,
            extension: DEFAULT_EXTENSION.to_string(),
            paths: HashMap::new(),
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn set_extension(&mut self, extension: impl Into<String>) {
        self.extension = extension.into();
    }

    /// Resolve and cache the file for a subject/session.
    ///
    /// When several files match, the first one returned by the dataset is used.
    pub fn find_path(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError> {
        let query = FileQuery {
            subject,
            session,
            suffix: &self.suffix,
            scope: self.scope.as_deref(),
            extension: &self.extension,
        };
        let matches = dataset.query(&query)?;
        let Some(first) = matches.first().cloned() else {
            return Err(MaskError::NoMatchingFile {
                suffix: self.suffix.clone(),
                scope: self.scope.clone().unwrap_or_else(|| "any".to_string()),
                subject: subject.to_string(),
                session: session.to_string(),
            });
        };
        if matches.len() > 1 {
            warn!(
                suffix = %self.suffix,
                count = matches.len(),
                chosen = ?first,
                "several files match mask query, using the first"
            );
        }

        debug!(suffix = %self.suffix, subject, session, path = ?first, "resolved mask file");
        self.paths
            .insert((session.to_string(), subject.to_string()), first);
        Ok(())
    }

    pub fn path(&self, row: &Row) -> Result<&Path, MaskError> {
        self.paths
            .get(&(row.session.clone(), row.subject.clone()))
            .map(PathBuf::as_path)
            .ok_or_else(|| MaskError::PathNotResolved {
                mask: self.suffix.clone(),
                subject: row.subject.clone(),
                session: row.session.clone(),
            })
    }
}

/// Where the raw data of a mask comes from.
#[derive(Clone, Debug)]
pub enum Source {
    /// A file found in the dataset.
    File(FileSource),
    /// Every voxel of the diffusion volume.
    Full,
    /// A derived scalar map of the diffusion data.
    Scalar(Scalar),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::File(file) => format!("file '{}'", file.suffix()),
            Source::Full => "full volume".to_string(),
            Source::Scalar(scalar) => format!("scalar '{scalar}'"),
        }
    }

    pub fn find_path(
        &mut self,
        dataset: &dyn DatasetQuery,
        subject: &str,
        session: &str,
    ) -> Result<(), MaskError> {
        match self {
            Source::File(file) => file.find_path(dataset, subject, session),
            Source::Full | Source::Scalar(_) => Ok(()),
        }
    }

    pub fn resolve(
        &self,
        ctx: &MaskContext<'_>,
        row: &Row,
        dwi: &DwiImage,
    ) -> Result<Resolved, MaskError> {
        match self {
            Source::File(file) => {
                let path = file.path(row)?;
                let image = ctx.loader.load(path)?;
                Ok(Resolved {
                    source: path.display().to_string(),
                    data: image.data,
                    affine: Some(image.affine),
                })
            }
            Source::Full => Ok(Resolved {
                source: FULL_VOLUME_SOURCE.to_string(),
                data: MaskArray::Float(ArrayD::ones(IxDyn(dwi.spatial_shape()))),
                affine: None,
            }),
            Source::Scalar(scalar) => {
                let available = ctx.diffusion.available_scalars();
                if !available.contains(scalar) {
                    return Err(MaskError::UnsupportedScalar {
                        value: scalar.to_string(),
                        valid: Scalar::join(available),
                    });
                }
                let path = ctx.diffusion.scalar_path(*scalar, row)?;
                let image = ctx.loader.load(&path)?;
                Ok(Resolved {
                    source: path.display().to_string(),
                    data: image.data,
                    affine: Some(image.affine),
                })
            }
        }
    }
}
