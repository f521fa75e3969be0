use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of a [`MaskError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The mask tree or one of its options is invalid.
    Configuration,
    /// Something the mask needs could not be found.
    Lookup,
    /// A collaborator failed to load or resample data.
    Io,
}

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("combine should be either 'or' or 'and', you set combine to {value}")]
    InvalidOperator { value: String },

    #[error("scalar should be one of {valid}, you input {value}")]
    UnsupportedScalar { value: String, valid: String },

    #[error("combined mask needs at least one child mask")]
    EmptyCombination,

    #[error("{what} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("{mask} is not a valid mask: {reason}")]
    InvalidMaskNode { mask: String, reason: String },

    #[error(
        "no path resolved for mask '{mask}' (subject {subject}, session {session}); call find_path first"
    )]
    PathNotResolved {
        mask: String,
        subject: String,
        session: String,
    },

    #[error(
        "no file with suffix '{suffix}' in scope {scope} for subject {subject}, session {session}"
    )]
    NoMatchingFile {
        suffix: String,
        scope: String,
        subject: String,
        session: String,
    },

    #[error("failed to load image {path:?}: {reason}")]
    Image { path: PathBuf, reason: String },

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MaskError::InvalidOperator { .. }
            | MaskError::UnsupportedScalar { .. }
            | MaskError::EmptyCombination
            | MaskError::ShapeMismatch { .. }
            | MaskError::InvalidMaskNode { .. }
            | MaskError::Json(_) => ErrorKind::Configuration,
            MaskError::PathNotResolved { .. } | MaskError::NoMatchingFile { .. } => {
                ErrorKind::Lookup
            }
            MaskError::Image { .. } | MaskError::Resample(_) | MaskError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_lookup(&self) -> bool {
        self.kind() == ErrorKind::Lookup
    }
}
