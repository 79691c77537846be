use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Why a single entry could not be completed. None of these abort the batch.
#[derive(Debug, Error)]
pub enum EntryError {
    #[error("ambiguous sidecar match for {media}: {candidates} media files share key {key:?}")]
    ClassificationAmbiguous {
        media: PathBuf,
        key: String,
        candidates: usize,
    },

    #[error("no metadata found for {0}")]
    NoMetadataFound(PathBuf),

    #[error("could not rename {media} and its sidecar consistently: {reason}")]
    RenameInconsistency { media: PathBuf, reason: String },

    #[error("metadata tool failed on {media}: {reason}")]
    ExternalToolFailure { media: PathBuf, reason: String },

    #[error("destination already exists: {0}")]
    DestinationCollision(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EntryError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EntryError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            EntryError::ClassificationAmbiguous { .. } => FailureKind::ClassificationAmbiguous,
            EntryError::NoMetadataFound(_) => FailureKind::NoMetadataFound,
            EntryError::RenameInconsistency { .. } => FailureKind::RenameInconsistency,
            EntryError::ExternalToolFailure { .. } => FailureKind::ExternalToolFailure,
            EntryError::DestinationCollision(_) => FailureKind::DestinationCollision,
            EntryError::Io { .. } => FailureKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ClassificationAmbiguous,
    NoMetadataFound,
    RenameInconsistency,
    ExternalToolFailure,
    DestinationCollision,
    Io,
}

/// A failed entry as it appears in the run result.
#[derive(Debug, Clone, Serialize)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

impl EntryFailure {
    pub fn new(path: impl Into<PathBuf>, err: &EntryError) -> Self {
        Self {
            path: path.into(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
