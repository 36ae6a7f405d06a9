use std::path::PathBuf;
use thiserror::Error;

/// Failures that belong to a single document or package.
///
/// None of these abort a batch: the pipeline logs them and moves on to the
/// next application.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed document {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("document not found: {0}")]
    MissingDocument(PathBuf),

    #[error("unrecognized package naming format: {0}")]
    UnrecognizedPackage(String),

    #[error("name oracle failed: {0}")]
    Oracle(String),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            return EngineError::MissingDocument(path);
        }
        EngineError::Io { path, source }
    }

    pub fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        EngineError::Malformed {
            path: path.into(),
            source,
        }
    }

    /// True when the error only means "this input was never produced".
    pub fn is_missing(&self) -> bool {
        matches!(self, EngineError::MissingDocument(_))
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
