use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the background removal pipeline.
///
/// # Why structured errors
///
/// Each variant captures context specific to its failure domain (input validation,
/// model loading, inference, compositing, filesystem), so callers can decide between
/// reporting, retrying initialization or falling back to the original image without
/// parsing error strings.
#[derive(Error, Debug)]
pub enum PrivacutError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Model file not found (searched: {searched:?})")]
    ModelMissing { searched: Vec<PathBuf> },

    #[error("Model load error: {operation} failed for {path:?}")]
    ModelLoadFailed {
        path: PathBuf,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Inference session is not ready")]
    SessionNotReady,

    #[error("Inference error: {operation} failed")]
    InferenceFailed {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Dimension mismatch: image is {expected:?}, mask is {actual:?}")]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Background removal was cancelled")]
    Cancelled,

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

pub type Result<T> = std::result::Result<T, PrivacutError>;

impl PrivacutError {
    pub(crate) fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    /// Model loading failure for `path`. The cause is kept as the error source.
    pub(crate) fn model_load(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::ModelLoadFailed {
            path: path.into(),
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Runtime failure during inference. Accepts any error (kept as the source) or a
    /// plain message.
    pub(crate) fn inference(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::InferenceFailed {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Whether the caller should fall back to the unmodified image rather than report
    /// a contract violation.
    pub const fn is_recoverable_by_fallback(&self) -> bool {
        matches!(
            self,
            Self::SessionNotReady | Self::InferenceFailed { .. } | Self::Cancelled
        )
    }
}

/// Convert I/O errors to filesystem errors.
///
/// # Why default values for context
///
/// Some I/O errors occur without specific path/operation context. Code that has
/// context should construct `PrivacutError::FileSystem` directly.
impl From<std::io::Error> for PrivacutError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// Convert image crate errors to image processing errors.
impl From<image::ImageError> for PrivacutError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to inference errors.
///
/// Shape errors only show up while moving tensors in and out of the runtime, so they
/// are reported as inference failures rather than a separate tensor error type.
impl From<ndarray::ShapeError> for PrivacutError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::InferenceFailed {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
