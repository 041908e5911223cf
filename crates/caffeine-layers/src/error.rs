use caffeine_blas::BlasError;
use caffeine_blob::BlobError;
use thiserror::Error;

/// An error type for layer operations.
///
/// Every variant except [`LayerError::Blas`] describes a network that was assembled
/// incorrectly; hosts are expected to treat them as fatal.
#[derive(Error, Debug, PartialEq)]
pub enum LayerError {
    /// A layer received the wrong number of bottom or top blobs.
    #[error("{layer} layer takes exactly {expected} {kind} blob(s), got {actual}")]
    BlobCount {
        /// The layer type name
        layer: &'static str,
        /// `"bottom"` or `"top"`
        kind: &'static str,
        /// Number of blobs the layer requires
        expected: usize,
        /// Number of blobs provided
        actual: usize,
    },

    /// The `propagate_down` flags do not match the bottom blobs.
    #[error("{layer} layer got {actual} propagate_down flag(s) for {expected} bottom blob(s)")]
    PropagateDownCount {
        /// The layer type name
        layer: &'static str,
        /// Number of bottom blobs
        expected: usize,
        /// Number of flags provided
        actual: usize,
    },

    /// Blob shapes are incompatible with the layer.
    #[error("{layer} layer shape mismatch: {message}")]
    ShapeMismatch {
        /// The layer type name
        layer: &'static str,
        /// Description of the mismatch
        message: String,
    },

    /// `forward` or `backward` was called before `setup`.
    #[error("{0} layer used before setup")]
    NotSetUp(&'static str),

    /// A configuration value is out of range.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// The parameter name
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Gradients were requested for an input that cannot receive them.
    #[error("{layer} layer cannot backpropagate to bottom blob {index}")]
    CannotBackpropagate {
        /// The layer type name
        layer: &'static str,
        /// Index of the bottom blob
        index: usize,
    },

    /// Blob error
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Backend error
    #[error(transparent)]
    Blas(#[from] BlasError),
}

impl LayerError {
    pub(crate) fn shape_mismatch(layer: &'static str, message: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            layer,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}
