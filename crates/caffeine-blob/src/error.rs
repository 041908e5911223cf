use thiserror::Error;

/// An error type for blob operations.
#[derive(Error, Debug, PartialEq)]
pub enum BlobError {
    /// The number of values does not match the requested shape.
    #[error("Shape mismatch: expected {expected} elements for shape, but got {actual} elements in data")]
    InvalidShape {
        /// Expected number of elements based on shape
        expected: usize,
        /// Actual number of elements in the data
        actual: usize,
    },

    /// Two blobs were expected to share a shape.
    #[error("Blob shapes differ: {0:?} != {1:?}")]
    ShapeMismatch([usize; 4], [usize; 4]),

    /// Index exceeds blob bounds.
    #[error("Index {index:?} out of bounds for blob of shape {shape:?}")]
    IndexOutOfBounds {
        /// The invalid index that was attempted
        index: [usize; 4],
        /// The shape of the blob
        shape: [usize; 4],
    },
}
