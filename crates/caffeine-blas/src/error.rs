use thiserror::Error;

/// An error type for backend operations.
#[derive(Error, Debug, PartialEq)]
pub enum BlasError {
    /// An operand is too small for the requested dimensions. The kernel is not launched.
    #[error("Dimension mismatch for operand {operand}: need {required} elements, got {actual}")]
    DimensionMismatch {
        /// Name of the offending operand
        operand: &'static str,
        /// Number of elements the dimensions require
        required: usize,
        /// Number of elements provided
        actual: usize,
    },

    /// The device could not be initialized.
    #[error("Failed to initialize device: {0}")]
    DeviceInit(String),
}
