#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! Layers delegate their numeric work to a [`Backend`]. Two implementations share one
//! numeric contract:
//!
//! - [`CpuBackend`]: runs on host memory on the calling thread.
//! - [`ParallelBackend`]: runs on device memory, splitting the output rows over a worker pool
//!   and joining before it returns.
//!
//! ```rust
//! use caffeine_blas::{Backend, CpuBackend, Transpose};
//!
//! let a = [1.0f32, 2.0, 3.0, 4.0];
//! let b = [1.0f32, 0.0, 0.0, 1.0];
//! let mut c = [0.0f32; 4];
//! CpuBackend::new()
//!     .gemm(Transpose::NoTrans, Transpose::NoTrans, 2, 2, 2, 1.0, &a, &b, 0.0, &mut c)
//!     .unwrap();
//! assert_eq!(c, a);
//! ```

/// Backend trait and its host and device implementations.
pub mod backend;

/// Scalar types supported by the backends.
pub mod dtype;

/// Error types for backend operations.
pub mod error;

/// Transpose flags and operand layouts.
pub mod gemm;

pub use crate::backend::{Backend, CpuBackend, ParallelBackend};
pub use crate::dtype::Dtype;
pub use crate::error::BlasError;
pub use crate::gemm::Transpose;
