#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! A [`Blob`] is a 4-D array `(num, channels, height, width)` holding a value array and a
//! gradient array of the same size. Each array lives in a [`SyncedMemory`] which keeps a host
//! copy and a device copy and copies between them only when the non-authoritative side is
//! requested.
//!
//! ```rust
//! use caffeine_blob::{Blob, Device};
//!
//! let mut blob = Blob::<f32>::from_vec([1, 1, 2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
//! blob.mutable_data(Device::Parallel)[0] = 10.0;
//! assert_eq!(blob.cpu_data(), &[10.0, 2.0, 3.0, 4.0]);
//! ```

/// Blob module containing the paired value/gradient buffer.
pub mod blob;

/// Device module containing the memory residency tag.
pub mod device;

/// Error types for blob operations.
pub mod error;

/// Memory module containing lazily synchronised host/device arrays.
pub mod memory;

pub use crate::blob::Blob;
pub use crate::device::Device;
pub use crate::error::BlobError;
pub use crate::memory::{SyncHead, SyncedMemory};
