#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]
//!
//! # Overview
//!
//! Layers implement the [`Layer`] trait: a host network calls [`Layer::setup`] once, then
//! [`Layer::forward`] and [`Layer::backward`] on every iteration. Each layer computes through
//! a shared [`caffeine_blas::Backend`] handle and reads its blobs on that backend's device.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use caffeine_blas::CpuBackend;
//! use caffeine_blob::Blob;
//! use caffeine_layers::{create_layer, param::FillerParameter, LayerParameter};
//!
//! let param = LayerParameter::inner_product(2)
//!     .with_weight_filler(FillerParameter::Constant { value: 1.0 });
//! let mut layer = create_layer::<f32>(param, Arc::new(CpuBackend::new())).unwrap();
//!
//! let mut bottom = Blob::from_vec([1, 3, 1, 1], vec![1.0, 2.0, 3.0]).unwrap();
//! let mut top = Blob::default();
//! layer.setup(&mut [&mut bottom], &mut [&mut top]).unwrap();
//! layer.forward(&mut [&mut bottom], &mut [&mut top]).unwrap();
//! assert_eq!(top.cpu_data(), &[6.0, 6.0]);
//! ```

/// Cross entropy loss layer.
pub mod cross_entropy;

/// Error types for layer operations.
pub mod error;

/// Initialization strategies for parameter blobs.
pub mod filler;

/// Fully-connected layer.
pub mod inner_product;

/// The layer trait, the layer type tag and the layer factory.
pub mod layer;

/// Layer configuration records.
pub mod param;

pub use crate::cross_entropy::CrossEntropyLayer;
pub use crate::error::LayerError;
pub use crate::filler::{get_filler, Filler};
pub use crate::inner_product::InnerProductLayer;
pub use crate::layer::{create_layer, Layer, LayerType};
pub use crate::param::LayerParameter;
