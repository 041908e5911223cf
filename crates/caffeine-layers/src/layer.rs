//! The contract between a layer and its host network.
//!
//! A host holds the activation blobs and calls, for every layer:
//!
//! 1. [`Layer::setup`] once, which checks the blob counts, allocates the parameters and
//!    shapes the top blobs;
//! 2. [`Layer::forward`] in layer order and [`Layer::backward`] in reverse order, for as many
//!    iterations as it likes. [`Layer::reshape`] may be called in between when the bottom
//!    shapes change.

use std::sync::Arc;

use caffeine_blas::{Backend, Dtype};
use caffeine_blob::Blob;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{
    cross_entropy::CrossEntropyLayer, error::LayerError, inner_product::InnerProductLayer,
    param::LayerParameter,
};

/// The closed set of layer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerType {
    /// Fully-connected affine map.
    InnerProduct,
    /// Cross entropy loss between predictions and targets.
    CrossEntropy,
}

impl LayerType {
    /// Returns the display name of the layer type.
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerType::InnerProduct => "InnerProduct",
            LayerType::CrossEntropy => "CrossEntropy",
        }
    }
}

impl std::fmt::Display for LayerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of computation with a forward and a backward pass.
///
/// Bottom and top blobs are owned by the host; a layer owns only its parameter blobs.
pub trait Layer<T: Dtype> {
    /// Returns the layer type.
    fn layer_type(&self) -> LayerType;

    /// Returns the configuration the layer was built from.
    fn param(&self) -> &LayerParameter;

    /// Number of bottom blobs the layer requires.
    fn exact_num_bottom_blobs(&self) -> usize;

    /// Number of top blobs the layer requires.
    fn exact_num_top_blobs(&self) -> usize;

    /// Checks the blob counts, allocates the parameters and shapes the top blobs.
    fn setup(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        self.check_blob_counts(bottom.len(), top.len())?;
        self.layer_setup(bottom, top)?;
        self.reshape(bottom, top)
    }

    /// One-time setup run by [`Layer::setup`] before the first [`Layer::reshape`].
    fn layer_setup(
        &mut self,
        _bottom: &mut [&mut Blob<T>],
        _top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        Ok(())
    }

    /// Adapts the top blobs and internal buffers to the current bottom shapes.
    fn reshape(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError>;

    /// Computes the top blobs from the bottom blobs.
    fn forward(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError>;

    /// Computes parameter gradients and, where `propagate_down` is set, bottom gradients
    /// from the top gradients.
    ///
    /// Returns the loss this layer contributes, zero for non-loss layers.
    fn backward(
        &mut self,
        top: &mut [&mut Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<T, LayerError>;

    /// The learnable parameter blobs.
    fn blobs(&self) -> &[Blob<T>];

    /// The learnable parameter blobs, for a solver to update.
    fn blobs_mut(&mut self) -> &mut [Blob<T>];

    /// Fails unless the blob counts match [`Layer::exact_num_bottom_blobs`] and
    /// [`Layer::exact_num_top_blobs`].
    fn check_blob_counts(&self, num_bottom: usize, num_top: usize) -> Result<(), LayerError> {
        let layer = self.layer_type().as_str();
        if num_bottom != self.exact_num_bottom_blobs() {
            return Err(LayerError::BlobCount {
                layer,
                kind: "bottom",
                expected: self.exact_num_bottom_blobs(),
                actual: num_bottom,
            });
        }
        if num_top != self.exact_num_top_blobs() {
            return Err(LayerError::BlobCount {
                layer,
                kind: "top",
                expected: self.exact_num_top_blobs(),
                actual: num_top,
            });
        }
        Ok(())
    }
}

/// Builds the layer described by `param`, computing on `backend`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn create_layer<T: Dtype>(
    param: LayerParameter,
    backend: Arc<dyn Backend<T>>,
) -> Result<Box<dyn Layer<T>>, LayerError> {
    Ok(match param.layer_type {
        LayerType::InnerProduct => Box::new(InnerProductLayer::new(param, backend)?),
        LayerType::CrossEntropy => Box::new(CrossEntropyLayer::new(param, backend)?),
    })
}

/// Converts a number to the layer scalar type.
pub(crate) fn cast<T: Dtype, U: ToPrimitive>(value: U) -> T {
    T::from(value).unwrap_or_else(T::nan)
}
