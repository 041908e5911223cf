//! Fully-connected layer.
//!
//! Computes `top = bottom * W + bias` where `bottom` is read as an `M x K` matrix (one row
//! per sample), `W` is `K x N` and the bias row is broadcast to every sample through an
//! outer product with an all-ones column of length `M`.

use std::sync::Arc;

use caffeine_blas::{Backend, Dtype, Transpose};
use caffeine_blob::{Blob, SyncedMemory};

use crate::{
    error::LayerError,
    filler::get_filler,
    layer::{Layer, LayerType},
    param::LayerParameter,
};

const NAME: &str = "InnerProduct";

/// Fully-connected layer with an optional bias.
///
/// Parameter blobs: `blobs()[0]` is the weight, shaped `(1, 1, K, N)`; `blobs()[1]`, present
/// only with a bias, is shaped `(1, 1, 1, N)`.
pub struct InnerProductLayer<T: Dtype> {
    param: LayerParameter,
    backend: Arc<dyn Backend<T>>,
    blobs: Vec<Blob<T>>,
    bias_term: bool,
    // all ones, length m
    bias_multiplier: SyncedMemory<T>,
    m: usize,
    k: usize,
    n: usize,
    ready: bool,
}

impl<T: Dtype> InnerProductLayer<T> {
    /// Creates an unconfigured layer. Nothing is allocated until [`Layer::setup`].
    ///
    /// # Errors
    ///
    /// Returns an error if `param` is not a valid inner product configuration.
    pub fn new(param: LayerParameter, backend: Arc<dyn Backend<T>>) -> Result<Self, LayerError> {
        if param.layer_type != LayerType::InnerProduct {
            return Err(LayerError::invalid_parameter(
                "type",
                format!("expected inner_product, got {}", param.layer_type),
            ));
        }
        param.validate()?;
        Ok(Self {
            bias_term: param.inner_product_param.bias_term,
            n: param.inner_product_param.num_output,
            param,
            backend,
            blobs: Vec::new(),
            bias_multiplier: SyncedMemory::new(0),
            m: 0,
            k: 0,
            ready: false,
        })
    }

    /// Returns `(M, K, N)`: batch size, flattened input size and output width.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.m, self.k, self.n)
    }

    fn check_ready(&self) -> Result<(), LayerError> {
        if self.ready {
            Ok(())
        } else {
            Err(LayerError::NotSetUp(NAME))
        }
    }

    fn check_bottom(&self, bottom: &Blob<T>) -> Result<(), LayerError> {
        if bottom.count() != self.m * self.k {
            return Err(LayerError::shape_mismatch(
                NAME,
                format!(
                    "bottom has {} elements, expected {} x {}; call reshape after changing the input",
                    bottom.count(),
                    self.m,
                    self.k
                ),
            ));
        }
        Ok(())
    }
}

impl<T: Dtype> Layer<T> for InnerProductLayer<T> {
    fn layer_type(&self) -> LayerType {
        LayerType::InnerProduct
    }

    fn param(&self) -> &LayerParameter {
        &self.param
    }

    fn exact_num_bottom_blobs(&self) -> usize {
        1
    }

    fn exact_num_top_blobs(&self) -> usize {
        1
    }

    fn layer_setup(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        _top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        let input = &bottom[0];
        if input.num() == 0 {
            return Err(LayerError::shape_mismatch(NAME, "bottom has an empty batch"));
        }
        self.k = input.count() / input.num();
        let ip = &self.param.inner_product_param;

        let mut weight = Blob::new(1, 1, self.k, self.n);
        get_filler::<T>(&ip.weight_filler)?.fill(&mut weight)?;
        self.blobs = vec![weight];

        if self.bias_term {
            let mut bias = Blob::new(1, 1, 1, self.n);
            get_filler::<T>(&ip.bias_filler.salted(1))?.fill(&mut bias)?;
            self.blobs.push(bias);
        }

        log::debug!(
            "{} '{}' set up: K={} N={} bias={}",
            NAME,
            self.param.name,
            self.k,
            self.n,
            self.bias_term
        );
        Ok(())
    }

    fn reshape(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        self.check_blob_counts(bottom.len(), top.len())?;
        if self.blobs.is_empty() {
            return Err(LayerError::NotSetUp(NAME));
        }
        let input = &bottom[0];
        let m = input.num();
        if m == 0 || input.count() / m != self.k || input.count() % m != 0 {
            return Err(LayerError::shape_mismatch(
                NAME,
                format!(
                    "bottom shape {:?} is incompatible with {} inputs per sample",
                    input.shape(),
                    self.k
                ),
            ));
        }
        self.m = m;
        top[0].reshape(m, self.n, 1, 1);
        if self.bias_term && self.bias_multiplier.len() != m {
            self.bias_multiplier = SyncedMemory::from_vec(vec![T::one(); m]);
        }
        self.ready = true;
        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        self.check_ready()?;
        self.check_blob_counts(bottom.len(), top.len())?;
        self.check_bottom(&bottom[0])?;

        let (m, k, n) = (self.m, self.k, self.n);
        let device = self.backend.device();
        let bottom_data = bottom[0].data(device);
        let top_data = top[0].mutable_data(device);

        self.backend.gemm(
            Transpose::NoTrans,
            Transpose::NoTrans,
            m,
            n,
            k,
            T::one(),
            bottom_data,
            self.blobs[0].data(device),
            T::zero(),
            top_data,
        )?;
        if self.bias_term {
            self.backend.gemm(
                Transpose::NoTrans,
                Transpose::NoTrans,
                m,
                n,
                1,
                T::one(),
                self.bias_multiplier.data(device),
                self.blobs[1].data(device),
                T::one(),
                top_data,
            )?;
        }
        self.backend.synchronize()?;
        Ok(())
    }

    fn backward(
        &mut self,
        top: &mut [&mut Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<T, LayerError> {
        self.check_ready()?;
        self.check_blob_counts(bottom.len(), top.len())?;
        if propagate_down.len() != bottom.len() {
            return Err(LayerError::PropagateDownCount {
                layer: NAME,
                expected: bottom.len(),
                actual: propagate_down.len(),
            });
        }
        self.check_bottom(&bottom[0])?;

        let (m, k, n) = (self.m, self.k, self.n);
        let device = self.backend.device();
        let top_diff = top[0].diff(device);

        // gradient with respect to weight
        self.backend.gemm(
            Transpose::Trans,
            Transpose::NoTrans,
            k,
            n,
            m,
            T::one(),
            bottom[0].data(device),
            top_diff,
            T::zero(),
            self.blobs[0].mutable_diff(device),
        )?;
        if self.bias_term {
            // gradient with respect to bias
            self.backend.gemv(
                Transpose::Trans,
                m,
                n,
                T::one(),
                top_diff,
                self.bias_multiplier.data(device),
                T::zero(),
                self.blobs[1].mutable_diff(device),
            )?;
        }
        if propagate_down[0] {
            // gradient with respect to bottom data
            self.backend.gemm(
                Transpose::NoTrans,
                Transpose::Trans,
                m,
                k,
                n,
                T::one(),
                top_diff,
                self.blobs[0].data(device),
                T::zero(),
                bottom[0].mutable_diff(device),
            )?;
        }
        self.backend.synchronize()?;
        Ok(T::zero())
    }

    fn blobs(&self) -> &[Blob<T>] {
        &self.blobs
    }

    fn blobs_mut(&mut self) -> &mut [Blob<T>] {
        &mut self.blobs
    }
}
