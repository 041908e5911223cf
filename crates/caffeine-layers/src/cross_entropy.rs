//! Cross entropy loss.
//!
//! Bottom blobs are `[predictions, targets]` of equal shape. The leading axis is the batch
//! (`outer_num` samples) and the remaining axes are flattened into `inner_num` values per
//! sample. With `inner_num > 1` each sample contributes the categorical loss
//! `-sum(t * ln p)`; with `inner_num == 1` it contributes the binary loss
//! `-(t * ln p + (1 - t) * ln(1 - p))`. Predictions are clamped to `[eps, 1 - eps]` first.

use std::sync::Arc;

use caffeine_blas::{Backend, Dtype};
use caffeine_blob::Blob;

use crate::{
    error::LayerError,
    layer::{cast, Layer, LayerType},
    param::LayerParameter,
};

const NAME: &str = "CrossEntropy";

/// Loss of one sample.
fn sample_loss<T: Dtype>(pred: &[T], target: &[T], eps: T) -> T {
    let one = T::one();
    if let ([p], [t]) = (pred, target) {
        let p = clamp(*p, eps);
        return -(*t * p.ln() + (one - *t) * (one - p).ln());
    }
    pred.iter()
        .zip(target.iter())
        .fold(T::zero(), |acc, (&p, &t)| acc - t * clamp(p, eps).ln())
}

/// Derivative of [`sample_loss`] with respect to one prediction.
fn prediction_grad<T: Dtype>(p: T, t: T, eps: T, binary: bool) -> T {
    let p = clamp(p, eps);
    if binary {
        (p - t) / (p * (T::one() - p))
    } else {
        -t / p
    }
}

#[inline]
fn clamp<T: Dtype>(p: T, eps: T) -> T {
    p.max(eps).min(T::one() - eps)
}

/// Cross entropy between a prediction blob and a target blob, reduced to a scalar.
///
/// The top blob holds the loss, shaped `(1, 1, 1, 1)`. In [`Layer::backward`] the
/// prediction gradient is scaled by the top gradient, which the host seeds with the loss
/// weight. Targets never receive a gradient.
pub struct CrossEntropyLayer<T: Dtype> {
    param: LayerParameter,
    backend: Arc<dyn Backend<T>>,
    epsilon: T,
    normalize: bool,
    outer_num: usize,
    inner_num: usize,
    loss: T,
    ready: bool,
}

impl<T: Dtype> CrossEntropyLayer<T> {
    /// Creates an unconfigured layer.
    ///
    /// # Errors
    ///
    /// Returns an error if `param` is not a valid cross entropy configuration.
    pub fn new(param: LayerParameter, backend: Arc<dyn Backend<T>>) -> Result<Self, LayerError> {
        if param.layer_type != LayerType::CrossEntropy {
            return Err(LayerError::invalid_parameter(
                "type",
                format!("expected cross_entropy, got {}", param.layer_type),
            ));
        }
        param.validate()?;
        // 1 - eps must stay below one in T
        let requested = cast::<T, _>(param.cross_entropy_param.epsilon);
        let epsilon = requested.max(T::epsilon());
        if epsilon > requested {
            log::debug!(
                "{} '{}': epsilon {} raised to {:?} for this precision",
                NAME,
                param.name,
                param.cross_entropy_param.epsilon,
                epsilon
            );
        }
        Ok(Self {
            epsilon,
            normalize: param.cross_entropy_param.normalize,
            param,
            backend,
            outer_num: 0,
            inner_num: 0,
            loss: T::zero(),
            ready: false,
        })
    }

    /// Returns `(outer_num, inner_num)`: samples per batch and values per sample.
    pub fn dims(&self) -> (usize, usize) {
        (self.outer_num, self.inner_num)
    }

    /// Returns the loss computed by the last forward pass.
    pub fn loss(&self) -> T {
        self.loss
    }

    fn normalizer(&self) -> T {
        if self.normalize {
            cast(self.outer_num)
        } else {
            T::one()
        }
    }

    fn check_ready(
        &self,
        bottom: &[&mut Blob<T>],
        top: &[&mut Blob<T>],
    ) -> Result<(), LayerError> {
        if !self.ready {
            return Err(LayerError::NotSetUp(NAME));
        }
        if top[0].count() != 1 {
            return Err(LayerError::shape_mismatch(
                NAME,
                format!("top has {} elements, expected 1", top[0].count()),
            ));
        }
        let expected = self.outer_num * self.inner_num;
        for blob in bottom {
            if blob.count() != expected {
                return Err(LayerError::shape_mismatch(
                    NAME,
                    format!(
                        "bottom has {} elements, expected {}; call reshape after changing the input",
                        blob.count(),
                        expected
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl<T: Dtype> Layer<T> for CrossEntropyLayer<T> {
    fn layer_type(&self) -> LayerType {
        LayerType::CrossEntropy
    }

    fn param(&self) -> &LayerParameter {
        &self.param
    }

    fn exact_num_bottom_blobs(&self) -> usize {
        2
    }

    fn exact_num_top_blobs(&self) -> usize {
        1
    }

    fn reshape(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        self.check_blob_counts(bottom.len(), top.len())?;
        let (pred, target) = (&bottom[0], &bottom[1]);
        if pred.num() == 0 {
            return Err(LayerError::shape_mismatch(NAME, "predictions have an empty batch"));
        }
        if pred.num() != target.num() || pred.count() != target.count() {
            return Err(LayerError::shape_mismatch(
                NAME,
                format!(
                    "predictions {:?} and targets {:?} differ",
                    pred.shape(),
                    target.shape()
                ),
            ));
        }
        self.outer_num = pred.num();
        self.inner_num = pred.count() / self.outer_num;
        top[0].reshape(1, 1, 1, 1);
        self.ready = true;
        log::debug!(
            "{} '{}' reshaped: outer_num={} inner_num={}",
            NAME,
            self.param.name,
            self.outer_num,
            self.inner_num
        );
        Ok(())
    }

    fn forward(
        &mut self,
        bottom: &mut [&mut Blob<T>],
        top: &mut [&mut Blob<T>],
    ) -> Result<(), LayerError> {
        self.check_blob_counts(bottom.len(), top.len())?;
        self.check_ready(bottom, top)?;

        let (outer_num, inner_num) = (self.outer_num, self.inner_num);
        let eps = self.epsilon;
        let device = self.backend.device();
        let (pred_blob, target_blob) = bottom.split_at_mut(1);
        let pred = pred_blob[0].data(device);
        let target = target_blob[0].data(device);

        if log::log_enabled!(log::Level::Warn) {
            let clamped = pred.iter().filter(|&&p| clamp(p, eps) != p).count();
            if clamped > 0 {
                log::warn!(
                    "{} '{}': clamped {} prediction(s) to [{:?}, 1 - {:?}]",
                    NAME,
                    self.param.name,
                    clamped,
                    eps,
                    eps
                );
            }
        }

        let mut per_sample = vec![T::zero(); outer_num];
        self.backend.for_each_row(&mut per_sample, 1, &|i, out| {
            let range = i * inner_num..(i + 1) * inner_num;
            out[0] = sample_loss(&pred[range.clone()], &target[range], eps);
        });
        self.backend.synchronize()?;

        let total = per_sample.iter().fold(T::zero(), |acc, &v| acc + v);
        self.loss = total / self.normalizer();
        top[0].mutable_data(device)[0] = self.loss;
        Ok(())
    }

    fn backward(
        &mut self,
        top: &mut [&mut Blob<T>],
        propagate_down: &[bool],
        bottom: &mut [&mut Blob<T>],
    ) -> Result<T, LayerError> {
        self.check_blob_counts(bottom.len(), top.len())?;
        if propagate_down.len() != bottom.len() {
            return Err(LayerError::PropagateDownCount {
                layer: NAME,
                expected: bottom.len(),
                actual: propagate_down.len(),
            });
        }
        if propagate_down[1] {
            return Err(LayerError::CannotBackpropagate {
                layer: NAME,
                index: 1,
            });
        }
        self.check_ready(bottom, top)?;

        if propagate_down[0] {
            let inner_num = self.inner_num;
            let binary = inner_num == 1;
            let eps = self.epsilon;
            let device = self.backend.device();
            let scale = top[0].diff(device)[0] / self.normalizer();

            let (pred_blob, target_blob) = bottom.split_at_mut(1);
            let target = target_blob[0].data(device);
            let (pred, pred_diff) = pred_blob[0].data_and_mutable_diff(device);
            self.backend.for_each_row(pred_diff, inner_num, &|i, row| {
                let offset = i * inner_num;
                for (j, d) in row.iter_mut().enumerate() {
                    let (p, t) = (pred[offset + j], target[offset + j]);
                    *d = prediction_grad(p, t, eps, binary) * scale;
                }
            });
            self.backend.synchronize()?;
        }
        Ok(self.loss)
    }

    fn blobs(&self) -> &[Blob<T>] {
        &[]
    }

    fn blobs_mut(&mut self) -> &mut [Blob<T>] {
        &mut []
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use caffeine_blas::CpuBackend;

    fn layer() -> CrossEntropyLayer<f64> {
        CrossEntropyLayer::new(LayerParameter::cross_entropy(), Arc::new(CpuBackend::new()))
            .unwrap()
    }

    #[test]
    fn test_reshape_dims() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::<f64>::new(4, 3, 2, 1);
        let mut target = Blob::<f64>::new(4, 6, 1, 1);
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        assert_eq!(layer.dims(), (4, 6));
        assert_eq!(top.shape(), [1, 1, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_reshape_mismatch() {
        let mut layer = layer();
        let mut pred = Blob::<f64>::new(2, 3, 1, 1);
        let mut target = Blob::<f64>::new(2, 2, 1, 1);
        let mut top = Blob::default();
        let res = layer.setup(&mut [&mut pred, &mut target], &mut [&mut top]);
        assert!(matches!(res, Err(LayerError::ShapeMismatch { .. })));

        let res = layer.setup(&mut [&mut pred], &mut [&mut top]);
        assert!(matches!(res, Err(LayerError::BlobCount { kind: "bottom", .. })));
    }

    #[test]
    fn test_forward_categorical() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([1, 2, 1, 1], vec![0.9, 0.1])?;
        let mut target = Blob::from_vec([1, 2, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        assert_relative_eq!(top.cpu_data()[0], -(0.9f64.ln()), epsilon = 1e-12);
        assert_relative_eq!(layer.loss(), -(0.9f64.ln()), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_forward_binary_per_sample() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([2, 1, 1, 1], vec![0.9, 0.1])?;
        let mut target = Blob::from_vec([2, 1, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        assert_relative_eq!(top.cpu_data()[0], -(0.9f64.ln()), epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_forward_without_normalize() -> Result<(), LayerError> {
        let param = LayerParameter::cross_entropy().with_normalize(false);
        let mut layer = CrossEntropyLayer::<f64>::new(param, Arc::new(CpuBackend::new()))?;
        let mut pred = Blob::from_vec([2, 2, 1, 1], vec![0.5, 0.5, 0.25, 0.75])?;
        let mut target = Blob::from_vec([2, 2, 1, 1], vec![1.0, 0.0, 0.0, 1.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        let expected = -(0.5f64.ln()) - 0.75f64.ln();
        assert_relative_eq!(top.cpu_data()[0], expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_forward_clamps_zero_predictions() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([2, 2, 1, 1], vec![0.0, 1.0, 1.0, 0.0])?;
        let mut target = Blob::from_vec([2, 2, 1, 1], vec![1.0, 0.0, 1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        let loss = top.cpu_data()[0];
        assert!(loss.is_finite());
        assert!(loss > 0.0);

        top.mutable_cpu_diff()[0] = 1.0;
        layer.backward(&mut [&mut top], &[true, false], &mut [&mut pred, &mut target])?;
        assert!(pred.cpu_diff().iter().all(|d| d.is_finite()));
        Ok(())
    }

    #[test]
    fn test_backward_categorical() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([2, 2, 1, 1], vec![0.8, 0.2, 0.4, 0.6])?;
        let mut target = Blob::from_vec([2, 2, 1, 1], vec![1.0, 0.0, 0.0, 1.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        top.mutable_cpu_diff()[0] = 2.0;

        let loss = layer.backward(&mut [&mut top], &[true, false], &mut [&mut pred, &mut target])?;
        assert_relative_eq!(loss, top.cpu_data()[0]);

        // -t / p * top_diff / outer_num
        let expected = [-1.0 / 0.8, 0.0, 0.0, -1.0 / 0.6];
        for (a, e) in pred.cpu_diff().iter().zip(expected.iter()) {
            assert_relative_eq!(a, e, epsilon = 1e-12);
        }
        assert!(target.cpu_diff().iter().all(|&d| d == 0.0));
        Ok(())
    }

    #[test]
    fn test_backward_binary() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([2, 1, 1, 1], vec![0.8, 0.3])?;
        let mut target = Blob::from_vec([2, 1, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        top.mutable_cpu_diff()[0] = 1.0;
        layer.backward(&mut [&mut top], &[true, false], &mut [&mut pred, &mut target])?;

        // (p - t) / (p (1 - p)) / outer_num
        let expected = [(0.8 - 1.0) / (0.8 * 0.2) / 2.0, 0.3 / (0.3 * 0.7) / 2.0];
        for (a, e) in pred.cpu_diff().iter().zip(expected.iter()) {
            assert_relative_eq!(a, e, epsilon = 1e-12);
        }
        Ok(())
    }

    #[test]
    fn test_backward_rejects_target_gradient() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([1, 2, 1, 1], vec![0.5, 0.5])?;
        let mut target = Blob::from_vec([1, 2, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        let res = layer.backward(&mut [&mut top], &[true, true], &mut [&mut pred, &mut target]);
        assert_eq!(
            res,
            Err(LayerError::CannotBackpropagate {
                layer: "CrossEntropy",
                index: 1
            })
        );
        Ok(())
    }

    #[test]
    fn test_backward_without_propagate_down() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([1, 2, 1, 1], vec![0.5, 0.5])?;
        let mut target = Blob::from_vec([1, 2, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        pred.mutable_cpu_diff().copy_from_slice(&[3.0, 4.0]);
        top.mutable_cpu_diff()[0] = 1.0;
        layer.backward(&mut [&mut top], &[false, false], &mut [&mut pred, &mut target])?;
        assert_eq!(pred.cpu_diff(), &[3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_tiny_epsilon_stays_finite_in_f32() -> Result<(), LayerError> {
        let mut param = LayerParameter::cross_entropy();
        param.cross_entropy_param.epsilon = 1e-9;
        assert!(param.validate().is_ok());
        let mut layer = CrossEntropyLayer::<f32>::new(param, Arc::new(CpuBackend::new()))?;

        let mut pred = Blob::from_vec([2, 1, 1, 1], vec![1.0f32, 0.0])?;
        let mut target = Blob::from_vec([2, 1, 1, 1], vec![0.0f32, 1.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;
        layer.forward(&mut [&mut pred, &mut target], &mut [&mut top])?;
        let loss = top.cpu_data()[0];
        assert!(loss.is_finite());
        assert!(loss > 0.0);

        top.mutable_cpu_diff()[0] = 1.0;
        layer.backward(&mut [&mut top], &[true, false], &mut [&mut pred, &mut target])?;
        assert!(pred.cpu_diff().iter().all(|d| d.is_finite()));
        Ok(())
    }

    #[test]
    fn test_unshaped_top_is_rejected() -> Result<(), LayerError> {
        let mut layer = layer();
        let mut pred = Blob::from_vec([1, 2, 1, 1], vec![0.5, 0.5])?;
        let mut target = Blob::from_vec([1, 2, 1, 1], vec![1.0, 0.0])?;
        let mut top = Blob::default();
        layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;

        let mut empty = Blob::default();
        let res = layer.forward(&mut [&mut pred, &mut target], &mut [&mut empty]);
        assert!(matches!(res, Err(LayerError::ShapeMismatch { .. })));
        let res = layer.backward(
            &mut [&mut empty],
            &[true, false],
            &mut [&mut pred, &mut target],
        );
        assert!(matches!(res, Err(LayerError::ShapeMismatch { .. })));
        Ok(())
    }

    #[test]
    fn test_forward_before_setup() {
        let mut layer = layer();
        let mut pred = Blob::<f64>::new(1, 2, 1, 1);
        let mut target = Blob::<f64>::new(1, 2, 1, 1);
        let mut top = Blob::default();
        assert_eq!(
            layer.forward(&mut [&mut pred, &mut target], &mut [&mut top]),
            Err(LayerError::NotSetUp("CrossEntropy"))
        );
    }
}
