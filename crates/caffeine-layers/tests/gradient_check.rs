use std::sync::Arc;

use approx::assert_relative_eq;
use caffeine_blas::{Backend, CpuBackend};
use caffeine_blob::Blob;
use caffeine_layers::{
    param::FillerParameter, CrossEntropyLayer, InnerProductLayer, Layer, LayerError,
    LayerParameter,
};

const STEP: f64 = 1e-4;
const TOLERANCE: f64 = 1e-3;

fn cpu() -> Arc<dyn Backend<f64>> {
    Arc::new(CpuBackend::new())
}

/// Objective `0.5 * sum(top^2)`, whose gradient with respect to `top` is `top` itself.
fn half_sum_squares(
    layer: &mut dyn Layer<f64>,
    bottom: &mut Blob<f64>,
    top: &mut Blob<f64>,
) -> Result<f64, LayerError> {
    layer.forward(&mut [&mut *bottom], &mut [&mut *top])?;
    Ok(top.cpu_data().iter().map(|v| 0.5 * v * v).sum())
}

fn inner_product_layer(bias_term: bool) -> Result<InnerProductLayer<f64>, LayerError> {
    let param = LayerParameter::inner_product(3)
        .with_bias_term(bias_term)
        .with_weight_filler(FillerParameter::Gaussian {
            mean: 0.0,
            std: 1.0,
            seed: Some(1),
        })
        .with_bias_filler(FillerParameter::Uniform {
            min: -1.0,
            max: 1.0,
            seed: Some(2),
        });
    InnerProductLayer::new(param, cpu())
}

#[test]
fn inner_product_parameter_gradients() -> Result<(), LayerError> {
    let mut layer = inner_product_layer(true)?;
    let values = (0..8).map(|i| (i as f64 - 3.5) / 4.0).collect();
    let mut bottom = Blob::from_vec([2, 2, 2, 1], values)?;
    let mut top = Blob::default();
    layer.setup(&mut [&mut bottom], &mut [&mut top])?;

    half_sum_squares(&mut layer, &mut bottom, &mut top)?;
    let top_values = top.cpu_data().to_vec();
    top.mutable_cpu_diff().copy_from_slice(&top_values);
    layer.backward(&mut [&mut top], &[true], &mut [&mut bottom])?;

    for blob_index in 0..layer.blobs().len() {
        let analytic = layer.blobs_mut()[blob_index].cpu_diff().to_vec();
        for (i, &expected) in analytic.iter().enumerate() {
            let original = layer.blobs_mut()[blob_index].cpu_data()[i];

            layer.blobs_mut()[blob_index].mutable_cpu_data()[i] = original + STEP;
            let plus = half_sum_squares(&mut layer, &mut bottom, &mut top)?;
            layer.blobs_mut()[blob_index].mutable_cpu_data()[i] = original - STEP;
            let minus = half_sum_squares(&mut layer, &mut bottom, &mut top)?;
            layer.blobs_mut()[blob_index].mutable_cpu_data()[i] = original;

            let numeric = (plus - minus) / (2.0 * STEP);
            assert_relative_eq!(expected, numeric, epsilon = TOLERANCE);
        }
    }
    Ok(())
}

#[test]
fn inner_product_bottom_gradients() -> Result<(), LayerError> {
    let mut layer = inner_product_layer(false)?;
    let values = (0..6).map(|i| 0.3 * i as f64 - 0.7).collect();
    let mut bottom = Blob::from_vec([3, 2, 1, 1], values)?;
    let mut top = Blob::default();
    layer.setup(&mut [&mut bottom], &mut [&mut top])?;

    half_sum_squares(&mut layer, &mut bottom, &mut top)?;
    let top_values = top.cpu_data().to_vec();
    top.mutable_cpu_diff().copy_from_slice(&top_values);
    layer.backward(&mut [&mut top], &[true], &mut [&mut bottom])?;
    let analytic = bottom.cpu_diff().to_vec();

    for (i, &expected) in analytic.iter().enumerate() {
        let original = bottom.cpu_data()[i];
        bottom.mutable_cpu_data()[i] = original + STEP;
        let plus = half_sum_squares(&mut layer, &mut bottom, &mut top)?;
        bottom.mutable_cpu_data()[i] = original - STEP;
        let minus = half_sum_squares(&mut layer, &mut bottom, &mut top)?;
        bottom.mutable_cpu_data()[i] = original;

        let numeric = (plus - minus) / (2.0 * STEP);
        assert_relative_eq!(expected, numeric, epsilon = TOLERANCE);
    }
    Ok(())
}

fn cross_entropy_loss(
    layer: &mut CrossEntropyLayer<f64>,
    pred: &mut Blob<f64>,
    target: &mut Blob<f64>,
    top: &mut Blob<f64>,
) -> Result<f64, LayerError> {
    layer.forward(&mut [&mut *pred, &mut *target], &mut [&mut *top])?;
    Ok(top.cpu_data()[0])
}

fn check_cross_entropy_gradients(
    shape: [usize; 4],
    pred: Vec<f64>,
    target: Vec<f64>,
) -> Result<(), LayerError> {
    let mut layer = CrossEntropyLayer::new(LayerParameter::cross_entropy(), cpu())?;
    let mut pred = Blob::from_vec(shape, pred)?;
    let mut target = Blob::from_vec(shape, target)?;
    let mut top = Blob::default();
    layer.setup(&mut [&mut pred, &mut target], &mut [&mut top])?;

    cross_entropy_loss(&mut layer, &mut pred, &mut target, &mut top)?;
    top.mutable_cpu_diff()[0] = 1.0;
    layer.backward(&mut [&mut top], &[true, false], &mut [&mut pred, &mut target])?;
    let analytic = pred.cpu_diff().to_vec();

    for (i, &expected) in analytic.iter().enumerate() {
        let original = pred.cpu_data()[i];
        pred.mutable_cpu_data()[i] = original + STEP;
        let plus = cross_entropy_loss(&mut layer, &mut pred, &mut target, &mut top)?;
        pred.mutable_cpu_data()[i] = original - STEP;
        let minus = cross_entropy_loss(&mut layer, &mut pred, &mut target, &mut top)?;
        pred.mutable_cpu_data()[i] = original;

        let numeric = (plus - minus) / (2.0 * STEP);
        assert_relative_eq!(expected, numeric, epsilon = TOLERANCE, max_relative = TOLERANCE);
    }
    Ok(())
}

#[test]
fn cross_entropy_categorical_gradients() -> Result<(), LayerError> {
    check_cross_entropy_gradients(
        [2, 3, 1, 1],
        vec![0.2, 0.5, 0.3, 0.6, 0.1, 0.3],
        vec![0.0, 1.0, 0.0, 0.5, 0.0, 0.5],
    )
}

#[test]
fn cross_entropy_binary_gradients() -> Result<(), LayerError> {
    check_cross_entropy_gradients([3, 1, 1, 1], vec![0.3, 0.7, 0.55], vec![1.0, 0.0, 0.25])
}

fn stacked_loss(
    fc: &mut InnerProductLayer<f64>,
    loss: &mut CrossEntropyLayer<f64>,
    data: &mut Blob<f64>,
    hidden: &mut Blob<f64>,
    target: &mut Blob<f64>,
    out: &mut Blob<f64>,
) -> Result<f64, LayerError> {
    fc.forward(&mut [&mut *data], &mut [&mut *hidden])?;
    loss.forward(&mut [&mut *hidden, &mut *target], &mut [&mut *out])?;
    Ok(out.cpu_data()[0])
}

#[test]
fn stacked_layers_weight_gradients() -> Result<(), LayerError> {
    let backend = cpu();
    let param = LayerParameter::inner_product(2)
        .with_weight_filler(FillerParameter::Uniform {
            min: 0.05,
            max: 0.2,
            seed: Some(5),
        })
        .with_bias_filler(FillerParameter::Constant { value: 0.1 });
    let mut fc = InnerProductLayer::new(param, backend.clone())?;
    let mut loss = CrossEntropyLayer::new(LayerParameter::cross_entropy(), backend)?;

    let mut data = Blob::from_vec([2, 3, 1, 1], vec![0.1, 0.5, 0.3, 0.4, 0.2, 0.1])?;
    let mut hidden = Blob::default();
    let mut target = Blob::from_vec([2, 2, 1, 1], vec![1.0, 0.0, 0.0, 1.0])?;
    let mut out = Blob::default();

    fc.setup(&mut [&mut data], &mut [&mut hidden])?;
    loss.setup(&mut [&mut hidden, &mut target], &mut [&mut out])?;

    stacked_loss(&mut fc, &mut loss, &mut data, &mut hidden, &mut target, &mut out)?;
    let mut grads = {
        out.mutable_cpu_diff()[0] = 1.0;
        let value = loss.backward(
            &mut [&mut out],
            &[true, false],
            &mut [&mut hidden, &mut target],
        )?;
        assert!(value > 0.0);
        let returned = fc.backward(&mut [&mut hidden], &[false], &mut [&mut data])?;
        assert_eq!(returned, 0.0);
        fc.blobs_mut()[0].cpu_diff().to_vec()
    };
    grads.extend_from_slice(fc.blobs_mut()[1].cpu_diff());

    let weight_count = fc.blobs()[0].count();
    for (i, &expected) in grads.iter().enumerate() {
        let (blob_index, j) = if i < weight_count {
            (0, i)
        } else {
            (1, i - weight_count)
        };
        let original = fc.blobs_mut()[blob_index].cpu_data()[j];
        fc.blobs_mut()[blob_index].mutable_cpu_data()[j] = original + STEP;
        let plus = stacked_loss(&mut fc, &mut loss, &mut data, &mut hidden, &mut target, &mut out)?;
        fc.blobs_mut()[blob_index].mutable_cpu_data()[j] = original - STEP;
        let minus = stacked_loss(&mut fc, &mut loss, &mut data, &mut hidden, &mut target, &mut out)?;
        fc.blobs_mut()[blob_index].mutable_cpu_data()[j] = original;

        let numeric = (plus - minus) / (2.0 * STEP);
        assert_relative_eq!(expected, numeric, epsilon = TOLERANCE);
    }
    Ok(())
}
