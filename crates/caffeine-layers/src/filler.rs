//! Initial values for parameter blobs.

use caffeine_blas::Dtype;
use caffeine_blob::Blob;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::{error::LayerError, layer::cast, param::FillerParameter};

/// A strategy writing initial values into a blob.
///
/// Fillers only touch the host copy of the values; gradients are left alone.
pub trait Filler<T: Dtype> {
    /// Overwrites every value of `blob`.
    fn fill(&self, blob: &mut Blob<T>) -> Result<(), LayerError>;
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Sets every value to a constant.
#[derive(Debug, Clone)]
pub struct ConstantFiller {
    value: f64,
}

impl ConstantFiller {
    /// Creates a filler writing `value`.
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl<T: Dtype> Filler<T> for ConstantFiller {
    fn fill(&self, blob: &mut Blob<T>) -> Result<(), LayerError> {
        let value = cast::<T, _>(self.value);
        blob.mutable_cpu_data().fill(value);
        Ok(())
    }
}

/// Draws values uniformly from `[min, max]`.
#[derive(Debug, Clone)]
pub struct UniformFiller {
    min: f64,
    max: f64,
    seed: Option<u64>,
}

impl UniformFiller {
    /// Creates a uniform filler.
    ///
    /// # Errors
    ///
    /// Returns an error if `min > max`.
    pub fn new(min: f64, max: f64, seed: Option<u64>) -> Result<Self, LayerError> {
        FillerParameter::Uniform { min, max, seed }.validate()?;
        Ok(Self { min, max, seed })
    }
}

impl<T: Dtype> Filler<T> for UniformFiller {
    fn fill(&self, blob: &mut Blob<T>) -> Result<(), LayerError> {
        let mut rng = make_rng(self.seed);
        let range = self.max - self.min;
        for v in blob.mutable_cpu_data().iter_mut() {
            *v = cast(self.min + range * rng.random::<f64>());
        }
        Ok(())
    }
}

/// Draws values from a normal distribution.
#[derive(Debug, Clone)]
pub struct GaussianFiller {
    normal: Normal<f64>,
    seed: Option<u64>,
}

impl GaussianFiller {
    /// Creates a gaussian filler.
    ///
    /// # Errors
    ///
    /// Returns an error if `std` is negative or not finite.
    pub fn new(mean: f64, std: f64, seed: Option<u64>) -> Result<Self, LayerError> {
        FillerParameter::Gaussian { mean, std, seed }.validate()?;
        let normal = Normal::new(mean, std)
            .map_err(|e| LayerError::invalid_parameter("filler.std", e.to_string()))?;
        Ok(Self { normal, seed })
    }
}

impl<T: Dtype> Filler<T> for GaussianFiller {
    fn fill(&self, blob: &mut Blob<T>) -> Result<(), LayerError> {
        let mut rng = make_rng(self.seed);
        for v in blob.mutable_cpu_data().iter_mut() {
            *v = cast(self.normal.sample(&mut rng));
        }
        Ok(())
    }
}

/// Draws values uniformly from `[-s, s]` with `s = sqrt(3 / fan_in)`.
///
/// Parameter blobs store their output axis last, so `fan_in` is `count / width`.
#[derive(Debug, Clone)]
pub struct XavierFiller {
    seed: Option<u64>,
}

impl XavierFiller {
    /// Creates a xavier filler.
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl<T: Dtype> Filler<T> for XavierFiller {
    fn fill(&self, blob: &mut Blob<T>) -> Result<(), LayerError> {
        if blob.count() == 0 {
            return Ok(());
        }
        let fan_in = blob.count() / blob.width();
        let scale = (3.0 / fan_in as f64).sqrt();
        UniformFiller::new(-scale, scale, self.seed)?.fill(blob)
    }
}

/// Builds the filler described by `param`.
///
/// # Errors
///
/// Returns an error if the distribution parameters are invalid.
pub fn get_filler<T: Dtype>(param: &FillerParameter) -> Result<Box<dyn Filler<T>>, LayerError> {
    Ok(match *param {
        FillerParameter::Constant { value } => {
            param.validate()?;
            Box::new(ConstantFiller::new(value))
        }
        FillerParameter::Uniform { min, max, seed } => {
            Box::new(UniformFiller::new(min, max, seed)?)
        }
        FillerParameter::Gaussian { mean, std, seed } => {
            Box::new(GaussianFiller::new(mean, std, seed)?)
        }
        FillerParameter::Xavier { seed } => Box::new(XavierFiller::new(seed)),
    })
}
