//! Layer configuration records.
//!
//! The records derive `serde` so a host can load them from any declarative format:
//!
//! ```rust
//! use caffeine_layers::param::{FillerParameter, LayerParameter};
//!
//! let json = r#"{
//!     "name": "fc1",
//!     "type": "inner_product",
//!     "inner_product_param": {
//!         "num_output": 10,
//!         "weight_filler": { "type": "gaussian", "std": 0.01, "seed": 7 }
//!     }
//! }"#;
//! let param: LayerParameter = serde_json::from_str(json).unwrap();
//! assert_eq!(param.inner_product_param.num_output, 10);
//! assert!(param.inner_product_param.bias_term);
//! assert_eq!(
//!     param.inner_product_param.weight_filler,
//!     FillerParameter::Gaussian { mean: 0.0, std: 0.01, seed: Some(7) }
//! );
//! ```

use serde::{Deserialize, Serialize};

use crate::{error::LayerError, layer::LayerType};

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

fn default_epsilon() -> f64 {
    1e-7
}

/// Initialization strategy for a parameter blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FillerParameter {
    /// Every value set to `value`.
    Constant {
        /// The fill value
        #[serde(default)]
        value: f64,
    },
    /// Values drawn uniformly from `[min, max]`.
    Uniform {
        /// Lower bound
        #[serde(default)]
        min: f64,
        /// Upper bound
        #[serde(default = "default_one")]
        max: f64,
        /// Seed for reproducible fills
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Values drawn from a normal distribution.
    Gaussian {
        /// Mean of the distribution
        #[serde(default)]
        mean: f64,
        /// Standard deviation of the distribution
        #[serde(default = "default_one")]
        std: f64,
        /// Seed for reproducible fills
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Values drawn uniformly from `[-s, s]` with `s = sqrt(3 / fan_in)`.
    Xavier {
        /// Seed for reproducible fills
        #[serde(default)]
        seed: Option<u64>,
    },
}

impl Default for FillerParameter {
    fn default() -> Self {
        FillerParameter::Constant { value: 0.0 }
    }
}

impl FillerParameter {
    /// Returns a copy whose seed, if any, is mixed with `salt`.
    ///
    /// Salt 0 leaves the seed unchanged. Blobs of one layer use distinct salts so a shared
    /// seed does not repeat the same random stream.
    pub fn salted(&self, salt: u64) -> Self {
        let mix = |seed: Option<u64>| {
            seed.map(|s| s ^ salt.wrapping_mul(0x9e37_79b9_7f4a_7c15))
        };
        match *self {
            FillerParameter::Constant { value } => FillerParameter::Constant { value },
            FillerParameter::Uniform { min, max, seed } => FillerParameter::Uniform {
                min,
                max,
                seed: mix(seed),
            },
            FillerParameter::Gaussian { mean, std, seed } => FillerParameter::Gaussian {
                mean,
                std,
                seed: mix(seed),
            },
            FillerParameter::Xavier { seed } => FillerParameter::Xavier { seed: mix(seed) },
        }
    }

    /// Checks that the distribution parameters are usable.
    pub fn validate(&self) -> Result<(), LayerError> {
        match *self {
            FillerParameter::Constant { value } if !value.is_finite() => Err(
                LayerError::invalid_parameter("filler.value", format!("{value} is not finite")),
            ),
            FillerParameter::Uniform { min, max, .. } if !(min <= max) => Err(
                LayerError::invalid_parameter("filler.min", format!("min {min} > max {max}")),
            ),
            FillerParameter::Gaussian { std, .. } if !(std >= 0.0) => Err(
                LayerError::invalid_parameter("filler.std", format!("{std} is negative")),
            ),
            _ => Ok(()),
        }
    }
}

/// Options of the inner product layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InnerProductParameter {
    /// Width of the output.
    #[serde(default)]
    pub num_output: usize,
    /// Whether a bias row is added to every output.
    #[serde(default = "default_true")]
    pub bias_term: bool,
    /// Initialization of the weight blob.
    #[serde(default)]
    pub weight_filler: FillerParameter,
    /// Initialization of the bias blob.
    #[serde(default)]
    pub bias_filler: FillerParameter,
}

impl Default for InnerProductParameter {
    fn default() -> Self {
        Self {
            num_output: 0,
            bias_term: true,
            weight_filler: FillerParameter::default(),
            bias_filler: FillerParameter::default(),
        }
    }
}

/// Options of the cross entropy layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossEntropyParameter {
    /// Divide the summed loss by the batch size.
    #[serde(default = "default_true")]
    pub normalize: bool,
    /// Predictions are clamped to `[epsilon, 1 - epsilon]` before taking logarithms.
    /// Values below the machine epsilon of the layer's scalar type are raised to it.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

impl Default for CrossEntropyParameter {
    fn default() -> Self {
        Self {
            normalize: true,
            epsilon: default_epsilon(),
        }
    }
}

/// Configuration of a single layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerParameter {
    /// Name used in log messages.
    #[serde(default)]
    pub name: String,
    /// Which layer to build.
    #[serde(rename = "type")]
    pub layer_type: LayerType,
    /// Options read by the inner product layer.
    #[serde(default)]
    pub inner_product_param: InnerProductParameter,
    /// Options read by the cross entropy layer.
    #[serde(default)]
    pub cross_entropy_param: CrossEntropyParameter,
}

impl LayerParameter {
    /// Creates an inner product configuration with a bias and zero-filled parameters.
    pub fn inner_product(num_output: usize) -> Self {
        Self {
            name: String::new(),
            layer_type: LayerType::InnerProduct,
            inner_product_param: InnerProductParameter {
                num_output,
                ..Default::default()
            },
            cross_entropy_param: CrossEntropyParameter::default(),
        }
    }

    /// Creates a cross entropy configuration with default options.
    pub fn cross_entropy() -> Self {
        Self {
            name: String::new(),
            layer_type: LayerType::CrossEntropy,
            inner_product_param: InnerProductParameter::default(),
            cross_entropy_param: CrossEntropyParameter::default(),
        }
    }

    /// Sets the layer name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Enables or disables the inner product bias.
    pub fn with_bias_term(mut self, bias_term: bool) -> Self {
        self.inner_product_param.bias_term = bias_term;
        self
    }

    /// Sets the inner product weight filler.
    pub fn with_weight_filler(mut self, filler: FillerParameter) -> Self {
        self.inner_product_param.weight_filler = filler;
        self
    }

    /// Sets the inner product bias filler.
    pub fn with_bias_filler(mut self, filler: FillerParameter) -> Self {
        self.inner_product_param.bias_filler = filler;
        self
    }

    /// Sets whether the cross entropy loss is divided by the batch size.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.cross_entropy_param.normalize = normalize;
        self
    }

    /// Checks the options read by this layer's type.
    pub fn validate(&self) -> Result<(), LayerError> {
        match self.layer_type {
            LayerType::InnerProduct => {
                let p = &self.inner_product_param;
                if p.num_output == 0 {
                    return Err(LayerError::invalid_parameter(
                        "num_output",
                        "must be positive",
                    ));
                }
                p.weight_filler.validate()?;
                if p.bias_term {
                    p.bias_filler.validate()?;
                }
                Ok(())
            }
            LayerType::CrossEntropy => {
                let eps = self.cross_entropy_param.epsilon;
                if !(eps > 0.0 && eps < 0.5) {
                    return Err(LayerError::invalid_parameter(
                        "epsilon",
                        format!("{eps} is outside (0, 0.5)"),
                    ));
                }
                Ok(())
            }
        }
    }
}
