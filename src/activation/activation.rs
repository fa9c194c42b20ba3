use std::f64::consts::E;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::N2nError;
use crate::math::tensor::Tensor;

/// Slope used when `leaky_relu` is selected by name.
const LEAKY_ALPHA: f64 = 0.2;

/// Element-wise activations used inside the networks and as the
/// configurable output activation of a denoiser.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationFunction {
    Identity,
    Sigmoid,
    ReLU,
    Tanh,
    LeakyReLU { alpha: f64 },
}

impl ActivationFunction {
    pub fn function(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => x,
            ActivationFunction::Sigmoid => 1.0 / (1.0 + E.powf(-x)),
            ActivationFunction::ReLU => if x > 0.0 { x } else { 0.0 },
            ActivationFunction::Tanh => x.tanh(),
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { x } else { alpha * x },
        }
    }

    /// Derivative evaluated at the pre-activation value `x`.
    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFunction::Identity => 1.0,
            ActivationFunction::Sigmoid => {
                let fx = self.function(x);
                fx * (1.0 - fx)
            }
            ActivationFunction::ReLU => if x > 0.0 { 1.0 } else { 0.0 },
            ActivationFunction::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
            ActivationFunction::LeakyReLU { alpha } => if x > 0.0 { 1.0 } else { *alpha },
        }
    }

    /// Applies the activation to every element of `z`.
    pub fn apply(&self, z: &Tensor) -> Tensor {
        if *self == ActivationFunction::Identity {
            return z.clone();
        }
        z.mapv(|x| self.function(x))
    }

    /// Back-propagates `grad` through the activation: `grad ⊙ f'(z)`.
    pub fn backprop(&self, z: &Tensor, grad: &Tensor) -> Tensor {
        if *self == ActivationFunction::Identity {
            return grad.clone();
        }
        let mut out = grad.clone();
        out.zip_mut_with(z, |g, &x| *g *= self.derivative(x));
        out
    }
}

impl Default for ActivationFunction {
    fn default() -> Self {
        ActivationFunction::Identity
    }
}

impl FromStr for ActivationFunction {
    type Err = N2nError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "identity" | "linear" => Ok(ActivationFunction::Identity),
            "sigmoid" => Ok(ActivationFunction::Sigmoid),
            "relu" => Ok(ActivationFunction::ReLU),
            "tanh" => Ok(ActivationFunction::Tanh),
            "leaky_relu" => Ok(ActivationFunction::LeakyReLU { alpha: LEAKY_ALPHA }),
            other => Err(N2nError::config(format!("unknown output activation '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn parses_known_names() {
        assert_eq!("relu".parse::<ActivationFunction>().unwrap(), ActivationFunction::ReLU);
        assert_eq!(
            "leaky_relu".parse::<ActivationFunction>().unwrap(),
            ActivationFunction::LeakyReLU { alpha: LEAKY_ALPHA }
        );
        assert!(matches!(
            "softplus".parse::<ActivationFunction>(),
            Err(N2nError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn relu_backprop_masks_negative_inputs() {
        let z = Array4::from_shape_vec((1, 1, 2, 1), vec![-1.0, 2.0]).unwrap();
        let g = Array4::from_elem((1, 1, 2, 1), 3.0);
        let d = ActivationFunction::ReLU.backprop(&z, &g);
        assert_eq!(d.as_slice().unwrap(), &[0.0, 3.0]);
    }

    #[test]
    fn sigmoid_derivative_peaks_at_zero() {
        let s = ActivationFunction::Sigmoid;
        assert!((s.derivative(0.0) - 0.25).abs() < 1e-12);
        assert!(s.derivative(4.0) < 0.25);
    }
}
