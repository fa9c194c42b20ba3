use crate::activation::ActivationFunction;
use crate::error::Result;
use crate::layers::{Conv2d, ParamView, ParamViewMut};
use crate::math::tensor::Tensor;

/// Final projection shared by both denoisers:
/// `output = activation(input + conv(features))`.
///
/// The projection starts at zero, so an untrained network reproduces its
/// input exactly under the identity activation.
#[derive(Debug)]
pub struct ResidualHead {
    pub conv: Conv2d,
    activation: ActivationFunction,
    pre_activation: Tensor,
}

impl ResidualHead {
    pub fn new(name: &str, k: usize, features: usize, channels: usize, activation: ActivationFunction) -> Self {
        ResidualHead {
            conv: Conv2d::zeros(name, k, features, channels),
            activation,
            pre_activation: Tensor::zeros((0, 0, 0, 0)),
        }
    }

    pub fn forward(&mut self, input: &Tensor, features: &Tensor) -> Result<Tensor> {
        let mut z = self.conv.forward(features)?;
        z += input;
        let out = self.activation.apply(&z);
        self.pre_activation = z;
        Ok(out)
    }

    /// Returns ∂L/∂features.
    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor> {
        let dz = self.activation.backprop(&self.pre_activation, grad);
        self.conv.backward(&dz)
    }

    pub fn zero_grad(&mut self) {
        self.conv.zero_grad();
    }

    pub fn params<'a>(&'a self, out: &mut Vec<ParamView<'a>>) {
        self.conv.params(out);
    }

    pub fn params_mut<'a>(&'a mut self, out: &mut Vec<ParamViewMut<'a>>) {
        self.conv.params_mut(out);
    }
}
