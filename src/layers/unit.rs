use rand::Rng;

use crate::activation::ActivationFunction;
use crate::error::Result;
use crate::layers::batch_norm::BatchNorm;
use crate::layers::conv::Conv2d;
use crate::layers::parameter::{ParamView, ParamViewMut};
use crate::math::tensor::Tensor;

/// Convolution, optional batch normalization, then an activation.
///
/// `forward_with_skip` adds a residual tensor to the (normalized)
/// pre-activation, which is how RED-Net merges its symmetric skips.
#[derive(Debug)]
pub struct ConvUnit {
    pub conv: Conv2d,
    pub norm: Option<BatchNorm>,
    pub activation: ActivationFunction,
    pre_activation: Tensor, // z, needed for f'(z) on the way back
}

impl ConvUnit {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        k: usize,
        in_channels: usize,
        out_channels: usize,
        normalize: bool,
        activation: ActivationFunction,
        rng: &mut R,
    ) -> ConvUnit {
        ConvUnit {
            conv: Conv2d::new(&format!("{name}/conv"), k, in_channels, out_channels, rng),
            norm: normalize.then(|| BatchNorm::new(&format!("{name}/bn"), out_channels)),
            activation,
            pre_activation: Tensor::zeros((0, 0, 0, 0)),
        }
    }

    pub fn forward(&mut self, x: &Tensor, is_training: bool) -> Result<Tensor> {
        self.forward_with_skip(x, None, is_training)
    }

    pub fn forward_with_skip(
        &mut self,
        x: &Tensor,
        skip: Option<&Tensor>,
        is_training: bool,
    ) -> Result<Tensor> {
        let mut z = self.conv.forward(x)?;
        if let Some(norm) = self.norm.as_mut() {
            z = norm.forward(&z, is_training)?;
        }
        if let Some(skip) = skip {
            z += skip;
        }
        let a = self.activation.apply(&z);
        self.pre_activation = z;
        Ok(a)
    }

    /// Returns `(∂L/∂input, ∂L/∂z)`; the second value is the gradient that
    /// flows into a skip tensor added by `forward_with_skip`.
    pub fn backward(&mut self, grad: &Tensor) -> Result<(Tensor, Tensor)> {
        let dz = self.activation.backprop(&self.pre_activation, grad);
        let mut d = dz.clone();
        if let Some(norm) = self.norm.as_mut() {
            d = norm.backward(&d)?;
        }
        let dx = self.conv.backward(&d)?;
        Ok((dx, dz))
    }

    pub fn apply_pending_statistics(&mut self) {
        if let Some(norm) = self.norm.as_mut() {
            norm.apply_pending_statistics();
        }
    }

    pub fn zero_grad(&mut self) {
        self.conv.zero_grad();
        if let Some(norm) = self.norm.as_mut() {
            norm.zero_grad();
        }
    }

    pub fn params<'a>(&'a self, out: &mut Vec<ParamView<'a>>) {
        self.conv.params(out);
        if let Some(norm) = &self.norm {
            norm.params(out);
        }
    }

    pub fn params_mut<'a>(&'a mut self, out: &mut Vec<ParamViewMut<'a>>) {
        self.conv.params_mut(out);
        if let Some(norm) = self.norm.as_mut() {
            norm.params_mut(out);
        }
    }
}
