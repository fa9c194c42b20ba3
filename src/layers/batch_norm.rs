use ndarray::{Array1, Array2, Axis, Ix1};

use crate::error::{N2nError, Result};
use crate::layers::parameter::{ParamView, ParamViewMut, Parameter};
use crate::math::tensor::Tensor;

const MOMENTUM: f64 = 0.99;
const EPS: f64 = 1e-3;

/// Per-channel batch normalization.
///
/// In training mode the layer normalizes with the batch statistics and
/// records them as a *pending* update of the running mean / variance. The
/// pending update is only folded into the running statistics by
/// [`BatchNorm::apply_pending_statistics`], which the training step calls
/// before the optimizer writes the parameters.
#[derive(Debug)]
pub struct BatchNorm {
    pub gamma: Parameter<Ix1>,
    pub beta: Parameter<Ix1>,
    pub moving_mean: Parameter<Ix1>,
    pub moving_variance: Parameter<Ix1>,
    pending: Option<(Array1<f64>, Array1<f64>)>,
    x_hat: Array2<f64>,
    inv_std: Array1<f64>,
    batch_statistics: bool,
}

impl BatchNorm {
    pub fn new(name: &str, channels: usize) -> BatchNorm {
        BatchNorm {
            gamma: Parameter::new(format!("{name}/gamma"), Array1::ones(channels)),
            beta: Parameter::new(format!("{name}/beta"), Array1::zeros(channels)),
            moving_mean: Parameter::statistic(format!("{name}/moving_mean"), Array1::zeros(channels)),
            moving_variance: Parameter::statistic(
                format!("{name}/moving_variance"),
                Array1::ones(channels),
            ),
            pending: None,
            x_hat: Array2::zeros((0, channels)),
            inv_std: Array1::zeros(channels),
            batch_statistics: false,
        }
    }

    pub fn forward(&mut self, x: &Tensor, is_training: bool) -> Result<Tensor> {
        let dim = x.raw_dim();
        let (b, h, w, c) = x.dim();
        let flat = x.as_standard_layout().into_owned().into_shape_with_order((b * h * w, c))?;

        let (mean, var) = if is_training {
            let mean = flat
                .mean_axis(Axis(0))
                .ok_or_else(|| N2nError::input("batch normalization over an empty batch"))?;
            let var = (&flat - &mean).mapv(|v| v * v).mean_axis(Axis(0)).unwrap_or_else(|| mean.clone());
            self.pending = Some((mean.clone(), var.clone()));
            (mean, var)
        } else {
            (self.moving_mean.value.clone(), self.moving_variance.value.clone())
        };

        self.inv_std = var.mapv(|v| 1.0 / (v + EPS).sqrt());
        self.x_hat = (&flat - &mean) * &self.inv_std;
        self.batch_statistics = is_training;

        let y = &self.x_hat * &self.gamma.value + &self.beta.value;
        Ok(y.into_shape_with_order(dim)?)
    }

    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor> {
        let dim = grad.raw_dim();
        let (b, h, w, c) = grad.dim();
        let n = (b * h * w) as f64;
        let dy = grad.as_standard_layout().into_owned().into_shape_with_order((b * h * w, c))?;

        let sum_dy = dy.sum_axis(Axis(0));
        let sum_dy_xhat = (&dy * &self.x_hat).sum_axis(Axis(0));
        self.beta.grad += &sum_dy;
        self.gamma.grad += &sum_dy_xhat;

        let scale = &self.gamma.value * &self.inv_std;
        let dx = if self.batch_statistics {
            // dx = γ/σ · (dy - mean(dy) - x̂ · mean(dy ⊙ x̂))
            let centered = &dy - &(&sum_dy / n) - &(&self.x_hat * &(&sum_dy_xhat / n));
            centered * &scale
        } else {
            dy * &scale
        };
        Ok(dx.into_shape_with_order(dim)?)
    }

    /// Folds the statistics of the last training forward pass into the
    /// running mean and variance. No-op when nothing is pending.
    pub fn apply_pending_statistics(&mut self) {
        if let Some((mean, var)) = self.pending.take() {
            self.moving_mean.value.zip_mut_with(&mean, |m, &x| *m = MOMENTUM * *m + (1.0 - MOMENTUM) * x);
            self.moving_variance.value.zip_mut_with(&var, |m, &x| *m = MOMENTUM * *m + (1.0 - MOMENTUM) * x);
        }
    }

    pub fn has_pending_statistics(&self) -> bool {
        self.pending.is_some()
    }

    pub fn zero_grad(&mut self) {
        self.gamma.zero_grad();
        self.beta.zero_grad();
    }

    pub fn params<'a>(&'a self, out: &mut Vec<ParamView<'a>>) {
        out.push(self.gamma.view());
        out.push(self.beta.view());
        out.push(self.moving_mean.view());
        out.push(self.moving_variance.view());
    }

    pub fn params_mut<'a>(&'a mut self, out: &mut Vec<ParamViewMut<'a>>) {
        out.push(self.gamma.view_mut());
        out.push(self.beta.view_mut());
        out.push(self.moving_mean.view_mut());
        out.push(self.moving_variance.view_mut());
    }
}
