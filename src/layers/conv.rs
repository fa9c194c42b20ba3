use ndarray::{s, Array1, Array2, Array4, Axis, Ix1, Ix4};
use rand::Rng;

use crate::error::{N2nError, Result};
use crate::layers::parameter::{ParamView, ParamViewMut, Parameter};
use crate::math::tensor::{he_kernel, Tensor};

/// Stride-1 2-D convolution with "same" zero padding.
///
/// Kernel layout is `[k, k, in_channels, out_channels]`; `k` must be odd so
/// the output keeps the input's spatial size.
#[derive(Debug)]
pub struct Conv2d {
    pub kernel: Parameter<Ix4>,
    pub bias: Parameter<Ix1>,
    k: usize,
    input: Tensor, // cached for the backward pass
}

impl Conv2d {
    pub fn new<R: Rng + ?Sized>(
        name: &str,
        k: usize,
        in_channels: usize,
        out_channels: usize,
        rng: &mut R,
    ) -> Conv2d {
        Conv2d::from_kernel(name, he_kernel(k, in_channels, out_channels, rng))
    }

    /// A convolution whose weights and bias start at zero.
    pub fn zeros(name: &str, k: usize, in_channels: usize, out_channels: usize) -> Conv2d {
        Conv2d::from_kernel(name, Array4::zeros((k, k, in_channels, out_channels)))
    }

    fn from_kernel(name: &str, kernel: Array4<f64>) -> Conv2d {
        let (k, _, _, out_channels) = kernel.dim();
        debug_assert!(k % 2 == 1, "kernel size must be odd");
        Conv2d {
            kernel: Parameter::new(format!("{name}/kernel"), kernel),
            bias: Parameter::new(format!("{name}/bias"), Array1::zeros(out_channels)),
            k,
            input: Tensor::zeros((0, 0, 0, 0)),
        }
    }

    pub fn in_channels(&self) -> usize {
        self.kernel.value.dim().2
    }

    pub fn out_channels(&self) -> usize {
        self.kernel.value.dim().3
    }

    pub fn forward(&mut self, x: &Tensor) -> Result<Tensor> {
        let (b, h, w, c) = x.dim();
        if c != self.in_channels() {
            return Err(N2nError::input(format!(
                "{} expects {} input channels, got {c}",
                self.kernel.name,
                self.in_channels()
            )));
        }
        let cout = self.out_channels();
        let pad = self.k / 2;

        let mut out = Tensor::zeros((b, h, w, cout));
        for i in 0..self.k {
            let (y0, y1) = valid_range(h, i, pad);
            for j in 0..self.k {
                let (x0, x1) = valid_range(w, j, pad);
                if y0 >= y1 || x0 >= x1 {
                    continue;
                }
                let rows = (y0 + i - pad)..(y1 + i - pad);
                let cols = (x0 + j - pad)..(x1 + j - pad);
                let n = b * (y1 - y0) * (x1 - x0);

                let patch = x.slice(s![.., rows, cols, ..]).as_standard_layout().into_owned().into_shape_with_order((n, c))?;
                let w_ij = self.kernel.value.slice(s![i, j, .., ..]);
                let contrib = patch.dot(&w_ij).into_shape_with_order((b, y1 - y0, x1 - x0, cout))?;
                let mut target = out.slice_mut(s![.., y0..y1, x0..x1, ..]);
                target += &contrib;
            }
        }
        out += &self.bias.value;

        self.input = x.clone();
        Ok(out)
    }

    /// Accumulates kernel/bias gradients for `grad` (∂L/∂output) and returns
    /// ∂L/∂input.
    pub fn backward(&mut self, grad: &Tensor) -> Result<Tensor> {
        let (b, h, w, c) = self.input.dim();
        let cout = self.out_channels();
        let pad = self.k / 2;

        let mut d_input = Tensor::zeros((b, h, w, c));
        for i in 0..self.k {
            let (y0, y1) = valid_range(h, i, pad);
            for j in 0..self.k {
                let (x0, x1) = valid_range(w, j, pad);
                if y0 >= y1 || x0 >= x1 {
                    continue;
                }
                let rows = (y0 + i - pad)..(y1 + i - pad);
                let cols = (x0 + j - pad)..(x1 + j - pad);
                let n = b * (y1 - y0) * (x1 - x0);

                let patch: Array2<f64> = self
                    .input
                    .slice(s![.., rows.clone(), cols.clone(), ..])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((n, c))?;
                let d_out: Array2<f64> = grad
                    .slice(s![.., y0..y1, x0..x1, ..])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape_with_order((n, cout))?;

                let mut dw = self.kernel.grad.slice_mut(s![i, j, .., ..]);
                dw += &patch.t().dot(&d_out);

                let w_ij = self.kernel.value.slice(s![i, j, .., ..]);
                let d_patch = d_out.dot(&w_ij.t()).into_shape_with_order((b, y1 - y0, x1 - x0, c))?;
                let mut target = d_input.slice_mut(s![.., rows, cols, ..]);
                target += &d_patch;
            }
        }

        let db = grad.sum_axis(Axis(0)).sum_axis(Axis(0)).sum_axis(Axis(0));
        self.bias.grad += &db;

        Ok(d_input)
    }

    pub fn zero_grad(&mut self) {
        self.kernel.zero_grad();
        self.bias.zero_grad();
    }

    pub fn params<'a>(&'a self, out: &mut Vec<ParamView<'a>>) {
        out.push(self.kernel.view());
        out.push(self.bias.view());
    }

    pub fn params_mut<'a>(&'a mut self, out: &mut Vec<ParamViewMut<'a>>) {
        out.push(self.kernel.view_mut());
        out.push(self.bias.view_mut());
    }
}

/// Output positions `[lo, hi)` along one axis whose input position
/// `out + offset - pad` falls inside `[0, size)`.
fn valid_range(size: usize, offset: usize, pad: usize) -> (usize, usize) {
    let lo = pad.saturating_sub(offset);
    let hi = (size + pad).saturating_sub(offset).min(size);
    (lo, hi)
}
