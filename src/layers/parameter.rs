use ndarray::{Array, ArrayViewD, ArrayViewMutD, Dimension};

/// A named array owned by a layer, together with its accumulated gradient.
///
/// Running statistics of normalization layers are stored as non-trainable
/// parameters: they are checkpointed like weights but the optimizer and the
/// gradient histograms skip them.
#[derive(Debug, Clone)]
pub struct Parameter<D: Dimension> {
    pub name: String,
    pub value: Array<f64, D>,
    pub grad: Array<f64, D>,
    pub trainable: bool,
}

/// Read-only view of a parameter, shape-erased.
pub struct ParamView<'a> {
    pub name: &'a str,
    pub value: ArrayViewD<'a, f64>,
    pub grad: ArrayViewD<'a, f64>,
    pub trainable: bool,
}

/// Mutable value / gradient pair handed to the optimizer.
pub struct ParamViewMut<'a> {
    pub name: &'a str,
    pub value: ArrayViewMutD<'a, f64>,
    pub grad: ArrayViewD<'a, f64>,
    pub trainable: bool,
}

impl<D: Dimension> Parameter<D> {
    pub fn new(name: impl Into<String>, value: Array<f64, D>) -> Self {
        let grad = Array::zeros(value.raw_dim());
        Parameter { name: name.into(), value, grad, trainable: true }
    }

    pub fn statistic(name: impl Into<String>, value: Array<f64, D>) -> Self {
        Parameter { trainable: false, ..Parameter::new(name, value) }
    }

    pub fn zero_grad(&mut self) {
        self.grad.fill(0.0);
    }

    pub fn view(&self) -> ParamView<'_> {
        ParamView {
            name: &self.name,
            value: self.value.view().into_dyn(),
            grad: self.grad.view().into_dyn(),
            trainable: self.trainable,
        }
    }

    pub fn view_mut(&mut self) -> ParamViewMut<'_> {
        ParamViewMut {
            name: &self.name,
            value: self.value.view_mut().into_dyn(),
            grad: self.grad.view().into_dyn(),
            trainable: self.trainable,
        }
    }
}
