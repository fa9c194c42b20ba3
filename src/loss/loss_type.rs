use std::fmt;
use std::str::FromStr;

use crate::error::N2nError;
use crate::loss::l0::AnnealedL0Loss;
use crate::loss::mae::MaeLoss;
use crate::loss::mse::MseLoss;
use crate::math::tensor::Tensor;

/// Selects which loss function the model optimizes.
///
/// - `L0`: annealed robust loss; its exponent depends on the global step.
/// - `L1`: mean absolute error.
/// - `L2`: mean squared error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossType {
    L0,
    L1,
    L2,
}

impl LossType {
    pub const ALL: [LossType; 3] = [LossType::L0, LossType::L1, LossType::L2];

    pub fn name(&self) -> &'static str {
        match self {
            LossType::L0 => "l0",
            LossType::L1 => "l1",
            LossType::L2 => "l2",
        }
    }

    /// Binds the loss to the current global step.
    pub fn at_step(&self, global_step: u64) -> LossFn {
        match self {
            LossType::L0 => LossFn::L0(AnnealedL0Loss::at_step(global_step)),
            LossType::L1 => LossFn::L1,
            LossType::L2 => LossFn::L2,
        }
    }
}

impl fmt::Display for LossType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LossType {
    type Err = N2nError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        LossType::ALL
            .into_iter()
            .find(|l| l.name() == name)
            .ok_or_else(|| N2nError::config(format!("unknown loss '{name}' (expected l0, l1 or l2)")))
    }
}

/// Resolves a loss identifier from the configuration.
pub fn select_loss(name: &str) -> Result<LossType, N2nError> {
    name.parse()
}

/// A loss bound to a global step: `(prediction, target) -> scalar`.
/// Pure; identical inputs give identical results.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossFn {
    L0(AnnealedL0Loss),
    L1,
    L2,
}

impl LossFn {
    pub fn loss(&self, prediction: &Tensor, target: &Tensor) -> f64 {
        match self {
            LossFn::L0(l0) => l0.loss(prediction, target),
            LossFn::L1 => MaeLoss::loss(prediction, target),
            LossFn::L2 => MseLoss::loss(prediction, target),
        }
    }

    /// ∂loss/∂prediction.
    pub fn gradient(&self, prediction: &Tensor, target: &Tensor) -> Tensor {
        match self {
            LossFn::L0(l0) => l0.derivative(prediction, target),
            LossFn::L1 => MaeLoss::derivative(prediction, target),
            LossFn::L2 => MseLoss::derivative(prediction, target),
        }
    }

    /// The `l0` exponent, when this is the annealed loss.
    pub fn gamma(&self) -> Option<f64> {
        match self {
            LossFn::L0(l0) => Some(l0.gamma),
            _ => None,
        }
    }
}
