use std::collections::BTreeMap;

use crate::error::{N2nError, Result};
use crate::math::tensor::Tensor;

pub const INPUT_KEY: &str = "input";
pub const TARGET_KEY: &str = "target";
pub const GT_KEY: &str = "gt";

/// One batch handed to the model.
///
/// `input` is always required. `target` (a second noisy realization of the
/// same scene) is needed by EVAL and TRAIN, `gt` (the clean image) by EVAL
/// only. Present arrays must share the `[batch, height, width, channels]`
/// shape of `input`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub input: Tensor,
    pub target: Option<Tensor>,
    pub gt: Option<Tensor>,
}

impl Batch {
    pub fn new(input: Tensor) -> Batch {
        Batch { input, target: None, gt: None }
    }

    pub fn with_target(mut self, target: Tensor) -> Batch {
        self.target = Some(target);
        self
    }

    pub fn with_gt(mut self, gt: Tensor) -> Batch {
        self.gt = Some(gt);
        self
    }

    /// Builds a batch from a feature map keyed by `input`, `target` and `gt`.
    /// Any other key is rejected.
    pub fn from_features(mut features: BTreeMap<String, Tensor>) -> Result<Batch> {
        let input = features
            .remove(INPUT_KEY)
            .ok_or_else(|| N2nError::input("feature map has no 'input'"))?;
        let target = features.remove(TARGET_KEY);
        let gt = features.remove(GT_KEY);
        if let Some(key) = features.keys().next() {
            return Err(N2nError::input(format!("unexpected feature '{key}'")));
        }
        Ok(Batch { input, target, gt })
    }

    /// Number of samples.
    pub fn size(&self) -> usize {
        self.input.dim().0
    }

    pub(crate) fn require_target(&self) -> Result<&Tensor> {
        self.require(TARGET_KEY, self.target.as_ref())
    }

    pub(crate) fn require_gt(&self) -> Result<&Tensor> {
        self.require(GT_KEY, self.gt.as_ref())
    }

    fn require<'a>(&self, key: &str, field: Option<&'a Tensor>) -> Result<&'a Tensor> {
        let t = field.ok_or_else(|| N2nError::input(format!("batch has no '{key}'")))?;
        if t.dim() != self.input.dim() {
            return Err(N2nError::input(format!(
                "'{key}' has shape {:?} but 'input' has {:?}",
                t.shape(),
                self.input.shape()
            )));
        }
        Ok(t)
    }
}
