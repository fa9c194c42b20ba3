use crate::math::tensor::Tensor;
use crate::model::eval_pass::EvalPass;
use crate::model::global_step::GlobalStep;

/// Name under which PREDICT exports its output.
pub const DENOISED_OUTPUT: &str = "denoised";

/// What a model invocation should do.
///
/// EVAL only reads the step (it binds the annealed loss and names the
/// snapshots); TRAIN advances it.
#[derive(Debug)]
pub enum Mode<'a> {
    Predict,
    Eval { step: &'a GlobalStep, pass: &'a mut EvalPass },
    Train { step: &'a mut GlobalStep },
}

impl Mode<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Predict => "predict",
            Mode::Eval { .. } => "eval",
            Mode::Train { .. } => "train",
        }
    }
}

/// Result of one invocation. Each variant carries only its mode's fields.
#[derive(Debug, Clone)]
pub enum ModelOutput {
    Predict { denoised: Tensor },
    Eval { loss: f64, comparison_metric: f64 },
    /// `global_step` is the value after the update.
    Train { loss: f64, global_step: u64 },
}

impl ModelOutput {
    pub fn loss(&self) -> Option<f64> {
        match self {
            ModelOutput::Predict { .. } => None,
            ModelOutput::Eval { loss, .. } | ModelOutput::Train { loss, .. } => Some(*loss),
        }
    }

    pub fn into_denoised(self) -> Option<Tensor> {
        match self {
            ModelOutput::Predict { denoised } => Some(denoised),
            _ => None,
        }
    }
}
