use serde::{Deserialize, Serialize};

/// Progress report emitted by `train_loop` after every evaluation pass.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, one value is
/// sent per pass; the receiver decides how to display it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStats {
    /// Global step the evaluation ran at.
    pub step: u64,
    /// Mean training loss since the previous report.
    pub train_loss: f64,
    /// Mean `loss(prediction, target)` over the evaluation pass.
    pub eval_loss: f64,
    /// Mean `loss(prediction, gt)` over the evaluation pass.
    pub comparison_metric: f64,
    /// Wall-clock time since the previous report, in milliseconds.
    pub elapsed_ms: u64,
}
