use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use crate::train::step_stats::StepStats;

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `max_steps`       : training stops once the global step reaches this
/// - `eval_every`      : steps between evaluation passes; `0` disables them
/// - `eval_batches`    : batches per evaluation pass
/// - `checkpoint_every`: steps between checkpoints; `0` only saves at the end
/// - `progress_tx`     : optional channel; one `StepStats` per evaluation
///                        pass. If the receiver is dropped the loop stops.
/// - `stop_flag`       : optional atomic flag; when set from another thread
///                        the loop stops before the next step.
pub struct TrainConfig {
    pub max_steps: u64,
    pub eval_every: u64,
    pub eval_batches: usize,
    pub checkpoint_every: u64,
    pub progress_tx: Option<mpsc::Sender<StepStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Evaluates every 100 steps over 4 batches and checkpoints every 1000.
    pub fn new(max_steps: u64) -> Self {
        TrainConfig {
            max_steps,
            eval_every: 100,
            eval_batches: 4,
            checkpoint_every: 1000,
            progress_tx: None,
            stop_flag: None,
        }
    }
}
