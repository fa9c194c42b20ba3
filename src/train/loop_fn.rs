use std::sync::atomic::Ordering;
use std::time::Instant;

use log::info;

use crate::data::NoisyPairs;
use crate::error::Result;
use crate::model::{DenoisingModel, EvalPass, GlobalStep, MeanMetric, Mode};
use crate::train::step_stats::StepStats;
use crate::train::train_config::TrainConfig;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` from `step` until `config.max_steps` and returns the
/// statistics of the **last evaluation pass**, if one ran.
///
/// # Arguments
/// - `model` : the model; its parameters are updated in place
/// - `step`  : global step, advanced once per training step
/// - `train` : source of training batches
/// - `eval`  : source of evaluation batches (needs `gt`)
/// - `config`: schedule, optional progress channel, optional stop flag
///
/// # Early termination
/// The loop breaks early if the `progress_tx` receiver has been dropped or
/// `config.stop_flag` is set. A checkpoint is still written in both cases.
///
/// # Errors
/// The first failing model invocation or checkpoint write aborts the loop.
pub fn train_loop(
    model: &mut DenoisingModel,
    step: &mut GlobalStep,
    train: &mut NoisyPairs,
    eval: &mut NoisyPairs,
    config: &TrainConfig,
) -> Result<Option<StepStats>> {
    let mut last_stats = None;
    let mut train_loss = MeanMetric::default();
    let mut since = Instant::now();
    let mut saved_at = None;

    info!("training from step {step} to {}", config.max_steps);

    while step.get() < config.max_steps {
        if stop_requested(config) {
            info!("stop requested at step {step}");
            break;
        }

        let batch = train.next_batch();
        let output = model.run(&batch, Mode::Train { step: &mut *step })?;
        if let Some(loss) = output.loss() {
            train_loss.update(loss, 1.0);
        }

        if is_due(step.get(), config.eval_every) {
            let pass = evaluate(model, step, eval, config.eval_batches)?;
            let stats = StepStats {
                step: step.get(),
                train_loss: train_loss.result(),
                eval_loss: pass.mean_loss(),
                comparison_metric: pass.comparison_metric(),
                elapsed_ms: since.elapsed().as_millis() as u64,
            };
            info!(
                "step {}: train loss {:.6}, eval loss {:.6}, vs clean {:.6} ({} ms)",
                stats.step, stats.train_loss, stats.eval_loss, stats.comparison_metric, stats.elapsed_ms
            );
            train_loss = MeanMetric::default();
            since = Instant::now();
            last_stats = Some(stats.clone());

            if let Some(ref tx) = config.progress_tx {
                // If the receiver has been dropped, stop training.
                if tx.send(stats).is_err() {
                    break;
                }
            }
        }

        if is_due(step.get(), config.checkpoint_every) {
            save_checkpoint(model, *step)?;
            saved_at = Some(step.get());
        }
    }

    if needs_final_checkpoint(saved_at, step.get()) {
        save_checkpoint(model, *step)?;
    }
    model.flush_summaries();
    Ok(last_stats)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Runs one evaluation pass of `batches` batches at the current step.
fn evaluate(
    model: &mut DenoisingModel,
    step: &GlobalStep,
    eval: &mut NoisyPairs,
    batches: usize,
) -> Result<EvalPass> {
    let mut pass = EvalPass::new();
    for _ in 0..batches.max(1) {
        let batch = eval.next_batch();
        model.run(&batch, Mode::Eval { step, pass: &mut pass })?;
    }
    Ok(pass)
}

fn save_checkpoint(model: &DenoisingModel, step: GlobalStep) -> Result<()> {
    match model.config().checkpoint_path() {
        Some(path) => model.save_checkpoint(path, step),
        None => Ok(()),
    }
}

/// The last in-loop checkpoint already covers `step` when it was taken there.
fn needs_final_checkpoint(saved_at: Option<u64>, step: u64) -> bool {
    saved_at != Some(step)
}

fn is_due(step: u64, every: u64) -> bool {
    every > 0 && step % every == 0
}

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().map(|f| f.load(Ordering::Relaxed)).unwrap_or(false)
}
