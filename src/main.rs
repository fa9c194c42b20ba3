//! Trains a Noise2Noise denoiser on a folder of clean images.
//!
//! Usage:
//!   ferrite-n2n <config.json> <train_dir> [eval_dir]
//!
//! Noisy input/target pairs are synthesized from the clean images. When
//! `model_dir` is set in the configuration the run resumes from
//! `<model_dir>/checkpoint.json` if it exists. Logging follows `RUST_LOG`.

use std::env;

use anyhow::{bail, Context};
use log::info;

use ferrite_n2n::data::{load_images, NoisyPairs};
use ferrite_n2n::{train_loop, DenoisingModel, GlobalStep, ModelConfig, TrainConfig};

const PATCH: usize = 64;
const SIGMA: f64 = 0.1;
const BATCH_SIZE: usize = 8;
const MAX_STEPS: u64 = 20_000;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <config.json> <train_dir> [eval_dir]", args[0]);
    }

    let config = ModelConfig::load_json(&args[1]).with_context(|| format!("reading {}", args[1]))?;
    let channels = 1;

    let train_images = load_images(&args[2], channels).with_context(|| format!("loading {}", args[2]))?;
    let eval_images = match args.get(3) {
        Some(dir) => load_images(dir, channels).with_context(|| format!("loading {dir}"))?,
        None => train_images.clone(),
    };

    let mut model = DenoisingModel::new(&config, channels)?;
    let mut step = GlobalStep::default();
    if let Some(path) = config.checkpoint_path().filter(|p| p.exists()) {
        step = model.load_checkpoint(&path).with_context(|| format!("resuming from {}", path.display()))?;
    }

    let mut train = NoisyPairs::new(train_images, PATCH, SIGMA, BATCH_SIZE, config.seed)?;
    let mut eval = NoisyPairs::new(eval_images, PATCH, SIGMA, BATCH_SIZE, config.seed.map(|s| s + 1))?;

    let train_config = TrainConfig::new(MAX_STEPS);
    match train_loop(&mut model, &mut step, &mut train, &mut eval, &train_config)? {
        Some(stats) => info!(
            "finished at step {}: eval loss {:.6}, vs clean {:.6}",
            stats.step, stats.eval_loss, stats.comparison_metric
        ),
        None => info!("finished at step {step}"),
    }
    Ok(())
}
