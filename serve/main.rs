//! HTTP inference for a trained denoiser.
//!
//! Run with:
//!   cargo run --bin serve --release -- <config.json> <checkpoint.json> [addr]
//!
//! Routes:
//!   GET  /health  : liveness probe, answers `ok`
//!   POST /predict : body is an image file; answers
//!                    `{"outputs": {"denoised": {"shape": [...], "data": [...]}}}`

mod routes;

use std::env;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context};
use log::info;
use tiny_http::Server;

use ferrite_n2n::model::Checkpoint;
use ferrite_n2n::{DenoisingModel, ModelConfig};

const DEFAULT_ADDR: &str = "127.0.0.1:7878";

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <config.json> <checkpoint.json> [addr]", args[0]);
    }
    let addr = args.get(3).map(String::as_str).unwrap_or(DEFAULT_ADDR);

    // Inference never writes summaries, whatever the training run configured.
    let config = ModelConfig { model_dir: None, ..ModelConfig::load_json(&args[1]).context("reading config")? };
    let checkpoint = Checkpoint::load_json(&args[2]).context("reading checkpoint")?;
    let mut model = DenoisingModel::new(&config, checkpoint.channels)?;
    let step = model.restore(&checkpoint)?;
    info!("loaded {} model at step {step}", model.architecture());

    let server = Server::http(addr).map_err(|e| anyhow!("failed to bind {addr}: {e}"))?;
    info!("listening on http://{addr}");

    let shared = Arc::new(Mutex::new(model));
    // One thread per request; the mutex serializes access to the model.
    for request in server.incoming_requests() {
        let model = Arc::clone(&shared);
        std::thread::spawn(move || routes::dispatch(request, model));
    }
    Ok(())
}
