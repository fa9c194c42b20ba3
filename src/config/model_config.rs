use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{N2nError, Result};

/// Hyperparameters of the U-Net denoiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UNetConfig {
    /// Filters of the first encoder level; doubled at every level below.
    pub base_filters: usize,
    /// Number of pooling levels.
    pub depth: usize,
}

impl Default for UNetConfig {
    fn default() -> Self {
        UNetConfig { base_filters: 16, depth: 2 }
    }
}

/// Hyperparameters of the residual encoder-decoder (RED-Net) denoiser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedNetConfig {
    /// Convolution layers in the encoder; the decoder mirrors them.
    pub layers: usize,
    pub filters: usize,
    /// A symmetric skip joins every `skip_every`-th decoder layer.
    pub skip_every: usize,
}

impl Default for RedNetConfig {
    fn default() -> Self {
        RedNetConfig { layers: 5, filters: 32, skip_every: 2 }
    }
}

/// Options recognised by the model. Resolved once per process and read-only
/// while the model is built.
///
/// `architecture`, `loss` and `output_activation` are kept as the strings
/// found in the configuration file; [`crate::DenoisingModel::new`] resolves
/// them and fails with `InvalidConfiguration` on unknown names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub architecture: String,
    pub loss: String,
    pub learning_rate: f64,
    pub variable_histograms: bool,
    pub gradient_histograms: bool,
    pub output_activation: String,
    pub unet: UNetConfig,
    pub rednet: RedNetConfig,
    /// Run directory for summaries, evaluation snapshots and checkpoints.
    /// Without it the model writes nothing to disk.
    pub model_dir: Option<PathBuf>,
    /// Samples stacked into each evaluation image panel.
    pub max_panel_images: usize,
    /// Seed for weight initialization; random when absent.
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            architecture: "unet".into(),
            loss: "l2".into(),
            learning_rate: 1e-4,
            variable_histograms: false,
            gradient_histograms: false,
            output_activation: "identity".into(),
            unet: UNetConfig::default(),
            rednet: RedNetConfig::default(),
            model_dir: None,
            max_panel_images: 3,
            seed: None,
        }
    }
}

impl ModelConfig {
    /// Checks the numeric options. Names are checked by their selectors.
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(N2nError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }

    pub fn events_path(&self) -> Option<PathBuf> {
        self.model_dir.as_ref().map(|dir| dir.join("events.jsonl"))
    }

    pub fn eval_dir(&self) -> Option<PathBuf> {
        self.model_dir.as_ref().map(|dir| dir.join("eval"))
    }

    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.model_dir.as_ref().map(|dir| dir.join("checkpoint.json"))
    }

    /// Serializes the configuration to a pretty-printed JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Reads a configuration file; missing fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<ModelConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
