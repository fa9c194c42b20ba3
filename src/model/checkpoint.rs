use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::info;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::{N2nError, Result};
use crate::model::global_step::GlobalStep;
use crate::model::model_fn::DenoisingModel;

/// A parameter array stored in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

/// Everything needed to resume a model: its weights, its running
/// statistics and the step they were reached at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub architecture: String,
    pub channels: usize,
    pub global_step: u64,
    pub tensors: BTreeMap<String, StoredTensor>,
}

impl Checkpoint {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Checkpoint> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl DenoisingModel {
    pub fn checkpoint(&self, step: GlobalStep) -> Checkpoint {
        let tensors = self
            .network
            .parameters()
            .into_iter()
            .map(|p| {
                let stored = StoredTensor { shape: p.value.shape().to_vec(), data: p.value.iter().copied().collect() };
                (p.name.to_owned(), stored)
            })
            .collect();
        Checkpoint {
            architecture: self.network.architecture().name().to_owned(),
            channels: self.network.channels(),
            global_step: step.get(),
            tensors,
        }
    }

    /// Replaces every parameter with the checkpoint's values and returns the
    /// step to resume from. Nothing is written unless the whole checkpoint
    /// matches the network. Optimizer moments restart from zero.
    pub fn restore(&mut self, checkpoint: &Checkpoint) -> Result<GlobalStep> {
        let architecture = self.network.architecture();
        if checkpoint.architecture != architecture.name() {
            return Err(N2nError::config(format!(
                "checkpoint was written by a {} model, this model is {architecture}",
                checkpoint.architecture
            )));
        }
        if checkpoint.channels != self.network.channels() {
            return Err(N2nError::config(format!(
                "checkpoint has {} channel(s), this model has {}",
                checkpoint.channels,
                self.network.channels()
            )));
        }

        let params = self.network.parameters();
        if params.len() != checkpoint.tensors.len() {
            let known: Vec<&str> = params.iter().map(|p| p.name).collect();
            if let Some(extra) = checkpoint.tensors.keys().find(|k| !known.contains(&k.as_str())) {
                return Err(N2nError::config(format!("checkpoint has unknown tensor '{extra}'")));
            }
        }
        for p in &params {
            let stored = checkpoint
                .tensors
                .get(p.name)
                .ok_or_else(|| N2nError::config(format!("checkpoint is missing tensor '{}'", p.name)))?;
            let expected: usize = stored.shape.iter().product();
            if stored.shape != p.value.shape() || stored.data.len() != expected {
                return Err(N2nError::config(format!(
                    "tensor '{}' has shape {:?} in the checkpoint, the model expects {:?}",
                    p.name,
                    stored.shape,
                    p.value.shape()
                )));
            }
        }
        drop(params);

        for mut p in self.network.parameters_mut() {
            let stored = &checkpoint.tensors[p.name];
            let value = ArrayD::from_shape_vec(IxDyn(&stored.shape), stored.data.clone())?;
            p.value.assign(&value);
        }
        self.optimizer.reset();
        Ok(GlobalStep::new(checkpoint.global_step))
    }

    pub fn save_checkpoint(&self, path: impl AsRef<Path>, step: GlobalStep) -> Result<()> {
        let path = path.as_ref();
        self.checkpoint(step).save_json(path)?;
        info!("saved checkpoint at step {step} to {}", path.display());
        Ok(())
    }

    pub fn load_checkpoint(&mut self, path: impl AsRef<Path>) -> Result<GlobalStep> {
        let path = path.as_ref();
        let step = self.restore(&Checkpoint::load_json(path)?)?;
        info!("restored step {step} from {}", path.display());
        Ok(step)
    }
}
