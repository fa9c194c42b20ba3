use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::activation::ActivationFunction;
use crate::config::ModelConfig;
use crate::error::{N2nError, Result};
use crate::layers::ParamView;
use crate::loss::{select_loss, LossFn, LossType};
use crate::math::tensor::Tensor;
use crate::model::batch::Batch;
use crate::model::eval_pass::EvalPass;
use crate::model::global_step::GlobalStep;
use crate::model::mode::{Mode, ModelOutput};
use crate::nets::{select_architecture, Architecture, Denoiser};
use crate::optim::Adam;
use crate::summary::{write_eval_panels, SummaryWriter};

/// A Noise2Noise denoiser: one network, one loss, one optimizer, driven
/// one batch at a time through [`DenoisingModel::run`].
pub struct DenoisingModel {
    pub(super) config: ModelConfig,
    pub(super) loss: LossType,
    pub(super) network: Box<dyn Denoiser>,
    pub(super) optimizer: Adam,
    summaries: SummaryWriter,
}

impl DenoisingModel {
    /// Resolves every named option and builds the network.
    ///
    /// Unknown architecture, loss or activation names fail with
    /// `InvalidConfiguration` before any parameter is allocated.
    pub fn new(config: &ModelConfig, channels: usize) -> Result<DenoisingModel> {
        let architecture = select_architecture(&config.architecture)?;
        let loss = select_loss(&config.loss)?;
        let output_activation: ActivationFunction = config.output_activation.parse()?;
        config.validate()?;
        if channels == 0 {
            return Err(N2nError::config("channel count must be at least 1"));
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let network = architecture.build(channels, output_activation, config, &mut rng)?;

        let summaries = match config.events_path() {
            Some(path) => SummaryWriter::create(path)?,
            None => SummaryWriter::disabled(),
        };

        let trainable: usize = network.parameters().iter().filter(|p| p.trainable).map(|p| p.value.len()).sum();
        info!(
            "built {architecture} denoiser: {channels} channel(s), loss {loss}, {trainable} trainable weights"
        );

        Ok(DenoisingModel {
            config: config.clone(),
            loss,
            network,
            optimizer: Adam::new(config.learning_rate),
            summaries,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn architecture(&self) -> Architecture {
        self.network.architecture()
    }

    pub fn channels(&self) -> usize {
        self.network.channels()
    }

    /// Named parameters and running statistics of the network.
    pub fn parameters(&self) -> Vec<ParamView<'_>> {
        self.network.parameters()
    }

    /// Runs one invocation in the given mode.
    ///
    /// Fields required by the mode are checked before the network runs. In
    /// TRAIN the parameter update and the step increment are applied here,
    /// after every fallible part of the step has succeeded.
    pub fn run(&mut self, batch: &Batch, mode: Mode<'_>) -> Result<ModelOutput> {
        debug!("{} on a batch of {}", mode.name(), batch.size());
        match mode {
            Mode::Predict => {
                let denoised = self.denoise(&batch.input, false)?;
                Ok(ModelOutput::Predict { denoised })
            }
            Mode::Eval { step, pass } => self.evaluate(batch, *step, pass),
            Mode::Train { step } => self.train(batch, step),
        }
    }

    /// Flushes buffered summary events.
    pub fn flush_summaries(&mut self) {
        self.summaries.flush();
    }

    fn denoise(&mut self, input: &Tensor, is_training: bool) -> Result<Tensor> {
        let (b, h, w, c) = input.dim();
        if b == 0 || h == 0 || w == 0 {
            return Err(N2nError::input(format!("empty input of shape {:?}", input.shape())));
        }
        if c != self.network.channels() {
            return Err(N2nError::input(format!(
                "input has {c} channel(s), the model was built for {}",
                self.network.channels()
            )));
        }
        self.network.forward(input, is_training)
    }

    fn evaluate(&mut self, batch: &Batch, step: GlobalStep, pass: &mut EvalPass) -> Result<ModelOutput> {
        let target = batch.require_target()?;
        let gt = batch.require_gt()?;
        let prediction = self.denoise(&batch.input, false)?;

        let loss_fn = self.loss.at_step(step.get());
        let loss = loss_fn.loss(&prediction, target);
        let comparison = loss_fn.loss(&prediction, gt);

        let first_batch = pass.batches() == 0;
        pass.record(loss, comparison, batch.size());
        if first_batch {
            self.snapshot(step, &batch.input, &prediction, gt);
        }

        Ok(ModelOutput::Eval { loss, comparison_metric: pass.comparison_metric() })
    }

    fn train(&mut self, batch: &Batch, step: &mut GlobalStep) -> Result<ModelOutput> {
        let target = batch.require_target()?;
        let prediction = self.denoise(&batch.input, true)?;

        let loss_fn = self.loss.at_step(step.get());
        let loss = loss_fn.loss(&prediction, target);
        if !loss.is_finite() {
            return Err(N2nError::NumericInstability(format!("loss is {loss} at step {step}")));
        }

        self.network.zero_grad();
        self.network.backward(&loss_fn.gradient(&prediction, target))?;

        // Nothing below can fail.
        self.network.apply_pending_statistics();
        self.optimizer.step(self.network.parameters_mut(), step.get());
        step.increment();

        self.record_train_summaries(step.get(), loss, &loss_fn);
        Ok(ModelOutput::Train { loss, global_step: step.get() })
    }

    fn record_train_summaries(&mut self, step: u64, loss: f64, loss_fn: &LossFn) {
        self.summaries.scalar(step, "loss", loss);
        if let Some(gamma) = loss_fn.gamma() {
            self.summaries.scalar(step, "l0/gamma", gamma);
        }

        let (variables, gradients) = (self.config.variable_histograms, self.config.gradient_histograms);
        if !(variables || gradients) {
            return;
        }
        for p in self.network.parameters().into_iter().filter(|p| p.trainable) {
            if variables {
                self.summaries.histogram(step, &format!("variables/{}", p.name), &p.value);
            }
            if gradients {
                self.summaries.histogram(step, &format!("gradients/{}", p.name), &p.grad);
            }
        }
    }

    fn snapshot(&mut self, step: GlobalStep, input: &Tensor, prediction: &Tensor, gt: &Tensor) {
        let Some(dir) = self.config.eval_dir() else { return };
        match write_eval_panels(&dir, step.get(), input, prediction, gt, self.config.max_panel_images) {
            Ok([full, crop]) => {
                self.summaries.image(step.get(), "eval/panel", &full);
                self.summaries.image(step.get(), "eval/panel_crop", &crop);
            }
            Err(e) => warn!("could not write evaluation panels for step {step}: {e}"),
        }
    }
}
