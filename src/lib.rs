pub mod activation;
pub mod config;
pub mod data;
pub mod error;
pub mod layers;
pub mod loss;
pub mod math;
pub mod model;
pub mod nets;
pub mod optim;
pub mod summary;
pub mod train;

// Convenience re-exports
pub use activation::ActivationFunction;
pub use config::ModelConfig;
pub use error::{N2nError, Result};
pub use loss::{select_loss, LossType};
pub use math::Tensor;
pub use model::{Batch, DenoisingModel, EvalPass, GlobalStep, Mode, ModelOutput, DENOISED_OUTPUT};
pub use nets::{select_architecture, Architecture};
pub use train::{train_loop, StepStats, TrainConfig};
