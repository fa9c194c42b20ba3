pub mod batch;
pub mod checkpoint;
pub mod eval_pass;
pub mod global_step;
pub mod mode;
pub mod model_fn;

pub use batch::Batch;
pub use checkpoint::{Checkpoint, StoredTensor};
pub use eval_pass::{EvalPass, MeanMetric};
pub use global_step::GlobalStep;
pub use mode::{Mode, ModelOutput, DENOISED_OUTPUT};
pub use model_fn::DenoisingModel;
