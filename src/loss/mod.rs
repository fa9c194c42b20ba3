pub mod l0;
pub mod loss_type;
pub mod mae;
pub mod mse;

pub use l0::{AnnealedL0Loss, L0_MAX_STEPS};
pub use loss_type::{select_loss, LossFn, LossType};
pub use mae::MaeLoss;
pub use mse::MseLoss;
