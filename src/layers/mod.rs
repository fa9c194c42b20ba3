pub mod batch_norm;
pub mod conv;
pub mod parameter;
pub mod resample;
pub mod unit;

pub use batch_norm::BatchNorm;
pub use conv::Conv2d;
pub use parameter::{ParamView, ParamViewMut, Parameter};
pub use resample::{AvgPool2, Upsample2};
pub use unit::ConvUnit;
