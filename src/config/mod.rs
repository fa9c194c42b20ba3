pub mod model_config;

pub use model_config::{ModelConfig, RedNetConfig, UNetConfig};
