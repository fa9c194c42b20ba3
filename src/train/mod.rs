pub mod loop_fn;
pub mod step_stats;
pub mod train_config;

pub use loop_fn::train_loop;
pub use step_stats::StepStats;
pub use train_config::TrainConfig;
