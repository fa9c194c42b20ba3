pub mod histogram;
pub mod panel;
pub mod writer;

pub use histogram::HistogramSummary;
pub use panel::write_eval_panels;
pub use writer::{read_events, Event, SummaryWriter};
