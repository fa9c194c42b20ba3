use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::summary::histogram::{HistogramSummary, DEFAULT_BUCKETS};

/// One line of the run's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Scalar { step: u64, tag: String, value: f64 },
    Histogram { step: u64, tag: String, histogram: HistogramSummary },
    Image { step: u64, tag: String, path: PathBuf },
}

/// Append-only JSON-lines event log for a run.
///
/// Every write failure is logged and swallowed: summaries are a side
/// channel and never fail the computation that produced them.
#[derive(Debug)]
pub struct SummaryWriter {
    out: Option<BufWriter<File>>,
}

impl SummaryWriter {
    /// A writer that only forwards scalars to the `log` crate.
    pub fn disabled() -> SummaryWriter {
        SummaryWriter { out: None }
    }

    pub fn create(path: impl AsRef<Path>) -> Result<SummaryWriter> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(SummaryWriter { out: Some(BufWriter::new(file)) })
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn scalar(&mut self, step: u64, tag: &str, value: f64) {
        debug!("step {step}: {tag} = {value:.6}");
        self.emit(&Event::Scalar { step, tag: tag.to_owned(), value });
    }

    pub fn histogram(&mut self, step: u64, tag: &str, values: &ArrayViewD<'_, f64>) {
        if !self.is_enabled() {
            return;
        }
        let histogram = HistogramSummary::from_array(values, DEFAULT_BUCKETS);
        self.emit(&Event::Histogram { step, tag: tag.to_owned(), histogram });
    }

    pub fn image(&mut self, step: u64, tag: &str, path: &Path) {
        self.emit(&Event::Image { step, tag: tag.to_owned(), path: path.to_path_buf() });
    }

    pub fn flush(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                warn!("failed to flush summaries: {e}");
            }
        }
    }

    fn emit(&mut self, event: &Event) {
        if let Err(e) = self.write(event) {
            warn!("dropping summary event: {e}");
        }
    }

    fn write(&mut self, event: &Event) -> Result<()> {
        let Some(out) = self.out.as_mut() else { return Ok(()) };
        serde_json::to_writer(&mut *out, event)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Reads back an event log. Used by tests and tooling, never by the model.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<Event>> {
    let text = fs::read_to_string(path)?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| Ok(serde_json::from_str(l)?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    #[test]
    fn writes_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("ferrite-n2n-summary-{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let _ = fs::remove_file(&path);
        {
            let mut w = SummaryWriter::create(&path).unwrap();
            w.scalar(3, "loss", 0.5);
            w.histogram(3, "variables/w", &Array1::from(vec![1.0, 2.0]).into_dyn().view());
        }
        let events = read_events(&path).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Scalar { step: 3, tag: "loss".into(), value: 0.5 });
        assert!(matches!(&events[1], Event::Histogram { tag, histogram, .. } if tag == "variables/w" && histogram.count == 2));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn disabled_writer_is_silent() {
        let mut w = SummaryWriter::disabled();
        w.scalar(0, "loss", 1.0);
        w.histogram(0, "x", &Array1::from(vec![1.0]).into_dyn().view());
        assert!(!w.is_enabled());
    }
}
