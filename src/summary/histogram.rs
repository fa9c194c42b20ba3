use ndarray::ArrayViewD;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUCKETS: usize = 30;

/// Distribution summary of a parameter or gradient array.
///
/// `buckets` splits `[min, max]` into equal-width bins; the last bin is
/// closed on the right so `max` is counted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    pub buckets: Vec<u64>,
}

impl HistogramSummary {
    pub fn from_array(values: &ArrayViewD<'_, f64>, bins: usize) -> HistogramSummary {
        let count = values.len();
        let bins = bins.max(1);
        if count == 0 {
            return HistogramSummary { count, min: 0.0, max: 0.0, mean: 0.0, std: 0.0, buckets: vec![0; bins] };
        }

        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let mean = values.sum() / count as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        let mut buckets = vec![0u64; bins];
        let width = (max - min) / bins as f64;
        for &v in values.iter() {
            let idx = if width > 0.0 { ((v - min) / width) as usize } else { 0 };
            buckets[idx.min(bins - 1)] += 1;
        }

        HistogramSummary { count, min, max, mean, std: var.sqrt(), buckets }
    }
}
