/// Weighted running mean.
#[derive(Debug, Clone, Default)]
pub struct MeanMetric {
    total: f64,
    weight: f64,
}

impl MeanMetric {
    pub fn update(&mut self, value: f64, weight: f64) {
        self.total += value * weight;
        self.weight += weight;
    }

    /// Mean of everything seen so far; 0 before the first update.
    pub fn result(&self) -> f64 {
        if self.weight > 0.0 {
            self.total / self.weight
        } else {
            0.0
        }
    }
}

/// Accumulators of one evaluation pass. Create a fresh one per pass.
///
/// Each batch is weighted by its sample count, so equally sized batches
/// average to the plain mean of their per-batch values.
#[derive(Debug, Clone, Default)]
pub struct EvalPass {
    comparison: MeanMetric,
    loss: MeanMetric,
    batches: usize,
}

impl EvalPass {
    pub fn new() -> EvalPass {
        EvalPass::default()
    }

    pub(crate) fn record(&mut self, loss: f64, comparison: f64, samples: usize) {
        let weight = samples as f64;
        self.loss.update(loss, weight);
        self.comparison.update(comparison, weight);
        self.batches += 1;
    }

    /// Running mean of `loss(prediction, gt)`.
    pub fn comparison_metric(&self) -> f64 {
        self.comparison.result()
    }

    /// Running mean of `loss(prediction, target)`.
    pub fn mean_loss(&self) -> f64 {
        self.loss.result()
    }

    pub fn batches(&self) -> usize {
        self.batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_batches_average_plainly() {
        let mut pass = EvalPass::new();
        pass.record(1.0, 0.2, 4);
        pass.record(3.0, 0.6, 4);
        assert!((pass.comparison_metric() - 0.4).abs() < 1e-12);
        assert!((pass.mean_loss() - 2.0).abs() < 1e-12);
        assert_eq!(pass.batches(), 2);
    }

    #[test]
    fn larger_batches_weigh_more() {
        let mut m = MeanMetric::default();
        assert_eq!(m.result(), 0.0);
        m.update(1.0, 1.0);
        m.update(4.0, 3.0);
        assert!((m.result() - 13.0 / 4.0).abs() < 1e-12);
    }
}
