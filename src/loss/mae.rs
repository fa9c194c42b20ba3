use crate::math::tensor::Tensor;

/// `l1`: mean absolute difference.
pub struct MaeLoss;

impl MaeLoss {
    /// Scalar MAE: mean(|predicted - expected|)
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> f64 {
        let n = predicted.len().max(1) as f64;
        predicted.iter().zip(expected.iter())
            .map(|(p, y)| (p - y).abs())
            .sum::<f64>() / n
    }

    /// Per-element subgradient: sign(p - y) / n  (0 when equal)
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Tensor {
        let n = predicted.len().max(1) as f64;
        let mut grad = predicted - expected;
        grad.mapv_inplace(|diff| {
            if diff > 0.0 { 1.0 / n } else if diff < 0.0 { -1.0 / n } else { 0.0 }
        });
        grad
    }
}
