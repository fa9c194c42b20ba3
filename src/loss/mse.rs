use crate::math::tensor::Tensor;

/// `l2`: mean squared difference.
pub struct MseLoss;

impl MseLoss {
    /// Scalar MSE: mean((predicted - expected)²)
    pub fn loss(predicted: &Tensor, expected: &Tensor) -> f64 {
        let n = predicted.len().max(1) as f64;
        predicted.iter().zip(expected.iter())
            .map(|(p, y)| (p - y).powi(2))
            .sum::<f64>() / n
    }

    /// Per-element gradient: 2·(predicted - expected) / n
    pub fn derivative(predicted: &Tensor, expected: &Tensor) -> Tensor {
        let scale = 2.0 / predicted.len().max(1) as f64;
        let mut grad = predicted - expected;
        grad *= scale;
        grad
    }
}
