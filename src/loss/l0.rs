use crate::math::tensor::Tensor;

/// Step at which the `l0` exponent reaches zero and stays there.
pub const L0_MAX_STEPS: u64 = 200_000;

/// Keeps `0^gamma` finite when the error is exactly zero.
const EPS: f64 = 1e-8;

/// `l0`: annealed robust loss `mean((|target - predicted| + ε)^γ)`.
///
/// γ decays linearly from 2 at step 0 to 0 at [`L0_MAX_STEPS`]: training
/// starts close to L2 and ends close to an L0 "exact match" penalty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnealedL0Loss {
    pub gamma: f64,
}

impl AnnealedL0Loss {
    pub fn at_step(global_step: u64) -> AnnealedL0Loss {
        AnnealedL0Loss { gamma: gamma_at(global_step) }
    }

    pub fn loss(&self, predicted: &Tensor, expected: &Tensor) -> f64 {
        let n = predicted.len().max(1) as f64;
        predicted.iter().zip(expected.iter())
            .map(|(p, y)| ((y - p).abs() + EPS).powf(self.gamma))
            .sum::<f64>() / n
    }

    /// Per-element gradient: γ·(|p - y| + ε)^(γ-1)·sign(p - y) / n
    pub fn derivative(&self, predicted: &Tensor, expected: &Tensor) -> Tensor {
        let n = predicted.len().max(1) as f64;
        let gamma = self.gamma;
        let mut grad = predicted - expected;
        grad.mapv_inplace(|diff| {
            if diff == 0.0 || gamma == 0.0 {
                0.0
            } else {
                gamma * (diff.abs() + EPS).powf(gamma - 1.0) * diff.signum() / n
            }
        });
        grad
    }
}

/// `γ = 2 · (1 - min(step, max) / max)`
pub fn gamma_at(global_step: u64) -> f64 {
    let ratio = global_step.min(L0_MAX_STEPS) as f64 / L0_MAX_STEPS as f64;
    2.0 * (1.0 - ratio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_decays_linearly_then_saturates() {
        assert_eq!(gamma_at(0), 2.0);
        assert_eq!(gamma_at(L0_MAX_STEPS / 2), 1.0);
        assert_eq!(gamma_at(L0_MAX_STEPS), 0.0);
        assert_eq!(gamma_at(L0_MAX_STEPS * 10), 0.0);

        let mut prev = gamma_at(0);
        for step in (0..=L0_MAX_STEPS + 5_000).step_by(997) {
            let g = gamma_at(step);
            assert!(g >= 0.0 && g <= prev);
            prev = g;
        }
    }

    #[test]
    fn exact_match_is_near_zero_early_and_one_late() {
        let p = Tensor::from_elem((1, 2, 2, 1), 0.3);
        assert!(AnnealedL0Loss::at_step(0).loss(&p, &p) < 1e-15);
        // (0 + ε)^0 = 1 for every element
        assert_eq!(AnnealedL0Loss::at_step(L0_MAX_STEPS).loss(&p, &p), 1.0);
    }

    #[test]
    fn step_zero_behaves_like_squared_error() {
        let p = Tensor::from_elem((1, 1, 2, 1), 0.0);
        let y = Tensor::from_shape_vec((1, 1, 2, 1), vec![0.5, -1.0]).unwrap();
        let l = AnnealedL0Loss::at_step(0).loss(&p, &y);
        assert!((l - (0.25 + 1.0) / 2.0).abs() < 1e-7);
    }

    #[test]
    fn gradient_is_zero_at_exact_match_for_small_gamma() {
        let p = Tensor::from_elem((1, 1, 1, 1), 0.7);
        let g = AnnealedL0Loss { gamma: 0.5 }.derivative(&p, &p);
        assert_eq!(g[[0, 0, 0, 0]], 0.0);
        assert!(g.iter().all(|v| v.is_finite()));
    }
}
