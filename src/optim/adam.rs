use std::collections::HashMap;

use ndarray::{ArrayD, Zip};

use crate::layers::ParamViewMut;

/// First and second moment estimates of one parameter.
#[derive(Debug, Clone)]
struct Moments {
    m: ArrayD<f64>,
    v: ArrayD<f64>,
}

/// Adam optimizer with moments keyed by parameter name.
///
/// Bias correction is driven by the global step rather than an internal
/// counter, so a model resumed from a checkpoint corrects with the right `t`.
#[derive(Debug, Clone)]
pub struct Adam {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    moments: HashMap<String, Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Adam {
        Adam::with_betas(learning_rate, 0.9, 0.999)
    }

    pub fn with_betas(learning_rate: f64, beta1: f64, beta2: f64) -> Adam {
        Adam { learning_rate, beta1, beta2, epsilon: 1e-8, moments: HashMap::new() }
    }

    /// Applies one update to every trainable parameter. `global_step` is the
    /// number of updates applied before this one.
    pub fn step(&mut self, params: Vec<ParamViewMut<'_>>, global_step: u64) {
        let Adam { learning_rate: lr, beta1: b1, beta2: b2, epsilon: eps, .. } = *self;

        let t = (global_step + 1) as f64;
        let bc1 = 1.0 - b1.powf(t);
        let bc2 = 1.0 - b2.powf(t);
        let step_size = lr * bc2.sqrt() / bc1;

        for param in params.into_iter().filter(|p| p.trainable) {
            let ParamViewMut { name, mut value, grad, .. } = param;
            let moments = self.moments.entry(name.to_owned()).or_insert_with(|| Moments {
                m: ArrayD::zeros(grad.raw_dim()),
                v: ArrayD::zeros(grad.raw_dim()),
            });
            if moments.m.shape() != grad.shape() {
                moments.m = ArrayD::zeros(grad.raw_dim());
                moments.v = ArrayD::zeros(grad.raw_dim());
            }

            Zip::from(&mut value)
                .and(&grad)
                .and(&mut moments.m)
                .and(&mut moments.v)
                .for_each(|p, &g, m, v| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *p -= step_size * *m / (v.sqrt() + eps);
                });
        }
    }

    /// Drops all moment estimates.
    pub fn reset(&mut self) {
        self.moments.clear();
    }
}
