use log::warn;
use ndarray::{s, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{N2nError, Result};
use crate::math::tensor::{sample_standard_normal, Tensor};
use crate::model::Batch;

/// Endless source of Noise2Noise training batches built from clean images.
///
/// Every sample is a random `patch x patch` crop `gt`; `input` and `target`
/// are `gt` plus two independent draws of Gaussian noise with standard
/// deviation `sigma`, clamped to [0, 1].
#[derive(Debug)]
pub struct NoisyPairs {
    images: Vec<Array3<f64>>,
    patch: usize,
    sigma: f64,
    batch_size: usize,
    rng: StdRng,
}

impl NoisyPairs {
    pub fn new(
        images: Vec<Array3<f64>>,
        patch: usize,
        sigma: f64,
        batch_size: usize,
        seed: Option<u64>,
    ) -> Result<NoisyPairs> {
        if patch == 0 || batch_size == 0 {
            return Err(N2nError::config("patch size and batch size must be at least 1"));
        }
        if !(sigma.is_finite() && sigma >= 0.0) {
            return Err(N2nError::config(format!("noise sigma must be non-negative, got {sigma}")));
        }
        let total = images.len();
        let images: Vec<_> = images
            .into_iter()
            .filter(|img| img.dim().0 >= patch && img.dim().1 >= patch)
            .collect();
        if images.len() < total {
            warn!("skipping {} image(s) smaller than {patch}x{patch}", total - images.len());
        }
        let Some(channels) = images.first().map(|img| img.dim().2) else {
            return Err(N2nError::input(format!("no image is at least {patch}x{patch}")));
        };
        if images.iter().any(|img| img.dim().2 != channels) {
            return Err(N2nError::input("images disagree in channel count"));
        }

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(NoisyPairs { images, patch, sigma, batch_size, rng })
    }

    pub fn channels(&self) -> usize {
        self.images[0].dim().2
    }

    pub fn next_batch(&mut self) -> Batch {
        let (b, p, c) = (self.batch_size, self.patch, self.channels());
        let mut gt = Tensor::zeros((b, p, p, c));
        for mut sample in gt.axis_iter_mut(Axis(0)) {
            let img = &self.images[self.rng.gen_range(0..self.images.len())];
            let y = self.rng.gen_range(0..=img.dim().0 - p);
            let x = self.rng.gen_range(0..=img.dim().1 - p);
            sample.assign(&img.slice(s![y..y + p, x..x + p, ..]));
        }
        let input = self.corrupt(&gt);
        let target = self.corrupt(&gt);
        Batch::new(input).with_target(target).with_gt(gt)
    }

    fn corrupt(&mut self, clean: &Tensor) -> Tensor {
        let sigma = self.sigma;
        let rng = &mut self.rng;
        clean.mapv(|v| (v + sigma * sample_standard_normal(&mut *rng)).clamp(0.0, 1.0))
    }
}
