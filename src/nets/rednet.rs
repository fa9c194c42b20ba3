use rand::Rng;

use crate::activation::ActivationFunction;
use crate::config::RedNetConfig;
use crate::error::{N2nError, Result};
use crate::layers::{ConvUnit, ParamView, ParamViewMut};
use crate::math::tensor::Tensor;
use crate::nets::head::ResidualHead;
use crate::nets::{Architecture, Denoiser};

/// Residual encoder-decoder network (RED-Net).
///
/// `layers` 3x3 conv + ReLU layers encode at full resolution; the decoder
/// mirrors them with `layers - 1` conv + ReLU layers followed by the
/// residual output projection. Every `skip_every`-th decoder layer adds the
/// output of its mirrored encoder layer before its ReLU.
#[derive(Debug)]
pub struct RedNet {
    channels: usize,
    skip_every: usize,
    encoders: Vec<ConvUnit>,
    decoders: Vec<ConvUnit>,
    head: ResidualHead,
}

impl RedNet {
    pub fn new<R: Rng + ?Sized>(
        channels: usize,
        output_activation: ActivationFunction,
        config: &RedNetConfig,
        rng: &mut R,
    ) -> Result<RedNet> {
        let RedNetConfig { layers, filters, skip_every } = *config;
        if channels == 0 || layers == 0 || filters == 0 || skip_every == 0 {
            return Err(N2nError::config(format!(
                "rednet needs channels, layers, filters and skip_every > 0 \
                 (got channels={channels}, layers={layers}, filters={filters}, skip_every={skip_every})"
            )));
        }
        let relu = ActivationFunction::ReLU;

        let encoders = (0..layers)
            .map(|i| {
                let in_ch = if i == 0 { channels } else { filters };
                ConvUnit::new(&format!("rednet/conv{i}"), 3, in_ch, filters, false, relu, rng)
            })
            .collect();
        let decoders = (0..layers - 1)
            .map(|j| ConvUnit::new(&format!("rednet/deconv{j}"), 3, filters, filters, false, relu, rng))
            .collect();

        Ok(RedNet {
            channels,
            skip_every,
            encoders,
            decoders,
            head: ResidualHead::new(&format!("rednet/deconv{}", layers - 1), 3, filters, channels, output_activation),
        })
    }
}

/// Encoder layer whose output joins decoder layer `j`, if any.
fn skip_source(j: usize, layers: usize, skip_every: usize) -> Option<usize> {
    ((j + 1) % skip_every == 0).then(|| layers - 2 - j)
}

impl Denoiser for RedNet {
    fn architecture(&self) -> Architecture {
        Architecture::RedNet
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn forward(&mut self, input: &Tensor, is_training: bool) -> Result<Tensor> {
        let layers = self.encoders.len();
        let mut features = Vec::with_capacity(layers);
        let mut h = input.clone();
        for unit in self.encoders.iter_mut() {
            h = unit.forward(&h, is_training)?;
            features.push(h.clone());
        }

        for (j, unit) in self.decoders.iter_mut().enumerate() {
            let skip = skip_source(j, layers, self.skip_every).map(|i| &features[i]);
            h = unit.forward_with_skip(&h, skip, is_training)?;
        }

        self.head.forward(input, &h)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<()> {
        let layers = self.encoders.len();
        let mut feature_grads: Vec<Option<Tensor>> = vec![None; layers];
        let mut g = self.head.backward(grad_output)?;

        for j in (0..self.decoders.len()).rev() {
            let (dx, dz) = self.decoders[j].backward(&g)?;
            if let Some(i) = skip_source(j, layers, self.skip_every) {
                accumulate(&mut feature_grads[i], dz);
            }
            g = dx;
        }
        accumulate(&mut feature_grads[layers - 1], g);

        for i in (0..layers).rev() {
            let Some(gi) = feature_grads[i].take() else { continue };
            let (dx, _) = self.encoders[i].backward(&gi)?;
            if i > 0 {
                accumulate(&mut feature_grads[i - 1], dx);
            }
        }
        Ok(())
    }

    fn apply_pending_statistics(&mut self) {
        // No normalization layers; nothing is ever deferred.
    }

    fn zero_grad(&mut self) {
        for unit in self.encoders.iter_mut().chain(self.decoders.iter_mut()) {
            unit.zero_grad();
        }
        self.head.zero_grad();
    }

    fn parameters(&self) -> Vec<ParamView<'_>> {
        let mut out = Vec::new();
        for unit in self.encoders.iter().chain(self.decoders.iter()) {
            unit.params(&mut out);
        }
        self.head.params(&mut out);
        out
    }

    fn parameters_mut(&mut self) -> Vec<ParamViewMut<'_>> {
        let mut out = Vec::new();
        for unit in self.encoders.iter_mut().chain(self.decoders.iter_mut()) {
            unit.params_mut(&mut out);
        }
        self.head.params_mut(&mut out);
        out
    }
}

fn accumulate(slot: &mut Option<Tensor>, grad: Tensor) {
    match slot {
        Some(existing) => *existing += &grad,
        None => *slot = Some(grad),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn small(layers: usize) -> RedNet {
        let mut rng = StdRng::seed_from_u64(2);
        let cfg = RedNetConfig { layers, filters: 4, skip_every: 2 };
        RedNet::new(3, ActivationFunction::Identity, &cfg, &mut rng).unwrap()
    }

    #[test]
    fn skips_mirror_the_encoder() {
        // 5 layers -> decoders 0..4; layers 1 and 3 take encoder 2 and 0.
        assert_eq!(skip_source(0, 5, 2), None);
        assert_eq!(skip_source(1, 5, 2), Some(2));
        assert_eq!(skip_source(3, 5, 2), Some(0));
        assert_eq!(skip_source(2, 5, 1), Some(1));
    }

    #[test]
    fn preserves_shape() {
        for layers in [1, 2, 5] {
            let mut net = small(layers);
            let x = Tensor::from_elem((2, 5, 6, 3), 0.5);
            assert_eq!(net.forward(&x, true).unwrap().dim(), (2, 5, 6, 3));
        }
    }

    #[test]
    fn untrained_network_is_identity() {
        let mut net = small(4);
        let x = Tensor::from_shape_fn((1, 3, 3, 3), |(_, y, x, c)| (y * 3 + x + c) as f64 / 12.0);
        assert_eq!(net.forward(&x, false).unwrap(), x);
    }

    #[test]
    fn gradients_flow_to_encoder_once_head_is_nonzero() {
        let mut net = small(4);
        net.head.conv.kernel.value.fill(0.1);
        let x = Tensor::from_shape_fn((1, 4, 4, 3), |(_, y, x, c)| ((y + x + c) % 3) as f64 / 3.0);
        net.forward(&x, true).unwrap();
        net.zero_grad();
        net.backward(&Tensor::ones((1, 4, 4, 3))).unwrap();
        let first = net.parameters().into_iter().find(|p| p.name == "rednet/conv0/conv/kernel").unwrap();
        assert!(first.grad.iter().any(|g| *g != 0.0));
    }
}
