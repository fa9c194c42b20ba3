use rand::Rng;

use crate::activation::ActivationFunction;
use crate::config::UNetConfig;
use crate::error::{N2nError, Result};
use crate::layers::{AvgPool2, ConvUnit, ParamView, ParamViewMut, Upsample2};
use crate::math::tensor::{concat_channels, split_channels, Tensor};
use crate::nets::head::ResidualHead;
use crate::nets::{Architecture, Denoiser};

const MAX_DEPTH: usize = 6;

/// Two 3x3 conv + batch-norm + ReLU units.
#[derive(Debug)]
struct DoubleConv {
    first: ConvUnit,
    second: ConvUnit,
}

impl DoubleConv {
    fn new<R: Rng + ?Sized>(name: &str, in_channels: usize, out_channels: usize, rng: &mut R) -> Self {
        let relu = ActivationFunction::ReLU;
        DoubleConv {
            first: ConvUnit::new(&format!("{name}/conv1"), 3, in_channels, out_channels, true, relu, rng),
            second: ConvUnit::new(&format!("{name}/conv2"), 3, out_channels, out_channels, true, relu, rng),
        }
    }

    fn forward(&mut self, x: &Tensor, is_training: bool) -> Result<Tensor> {
        let h = self.first.forward(x, is_training)?;
        self.second.forward(&h, is_training)
    }

    fn backward(&mut self, grad: &Tensor) -> Result<Tensor> {
        let (g, _) = self.second.backward(grad)?;
        let (g, _) = self.first.backward(&g)?;
        Ok(g)
    }

    fn units_mut(&mut self) -> [&mut ConvUnit; 2] {
        [&mut self.first, &mut self.second]
    }
}

/// U-Net: an encoder that halves the resolution `depth` times, a bottleneck,
/// and a decoder that upsamples and concatenates the matching encoder
/// features before each block.
#[derive(Debug)]
pub struct UNet {
    channels: usize,
    encoders: Vec<DoubleConv>,
    pools: Vec<AvgPool2>,
    bottleneck: DoubleConv,
    ups: Vec<Upsample2>,
    decoders: Vec<DoubleConv>,
    /// Channels coming from below at each decoder level, for splitting the
    /// concatenated gradient.
    up_channels: Vec<usize>,
    head: ResidualHead,
}

impl UNet {
    pub fn new<R: Rng + ?Sized>(
        channels: usize,
        output_activation: ActivationFunction,
        config: &UNetConfig,
        rng: &mut R,
    ) -> Result<UNet> {
        let UNetConfig { base_filters: f, depth } = *config;
        if channels == 0 || f == 0 || depth == 0 || depth > MAX_DEPTH {
            return Err(N2nError::config(format!(
                "unet needs channels > 0, base_filters > 0 and 1 <= depth <= {MAX_DEPTH} \
                 (got channels={channels}, base_filters={f}, depth={depth})"
            )));
        }
        let filters = |level: usize| f << level;

        let encoders = (0..depth)
            .map(|d| {
                let in_ch = if d == 0 { channels } else { filters(d - 1) };
                DoubleConv::new(&format!("unet/enc{d}"), in_ch, filters(d), rng)
            })
            .collect();
        let bottleneck = DoubleConv::new("unet/bottleneck", filters(depth - 1), filters(depth), rng);
        let decoders = (0..depth)
            .map(|d| DoubleConv::new(&format!("unet/dec{d}"), filters(d + 1) + filters(d), filters(d), rng))
            .collect();

        Ok(UNet {
            channels,
            encoders,
            pools: (0..depth).map(|_| AvgPool2::new()).collect(),
            bottleneck,
            ups: (0..depth).map(|_| Upsample2::new()).collect(),
            decoders,
            up_channels: (0..depth).map(|d| filters(d + 1)).collect(),
            head: ResidualHead::new("unet/out", 1, f, channels, output_activation),
        })
    }

    fn depth(&self) -> usize {
        self.encoders.len()
    }
}

impl Denoiser for UNet {
    fn architecture(&self) -> Architecture {
        Architecture::UNet
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn forward(&mut self, input: &Tensor, is_training: bool) -> Result<Tensor> {
        let depth = self.depth();
        let mut skips = Vec::with_capacity(depth);
        let mut h = input.clone();
        for d in 0..depth {
            h = self.encoders[d].forward(&h, is_training)?;
            let pooled = self.pools[d].forward(&h);
            skips.push(h);
            h = pooled;
        }

        h = self.bottleneck.forward(&h, is_training)?;

        for d in (0..depth).rev() {
            let (_, height, width, _) = skips[d].dim();
            let up = self.ups[d].forward(&h, height, width);
            h = concat_channels(&up, &skips[d])?;
            h = self.decoders[d].forward(&h, is_training)?;
        }

        self.head.forward(input, &h)
    }

    fn backward(&mut self, grad_output: &Tensor) -> Result<()> {
        let depth = self.depth();
        let mut g = self.head.backward(grad_output)?;

        let mut skip_grads = Vec::with_capacity(depth);
        for d in 0..depth {
            g = self.decoders[d].backward(&g)?;
            let (g_up, g_skip) = split_channels(&g, self.up_channels[d]);
            skip_grads.push(g_skip);
            g = self.ups[d].backward(&g_up);
        }

        g = self.bottleneck.backward(&g)?;

        for d in (0..depth).rev() {
            g = self.pools[d].backward(&g);
            g += &skip_grads[d];
            g = self.encoders[d].backward(&g)?;
        }
        Ok(())
    }

    fn apply_pending_statistics(&mut self) {
        for block in self.encoders.iter_mut().chain(std::iter::once(&mut self.bottleneck)).chain(self.decoders.iter_mut()) {
            for unit in block.units_mut() {
                unit.apply_pending_statistics();
            }
        }
    }

    fn zero_grad(&mut self) {
        for block in self.encoders.iter_mut().chain(std::iter::once(&mut self.bottleneck)).chain(self.decoders.iter_mut()) {
            for unit in block.units_mut() {
                unit.zero_grad();
            }
        }
        self.head.zero_grad();
    }

    fn parameters(&self) -> Vec<ParamView<'_>> {
        let mut out = Vec::new();
        for block in self.encoders.iter().chain(std::iter::once(&self.bottleneck)).chain(self.decoders.iter()) {
            block.first.params(&mut out);
            block.second.params(&mut out);
        }
        self.head.params(&mut out);
        out
    }

    fn parameters_mut(&mut self) -> Vec<ParamViewMut<'_>> {
        let mut out = Vec::new();
        for block in self.encoders.iter_mut().chain(std::iter::once(&mut self.bottleneck)).chain(self.decoders.iter_mut()) {
            block.first.params_mut(&mut out);
            block.second.params_mut(&mut out);
        }
        self.head.params_mut(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn small(channels: usize, depth: usize) -> UNet {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = UNetConfig { base_filters: 4, depth };
        UNet::new(channels, ActivationFunction::Identity, &cfg, &mut rng).unwrap()
    }

    #[test]
    fn preserves_shape_for_odd_sizes() {
        let mut net = small(3, 2);
        let x = Tensor::from_elem((2, 7, 5, 3), 0.3);
        assert_eq!(net.forward(&x, true).unwrap().dim(), (2, 7, 5, 3));
        assert_eq!(net.forward(&x, false).unwrap().dim(), (2, 7, 5, 3));
    }

    #[test]
    fn untrained_network_is_identity() {
        let mut net = small(1, 1);
        let x = Tensor::from_shape_fn((1, 4, 4, 1), |(_, y, x, _)| (y + x) as f64 / 8.0);
        assert_eq!(net.forward(&x, false).unwrap(), x);
    }

    #[test]
    fn parameter_names_are_unique() {
        let net = small(1, 2);
        let params = net.parameters();
        let mut names: Vec<&str> = params.iter().map(|p| p.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(names.contains(&"unet/out/kernel"));
        assert!(names.contains(&"unet/enc1/conv2/bn/moving_mean"));
    }

    #[test]
    fn backward_fills_output_projection_gradient() {
        let mut net = small(1, 1);
        let x = Tensor::from_shape_fn((2, 4, 4, 1), |(b, y, x, _)| ((b + y * 3 + x) % 4) as f64 / 4.0);
        net.forward(&x, true).unwrap();
        net.zero_grad();
        net.backward(&Tensor::ones((2, 4, 4, 1))).unwrap();
        let head_grad = net.parameters().into_iter().find(|p| p.name == "unet/out/kernel").unwrap();
        assert!(head_grad.grad.iter().any(|g| *g != 0.0));
    }

    #[test]
    fn rejects_zero_depth() {
        let mut rng = StdRng::seed_from_u64(1);
        let cfg = UNetConfig { base_filters: 4, depth: 0 };
        assert!(matches!(
            UNet::new(1, ActivationFunction::Identity, &cfg, &mut rng),
            Err(N2nError::InvalidConfiguration(_))
        ));
    }
}
