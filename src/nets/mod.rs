pub mod head;
pub mod rednet;
pub mod unet;

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::activation::ActivationFunction;
use crate::config::ModelConfig;
use crate::error::{N2nError, Result};
use crate::layers::{ParamView, ParamViewMut};
use crate::math::tensor::Tensor;

pub use rednet::RedNet;
pub use unet::UNet;

/// A denoising network: one parameter set mapping a
/// `[batch, height, width, channels]` tensor to a tensor of the same shape.
///
/// `forward` caches what `backward` needs, so a backward call always refers
/// to the most recent forward call. Gradients accumulate until `zero_grad`.
pub trait Denoiser: Send {
    fn architecture(&self) -> Architecture;

    /// Channel count the network was built for.
    fn channels(&self) -> usize;

    fn forward(&mut self, input: &Tensor, is_training: bool) -> Result<Tensor>;

    /// Back-propagates ∂L/∂output into the parameter gradients.
    fn backward(&mut self, grad_output: &Tensor) -> Result<()>;

    /// Commits the running statistics recorded by the last training forward
    /// pass (batch normalization). Must run before the optimizer step.
    fn apply_pending_statistics(&mut self);

    fn zero_grad(&mut self);

    fn parameters(&self) -> Vec<ParamView<'_>>;

    fn parameters_mut(&mut self) -> Vec<ParamViewMut<'_>>;
}

/// Registered denoising architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    UNet,
    RedNet,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::UNet, Architecture::RedNet];

    pub fn name(&self) -> &'static str {
        match self {
            Architecture::UNet => "unet",
            Architecture::RedNet => "rednet",
        }
    }

    /// Builds the single parameter set used for every forward pass of a
    /// model. The output activation is fixed at build time.
    pub fn build<R: Rng + ?Sized>(
        &self,
        channels: usize,
        output_activation: ActivationFunction,
        config: &ModelConfig,
        rng: &mut R,
    ) -> Result<Box<dyn Denoiser>> {
        Ok(match self {
            Architecture::UNet => Box::new(UNet::new(channels, output_activation, &config.unet, rng)?),
            Architecture::RedNet => Box::new(RedNet::new(channels, output_activation, &config.rednet, rng)?),
        })
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Architecture {
    type Err = N2nError;

    fn from_str(name: &str) -> Result<Self> {
        Architecture::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| N2nError::config(format!("unknown architecture '{name}' (expected unet or rednet)")))
    }
}

/// Resolves an architecture identifier from the configuration.
pub fn select_architecture(name: &str) -> Result<Architecture> {
    name.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn selects_registered_architectures() {
        assert_eq!(select_architecture("unet").unwrap(), Architecture::UNet);
        assert_eq!(select_architecture("rednet").unwrap(), Architecture::RedNet);
    }

    #[test]
    fn unknown_architecture_names_the_value() {
        let err = select_architecture("resnet").unwrap_err();
        assert!(matches!(err, N2nError::InvalidConfiguration(ref m) if m.contains("resnet")));
        assert!(select_architecture("UNet").is_err());
    }

    #[test]
    fn every_architecture_preserves_shape() {
        let mut config = ModelConfig::default();
        config.unet.base_filters = 4;
        config.rednet.filters = 4;
        config.rednet.layers = 3;
        let mut rng = StdRng::seed_from_u64(0);
        for arch in Architecture::ALL {
            let mut net = arch.build(2, ActivationFunction::Sigmoid, &config, &mut rng).unwrap();
            let x = Tensor::from_elem((3, 6, 5, 2), 0.25);
            let y = net.forward(&x, false).unwrap();
            assert_eq!(y.dim(), x.dim(), "{arch}");
            assert_eq!(net.architecture(), arch);
        }
    }
}
