mod discriminator;
mod generator;
mod init;

pub use discriminator::*;
pub use generator::*;
pub use init::*;

use crate::error::Error;
use burn::prelude::*;

/// Smallest feature map produced by the generator input and consumed by the discriminator
/// output.
const BASE_RESOLUTION: usize = 4;

/// Shape of both networks.
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// 1 for grayscale images, 3 for RGB images.
    #[config(default = 3)]
    pub image_channels: usize,
    /// Size of the noise vector fed to the generator.
    #[config(default = 100)]
    pub latent_dim: usize,
    /// Side of the square images, a power of two of at least 8.
    #[config(default = 64)]
    pub image_size: usize,
    #[config(default = 64)]
    pub generator_width: usize,
    #[config(default = 64)]
    pub discriminator_width: usize,
    #[config(default = "WeightInitConfig::new()")]
    pub init: WeightInitConfig,
}

impl ModelConfig {
    /// Checks that both networks can be built from this configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.image_size.is_power_of_two() || self.image_size < 2 * BASE_RESOLUTION {
            return Err(Error::InvalidConfig(format!(
                "image size must be a power of two of at least {}, got {}",
                2 * BASE_RESOLUTION,
                self.image_size
            )));
        }
        if self.image_channels != 1 && self.image_channels != 3 {
            return Err(Error::InvalidConfig(format!(
                "images must have 1 or 3 channels, got {}",
                self.image_channels
            )));
        }
        if self.latent_dim == 0 || self.generator_width == 0 || self.discriminator_width == 0 {
            return Err(Error::InvalidConfig(
                "latent dimension and network widths must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of times the resolution doubles between the 4x4 base and the image size.
    pub fn num_doublings(&self) -> usize {
        (self.image_size / BASE_RESOLUTION).trailing_zeros() as usize
    }

    /// Initializes a [generator](Generator).
    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        Generator::new(
            self.latent_dim,
            self.generator_width,
            self.image_channels,
            self.num_doublings(),
            &self.init,
            device,
        )
    }

    /// Initializes a [discriminator](Discriminator).
    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        Discriminator::new(
            self.image_channels,
            self.discriminator_width,
            self.num_doublings(),
            &self.init,
            device,
        )
    }
}
