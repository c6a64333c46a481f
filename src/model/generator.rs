use burn::{
    nn::{
        BatchNorm, Relu, Tanh,
        conv::{ConvTranspose2d, ConvTranspose2dConfig},
    },
    prelude::*,
};

use super::init::{LayerKind, WeightInitConfig};

/// Transposed convolution followed by batch norm and ReLU.
#[derive(Module, Debug)]
pub struct UpsampleBlock<B: Backend> {
    pub(crate) conv: ConvTranspose2d<B>,
    pub(crate) norm: BatchNorm<B, 2>,
    activation: Relu,
}

impl<B: Backend> UpsampleBlock<B> {
    pub(crate) fn new(
        channels: [usize; 2],
        stride: usize,
        padding: usize,
        init: &WeightInitConfig,
        device: &B::Device,
    ) -> Self {
        Self {
            conv: transposed_conv(channels, stride, padding, init, device),
            norm: init.batch_norm(channels[1], device),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Maps latent noise to images in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    pub(crate) input: UpsampleBlock<B>,
    pub(crate) blocks: Vec<UpsampleBlock<B>>,
    pub(crate) output: ConvTranspose2d<B>,
    activation: Tanh,
}

impl<B: Backend> Generator<B> {
    pub(crate) fn new(
        latent_dim: usize,
        width: usize,
        channels: usize,
        num_doublings: usize,
        init: &WeightInitConfig,
        device: &B::Device,
    ) -> Self {
        // 1x1 noise -> 4x4 feature maps at the widest level.
        let widest = width << (num_doublings - 1);
        let input = UpsampleBlock::new([latent_dim, widest], 1, 0, init, device);

        let blocks = (1..num_doublings)
            .rev()
            .map(|level| {
                let channels_in = width << level;
                UpsampleBlock::new([channels_in, channels_in / 2], 2, 1, init, device)
            })
            .collect();

        Self {
            input,
            blocks,
            output: transposed_conv([width, channels], 2, 1, init, device),
            activation: Tanh::new(),
        }
    }

    /// # Shapes
    ///
    /// - noise: `[batch_size, latent_dim, 1, 1]`
    /// - output: `[batch_size, channels, image_size, image_size]`
    pub fn forward(&self, noise: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.input.forward(noise);

        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        let x = self.output.forward(x);
        self.activation.forward(x)
    }
}

fn transposed_conv<B: Backend>(
    channels: [usize; 2],
    stride: usize,
    padding: usize,
    init: &WeightInitConfig,
    device: &B::Device,
) -> ConvTranspose2d<B> {
    ConvTranspose2dConfig::new(channels, [4, 4])
        .with_stride([stride, stride])
        .with_padding([padding, padding])
        .with_bias(false)
        .with_initializer(init.initializer(LayerKind::Convolution))
        .init(device)
}
