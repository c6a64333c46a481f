use burn::{
    nn::{
        BatchNorm, LeakyRelu, LeakyReluConfig, PaddingConfig2d, Sigmoid,
        conv::{Conv2d, Conv2dConfig},
    },
    prelude::*,
};

use super::init::{LayerKind, WeightInitConfig};

const NEGATIVE_SLOPE: f64 = 0.2;

/// Strided convolution followed by batch norm and leaky ReLU.
#[derive(Module, Debug)]
pub struct DownsampleBlock<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) norm: BatchNorm<B, 2>,
    activation: LeakyRelu,
}

impl<B: Backend> DownsampleBlock<B> {
    pub(crate) fn new(channels: [usize; 2], init: &WeightInitConfig, device: &B::Device) -> Self {
        Self {
            conv: conv(channels, 2, 1, init, device),
            norm: init.batch_norm(channels[1], device),
            activation: leaky_relu(),
        }
    }

    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);
        self.activation.forward(x)
    }
}

/// Maps images to the probability of being real.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    pub(crate) input: Conv2d<B>,
    input_activation: LeakyRelu,
    pub(crate) blocks: Vec<DownsampleBlock<B>>,
    pub(crate) output: Conv2d<B>,
    activation: Sigmoid,
}

impl<B: Backend> Discriminator<B> {
    pub(crate) fn new(
        channels: usize,
        width: usize,
        num_doublings: usize,
        init: &WeightInitConfig,
        device: &B::Device,
    ) -> Self {
        // No normalization on the first layer.
        let input = conv([channels, width], 2, 1, init, device);

        let blocks = (0..num_doublings - 1)
            .map(|level| {
                let channels_in = width << level;
                DownsampleBlock::new([channels_in, channels_in * 2], init, device)
            })
            .collect();

        // 4x4 feature maps -> one score per image.
        let widest = width << (num_doublings - 1);
        let output = conv([widest, 1], 1, 0, init, device);

        Self {
            input,
            input_activation: leaky_relu(),
            blocks,
            output,
            activation: Sigmoid::new(),
        }
    }

    /// # Shapes
    ///
    /// - images: `[batch_size, channels, image_size, image_size]`
    /// - output: `[batch_size]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch_size, _, _, _] = images.dims();

        let x = self.input.forward(images);
        let mut x = self.input_activation.forward(x);

        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        let x = self.output.forward(x);
        self.activation.forward(x).reshape([batch_size])
    }
}

fn conv<B: Backend>(
    channels: [usize; 2],
    stride: usize,
    padding: usize,
    init: &WeightInitConfig,
    device: &B::Device,
) -> Conv2d<B> {
    Conv2dConfig::new(channels, [4, 4])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .with_initializer(init.initializer(LayerKind::Convolution))
        .init(device)
}

fn leaky_relu() -> LeakyRelu {
    LeakyReluConfig::new()
        .with_negative_slope(NEGATIVE_SLOPE)
        .init()
}
