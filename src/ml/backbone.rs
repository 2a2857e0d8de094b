// ============================================================
// Residual Convolutional Backbone
// ============================================================
// A compact ResNet-style feature extractor: 7×7 stem at stride
// 2, a stride-2 max pool, then two stride-2 basic blocks. Total
// stride 16, so a W×H image becomes a ⌈W/16⌉×⌈H/16⌉ grid of
// feature columns for the transformer.
//
// Reference: He et al. (2016) Deep Residual Learning

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    pub in_channels:  usize,
    pub out_channels: usize,
    pub stride: usize,
}

impl BasicBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BasicBlock<B> {
        let s = self.stride;
        BasicBlock {
            conv1: Conv2dConfig::new([self.in_channels, self.out_channels], [3, 3])
                .with_stride([s, s])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm1: BatchNormConfig::new(self.out_channels).init(device),
            conv2: Conv2dConfig::new([self.out_channels, self.out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            norm2: BatchNormConfig::new(self.out_channels).init(device),
            down_conv: Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                .with_stride([s, s])
                .with_bias(false)
                .init(device),
            down_norm: BatchNormConfig::new(self.out_channels).init(device),
        }
    }
}

#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub norm1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub norm2: BatchNorm<B, 2>,
    pub down_conv: Conv2d<B>,
    pub down_norm: BatchNorm<B, 2>,
}

impl<B: Backend> BasicBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.down_norm.forward(self.down_conv.forward(x.clone()));
        let out = relu(self.norm1.forward(self.conv1.forward(x)));
        let out = self.norm2.forward(self.conv2.forward(out));
        relu(out + residual)
    }
}

#[derive(Config, Debug)]
pub struct ResidualBackboneConfig {
    #[config(default = 32)]
    pub base_channels: usize,
}

impl ResidualBackboneConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResidualBackbone<B> {
        let c = self.base_channels;
        ResidualBackbone {
            stem_conv: Conv2dConfig::new([3, c], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            stem_norm: BatchNormConfig::new(c).init(device),
            stem_pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            stage1: BasicBlockConfig::new(c, 2 * c, 2).init(device),
            stage2: BasicBlockConfig::new(2 * c, 4 * c, 2).init(device),
            out_channels: 4 * c,
        }
    }
}

#[derive(Module, Debug)]
pub struct ResidualBackbone<B: Backend> {
    pub stem_conv: Conv2d<B>,
    pub stem_norm: BatchNorm<B, 2>,
    pub stem_pool: MaxPool2d,
    pub stage1: BasicBlock<B>,
    pub stage2: BasicBlock<B>,
    pub out_channels: usize,
}

impl<B: Backend> ResidualBackbone<B> {
    /// images: [batch, 3, H, W] → [batch, out_channels, H/16, W/16]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.stem_norm.forward(self.stem_conv.forward(images)));
        let x = self.stem_pool.forward(x);
        let x = self.stage1.forward(x);
        self.stage2.forward(x)
    }
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;

    type TB = burn::backend::NdArray;

    #[test]
    fn test_stride_sixteen_output_grid() {
        let device = Default::default();
        let backbone = ResidualBackboneConfig::new()
            .with_base_channels(8)
            .init::<TB>(&device);

        let images = Tensor::<TB, 4>::random([2, 3, 64, 96], Distribution::Default, &device);
        let features = backbone.forward(images);

        assert_eq!(features.dims(), [2, 32, 4, 6]);
        assert_eq!(backbone.out_channels, 32);
    }

    #[test]
    fn test_handles_sizes_not_divisible_by_stride() {
        let device = Default::default();
        let backbone = ResidualBackboneConfig::new()
            .with_base_channels(8)
            .init::<TB>(&device);

        // 50 → 25 → 13 → 7 → 4
        let images = Tensor::<TB, 4>::random([1, 3, 50, 50], Distribution::Default, &device);
        assert_eq!(backbone.forward(images).dims(), [1, 32, 4, 4]);
    }
}
