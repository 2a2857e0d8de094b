// ============================================================
// The Detection Model
// ============================================================
// Backbone features are projected to the transformer width with
// a 1×1 convolution, flattened into a sequence of feature cells,
// tagged with 2-D sine positions, and decoded against a learned
// set of object queries. Every query emits one classification
// (including a dedicated "no object" class) and one box.
//
// Boxes are predicted directly in normalised [0, 1] image space
// as (cx, cy, w, h) through a small MLP ending in a sigmoid, so
// any query can claim any part of the image regardless of which
// feature cell it attended to.
//
// Reference: Carion et al. (2020), §3.2

use burn::{
    module::Ignored,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        Embedding, EmbeddingConfig, Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{relu, sigmoid},
};

use crate::ml::backbone::{ResidualBackbone, ResidualBackboneConfig};
use crate::ml::bitlinear::LinearKind;
use crate::ml::position::{MaskGrid, SinePositionEmbedding, SinePositionEmbeddingConfig};
use crate::ml::transformer::{DetrTransformer, DetrTransformerConfig};

#[derive(Config, Debug)]
pub struct DetrMlpConfig {
    pub d_input:  usize,
    pub d_hidden: usize,
    pub d_output: usize,
    pub num_layers: usize,
}

impl DetrMlpConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DetrMlp<B> {
        let mut layers = Vec::with_capacity(self.num_layers);
        for i in 0..self.num_layers {
            let d_in = if i == 0 { self.d_input } else { self.d_hidden };
            let d_out = if i + 1 == self.num_layers { self.d_output } else { self.d_hidden };
            layers.push(LinearConfig::new(d_in, d_out).init(device));
        }
        DetrMlp { layers }
    }
}

/// Plain MLP with ReLU between layers and none after the last.
#[derive(Module, Debug)]
pub struct DetrMlp<B: Backend> {
    pub layers: Vec<Linear<B>>,
}

impl<B: Backend> DetrMlp<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let last = self.layers.len() - 1;
        let mut x = x;
        for (i, layer) in self.layers.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = relu(x);
            }
        }
        x
    }
}

#[derive(Config, Debug)]
pub struct DetrConfig {
    pub num_classes: usize,
    pub num_queries: usize,
    pub hidden_dim: usize,
    pub n_heads: usize,
    pub enc_layers: usize,
    pub dec_layers: usize,
    pub dim_feedforward: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = 32)]
    pub backbone_channels: usize,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
}

impl DetrConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DetrModel<B> {
        assert!(
            self.hidden_dim % 2 == 0,
            "hidden_dim must be even: half the channels encode rows, half columns"
        );
        let backbone = ResidualBackboneConfig::new()
            .with_base_channels(self.backbone_channels)
            .init(device);
        let input_proj =
            Conv2dConfig::new([backbone.out_channels, self.hidden_dim], [1, 1]).init(device);
        let transformer = DetrTransformerConfig::new(
            self.hidden_dim,
            self.n_heads,
            self.enc_layers,
            self.dec_layers,
            self.dim_feedforward,
        )
        .with_dropout(self.dropout)
        .with_linear(self.linear)
        .init(device);

        DetrModel {
            backbone,
            input_proj,
            pos_embedding: Ignored(SinePositionEmbeddingConfig::new(self.hidden_dim / 2).init()),
            query_embed: EmbeddingConfig::new(self.num_queries, self.hidden_dim).init(device),
            transformer,
            class_embed: LinearConfig::new(self.hidden_dim, self.num_classes + 1).init(device),
            bbox_embed: DetrMlpConfig::new(self.hidden_dim, self.hidden_dim, 4, 3).init(device),
            num_queries: self.num_queries,
            hidden_dim: self.hidden_dim,
        }
    }
}

/// Predictions for one batch. Logits carry `num_classes + 1`
/// entries per query — the last is "no object".
#[derive(Debug, Clone)]
pub struct DetrOutput<B: Backend> {
    pub pred_logits: Tensor<B, 3>, // [batch, queries, num_classes + 1]
    pub pred_boxes:  Tensor<B, 3>, // [batch, queries, 4] normalised cxcywh
}

#[derive(Module, Debug)]
pub struct DetrModel<B: Backend> {
    pub backbone:      ResidualBackbone<B>,
    pub input_proj:    Conv2d<B>,
    pub pos_embedding: Ignored<SinePositionEmbedding>,
    pub query_embed:   Embedding<B>,
    pub transformer:   DetrTransformer<B>,
    pub class_embed:   Linear<B>,
    pub bbox_embed:    DetrMlp<B>,
    pub num_queries:   usize,
    pub hidden_dim:    usize,
}

impl<B: Backend> DetrModel<B> {
    /// images: [batch, 3, H, W], mask: [batch, H, W] with `true`
    /// marking padded pixels.
    pub fn forward(&self, images: Tensor<B, 4>, mask: Tensor<B, 3, Bool>) -> DetrOutput<B> {
        let device = images.device();
        let features = self.backbone.forward(images); // [batch, c_f, h_f, w_f]
        let [batch, _, feat_h, feat_w] = features.dims();
        let src = self.input_proj.forward(features); // [batch, hidden, h_f, w_f]

        // resample the pixel mask onto the feature grid
        let grid = MaskGrid::from_tensor(&mask).downsample(feat_h, feat_w);
        let pos = self.pos_embedding.forward::<B>(&grid, &device);
        let key_padding_mask = grid
            .to_tensor::<B>(&device)
            .reshape([batch, feat_h * feat_w]);

        let src = src.flatten::<3>(2, 3).swap_dims(1, 2); // [batch, cells, hidden]
        let pos = pos.flatten::<3>(2, 3).swap_dims(1, 2);

        let queries = self
            .query_embed
            .weight
            .val()
            .unsqueeze::<3>()
            .expand([batch, self.num_queries, self.hidden_dim]);

        let hs = self
            .transformer
            .forward(src, Some(key_padding_mask), pos, queries);

        DetrOutput {
            pred_logits: self.class_embed.forward(hs.clone()),
            pred_boxes:  sigmoid(self.bbox_embed.forward(hs)),
        }
    }
}

// ─── Unit Tests ──────────────────────────────────────────────
