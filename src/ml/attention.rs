// ============================================================
// Multi-Head Attention with Key-Padding Masks
// ============================================================
// The detection transformer needs three attention flavours from
// one module:
//
//   - encoder self-attention  (q = k = features + position)
//   - decoder self-attention  (q = k = queries + query position)
//   - decoder cross-attention (queries attend to image features)
//
// nn::MultiHeadAttention bakes query/key/value into one input
// record; here the three streams stay separate arguments because
// position embeddings are added to queries and keys but never to
// values. Padded feature cells (from batching images of unequal
// sizes) are masked out of the keys before the softmax.
//
// Every projection is a Dense, so the whole stack switches to
// ternary weights with one config field.
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Carion et al. (2020), §3.2 (DETR architecture)

use burn::{
    nn::{Dropout, DropoutConfig},
    prelude::*,
    tensor::activation::softmax,
};

use crate::ml::bitlinear::{Dense, LinearKind};

#[derive(Config, Debug)]
pub struct MultiheadAttentionConfig {
    pub d_model: usize,
    pub n_heads: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    #[config(default = "LinearKind::Standard")]
    pub linear: LinearKind,
    /// Value written into masked score cells before the softmax.
    #[config(default = -1.0e4)]
    pub min_float: f64,
}

impl MultiheadAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiheadAttention<B> {
        assert!(
            self.d_model % self.n_heads == 0,
            "d_model ({}) must divide evenly into {} heads",
            self.d_model,
            self.n_heads
        );
        MultiheadAttention {
            q_proj:   self.linear.init(self.d_model, self.d_model, device),
            k_proj:   self.linear.init(self.d_model, self.d_model, device),
            v_proj:   self.linear.init(self.d_model, self.d_model, device),
            out_proj: self.linear.init(self.d_model, self.d_model, device),
            dropout:  DropoutConfig::new(self.dropout).init(),
            n_heads:  self.n_heads,
            d_k:      self.d_model / self.n_heads,
            min_float: self.min_float,
        }
    }
}

#[derive(Module, Debug)]
pub struct MultiheadAttention<B: Backend> {
    pub q_proj:   Dense<B>,
    pub k_proj:   Dense<B>,
    pub v_proj:   Dense<B>,
    pub out_proj: Dense<B>,
    pub dropout:  Dropout,
    pub n_heads:  usize,
    pub d_k:      usize,
    pub min_float: f64,
}

impl<B: Backend> MultiheadAttention<B> {
    /// query: [batch, q_len, d_model], key/value: [batch, k_len, d_model].
    /// `key_padding_mask` is [batch, k_len] with `true` marking padded
    /// key positions that no query may attend to.
    pub fn forward(
        &self,
        query: Tensor<B, 3>,
        key: Tensor<B, 3>,
        value: Tensor<B, 3>,
        key_padding_mask: Option<Tensor<B, 2, Bool>>,
    ) -> Tensor<B, 3> {
        let [batch, q_len, d_model] = query.dims();
        let k_len = key.dims()[1];

        let q = self.split_heads(self.q_proj.forward(query)); // [batch, heads, q_len, d_k]
        let k = self.split_heads(self.k_proj.forward(key));   // [batch, heads, k_len, d_k]
        let v = self.split_heads(self.v_proj.forward(value)); // [batch, heads, k_len, d_k]

        let mut scores = q.matmul(k.swap_dims(2, 3)) / (self.d_k as f64).sqrt();
        if let Some(mask) = key_padding_mask {
            let mask = mask
                .reshape([batch, 1, 1, k_len])
                .expand([batch, self.n_heads, q_len, k_len]);
            scores = scores.mask_fill(mask, self.min_float);
        }

        let weights = self.dropout.forward(softmax(scores, 3));
        let context = weights
            .matmul(v)           // [batch, heads, q_len, d_k]
            .swap_dims(1, 2)     // [batch, q_len, heads, d_k]
            .reshape([batch, q_len, d_model]);
        self.out_proj.forward(context)
    }

    fn split_heads(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, len, _] = x.dims();
        x.reshape([batch, len, self.n_heads, self.d_k]).swap_dims(1, 2)
    }
}

// ─── Unit Tests ──────────────────────────────────────────────
