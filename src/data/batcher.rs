// ============================================================
// Layer 4 — Detection Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<DetectionSample>
// into GPU-ready tensors.
//
// What is a Batcher?
//   A Batcher takes a list of individual samples and stacks
//   them into a single batch tensor. This is necessary because
//   GPUs are most efficient when processing many samples at once.
//
// How batching works here:
//   Scenes come in different sizes, so every image is padded to
//   the largest height and width in the batch (zeros on the
//   bottom/right edges). A boolean mask records which cells are
//   padding so the attention layers can ignore them:
//
//   Input:  Vec of N DetectionSamples, sizes (h_i, w_i)
//   Output: images [N, 3, max_h, max_w]
//           mask   [N, max_h, max_w]   true = padded
//
// Ground-truth labels and boxes stay host-side: their lengths
// differ per image, and the Hungarian matcher consumes them per
// image anyway.
//
// Reference: Burn Book §4 (Batcher)
//            Carion et al. (2020), NestedTensor batching

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::DetectionSample;
use crate::domain::scene::SceneTargets;

// ─── DetectionBatch ───────────────────────────────────────────────────────────
/// A batch of rendered scenes ready for the model forward pass.
///
/// B is the Burn Backend (e.g. Wgpu, NdArray) —
/// generic so the same batcher works on any device.
#[derive(Debug, Clone)]
pub struct DetectionBatch<B: Backend> {
    /// Padded images — shape: [batch, 3, max_h, max_w]
    pub images: Tensor<B, 4>,

    /// Padding mask — shape: [batch, max_h, max_w]
    /// true = padded cell, false = real pixel
    pub mask: Tensor<B, 3, Bool>,

    /// Per-image ground truth, in batch order
    pub targets: Vec<SceneTargets>,
}

// ─── DetectionBatcher ─────────────────────────────────────────────────────────
/// The batcher struct — holds the target device so tensors
/// are created on the correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct DetectionBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DetectionBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

// ─── Burn Batcher Trait Implementation ────────────────────────────────────────
// This is what makes DetectionBatcher work with Burn's DataLoader.
// The DataLoader calls .batch(items) with each mini-batch of samples.
impl<B: Backend> Batcher<DetectionSample, DetectionBatch<B>> for DetectionBatcher<B> {
    /// Convert a Vec of DetectionSamples into a single DetectionBatch.
    ///
    /// Steps:
    ///   1. Find the largest height and width in the batch
    ///   2. Copy each image row by row into a zeroed flat buffer
    ///   3. Zero the mask over each image's real extent
    ///   4. Reshape flat buffers into [N, 3, H, W] / [N, H, W]
    fn batch(&self, items: Vec<DetectionSample>) -> DetectionBatch<B> {
        let batch_size = items.len();
        let max_h = items.iter().map(|s| s.height).max().unwrap_or(1);
        let max_w = items.iter().map(|s| s.width).max().unwrap_or(1);
        let plane = max_h * max_w;

        // ── Copy pixels into the padded layout ────────────────────────────────
        // The mask starts all-padded; each image's real extent is
        // then marked valid.
        let mut image_flat = vec![0.0f32; batch_size * 3 * plane];
        let mut mask_flat  = vec![1i32; batch_size * plane];

        for (n, sample) in items.iter().enumerate() {
            let (w, h) = (sample.width, sample.height);
            for c in 0..3 {
                for y in 0..h {
                    let src = (c * h + y) * w;
                    let dst = ((n * 3 + c) * max_h + y) * max_w;
                    image_flat[dst..dst + w].copy_from_slice(&sample.pixels[src..src + w]);
                }
            }
            for y in 0..h {
                let dst = (n * max_h + y) * max_w;
                for cell in mask_flat[dst..dst + w].iter_mut() {
                    *cell = 0;
                }
            }
        }

        // ── Create tensors ────────────────────────────────────────────────────
        let images = Tensor::<B, 1>::from_floats(
            image_flat.as_slice(), &self.device,
        ).reshape([batch_size, 3, max_h, max_w]);

        let mask = Tensor::<B, 1, Int>::from_ints(
            mask_flat.as_slice(), &self.device,
        ).reshape([batch_size, max_h, max_w]).equal_elem(1);

        let targets: Vec<SceneTargets> = items.into_iter().map(|s| s.targets).collect();

        DetectionBatch { images, mask, targets }
    }
}

// ─── Unit Tests ──────────────────────────────────────────────
