// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// This layer contains ALL Burn framework specific code.
// No other layer imports from burn directly — only this one.
//
// Why isolate Burn code here?
//   - If Burn's API changes, we only update this layer
//   - Other layers are testable without a GPU
//   - The model architecture is clearly separated from
//     data loading and application logic
//
// What's in this layer:
//
//   attention.rs   — Multi-head attention with key-padding masks
//   bitlinear.rs   — Ternary-weight linear layers (BitNet b1.58)
//                    plus the Dense wrapper that picks between a
//                    standard and a bit-quantised projection
//   transformer.rs — Post-norm encoder/decoder stacks wired the
//                    way the detection transformer expects them,
//                    and a pre-norm ViT-style encoder layer
//   position.rs    — Fixed sine/cosine 2-D position embeddings
//   backbone.rs    — Small residual CNN backbone (stride 16)
//   detr.rs        — The full detection model: backbone →
//                    transformer → class / box heads
//   box_ops.rs     — Tensor box conversions, IoU and GIoU
//   matcher.rs     — Hungarian bipartite matching of predictions
//                    to ground-truth objects
//   criterion.rs   — Set prediction loss (CE + L1 + GIoU)
//   trainer.rs     — The training loop: forward, loss, backward,
//                    per-group optimiser steps, checkpointing
//   detector.rs    — Loads a checkpoint and runs detection on a
//                    single image, with score thresholding
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Vaswani et al. (2017) Attention Is All You Need
//            Carion et al. (2020) End-to-End Object Detection
//            with Transformers

/// Multi-head attention used by every transformer block
pub mod attention;

/// Ternary-weight (1.58-bit) linear layers and the Dense wrapper
pub mod bitlinear;

/// Encoder/decoder layers and the full detection transformer
pub mod transformer;

/// Sine/cosine 2-D position embeddings
pub mod position;

/// Residual convolutional backbone
pub mod backbone;

/// The detection model and its output record
pub mod detr;

/// Box conversions, pairwise IoU and generalised IoU on tensors
pub mod box_ops;

/// Hungarian matching between predictions and ground truth
pub mod matcher;

/// The set prediction criterion
pub mod criterion;

/// Full training loop with validation and checkpointing
pub mod trainer;

/// Detection engine — loads checkpoint and predicts boxes
pub mod detector;
