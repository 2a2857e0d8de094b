// ============================================================
// Layer 5 — Detector
// ============================================================
// Checkpoint-backed inference: one rendered scene in, a list of
// thresholded detections out.
//
// Post-processing follows the training objective: softmax over
// the class logits, take the best REAL class per query (the
// trailing no-object column only competes through the softmax
// normalisation), drop queries below the score threshold, then
// scale the normalised cxcywh box back to pixel corners.

use anyhow::Result;
use burn::prelude::*;

use crate::data::dataset::DetectionSample;
use crate::domain::boxes::BoxCxCyWh;
use crate::domain::detection::Detection;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::detr::{DetrModel, DetrOutput};
use crate::ml::trainer::model_config;

type InferBackend = burn::backend::Wgpu;

pub struct Detector {
    model:       DetrModel<InferBackend>,
    num_classes: usize,
    device:      burn::backend::wgpu::WgpuDevice,
}

impl Detector {
    /// Rebuild the architecture from the saved training config and
    /// load the latest checkpoint onto the default WGPU device.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt_manager.load_config()?;
        let model: DetrModel<InferBackend> =
            model_config(&cfg).with_dropout(0.0).init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model loaded from checkpoint");
        Ok(Self { model, num_classes: cfg.num_classes, device })
    }

    pub fn detect(&self, sample: &DetectionSample, score_threshold: f32) -> Result<Vec<Detection>> {
        let (width, height) = (sample.width, sample.height);

        let images = Tensor::<InferBackend, 1>::from_floats(sample.pixels.as_slice(), &self.device)
            .reshape([1, 3, height, width]);
        // A single unbatched image has no padding to mask out.
        let mask = Tensor::<InferBackend, 3, Int>::zeros([1, height, width], &self.device)
            .equal_elem(1);

        let output = self.model.forward(images, mask);
        let detections = postprocess(&output, self.num_classes, width, height, score_threshold);
        tracing::debug!("{} detections above score {:.2}", detections.len(), score_threshold);
        Ok(detections)
    }
}

/// Turn raw single-image model output into detections in absolute
/// pixel coordinates, best-scoring first.
pub fn postprocess<B: Backend>(
    output:          &DetrOutput<B>,
    num_classes:     usize,
    width:           usize,
    height:          usize,
    score_threshold: f32,
) -> Vec<Detection> {
    let [batch, num_queries, num_logits] = output.pred_logits.dims();
    debug_assert_eq!(batch, 1);
    debug_assert_eq!(num_logits, num_classes + 1);

    let probs: Vec<f32> = burn::tensor::activation::softmax(output.pred_logits.clone(), 2)
        .into_data().to_vec::<f32>().unwrap_or_default();
    let boxes: Vec<f32> = output.pred_boxes.clone()
        .into_data().to_vec::<f32>().unwrap_or_default();

    let mut detections = Vec::new();
    for q in 0..num_queries {
        let row = &probs[q * num_logits..(q + 1) * num_logits];
        let (class_id, score) = row[..num_classes]
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |best, (i, &p)| {
                if p > best.1 { (i, p) } else { best }
            });
        if score < score_threshold {
            continue;
        }

        let b = &boxes[q * 4..(q + 1) * 4];
        let bbox = BoxCxCyWh::new(b[0], b[1], b[2], b[3])
            .to_xyxy()
            .scale(width as f32, height as f32);
        detections.push(Detection::new(class_id, score, bbox));
    }

    detections.sort_by(|a, b| b.score.total_cmp(&a.score));
    detections
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    /// Crafted logits for three queries: a confident class-1, a
    /// confident no-object, and a lukewarm class-0.
    fn crafted_output(device: &<TB as Backend>::Device) -> DetrOutput<TB> {
        // num_classes = 2, so logits are [c0, c1, no-object]
        let pred_logits = Tensor::<TB, 3>::from_floats(
            [[
                [0.0, 4.0, 0.0],   // q0 → class 1, softmax ≈ 0.964
                [0.0, 0.0, 4.0],   // q1 → no-object dominates
                [1.0, 0.0, 0.0],   // q2 → class 0, softmax ≈ 0.576
            ]],
            device,
        );
        let pred_boxes = Tensor::<TB, 3>::from_floats(
            [[
                [0.50, 0.50, 0.20, 0.40],
                [0.10, 0.10, 0.05, 0.05],
                [0.25, 0.75, 0.10, 0.10],
            ]],
            device,
        );
        DetrOutput { pred_logits, pred_boxes }
    }

    #[test]
    fn test_postprocess_thresholds_and_scales() {
        let device = Default::default();
        let output = crafted_output(&device);

        let detections = postprocess(&output, 2, 200, 100, 0.5);

        // q1's best real class sits near softmax 0.017, well under
        // the threshold; q0 and q2 survive, q0 first (higher score).
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_id, 1);
        assert!(detections[0].score > 0.95);
        assert_eq!(detections[1].class_id, 0);
        assert!(detections[1].score > 0.5 && detections[1].score < 0.6);

        // q0: cxcywh (0.5, 0.5, 0.2, 0.4) on a 200×100 image
        let b = detections[0].bbox;
        assert!((b.x1 - 80.0).abs() < 1e-3);
        assert!((b.y1 - 30.0).abs() < 1e-3);
        assert!((b.x2 - 120.0).abs() < 1e-3);
        assert!((b.y2 - 70.0).abs() < 1e-3);
    }

    #[test]
    fn test_postprocess_high_threshold_keeps_only_confident() {
        let device = Default::default();
        let output = crafted_output(&device);

        let detections = postprocess(&output, 2, 64, 64, 0.9);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_id, 1);
    }
}
