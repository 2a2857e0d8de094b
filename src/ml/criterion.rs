// ============================================================
// Set Prediction Criterion
// ============================================================
// Once the matcher has paired queries with ground-truth objects,
// three terms make up the loss:
//
//   loss_ce   — cross entropy over ALL queries; matched queries
//               target their object's class, the rest target the
//               "no object" class, down-weighted by eos_coef so
//               the (far more numerous) background queries do not
//               drown out the objects
//   loss_bbox — L1 between matched boxes
//   loss_giou — 1 − GIoU between matched boxes, which stays
//               informative when boxes do not overlap at all
//
// Box terms are normalised by the total number of ground-truth
// objects in the batch (clamped to 1), so images with many
// objects do not dominate the gradient.
//
// class_error and cardinality_error are diagnostics only: top-1
// error on matched queries, and how far the number of confident
// predictions strays from the number of real objects.
//
// Reference: Carion et al. (2020), §2 (Hungarian loss)
//            Rezatofighi et al. (2019) Generalized IoU

use anyhow::{anyhow, Result};
use burn::{
    nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig},
    prelude::*,
};

use crate::domain::scene::SceneTargets;
use crate::ml::box_ops::{box_cxcywh_to_xyxy, giou_pairs};
use crate::ml::detr::DetrOutput;
use crate::ml::matcher::HungarianMatcher;

/// Loss terms for one batch. `total` carries the autodiff graph;
/// the component fields are detached scalars for logging.
#[derive(Debug, Clone)]
pub struct DetrLosses<B: Backend> {
    pub total: Tensor<B, 1>,
    pub loss_ce:   f64,
    pub loss_bbox: f64,
    pub loss_giou: f64,
    pub class_error:       f64,
    pub cardinality_error: f64,
}

pub struct SetCriterion<B: Backend> {
    pub matcher: HungarianMatcher,
    pub num_classes: usize,
    pub bbox_loss_coef: f64,
    pub giou_loss_coef: f64,
    ce: CrossEntropyLoss<B>,
}

impl<B: Backend> SetCriterion<B> {
    pub fn new(
        num_classes: usize,
        matcher: HungarianMatcher,
        eos_coef: f64,
        bbox_loss_coef: f64,
        giou_loss_coef: f64,
        device: &B::Device,
    ) -> Self {
        let mut class_weights = vec![1.0f32; num_classes + 1];
        class_weights[num_classes] = eos_coef as f32;
        let ce = CrossEntropyLossConfig::new()
            .with_weights(Some(class_weights))
            .init(device);
        Self { matcher, num_classes, bbox_loss_coef, giou_loss_coef, ce }
    }

    pub fn forward(&self, outputs: &DetrOutput<B>, targets: &[SceneTargets]) -> Result<DetrLosses<B>> {
        let [batch, num_queries, num_logits] = outputs.pred_logits.dims();
        let device = outputs.pred_logits.device();

        let indices = self.matcher.forward(outputs, targets)?;
        let num_boxes = targets.iter().map(|t| t.len()).sum::<usize>().max(1) as f64;

        // ── Classification: matched queries get their object's class,
        //    everything else the no-object class ──
        let mut classes = vec![self.num_classes as i32; batch * num_queries];
        for (b, matched) in indices.iter().enumerate() {
            for (q, t) in matched.pairs() {
                classes[b * num_queries + q] = targets[b].labels[t] as i32;
            }
        }
        let target_classes = Tensor::<B, 1, Int>::from_ints(classes.as_slice(), &device);
        let logits_flat = outputs
            .pred_logits
            .clone()
            .reshape([batch * num_queries, num_logits]);
        let loss_ce = self.ce.forward(logits_flat, target_classes);

        // ── Box regression over the matched pairs ──
        let total_matched: usize = indices.iter().map(|m| m.len()).sum();
        let (loss_bbox, loss_giou) = if total_matched > 0 {
            let mut flat_indices = Vec::with_capacity(total_matched);
            let mut target_flat = Vec::with_capacity(total_matched * 4);
            for (b, matched) in indices.iter().enumerate() {
                for (q, t) in matched.pairs() {
                    flat_indices.push((b * num_queries + q) as i32);
                    target_flat.extend_from_slice(&targets[b].boxes[t]);
                }
            }
            let gather = Tensor::<B, 1, Int>::from_ints(flat_indices.as_slice(), &device);
            let src_boxes = outputs
                .pred_boxes
                .clone()
                .reshape([batch * num_queries, 4])
                .select(0, gather); // [matched, 4]
            let tgt_boxes = Tensor::<B, 1>::from_floats(target_flat.as_slice(), &device)
                .reshape([total_matched, 4]);

            let l1 = (src_boxes.clone() - tgt_boxes.clone()).abs().sum() / num_boxes;
            let giou = giou_pairs(box_cxcywh_to_xyxy(src_boxes), box_cxcywh_to_xyxy(tgt_boxes));
            let giou_loss = (-giou + 1.0).sum() / num_boxes;
            (l1, giou_loss)
        } else {
            (Tensor::zeros([1], &device), Tensor::zeros([1], &device))
        };

        let total = loss_ce.clone()
            + loss_bbox.clone() * self.bbox_loss_coef
            + loss_giou.clone() * self.giou_loss_coef;

        let (class_error, cardinality_error) =
            self.diagnostics(outputs, targets, &indices, batch, num_queries)?;

        Ok(DetrLosses {
            total,
            loss_ce:   loss_ce.into_scalar().elem::<f64>(),
            loss_bbox: loss_bbox.into_scalar().elem::<f64>(),
            loss_giou: loss_giou.into_scalar().elem::<f64>(),
            class_error,
            cardinality_error,
        })
    }

    fn diagnostics(
        &self,
        outputs: &DetrOutput<B>,
        targets: &[SceneTargets],
        indices: &[crate::ml::matcher::MatchedIndices],
        batch: usize,
        num_queries: usize,
    ) -> Result<(f64, f64)> {
        let predicted: Vec<i64> = outputs
            .pred_logits
            .clone()
            .argmax(2)
            .reshape([batch * num_queries])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| anyhow!("argmax readback: {e:?}"))?;

        let mut matched = 0usize;
        let mut correct = 0usize;
        let mut cardinality = 0.0f64;
        for b in 0..batch {
            for (q, t) in indices[b].pairs() {
                matched += 1;
                if predicted[b * num_queries + q] == targets[b].labels[t] {
                    correct += 1;
                }
            }
            let confident = (0..num_queries)
                .filter(|&q| predicted[b * num_queries + q] != self.num_classes as i64)
                .count();
            cardinality += (confident as f64 - targets[b].len() as f64).abs();
        }

        let class_error = if matched > 0 {
            100.0 * (1.0 - correct as f64 / matched as f64)
        } else {
            0.0
        };
        Ok((class_error, cardinality / batch.max(1) as f64))
    }
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;
    type AB = burn::backend::Autodiff<burn::backend::NdArray>;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn output_from<B: Backend>(
        logits: Vec<Vec<f32>>,
        boxes: Vec<[f32; 4]>,
        device: &B::Device,
    ) -> DetrOutput<B> {
        let queries = logits.len();
        let classes = logits[0].len();
        let logits_flat: Vec<f32> = logits.into_iter().flatten().collect();
        let boxes_flat: Vec<f32> = boxes.iter().flatten().copied().collect();
        DetrOutput {
            pred_logits: Tensor::<B, 1>::from_floats(logits_flat.as_slice(), device)
                .reshape([1, queries, classes]),
            pred_boxes: Tensor::<B, 1>::from_floats(boxes_flat.as_slice(), device)
                .reshape([1, queries, 4]),
        }
    }

    fn criterion<B: Backend>(eos_coef: f64, device: &B::Device) -> SetCriterion<B> {
        SetCriterion::new(1, HungarianMatcher::new(1.0, 5.0, 2.0), eos_coef, 5.0, 2.0, device)
    }

    /// One class, two queries. q0 predicts the object perfectly,
    /// q1 leans no-object. With uniform class weights the CE is
    /// (−ln σ₀(2,0) − ln σ₁(0,1.5)) / 2 ≈ 0.16417.
    #[test]
    fn test_cross_entropy_matches_hand_computation() {
        let device = device();
        let outputs = output_from::<TB>(
            vec![vec![2.0, 0.0], vec![0.0, 1.5]],
            vec![[0.5, 0.5, 0.2, 0.2], [0.1, 0.1, 0.05, 0.05]],
            &device,
        );
        let targets = [SceneTargets {
            labels: vec![0],
            boxes:  vec![[0.5, 0.5, 0.2, 0.2]],
        }];

        let losses = criterion::<TB>(1.0, &device).forward(&outputs, &targets).unwrap();

        assert!((losses.loss_ce - 0.164_17).abs() < 1e-3, "ce = {}", losses.loss_ce);
        assert!(losses.loss_bbox.abs() < 1e-6);
        assert!(losses.loss_giou.abs() < 1e-6);
        assert!(losses.class_error.abs() < 1e-9);
    }

    #[test]
    fn test_eos_weight_downweights_background_queries() {
        let device = device();
        let make = || {
            output_from::<TB>(
                vec![vec![2.0, 0.0], vec![0.0, 1.5]],
                vec![[0.5, 0.5, 0.2, 0.2], [0.1, 0.1, 0.05, 0.05]],
                &device,
            )
        };
        let targets = [SceneTargets {
            labels: vec![0],
            boxes:  vec![[0.5, 0.5, 0.2, 0.2]],
        }];

        let uniform = criterion::<TB>(1.0, &device).forward(&make(), &targets).unwrap();
        let weighted = criterion::<TB>(0.1, &device).forward(&make(), &targets).unwrap();

        assert!(weighted.loss_ce < uniform.loss_ce);
    }

    /// Matched pair differs only in width: L1 = 0.2 and the boxes
    /// give IoU 0.5 with the enclosing box equal to the union, so
    /// GIoU = 0.5 and loss_giou = 0.5.
    #[test]
    fn test_box_losses_match_hand_computation() {
        let device = device();
        let outputs = output_from::<TB>(
            vec![vec![6.0, -6.0], vec![-6.0, 6.0]],
            vec![[0.5, 0.5, 0.2, 0.2], [0.9, 0.9, 0.1, 0.1]],
            &device,
        );
        let targets = [SceneTargets {
            labels: vec![0],
            boxes:  vec![[0.5, 0.5, 0.4, 0.2]],
        }];

        let losses = criterion::<TB>(0.1, &device).forward(&outputs, &targets).unwrap();

        assert!((losses.loss_bbox - 0.2).abs() < 1e-4, "bbox = {}", losses.loss_bbox);
        assert!((losses.loss_giou - 0.5).abs() < 1e-4, "giou = {}", losses.loss_giou);
    }

    #[test]
    fn test_empty_targets_leave_only_classification() {
        let device = device();
        let outputs = output_from::<TB>(
            vec![vec![2.0, 0.0], vec![-3.0, 3.0]],
            vec![[0.5, 0.5, 0.2, 0.2], [0.1, 0.1, 0.05, 0.05]],
            &device,
        );
        let targets = [SceneTargets::default()];

        let losses = criterion::<TB>(0.1, &device).forward(&outputs, &targets).unwrap();

        assert!(losses.loss_bbox.abs() < 1e-9);
        assert!(losses.loss_giou.abs() < 1e-9);
        assert!(losses.loss_ce > 0.0);
        // q0 still claims class 0 → one spurious confident prediction
        assert!((losses.cardinality_error - 1.0).abs() < 1e-9);
        assert!(losses.class_error.abs() < 1e-9);
    }

    /// Box gradients may only reach the matched query.
    #[test]
    fn test_gradients_flow_only_to_matched_boxes() {
        let device = Default::default();
        let boxes = Tensor::<AB, 1>::from_floats(
            [0.45, 0.5, 0.25, 0.2, 0.1, 0.1, 0.05, 0.05].as_slice(),
            &device,
        )
        .reshape([1, 2, 4])
        .require_grad();
        let outputs = DetrOutput {
            pred_logits: Tensor::<AB, 1>::from_floats(
                [6.0, -6.0, -6.0, 6.0].as_slice(),
                &device,
            )
            .reshape([1, 2, 2]),
            pred_boxes: boxes.clone(),
        };
        let targets = [SceneTargets {
            labels: vec![0],
            boxes:  vec![[0.5, 0.5, 0.2, 0.2]],
        }];

        let losses = criterion::<AB>(0.1, &device).forward(&outputs, &targets).unwrap();
        let grads = losses.total.backward();
        let grad: Vec<f32> = boxes.grad(&grads).unwrap().into_data().to_vec().unwrap();

        let matched_magnitude: f32 = grad[0..4].iter().map(|g| g.abs()).sum();
        let unmatched_magnitude: f32 = grad[4..8].iter().map(|g| g.abs()).sum();
        assert!(matched_magnitude > 1e-4, "no gradient on the matched box");
        assert!(unmatched_magnitude < 1e-9, "gradient leaked to an unmatched box");
    }
}
