// ============================================================
// Hungarian Matcher
// ============================================================
// Set prediction needs a one-to-one assignment between the fixed
// pool of query predictions and the variable set of ground-truth
// objects before any loss can be computed. Each image gets its
// own assignment, minimising
//
//   cost = w_class · (-p(target class))
//        + w_bbox  · L1(pred box, target box)
//        + w_giou  · (-GIoU(pred box, target box))
//
// The cost matrix is built with tensor ops, downloaded, and
// solved exactly with the Kuhn-Munkres algorithm from the
// pathfinding crate (OrderedFloat supplies the total order the
// solver needs). No gradients flow through the matching itself;
// the criterion re-reads the matched predictions.
//
// Why not a greedy assignment? Greedy can chain bad choices: a
// query grabbing its locally-best target may force another query
// onto a far worse one. Kuhn-Munkres finds the global minimum.
//
// Reference: Carion et al. (2020), §2 (bipartite matching)
//            Kuhn (1955) The Hungarian Method

use anyhow::{anyhow, Result};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use ordered_float::OrderedFloat;
use pathfinding::kuhn_munkres::kuhn_munkres_min;
use pathfinding::matrix::Matrix;

use crate::domain::scene::SceneTargets;
use crate::ml::box_ops::{box_cxcywh_to_xyxy, generalized_box_iou};
use crate::ml::detr::DetrOutput;

/// Matched (query, target) index pairs for one image, sorted by
/// query index. Both lists always have equal length.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedIndices {
    pub queries: Vec<usize>,
    pub targets: Vec<usize>,
}

impl MatchedIndices {
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.queries.iter().copied().zip(self.targets.iter().copied())
    }
}

#[derive(Debug, Clone)]
pub struct HungarianMatcher {
    pub cost_class: f64,
    pub cost_bbox:  f64,
    pub cost_giou:  f64,
}

impl HungarianMatcher {
    pub fn new(cost_class: f64, cost_bbox: f64, cost_giou: f64) -> Self {
        Self { cost_class, cost_bbox, cost_giou }
    }

    /// One `MatchedIndices` per batch element; images without
    /// objects get an empty assignment.
    pub fn forward<B: Backend>(
        &self,
        outputs: &DetrOutput<B>,
        targets: &[SceneTargets],
    ) -> Result<Vec<MatchedIndices>> {
        let [batch, num_queries, num_logits] = outputs.pred_logits.dims();
        let device = outputs.pred_logits.device();
        let probs = softmax(outputs.pred_logits.clone(), 2);

        let mut all = Vec::with_capacity(batch);
        for (b, tgt) in targets.iter().enumerate() {
            let num_targets = tgt.len();
            if num_targets == 0 {
                all.push(MatchedIndices::default());
                continue;
            }

            let out_prob = probs
                .clone()
                .slice([b..b + 1, 0..num_queries, 0..num_logits])
                .reshape([num_queries, num_logits]);
            let out_bbox = outputs
                .pred_boxes
                .clone()
                .slice([b..b + 1, 0..num_queries, 0..4])
                .reshape([num_queries, 4]);

            let labels: Vec<i32> = tgt.labels.iter().map(|&c| c as i32).collect();
            let tgt_ids = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), &device);
            let boxes_flat: Vec<f32> = tgt.boxes.iter().flatten().copied().collect();
            let tgt_bbox = Tensor::<B, 1>::from_floats(boxes_flat.as_slice(), &device)
                .reshape([num_targets, 4]);

            // [queries, targets] cost terms
            let cost_class = -out_prob.select(1, tgt_ids);
            let cost_bbox = l1_cost(out_bbox.clone(), tgt_bbox.clone());
            let cost_giou =
                -generalized_box_iou(box_cxcywh_to_xyxy(out_bbox), box_cxcywh_to_xyxy(tgt_bbox));

            let cost = cost_class * self.cost_class
                + cost_bbox * self.cost_bbox
                + cost_giou * self.cost_giou;
            let host: Vec<f32> = cost
                .into_data()
                .to_vec()
                .map_err(|e| anyhow!("cost matrix readback: {e:?}"))?;

            all.push(solve_assignment(&host, num_queries, num_targets)?);
        }
        Ok(all)
    }
}

/// Pairwise L1 distances: ([n, 4], [m, 4]) → [n, m]
fn l1_cost<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let n = a.dims()[0];
    let m = b.dims()[0];
    let diff = a.unsqueeze_dim::<3>(1).expand([n, m, 4]) - b.unsqueeze_dim::<3>(0).expand([n, m, 4]);
    diff.abs().sum_dim(2).reshape([n, m])
}

/// Exact minimum-cost assignment on the host. `cost` is row-major
/// [num_queries, num_targets]. Kuhn-Munkres wants rows ≤ columns,
/// so the smaller side becomes the rows and the pairs are mapped
/// back afterwards.
fn solve_assignment(cost: &[f32], num_queries: usize, num_targets: usize) -> Result<MatchedIndices> {
    let mut pairs: Vec<(usize, usize)> = if num_targets <= num_queries {
        let rows: Vec<Vec<OrderedFloat<f32>>> = (0..num_targets)
            .map(|t| (0..num_queries).map(|q| OrderedFloat(cost[q * num_targets + t])).collect())
            .collect();
        let weights = Matrix::from_rows(rows).map_err(|e| anyhow!("cost matrix shape: {e:?}"))?;
        let (_, assignment) = kuhn_munkres_min(&weights);
        assignment.iter().enumerate().map(|(t, &q)| (q, t)).collect()
    } else {
        let rows: Vec<Vec<OrderedFloat<f32>>> = (0..num_queries)
            .map(|q| (0..num_targets).map(|t| OrderedFloat(cost[q * num_targets + t])).collect())
            .collect();
        let weights = Matrix::from_rows(rows).map_err(|e| anyhow!("cost matrix shape: {e:?}"))?;
        let (_, assignment) = kuhn_munkres_min(&weights);
        assignment.iter().enumerate().map(|(q, &t)| (q, t)).collect()
    };
    pairs.sort_unstable();

    Ok(MatchedIndices {
        queries: pairs.iter().map(|&(q, _)| q).collect(),
        targets: pairs.iter().map(|&(_, t)| t).collect(),
    })
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn output_from(logits: Vec<Vec<f32>>, boxes: Vec<[f32; 4]>) -> DetrOutput<TB> {
        let device = device();
        let queries = logits.len();
        let classes = logits[0].len();
        let logits_flat: Vec<f32> = logits.into_iter().flatten().collect();
        let boxes_flat: Vec<f32> = boxes.iter().flatten().copied().collect();
        DetrOutput {
            pred_logits: Tensor::<TB, 1>::from_floats(logits_flat.as_slice(), &device)
                .reshape([1, queries, classes]),
            pred_boxes: Tensor::<TB, 1>::from_floats(boxes_flat.as_slice(), &device)
                .reshape([1, queries, 4]),
        }
    }

    /// Greedy matching would give q0 its closest target (distance
    /// 0.1) and stick q1 with 0.4; the optimal total crosses the
    /// assignment over.
    #[test]
    fn test_finds_globally_optimal_assignment() {
        let outputs = output_from(
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            vec![[0.3, 0.5, 0.2, 0.2], [0.1, 0.5, 0.2, 0.2]],
        );
        let targets = [SceneTargets {
            labels: vec![0, 0],
            boxes:  vec![[0.2, 0.5, 0.2, 0.2], [0.5, 0.5, 0.2, 0.2]],
        }];

        let matcher = HungarianMatcher::new(0.0, 1.0, 0.0);
        let indices = matcher.forward(&outputs, &targets).unwrap();

        assert_eq!(indices[0].queries, vec![0, 1]);
        assert_eq!(indices[0].targets, vec![1, 0]);
    }

    #[test]
    fn test_class_probabilities_drive_assignment() {
        // identical boxes; only the class term can decide
        let outputs = output_from(
            vec![vec![-4.0, 4.0, 0.0], vec![4.0, -4.0, 0.0]],
            vec![[0.5, 0.5, 0.2, 0.2], [0.5, 0.5, 0.2, 0.2]],
        );
        let targets = [SceneTargets {
            labels: vec![0, 1],
            boxes:  vec![[0.5, 0.5, 0.2, 0.2], [0.5, 0.5, 0.2, 0.2]],
        }];

        let matcher = HungarianMatcher::new(1.0, 0.0, 0.0);
        let indices = matcher.forward(&outputs, &targets).unwrap();

        // q0 believes in class 1 → target index 1; q1 → target 0
        assert_eq!(indices[0].queries, vec![0, 1]);
        assert_eq!(indices[0].targets, vec![1, 0]);
    }

    #[test]
    fn test_empty_targets_produce_empty_assignment() {
        let outputs = output_from(
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            vec![[0.5, 0.5, 0.2, 0.2], [0.2, 0.2, 0.1, 0.1]],
        );
        let targets = [SceneTargets::default()];

        let matcher = HungarianMatcher::new(1.0, 5.0, 2.0);
        let indices = matcher.forward(&outputs, &targets).unwrap();

        assert!(indices[0].is_empty());
    }

    #[test]
    fn test_more_targets_than_queries_matches_each_query_once() {
        let outputs = output_from(
            vec![vec![0.0, 0.0], vec![0.0, 0.0]],
            vec![[0.2, 0.2, 0.2, 0.2], [0.8, 0.8, 0.2, 0.2]],
        );
        let targets = [SceneTargets {
            labels: vec![0, 0, 0],
            boxes:  vec![
                [0.2, 0.2, 0.2, 0.2],
                [0.8, 0.8, 0.2, 0.2],
                [0.5, 0.5, 0.2, 0.2],
            ],
        }];

        let matcher = HungarianMatcher::new(0.0, 1.0, 0.0);
        let indices = matcher.forward(&outputs, &targets).unwrap();

        assert_eq!(indices[0].queries, vec![0, 1]);
        assert_eq!(indices[0].targets, vec![0, 1]);
    }
}
