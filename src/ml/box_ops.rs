// ============================================================
// Tensor Box Operations
// ============================================================
// Batched counterparts of the scalar box maths in domain::boxes,
// kept differentiable for the loss: slicing, cat, min/max pairs
// and clamps only. `box_iou`/`generalized_box_iou` are pairwise
// (every row of `a` against every row of `b`); `giou_pairs` is
// the aligned row-for-row variant the criterion needs.

use burn::prelude::*;

/// [n, 4] (cx, cy, w, h) → [n, 4] (x1, y1, x2, y2)
pub fn box_cxcywh_to_xyxy<B: Backend>(boxes: Tensor<B, 2>) -> Tensor<B, 2> {
    let n = boxes.dims()[0];
    let cx = boxes.clone().slice([0..n, 0..1]);
    let cy = boxes.clone().slice([0..n, 1..2]);
    let w = boxes.clone().slice([0..n, 2..3]);
    let h = boxes.slice([0..n, 3..4]);
    Tensor::cat(
        vec![
            cx.clone() - w.clone() * 0.5,
            cy.clone() - h.clone() * 0.5,
            cx + w * 0.5,
            cy + h * 0.5,
        ],
        1,
    )
}

/// Areas of [n, 4] xyxy boxes → [n]
fn box_area<B: Backend>(boxes: Tensor<B, 2>) -> Tensor<B, 1> {
    let n = boxes.dims()[0];
    let w = boxes.clone().slice([0..n, 2..3]) - boxes.clone().slice([0..n, 0..1]);
    let h = boxes.clone().slice([0..n, 3..4]) - boxes.slice([0..n, 1..2]);
    (w * h).reshape([n])
}

/// Pairwise IoU of xyxy boxes: ([n, 4], [m, 4]) → ([n, m], [n, m])
/// also returning the union areas, which the GIoU reuses.
pub fn box_iou<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
    let n = a.dims()[0];
    let m = b.dims()[0];
    let area_a = box_area(a.clone());
    let area_b = box_area(b.clone());

    let a_min = a.clone().slice([0..n, 0..2]).unsqueeze_dim::<3>(1).expand([n, m, 2]);
    let a_max = a.slice([0..n, 2..4]).unsqueeze_dim::<3>(1).expand([n, m, 2]);
    let b_min = b.clone().slice([0..m, 0..2]).unsqueeze_dim::<3>(0).expand([n, m, 2]);
    let b_max = b.slice([0..m, 2..4]).unsqueeze_dim::<3>(0).expand([n, m, 2]);

    let wh = (a_max.min_pair(b_max) - a_min.max_pair(b_min)).clamp_min(0.0);
    let inter = (wh.clone().slice([0..n, 0..m, 0..1]) * wh.slice([0..n, 0..m, 1..2]))
        .reshape([n, m]);

    let union = area_a.unsqueeze_dim::<2>(1).expand([n, m])
        + area_b.unsqueeze_dim::<2>(0).expand([n, m])
        - inter.clone();
    (inter / union.clone(), union)
}

/// Pairwise generalised IoU of xyxy boxes: ([n, 4], [m, 4]) → [n, m],
/// values in [-1, 1].
pub fn generalized_box_iou<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let n = a.dims()[0];
    let m = b.dims()[0];
    let (iou, union) = box_iou(a.clone(), b.clone());

    let a_min = a.clone().slice([0..n, 0..2]).unsqueeze_dim::<3>(1).expand([n, m, 2]);
    let a_max = a.slice([0..n, 2..4]).unsqueeze_dim::<3>(1).expand([n, m, 2]);
    let b_min = b.clone().slice([0..m, 0..2]).unsqueeze_dim::<3>(0).expand([n, m, 2]);
    let b_max = b.slice([0..m, 2..4]).unsqueeze_dim::<3>(0).expand([n, m, 2]);

    // smallest box enclosing both
    let wh = (a_max.max_pair(b_max) - a_min.min_pair(b_min)).clamp_min(0.0);
    let enclose = (wh.clone().slice([0..n, 0..m, 0..1]) * wh.slice([0..n, 0..m, 1..2]))
        .reshape([n, m]);

    iou - (enclose.clone() - union) / enclose
}

/// Row-aligned GIoU of two [n, 4] xyxy tensors → [n]
pub fn giou_pairs<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 1> {
    let n = a.dims()[0];
    let area = box_area(a.clone()) + box_area(b.clone());

    let a_min = a.clone().slice([0..n, 0..2]);
    let a_max = a.slice([0..n, 2..4]);
    let b_min = b.clone().slice([0..n, 0..2]);
    let b_max = b.slice([0..n, 2..4]);

    let wh = (a_max.clone().min_pair(b_max.clone()) - a_min.clone().max_pair(b_min.clone()))
        .clamp_min(0.0);
    let inter = (wh.clone().slice([0..n, 0..1]) * wh.slice([0..n, 1..2])).reshape([n]);
    let union = area - inter.clone();
    let iou = inter / union.clone();

    let wh = (a_max.max_pair(b_max) - a_min.min_pair(b_min)).clamp_min(0.0);
    let enclose = (wh.clone().slice([0..n, 0..1]) * wh.slice([0..n, 1..2])).reshape([n]);

    iou - (enclose.clone() - union) / enclose
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::boxes::BoxCxCyWh;

    type TB = burn::backend::NdArray;

    fn device() -> <TB as Backend>::Device {
        Default::default()
    }

    fn sample_a() -> Vec<BoxCxCyWh> {
        vec![
            BoxCxCyWh::new(0.5, 0.5, 0.4, 0.4),
            BoxCxCyWh::new(0.25, 0.25, 0.3, 0.2),
            BoxCxCyWh::new(0.8, 0.2, 0.2, 0.3),
            BoxCxCyWh::new(0.5, 0.5, 1.0, 1.0),
        ]
    }

    fn sample_b() -> Vec<BoxCxCyWh> {
        vec![
            BoxCxCyWh::new(0.55, 0.45, 0.4, 0.5),
            BoxCxCyWh::new(0.1, 0.9, 0.15, 0.15),
            BoxCxCyWh::new(0.5, 0.5, 0.4, 0.4),
        ]
    }

    fn upload(boxes: &[BoxCxCyWh]) -> Tensor<TB, 2> {
        let flat: Vec<f32> = boxes.iter().flat_map(|b| b.to_array()).collect();
        Tensor::<TB, 1>::from_floats(flat.as_slice(), &device()).reshape([boxes.len(), 4])
    }

    #[test]
    fn test_conversion_matches_scalar_oracle() {
        let boxes = sample_a();
        let converted = box_cxcywh_to_xyxy(upload(&boxes));
        let host: Vec<f32> = converted.into_data().to_vec().unwrap();

        for (i, b) in boxes.iter().enumerate() {
            let xyxy = b.to_xyxy();
            assert!((host[i * 4] - xyxy.x1).abs() < 1e-6);
            assert!((host[i * 4 + 1] - xyxy.y1).abs() < 1e-6);
            assert!((host[i * 4 + 2] - xyxy.x2).abs() < 1e-6);
            assert!((host[i * 4 + 3] - xyxy.y2).abs() < 1e-6);
        }
    }

    #[test]
    fn test_pairwise_iou_matches_scalar_oracle() {
        let (boxes_a, boxes_b) = (sample_a(), sample_b());
        let (iou, _) = box_iou(
            box_cxcywh_to_xyxy(upload(&boxes_a)),
            box_cxcywh_to_xyxy(upload(&boxes_b)),
        );
        let host: Vec<f32> = iou.into_data().to_vec().unwrap();

        for (i, a) in boxes_a.iter().enumerate() {
            for (j, b) in boxes_b.iter().enumerate() {
                let expected = a.to_xyxy().iou(b.to_xyxy());
                assert!(
                    (host[i * boxes_b.len() + j] - expected).abs() < 1e-5,
                    "iou[{i}][{j}] = {} vs {expected}",
                    host[i * boxes_b.len() + j]
                );
            }
        }
    }

    #[test]
    fn test_pairwise_giou_matches_scalar_oracle() {
        let (boxes_a, boxes_b) = (sample_a(), sample_b());
        let giou = generalized_box_iou(
            box_cxcywh_to_xyxy(upload(&boxes_a)),
            box_cxcywh_to_xyxy(upload(&boxes_b)),
        );
        let host: Vec<f32> = giou.into_data().to_vec().unwrap();

        for (i, a) in boxes_a.iter().enumerate() {
            for (j, b) in boxes_b.iter().enumerate() {
                let expected = a.to_xyxy().giou(b.to_xyxy());
                assert!(
                    (host[i * boxes_b.len() + j] - expected).abs() < 1e-5,
                    "giou[{i}][{j}] = {} vs {expected}",
                    host[i * boxes_b.len() + j]
                );
            }
        }
    }

    #[test]
    fn test_aligned_pairs_match_pairwise_diagonal() {
        let boxes = sample_a();
        let shifted: Vec<BoxCxCyWh> = boxes
            .iter()
            .map(|b| BoxCxCyWh::new(b.cx + 0.05, b.cy - 0.03, b.w, b.h))
            .collect();

        let a = box_cxcywh_to_xyxy(upload(&boxes));
        let b = box_cxcywh_to_xyxy(upload(&shifted));

        let aligned: Vec<f32> = giou_pairs(a.clone(), b.clone()).into_data().to_vec().unwrap();
        let full: Vec<f32> = generalized_box_iou(a, b).into_data().to_vec().unwrap();

        for i in 0..boxes.len() {
            assert!((aligned[i] - full[i * boxes.len() + i]).abs() < 1e-6);
        }
    }

    #[test]
    fn test_identical_boxes_score_one() {
        let a = box_cxcywh_to_xyxy(upload(&sample_a()));
        let giou: Vec<f32> = giou_pairs(a.clone(), a).into_data().to_vec().unwrap();
        for v in giou {
            assert!((v - 1.0).abs() < 1e-5);
        }
    }
}
