// ============================================================
// Layer 3 — Bounding Box Types
// ============================================================
// Two box parameterisations are used throughout the system:
//
//   BoxCxCyWh — (centre_x, centre_y, width, height)
//               The model predicts boxes in this form, with every
//               coordinate normalised to [0, 1] by the image size.
//
//   BoxXyxy   — (x_min, y_min, x_max, y_max)
//               IoU-style overlap maths is only natural in corner
//               form, and final detections are reported this way
//               in absolute pixels.
//
// The IoU / GIoU functions here operate on plain f32 values.
// Layer 5 re-implements the same formulas on tensors for the loss;
// these scalar versions are the independent oracle the tensor
// versions are tested against.
//
// GIoU extends IoU so that non-overlapping boxes still get a
// useful gradient signal: it subtracts the fraction of the
// smallest enclosing box not covered by the union, giving a
// score in (-1, 1].
//
// Reference: Rezatofighi et al. (2019) Generalized IoU
//            Rust Book §5 (Structs)

use serde::{Deserialize, Serialize};

/// Centre-form box. Coordinates are normalised to [0, 1]
/// relative to the (unpadded) image size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxCxCyWh {
    pub cx: f32,
    pub cy: f32,
    pub w:  f32,
    pub h:  f32,
}

/// Corner-form box: (x1, y1) is the top-left corner,
/// (x2, y2) the bottom-right. Units depend on context —
/// normalised during training, absolute pixels in detections.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxXyxy {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoxCxCyWh {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// Convert from centre form to corner form.
    pub fn to_xyxy(self) -> BoxXyxy {
        BoxXyxy {
            x1: self.cx - 0.5 * self.w,
            y1: self.cy - 0.5 * self.h,
            x2: self.cx + 0.5 * self.w,
            y2: self.cy + 0.5 * self.h,
        }
    }

    /// Flat [cx, cy, w, h] view, handy when filling tensor buffers.
    pub fn to_array(self) -> [f32; 4] {
        [self.cx, self.cy, self.w, self.h]
    }
}

impl BoxXyxy {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Convert from corner form back to centre form.
    pub fn to_cxcywh(self) -> BoxCxCyWh {
        BoxCxCyWh {
            cx: 0.5 * (self.x1 + self.x2),
            cy: 0.5 * (self.y1 + self.y2),
            w:  self.x2 - self.x1,
            h:  self.y2 - self.y1,
        }
    }

    /// Scale a normalised box up to absolute pixel coordinates.
    pub fn scale(self, width: f32, height: f32) -> BoxXyxy {
        BoxXyxy {
            x1: self.x1 * width,
            y1: self.y1 * height,
            x2: self.x2 * width,
            y2: self.y2 * height,
        }
    }

    pub fn area(self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection-over-union of two well-formed boxes (x2 >= x1, y2 >= y1).
    pub fn iou(self, other: BoxXyxy) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter   = inter_w * inter_h;
        let union   = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }
        inter / union
    }

    /// Generalized IoU: iou - (enclosing_area - union) / enclosing_area.
    ///
    /// Equal boxes give 1.0; far-apart boxes approach -1.0.
    pub fn giou(self, other: BoxXyxy) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter   = inter_w * inter_h;
        let union   = self.area() + other.area() - inter;

        let enc_w   = self.x2.max(other.x2) - self.x1.min(other.x1);
        let enc_h   = self.y2.max(other.y2) - self.y1.min(other.y1);
        let enclose = enc_w * enc_h;

        if union <= 0.0 || enclose <= 0.0 {
            return 0.0;
        }
        inter / union - (enclose - union) / enclose
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) {
        assert!((a - b).abs() < 1e-5, "{a} vs {b}");
    }

    #[test]
    fn test_centre_corner_round_trip() {
        let b = BoxCxCyWh::new(0.5, 0.5, 0.5, 0.5);
        let c = b.to_xyxy();
        close(c.x1, 0.25);
        close(c.y1, 0.25);
        close(c.x2, 0.75);
        close(c.y2, 0.75);
        let back = c.to_cxcywh();
        close(back.cx, 0.5);
        close(back.w, 0.5);
    }

    #[test]
    fn test_iou_identical_boxes() {
        let a = BoxXyxy::new(0.0, 0.0, 2.0, 2.0);
        close(a.iou(a), 1.0);
        close(a.giou(a), 1.0);
    }

    #[test]
    fn test_iou_partial_overlap() {
        // Unit-area overlap between two 2x2 boxes offset by (1, 1):
        // inter = 1, union = 7, enclose = 9
        let a = BoxXyxy::new(0.0, 0.0, 2.0, 2.0);
        let b = BoxXyxy::new(1.0, 1.0, 3.0, 3.0);
        close(a.iou(b), 1.0 / 7.0);
        close(a.giou(b), 1.0 / 7.0 - 2.0 / 9.0);
    }

    #[test]
    fn test_giou_disjoint_boxes_is_negative() {
        let a = BoxXyxy::new(0.0, 0.0, 1.0, 1.0);
        let b = BoxXyxy::new(2.0, 2.0, 3.0, 3.0);
        close(a.iou(b), 0.0);
        // union = 2, enclose = 9 → giou = -(9-2)/9
        close(a.giou(b), -7.0 / 9.0);
    }

    #[test]
    fn test_scale_to_pixels() {
        let b = BoxCxCyWh::new(0.5, 0.5, 0.5, 0.25).to_xyxy().scale(200.0, 100.0);
        close(b.x1, 50.0);
        close(b.y1, 37.5);
        close(b.x2, 150.0);
        close(b.y2, 62.5);
    }
}
