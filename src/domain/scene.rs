// ============================================================
// Layer 3 — Scene Domain Type
// ============================================================
// A Scene is one labelled training example in domain terms:
// an image of a given size plus the set of objects in it.
// Set prediction means the objects carry NO ordering — the
// matcher pairs them with model queries at loss time.
//
// Box coordinates are stored normalised to the scene's own
// width/height so the label is independent of any padding the
// batcher applies later.
//
// Reference: Carion et al. (2020) End-to-End Object Detection
//            with Transformers

use serde::{Deserialize, Serialize};

use crate::domain::boxes::BoxCxCyWh;

/// One ground-truth object: a class label plus a normalised box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneObject {
    /// Class index in [0, num_classes). The "no object" class is
    /// reserved by the criterion and never appears in labels.
    pub class_id: usize,

    /// Normalised centre-form box relative to the scene size
    pub bbox: BoxCxCyWh,
}

/// A labelled scene — the domain-level unit the data layer renders
/// into pixels and the criterion consumes as ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    /// Image width in pixels
    pub width: usize,

    /// Image height in pixels
    pub height: usize,

    /// The unordered set of ground-truth objects (may be empty)
    pub objects: Vec<SceneObject>,
}

impl Scene {
    pub fn new(width: usize, height: usize, objects: Vec<SceneObject>) -> Self {
        Self { width, height, objects }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

/// Ground truth for one image, flattened into the arrays the
/// matcher and criterion consume: parallel label / box lists.
/// `boxes[i]` is the normalised [cx, cy, w, h] for `labels[i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneTargets {
    pub labels: Vec<i64>,
    pub boxes:  Vec<[f32; 4]>,
}

impl SceneTargets {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl From<&Scene> for SceneTargets {
    fn from(scene: &Scene) -> Self {
        Self {
            labels: scene.objects.iter().map(|o| o.class_id as i64).collect(),
            boxes:  scene.objects.iter().map(|o| o.bbox.to_array()).collect(),
        }
    }
}
