use serde::{Deserialize, Serialize};

use crate::domain::boxes::BoxXyxy;

/// One predicted object after post-processing: the argmax class,
/// its softmax confidence, and the box scaled to absolute pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub score:    f32,
    pub bbox:     BoxXyxy,
}

impl Detection {
    pub fn new(class_id: usize, score: f32, bbox: BoxXyxy) -> Self {
        Self { class_id, score, bbox }
    }
}
