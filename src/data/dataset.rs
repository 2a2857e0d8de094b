use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

use crate::domain::scene::SceneTargets;

/// One rendered training sample: pixels plus ground truth.
/// Pixel layout is channel-major (CHW):
/// `pixels[(c * height + y) * width + x]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSample {
    pub pixels:  Vec<f32>,
    pub width:   usize,
    pub height:  usize,
    pub targets: SceneTargets,
}

impl DetectionSample {
    pub fn pixel(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.pixels[(channel * self.height + y) * self.width + x]
    }

    pub fn object_count(&self) -> usize {
        self.targets.len()
    }
}

pub struct DetectionDataset {
    samples: Vec<DetectionSample>,
}

impl DetectionDataset {
    pub fn new(samples: Vec<DetectionSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<DetectionSample> for DetectionDataset {
    fn get(&self, index: usize) -> Option<DetectionSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
