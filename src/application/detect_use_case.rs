// ============================================================
// Layer 2 — Detect Use Case
// ============================================================
// Inference workflow:
//   1. Rebuild the model from the saved checkpoint + config
//   2. Generate one held-out scene from a caller-chosen seed
//   3. Run the detector and hand back truth + predictions
//
// The scene seed is independent of the training seed, so the
// detector is always demonstrated on an image it never saw.

use anyhow::{Context, Result};

use crate::data::dataset::DetectionSample;
use crate::data::synthetic::SyntheticScenes;
use crate::domain::detection::Detection;
use crate::domain::scene::{Scene, SceneTargets};
use crate::domain::traits::SceneSource;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::detector::Detector;

use super::train_use_case::TrainConfig;

pub struct DetectUseCase {
    config:          TrainConfig,
    detector:        Detector,
    seed:            u64,
    score_threshold: f32,
}

impl DetectUseCase {
    pub fn new(checkpoint_dir: String, seed: u64, score_threshold: f32) -> Result<Self> {
        let ckpt     = CheckpointManager::new(&checkpoint_dir);
        let config   = ckpt.load_config()?;
        let detector = Detector::from_checkpoint(&ckpt)?;
        Ok(Self { config, detector, seed, score_threshold })
    }

    /// Generate one held-out scene, run the detector on it, and
    /// return the ground truth alongside the predictions.
    pub fn detect(&self) -> Result<(Scene, Vec<Detection>)> {
        let cfg = &self.config;

        let mut source = SyntheticScenes::new(
            cfg.num_classes,
            cfg.max_objects,
            cfg.min_image_size,
            cfg.max_image_size,
            self.seed,
        );
        let mut scenes = source.next_scenes(1)?;
        let scene = scenes.pop().context("scene generator returned no scenes")?;
        let pixels = source.render(&scene);

        let sample = DetectionSample {
            pixels,
            width:   scene.width,
            height:  scene.height,
            targets: SceneTargets::from(&scene),
        };

        let detections = self.detector.detect(&sample, self.score_threshold)?;
        tracing::info!(
            "Detected {} objects (ground truth has {})",
            detections.len(),
            scene.object_count(),
        );

        Ok((scene, detections))
    }
}
