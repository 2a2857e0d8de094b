// ============================================================
// Layer 4 — Synthetic Scene Generator
// ============================================================
// Produces labelled scenes entirely in memory: each scene is a
// dark noisy background with up to max_objects filled
// rectangles, one colour per class. The generator owns a seeded
// StdRng, so the same seed always yields the same dataset.
//
// Why rectangles?
//   The matcher, criterion and training loop never look at the
//   pixels — they need images whose ground truth is known
//   exactly. Solid colour-by-class rectangles give the model a
//   learnable pixels→(class, box) mapping without any file I/O.
//
// Why normalised boxes?
//   Scenes vary in size and the batcher pads them later. Boxes
//   stored relative to the scene's own width/height stay correct
//   no matter how much padding is added.
//
// Reference: rand crate documentation (StdRng, SeedableRng)

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::DetectionSample;
use crate::domain::boxes::BoxCxCyWh;
use crate::domain::scene::{Scene, SceneObject, SceneTargets};
use crate::domain::traits::SceneSource;

/// RGB colour per class id, cycled when num_classes exceeds it.
const PALETTE: [[f32; 3]; 8] = [
    [0.90, 0.20, 0.20],
    [0.20, 0.80, 0.30],
    [0.25, 0.40, 0.95],
    [0.95, 0.85, 0.20],
    [0.85, 0.30, 0.85],
    [0.20, 0.85, 0.85],
    [0.95, 0.55, 0.15],
    [0.60, 0.60, 0.60],
];

const BACKGROUND:      f32 = 0.10;
const NOISE_AMPLITUDE: f32 = 0.05;

// ─── SyntheticScenes ──────────────────────────────────────────────────────────
pub struct SyntheticScenes {
    num_classes: usize,
    max_objects: usize,
    min_size:    usize,
    max_size:    usize,
    rng:         StdRng,
}

impl SyntheticScenes {
    pub fn new(
        num_classes: usize,
        max_objects: usize,
        min_size:    usize,
        max_size:    usize,
        seed:        u64,
    ) -> Self {
        assert!(num_classes > 0, "need at least one object class");
        assert!(min_size <= max_size, "min_size must not exceed max_size");
        Self {
            num_classes,
            max_objects,
            min_size,
            max_size,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// One random labelled scene. Image size, object count, class
    /// and geometry are all drawn from the generator's RNG; every
    /// box lies strictly inside the image.
    pub fn scene(&mut self) -> Scene {
        let width  = self.rng.gen_range(self.min_size..=self.max_size);
        let height = self.rng.gen_range(self.min_size..=self.max_size);
        let count  = self.rng.gen_range(0..=self.max_objects);

        let mut objects = Vec::with_capacity(count);
        for _ in 0..count {
            let w = self.rng.gen_range(0.15f32..0.5);
            let h = self.rng.gen_range(0.15f32..0.5);
            let cx = self.rng.gen_range(w / 2.0..1.0 - w / 2.0);
            let cy = self.rng.gen_range(h / 2.0..1.0 - h / 2.0);
            objects.push(SceneObject {
                class_id: self.rng.gen_range(0..self.num_classes),
                bbox:     BoxCxCyWh::new(cx, cy, w, h),
            });
        }
        Scene::new(width, height, objects)
    }

    /// Rasterise a scene into a CHW pixel buffer: noisy dark
    /// background first, then one filled rectangle per object in
    /// its class colour. Later objects paint over earlier ones.
    pub fn render(&mut self, scene: &Scene) -> Vec<f32> {
        let (w, h) = (scene.width, scene.height);
        let plane  = w * h;
        let mut pixels = vec![0.0f32; 3 * plane];

        for value in pixels.iter_mut() {
            *value = BACKGROUND + self.rng.gen_range(-NOISE_AMPLITUDE..NOISE_AMPLITUDE);
        }

        for object in &scene.objects {
            let corners = object.bbox.to_xyxy().scale(w as f32, h as f32);
            let x1 = corners.x1.floor().max(0.0) as usize;
            let y1 = corners.y1.floor().max(0.0) as usize;
            let x2 = (corners.x2.ceil() as usize).min(w);
            let y2 = (corners.y2.ceil() as usize).min(h);

            let colour = PALETTE[object.class_id % PALETTE.len()];
            for y in y1..y2 {
                for x in x1..x2 {
                    for (c, &value) in colour.iter().enumerate() {
                        pixels[(c * h + y) * w + x] = value;
                    }
                }
            }
        }
        pixels
    }

    /// Generate and rasterise one sample in a single step.
    pub fn sample(&mut self) -> DetectionSample {
        let scene  = self.scene();
        let pixels = self.render(&scene);
        DetectionSample {
            pixels,
            width:   scene.width,
            height:  scene.height,
            targets: SceneTargets::from(&scene),
        }
    }

    pub fn samples(&mut self, count: usize) -> Vec<DetectionSample> {
        (0..count).map(|_| self.sample()).collect()
    }
}

impl SceneSource for SyntheticScenes {
    fn next_scenes(&mut self, count: usize) -> Result<Vec<Scene>> {
        Ok((0..count).map(|_| self.scene()).collect())
    }
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_dataset() {
        let mut a = SyntheticScenes::new(4, 3, 32, 48, 7);
        let mut b = SyntheticScenes::new(4, 3, 32, 48, 7);

        let sa = a.samples(3);
        let sb = b.samples(3);

        for (x, y) in sa.iter().zip(sb.iter()) {
            assert_eq!(x.width, y.width);
            assert_eq!(x.height, y.height);
            assert_eq!(x.pixels, y.pixels);
            assert_eq!(x.targets.labels, y.targets.labels);
            assert_eq!(x.targets.boxes, y.targets.boxes);
        }
    }

    #[test]
    fn test_different_seed_differs() {
        let mut a = SyntheticScenes::new(4, 3, 32, 32, 7);
        let mut b = SyntheticScenes::new(4, 3, 32, 32, 8);
        assert_ne!(a.sample().pixels, b.sample().pixels);
    }

    #[test]
    fn test_scene_bounds() {
        let mut source = SyntheticScenes::new(5, 4, 32, 64, 11);
        let scenes = source.next_scenes(20).unwrap();

        for scene in &scenes {
            assert!(scene.width >= 32 && scene.width <= 64);
            assert!(scene.height >= 32 && scene.height <= 64);
            assert!(scene.object_count() <= 4);
            for object in &scene.objects {
                assert!(object.class_id < 5);
                let b = object.bbox;
                assert!(b.cx - b.w / 2.0 > 0.0);
                assert!(b.cx + b.w / 2.0 < 1.0);
                assert!(b.cy - b.h / 2.0 > 0.0);
                assert!(b.cy + b.h / 2.0 < 1.0);
            }
        }
    }

    #[test]
    fn test_render_paints_class_colour() {
        let mut source = SyntheticScenes::new(2, 1, 16, 16, 3);
        let scene = Scene::new(16, 16, vec![SceneObject {
            class_id: 0,
            bbox:     BoxCxCyWh::new(0.5, 0.5, 0.5, 0.5),
        }]);
        let pixels = source.render(&scene);

        // centre pixel sits inside the rectangle
        for c in 0..3 {
            assert_eq!(pixels[(c * 16 + 8) * 16 + 8], PALETTE[0][c]);
        }
        // top-left corner is outside it: background plus noise
        let corner = pixels[0];
        assert!((corner - BACKGROUND).abs() <= NOISE_AMPLITUDE + 1e-6);
    }
}
