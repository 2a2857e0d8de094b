// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Generate synthetic scenes   (Layer 4 - data)
//   Step 2: Split train/validation      (Layer 4 - data)
//   Step 3: Build datasets              (Layer 4 - data)
//   Step 4: Save config                 (Layer 6 - infra)
//   Step 5: Open the metrics log        (Layer 6 - infra)
//   Step 6: Run training loop           (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::DetectionDataset,
    splitter::split_train_val,
    synthetic::SyntheticScenes,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    metrics::MetricsLogger,
};
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved to disk and reloaded for inference.
// The #[derive(Serialize, Deserialize)] macros from serde handle
// reading/writing this struct to JSON automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub checkpoint_dir:    String,

    // dataset
    pub num_classes:       usize,
    pub max_objects:       usize,
    pub scenes:            usize,
    pub min_image_size:    usize,
    pub max_image_size:    usize,

    // optimisation
    pub batch_size:        usize,
    pub epochs:            usize,
    pub num_workers:       usize,
    pub lr:                f64,
    pub lr_backbone:       f64,
    pub lr_drop:           usize,
    pub weight_decay:      f64,
    pub clip_max_norm:     f64,

    // model
    pub hidden_dim:        usize,
    pub n_heads:           usize,
    pub enc_layers:        usize,
    pub dec_layers:        usize,
    pub dim_feedforward:   usize,
    pub dropout:           f64,
    pub num_queries:       usize,
    pub backbone_channels: usize,
    pub bitlinear:         bool,

    // matching + loss weights
    pub cost_class:        f64,
    pub cost_bbox:         f64,
    pub cost_giou:         f64,
    pub bbox_loss_coef:    f64,
    pub giou_loss_coef:    f64,
    pub eos_coef:          f64,

    // run control
    pub seed:              u64,
    pub resume:            bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            checkpoint_dir:    "checkpoints".to_string(),
            num_classes:       4,
            max_objects:       4,
            scenes:            256,
            min_image_size:    96,
            max_image_size:    160,
            batch_size:        8,
            epochs:            25,
            num_workers:       1,
            lr:                1e-4,
            lr_backbone:       1e-5,
            lr_drop:           20,
            weight_decay:      1e-4,
            clip_max_norm:     0.1,
            hidden_dim:        128,
            n_heads:           8,
            enc_layers:        3,
            dec_layers:        3,
            dim_feedforward:   512,
            dropout:           0.1,
            num_queries:       25,
            backbone_channels: 32,
            bitlinear:         false,
            cost_class:        1.0,
            cost_bbox:         5.0,
            cost_giou:         2.0,
            bbox_loss_coef:    5.0,
            giou_loss_coef:    2.0,
            eos_coef:          0.1,
            seed:              42,
            resume:            false,
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
// Owns the config and runs the full training pipeline.
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    /// Create a new TrainUseCase with the given configuration
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<()> {
        let cfg = &self.config;

        // ── Step 1: Generate the synthetic dataset ────────────────────────────
        // Everything downstream is reproducible from cfg.seed alone
        tracing::info!(
            "Generating {} scenes ({} classes, up to {} objects each)",
            cfg.scenes, cfg.num_classes, cfg.max_objects,
        );
        let mut source = SyntheticScenes::new(
            cfg.num_classes,
            cfg.max_objects,
            cfg.min_image_size,
            cfg.max_image_size,
            cfg.seed,
        );
        let samples = source.samples(cfg.scenes);
        let objects: usize = samples.iter().map(|s| s.object_count()).sum();
        tracing::info!("Rendered {} scenes, {} objects total", samples.len(), objects);

        // ── Step 2: Train / validation split (80/20) ──────────────────────────
        // Shuffle and split so the model is evaluated on unseen scenes
        let (train_samples, val_samples) = split_train_val(samples, 0.8, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            train_samples.len(),
            val_samples.len()
        );

        // ── Step 3: Build Burn datasets ───────────────────────────────────────
        // DetectionDataset implements Burn's Dataset trait so the
        // DataLoader can call .get(index) and .len() on it
        let train_dataset = DetectionDataset::new(train_samples);
        let val_dataset   = DetectionDataset::new(val_samples);

        // ── Step 4: Save config for inference ─────────────────────────────────
        // The detector needs to know the model architecture to rebuild it
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);
        ckpt_manager.save_config(cfg)?;

        // ── Step 5: Open the metrics CSV next to the checkpoints ──────────────
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;

        // ── Step 6: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, train_dataset, val_dataset, ckpt_manager, metrics)?;

        Ok(())
    }
}
