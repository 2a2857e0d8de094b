// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Full train + validation loop using Burn's DataLoader and AdamW.
//
// Key Burn insights:
//   - Training uses MyBackend (Autodiff<Wgpu>) for gradients
//   - model.valid() returns model on MyInnerBackend (Wgpu)
//   - Validation batcher must also use MyInnerBackend
//   - GradientsParams::from_module POPS the matching gradients
//     out of the container, so the backbone can be stepped by its
//     own optimiser without double-stepping any parameter
//
// The backbone trains at a lower learning rate than the
// transformer, and both rates decay by 10× every lr_drop epochs.
//
// Reference: Burn Book §5
//            Loshchilov & Hutter (2019) Decoupled Weight Decay

use anyhow::Result;
use burn::{
    data::dataloader::DataLoaderBuilder,
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{AdamWConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{batcher::DetectionBatcher, dataset::DetectionDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::metrics::{EpochMetrics, MetricsLogger};
use crate::ml::bitlinear::LinearKind;
use crate::ml::criterion::SetCriterion;
use crate::ml::detr::{DetrConfig, DetrModel};
use crate::ml::matcher::HungarianMatcher;

type MyBackend      = burn::backend::Autodiff<burn::backend::Wgpu>;
type MyInnerBackend = burn::backend::Wgpu;

/// The model architecture implied by a training config. The
/// detector rebuilds the exact same architecture from the saved
/// config before loading weights.
pub fn model_config(cfg: &TrainConfig) -> DetrConfig {
    DetrConfig::new(
        cfg.num_classes,
        cfg.num_queries,
        cfg.hidden_dim,
        cfg.n_heads,
        cfg.enc_layers,
        cfg.dec_layers,
        cfg.dim_feedforward,
    )
    .with_dropout(cfg.dropout)
    .with_backbone_channels(cfg.backbone_channels)
    .with_linear(if cfg.bitlinear { LinearKind::Bit } else { LinearKind::Standard })
}

pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: DetectionDataset,
    val_dataset:   DetectionDataset,
    ckpt_manager:  CheckpointManager,
    metrics:       MetricsLogger,
) -> Result<()> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, train_dataset, val_dataset, ckpt_manager, metrics, device)
}

fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: DetectionDataset,
    val_dataset:   DetectionDataset,
    ckpt_manager:  CheckpointManager,
    metrics:       MetricsLogger,
    device:        B::Device,
) -> Result<()> {
    B::seed(cfg.seed);

    // ── Build model ───────────────────────────────────────────────────────────
    let mut model: DetrModel<B> = model_config(cfg).init(&device);
    tracing::info!(
        "Model ready: {} parameters, {} object queries, hidden_dim={}",
        model.num_params(),
        cfg.num_queries,
        cfg.hidden_dim,
    );

    let mut start_epoch = 1;
    if cfg.resume {
        model = ckpt_manager.load_model(model, &device)?;
        start_epoch = ckpt_manager.latest_epoch()? + 1;
        tracing::info!("Resuming training at epoch {}", start_epoch);
    }

    // ── AdamW, one instance per parameter group ───────────────────────────────
    let optim_cfg = AdamWConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(cfg.weight_decay as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(cfg.clip_max_norm as f32)));
    let mut optim          = optim_cfg.init();
    let mut optim_backbone = optim_cfg.init();

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = DetectionBatcher::<B>::new(device.clone());
    let train_loader  = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Validation data loader (InnerBackend — no autodiff overhead) ──────────
    let val_batcher = DetectionBatcher::<B::InnerBackend>::new(device.clone());
    let val_loader  = DataLoaderBuilder::new(val_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

    let matcher = HungarianMatcher::new(cfg.cost_class, cfg.cost_bbox, cfg.cost_giou);
    let criterion = SetCriterion::<B>::new(
        cfg.num_classes,
        matcher.clone(),
        cfg.eos_coef,
        cfg.bbox_loss_coef,
        cfg.giou_loss_coef,
        &device,
    );
    let val_criterion = SetCriterion::<B::InnerBackend>::new(
        cfg.num_classes,
        matcher,
        cfg.eos_coef,
        cfg.bbox_loss_coef,
        cfg.giou_loss_coef,
        &device,
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let started = std::time::Instant::now();
    for epoch in start_epoch..=cfg.epochs {
        // step schedule: 10× decay every lr_drop epochs
        let decay = 0.1f64.powi((epoch / cfg.lr_drop) as i32);
        let lr          = cfg.lr * decay;
        let lr_backbone = cfg.lr_backbone * decay;

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_loss_sum = 0.0f64;
        let mut ce_sum         = 0.0f64;
        let mut bbox_sum       = 0.0f64;
        let mut giou_sum       = 0.0f64;
        let mut class_err_sum  = 0.0f64;
        let mut train_batches  = 0usize;

        for batch in train_loader.iter() {
            let output = model.forward(batch.images, batch.mask);
            let losses = criterion.forward(&output, &batch.targets)?;

            train_loss_sum += losses.total.clone().into_scalar().elem::<f64>();
            ce_sum         += losses.loss_ce;
            bbox_sum       += losses.loss_bbox;
            giou_sum       += losses.loss_giou;
            class_err_sum  += losses.class_error;
            train_batches  += 1;

            // Backward pass, then split the gradients between the
            // two optimisers: backbone first, remainder second.
            let mut grads = losses.total.backward();
            let backbone_grads = GradientsParams::from_module(&mut grads, &model.backbone);
            let rest_grads     = GradientsParams::from_grads(grads, &model);
            model = optim.step(lr, model, rest_grads);
            model = optim_backbone.step(lr_backbone, model, backbone_grads);
        }

        let avg = |sum: f64| if train_batches > 0 { sum / train_batches as f64 } else { f64::NAN };
        let avg_train_loss = avg(train_loss_sum);
        let avg_ce         = avg(ce_sum);
        let avg_bbox       = avg(bbox_sum);
        let avg_giou       = avg(giou_sum);
        let avg_class_err  = avg(class_err_sum);

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → DetrModel<MyInnerBackend>, dropout disabled
        let model_valid = model.valid();

        let mut val_loss_sum = 0.0f64;
        let mut card_err_sum = 0.0f64;
        let mut val_batches  = 0usize;

        for batch in val_loader.iter() {
            let output = model_valid.forward(batch.images, batch.mask);
            let losses = val_criterion.forward(&output, &batch.targets)?;

            val_loss_sum += losses.total.into_scalar().elem::<f64>();
            card_err_sum += losses.cardinality_error;
            val_batches  += 1;
        }

        let avg_val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
        let avg_card_err = if val_batches > 0 { card_err_sum / val_batches as f64 } else { 0.0 };

        println!(
            "Epoch {:>3}/{} | lr={:.1e} | train_loss={:.4} | val_loss={:.4} | ce={:.4} | bbox={:.4} | giou={:.4} | class_err={:.1}%",
            epoch, cfg.epochs, lr, avg_train_loss, avg_val_loss,
            avg_ce, avg_bbox, avg_giou, avg_class_err,
        );

        ckpt_manager.save_model(&model, epoch)?;
        metrics.log(&EpochMetrics::new(
            epoch,
            avg_train_loss,
            avg_val_loss,
            avg_ce,
            avg_bbox,
            avg_giou,
            avg_class_err,
            avg_card_err,
            lr,
        ))?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    let elapsed = started.elapsed().as_secs();
    tracing::info!(
        "Training complete in {:02}:{:02}:{:02}",
        elapsed / 3600,
        (elapsed % 3600) / 60,
        elapsed % 60,
    );
    Ok(())
}

// ─── Unit Tests ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::SyntheticScenes;

    type TestBackend = burn::backend::Autodiff<burn::backend::NdArray>;

    /// Two epochs end to end on the CPU backend: model builds,
    /// losses come back finite, checkpoints and the metrics CSV
    /// land on disk.
    #[test]
    fn test_smoke_run_writes_checkpoint_and_metrics() {
        let dir = std::env::temp_dir().join(format!("detr-trainer-test-{}", std::process::id()));
        let dir_str = dir.to_string_lossy().to_string();
        let _ = std::fs::remove_dir_all(&dir);

        let cfg = TrainConfig {
            checkpoint_dir: dir_str.clone(),
            epochs: 2,
            batch_size: 2,
            num_workers: 1,
            min_image_size: 48,
            max_image_size: 64,
            hidden_dim: 16,
            n_heads: 2,
            enc_layers: 1,
            dec_layers: 1,
            dim_feedforward: 32,
            num_queries: 5,
            backbone_channels: 4,
            dropout: 0.0,
            ..TrainConfig::default()
        };

        let mut source = SyntheticScenes::new(
            cfg.num_classes,
            cfg.max_objects,
            cfg.min_image_size,
            cfg.max_image_size,
            cfg.seed,
        );
        let train_samples = source.samples(4);
        let val_samples = source.samples(2);

        let result = train_loop::<TestBackend>(
            &cfg,
            DetectionDataset::new(train_samples),
            DetectionDataset::new(val_samples),
            CheckpointManager::new(dir_str.clone()),
            MetricsLogger::new(dir_str).unwrap(),
            Default::default(),
        );
        assert!(result.is_ok(), "training failed: {:?}", result.err());

        assert!(dir.join("model_epoch_2.mpk").exists());
        assert!(dir.join("latest_epoch.json").exists());
        assert!(dir.join("metrics.csv").exists());

        let csv = std::fs::read_to_string(dir.join("metrics.csv")).unwrap();
        assert_eq!(csv.lines().count(), 3); // header + 2 epochs

        let _ = std::fs::remove_dir_all(&dir);
    }
}
