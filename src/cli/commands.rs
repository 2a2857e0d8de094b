// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `detect`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for missing args
//   - type conversion (string → usize, f64, etc.)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::train_use_case::TrainConfig;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the detection model on synthetic scenes
    Train(TrainArgs),

    /// Detect objects in a held-out scene using a trained checkpoint
    Detect(DetectArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory to save model checkpoints and metrics
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Number of object classes the model distinguishes
    /// (the "no object" class is added on top automatically)
    #[arg(long, default_value_t = 4)]
    pub num_classes: usize,

    /// Maximum number of objects per generated scene
    #[arg(long, default_value_t = 4)]
    pub max_objects: usize,

    /// Total number of scenes to generate (split 80/20)
    #[arg(long, default_value_t = 256)]
    pub scenes: usize,

    /// Smallest generated image edge, in pixels
    #[arg(long, default_value_t = 96)]
    pub min_image_size: usize,

    /// Largest generated image edge, in pixels
    #[arg(long, default_value_t = 160)]
    pub max_image_size: usize,

    /// Number of scenes processed together in one forward pass
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Number of full passes through the training data
    #[arg(long, default_value_t = 25)]
    pub epochs: usize,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Learning rate for the transformer and heads
    #[arg(long, default_value_t = 1e-4)]
    pub lr: f64,

    /// Learning rate for the convolutional backbone —
    /// kept lower so pretrained-style features change slowly
    #[arg(long, default_value_t = 1e-5)]
    pub lr_backbone: f64,

    /// Epoch interval after which both learning rates drop 10×
    #[arg(long, default_value_t = 20)]
    pub lr_drop: usize,

    /// AdamW decoupled weight decay
    #[arg(long, default_value_t = 1e-4)]
    pub weight_decay: f64,

    /// Per-tensor gradient norm clipping threshold
    #[arg(long, default_value_t = 0.1)]
    pub clip_max_norm: f64,

    /// Transformer hidden dimension (d_model in the paper)
    /// Must be divisible by n_heads and by 2 (sine embedding)
    #[arg(long, default_value_t = 128)]
    pub hidden_dim: usize,

    /// Number of attention heads in multi-head attention
    #[arg(long, default_value_t = 8)]
    pub n_heads: usize,

    /// Number of stacked encoder layers
    #[arg(long, default_value_t = 3)]
    pub enc_layers: usize,

    /// Number of stacked decoder layers
    #[arg(long, default_value_t = 3)]
    pub dec_layers: usize,

    /// Inner dimension of the feed-forward network
    /// Typically 4x hidden_dim
    #[arg(long, default_value_t = 512)]
    pub dim_feedforward: usize,

    /// Dropout probability — randomly zeroes activations during
    /// training to prevent overfitting
    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Number of learned object queries — the maximum number of
    /// objects the model can detect in one image
    #[arg(long, default_value_t = 25)]
    pub num_queries: usize,

    /// Channel width of the backbone stem (later stages scale it)
    #[arg(long, default_value_t = 32)]
    pub backbone_channels: usize,

    /// Use BitNet-style ternary-quantised projections inside the
    /// transformer instead of standard linear layers
    #[arg(long)]
    pub bitlinear: bool,

    /// Matching cost weight for classification probability
    #[arg(long, default_value_t = 1.0)]
    pub cost_class: f64,

    /// Matching cost weight for L1 box distance
    #[arg(long, default_value_t = 5.0)]
    pub cost_bbox: f64,

    /// Matching cost weight for generalised IoU
    #[arg(long, default_value_t = 2.0)]
    pub cost_giou: f64,

    /// Loss weight on the L1 box term
    #[arg(long, default_value_t = 5.0)]
    pub bbox_loss_coef: f64,

    /// Loss weight on the generalised-IoU box term
    #[arg(long, default_value_t = 2.0)]
    pub giou_loss_coef: f64,

    /// Cross-entropy weight on the "no object" class — below 1 so
    /// the many unmatched queries don't drown out real objects
    #[arg(long, default_value_t = 0.1)]
    pub eos_coef: f64,

    /// Seed for scene generation, shuffling and the backend
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Continue training from the latest saved checkpoint
    #[arg(long)]
    pub resume: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            checkpoint_dir:    a.checkpoint_dir,
            num_classes:       a.num_classes,
            max_objects:       a.max_objects,
            scenes:            a.scenes,
            min_image_size:    a.min_image_size,
            max_image_size:    a.max_image_size,
            batch_size:        a.batch_size,
            epochs:            a.epochs,
            num_workers:       a.num_workers,
            lr:                a.lr,
            lr_backbone:       a.lr_backbone,
            lr_drop:           a.lr_drop,
            weight_decay:      a.weight_decay,
            clip_max_norm:     a.clip_max_norm,
            hidden_dim:        a.hidden_dim,
            n_heads:           a.n_heads,
            enc_layers:        a.enc_layers,
            dec_layers:        a.dec_layers,
            dim_feedforward:   a.dim_feedforward,
            dropout:           a.dropout,
            num_queries:       a.num_queries,
            backbone_channels: a.backbone_channels,
            bitlinear:         a.bitlinear,
            cost_class:        a.cost_class,
            cost_bbox:         a.cost_bbox,
            cost_giou:         a.cost_giou,
            bbox_loss_coef:    a.bbox_loss_coef,
            giou_loss_coef:    a.giou_loss_coef,
            eos_coef:          a.eos_coef,
            seed:              a.seed,
            resume:            a.resume,
        }
    }
}

/// All arguments for the `detect` command
#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Seed for the held-out demo scene — keep it different from
    /// the training seed so the image is genuinely unseen
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Minimum softmax confidence for a query to count as a detection
    #[arg(long, default_value_t = 0.7)]
    pub score_threshold: f32,
}
