// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`  — trains the detector on synthetic scenes
//   2. `detect` — loads a checkpoint and detects objects
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

// Declare the commands submodule
pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, DetectArgs, TrainArgs};

/// The main CLI struct — clap reads the fields and generates
/// argument parsing code automatically via the Parser derive macro.
#[derive(Parser, Debug)]
#[command(
    name = "set-detr",
    version = "0.1.0",
    about = "Train a transformer object detector on synthetic scenes, then detect."
)]
pub struct Cli {
    /// The subcommand to run (train or detect)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    /// This keeps the CLI layer thin — it only routes, never computes.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)  => Self::run_train(args),
            Commands::Detect(args) => Self::run_detect(args),
        }
    }

    /// Handles the `train` subcommand.
    /// Converts CLI args into a TrainConfig and hands off to Layer 2.
    fn run_train(args: TrainArgs) -> Result<()> {
        use crate::application::train_use_case::TrainUseCase;

        tracing::info!("Starting training run into: {}", args.checkpoint_dir);

        // Convert CLI args → application config (separates presentation from domain)
        let use_case = TrainUseCase::new(args.into());
        use_case.execute()?;

        println!("Training complete. Checkpoint saved.");
        Ok(())
    }

    /// Handles the `detect` subcommand.
    /// Loads the model from checkpoint and prints truth vs predictions.
    fn run_detect(args: DetectArgs) -> Result<()> {
        use crate::application::detect_use_case::DetectUseCase;

        let use_case = DetectUseCase::new(
            args.checkpoint_dir.clone(),
            args.seed,
            args.score_threshold,
        )?;

        let (scene, detections) = use_case.detect()?;

        println!(
            "\nScene {}x{} — {} ground-truth objects:",
            scene.width,
            scene.height,
            scene.object_count(),
        );
        for object in &scene.objects {
            let b = object.bbox.to_xyxy().scale(scene.width as f32, scene.height as f32);
            println!(
                "  class {} at [{:.0}, {:.0}, {:.0}, {:.0}]",
                object.class_id, b.x1, b.y1, b.x2, b.y2,
            );
        }

        println!(
            "\n{} detections above score {:.2}:",
            detections.len(),
            args.score_threshold,
        );
        for d in &detections {
            println!(
                "  class {} ({:.0}%) at [{:.0}, {:.0}, {:.0}, {:.0}]",
                d.class_id,
                d.score * 100.0,
                d.bbox.x1, d.bbox.y1, d.bbox.x2, d.bbox.y2,
            );
        }
        Ok(())
    }
}
