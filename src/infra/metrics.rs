// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Why log metrics to CSV?
//   - Easy to open in Excel or Google Sheets
//   - Can plot learning curves to diagnose training issues
//   - Provides a permanent record of each training run
//
// Metrics recorded per epoch:
//   - epoch:             the epoch number (1, 2, 3, ...)
//   - train_loss:        average weighted total loss on training set
//   - val_loss:          the same average on the validation set
//   - loss_ce:           classification term (unweighted average)
//   - loss_bbox:         L1 box regression term
//   - loss_giou:         generalised-IoU box term
//   - class_error:       top-1 error % on matched queries
//   - cardinality_error: |#predicted objects − #actual objects|
//   - lr:                transformer learning rate this epoch
//
// Output file: checkpoints/metrics.csv
//
// Example CSV output:
//   epoch,train_loss,val_loss,loss_ce,loss_bbox,loss_giou,class_error,cardinality_error,lr
//   1,14.205100,13.890200,1.412800,0.310500,0.842200,85.200000,3.120000,0.000100
//   2,11.981400,11.754300,1.205600,0.271900,0.790800,71.600000,2.480000,0.000100
//   ...
//
// How to read the metrics:
//   - Loss should decrease each epoch (model is learning)
//   - If val_loss increases while train_loss decreases → overfitting
//   - class_error falling → matched queries predict the right class
//   - cardinality_error falling → model finds the right object count
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
};
use serde::{Deserialize, Serialize};

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    /// Average weighted total loss over all training batches
    /// Lower is better; dominated early on by the box terms
    pub train_loss: f64,

    /// The same average on the validation set
    /// Should track train_loss — divergence indicates overfitting
    pub val_loss: f64,

    /// Cross-entropy classification term, before weighting
    pub loss_ce: f64,

    /// L1 box regression term, before weighting
    pub loss_bbox: f64,

    /// Generalised-IoU box term, before weighting
    pub loss_giou: f64,

    /// Top-1 classification error on matched queries, in percent
    /// Range: [0, 100] — 0 means every matched query is correct
    pub class_error: f64,

    /// Mean |#non-background predictions − #ground-truth objects|
    pub cardinality_error: f64,

    /// Transformer learning rate in effect this epoch
    /// (the backbone runs at its own, lower rate)
    pub lr: f64,
}

impl EpochMetrics {
    /// Create a new EpochMetrics record
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        epoch:             usize,
        train_loss:        f64,
        val_loss:          f64,
        loss_ce:           f64,
        loss_bbox:         f64,
        loss_giou:         f64,
        class_error:       f64,
        cardinality_error: f64,
        lr:                f64,
    ) -> Self {
        Self {
            epoch,
            train_loss,
            val_loss,
            loss_ce,
            loss_bbox,
            loss_giou,
            class_error,
            cardinality_error,
            lr,
        }
    }

    /// Returns true if this epoch improved over the previous best val_loss
    pub fn is_improvement(&self, best_val_loss: f64) -> bool {
        self.val_loss < best_val_loss
    }
}

/// Logs epoch metrics to a CSV file for later analysis.
pub struct MetricsLogger {
    /// Full path to the CSV file
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create a new MetricsLogger.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());

        // Create directory if it doesn't exist
        fs::create_dir_all(&dir)?;

        let csv_path = dir.join("metrics.csv");

        // Write CSV header only if file is new
        // This allows appending to an existing log across runs
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            // Write the header row
            writeln!(
                f,
                "epoch,train_loss,val_loss,loss_ce,loss_bbox,loss_giou,class_error,cardinality_error,lr",
            )?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row in the CSV.
    ///
    /// Uses OpenOptions with append=true so we add to the file
    /// without overwriting previous epochs.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        // Open in append mode — adds to end of file
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        // Write one CSV row with 6 decimal places for each metric
        writeln!(
            f,
            "{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
            m.epoch,
            m.train_loss,
            m.val_loss,
            m.loss_ce,
            m.loss_bbox,
            m.loss_giou,
            m.class_error,
            m.cardinality_error,
            m.lr,
        )?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, val_loss={:.4}",
            m.epoch,
            m.train_loss,
            m.val_loss,
        );

        Ok(())
    }

    /// Return the path to the metrics CSV file
    pub fn csv_path(&self) -> &PathBuf {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_improvement() {
        let m = EpochMetrics::new(2, 9.5, 9.3, 1.2, 0.3, 0.8, 40.0, 1.5, 1e-4);
        // 9.3 < 10.0 → this is an improvement
        assert!(m.is_improvement(10.0));
        // 9.3 is NOT less than 9.0 → not an improvement
        assert!(!m.is_improvement(9.0));
    }
}
