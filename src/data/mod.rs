// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from scene generation
// all the way to GPU-ready tensor batches.
//
// The pipeline flows in this order:
//
//   SyntheticScenes
//       │
//       ▼
//   Scene             → image size + labelled objects (domain)
//       │
//       ▼
//   DetectionSample   → rendered CHW pixels + targets
//       │
//       ▼
//   DetectionDataset  → implements Burn's Dataset trait
//       │
//       ▼
//   DetectionBatcher  → pads to a common size, builds the mask
//       │
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// Each module is responsible for exactly one step.
// This makes each step independently testable and replaceable.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Seeded in-memory generator of labelled scenes
pub mod synthetic;

/// Implements Burn's Dataset trait for detection samples
pub mod dataset;

/// Implements Burn's Batcher trait to create padded tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
