// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// This is the heart of the application — pure Rust structs
// and traits that define the core concepts of the system.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - NO ML-specific code
//   - Only plain Rust structs, enums, and traits
//
// Why keep this layer pure?
//   - Easy to unit test (no GPU needed)
//   - Easy to understand (no framework noise)
//   - The scalar box maths doubles as an independent oracle
//     for the tensor box ops in Layer 5
//
// Think of this layer as the "dictionary" of the system —
// it defines what things ARE, not how they work.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

// Bounding-box value types and scalar IoU / GIoU maths
pub mod boxes;

// A labelled scene: image size plus its ground-truth objects
pub mod scene;

// A single predicted detection (class, score, pixel box)
pub mod detection;

// Core abstractions (traits) that other layers implement
pub mod traits;
