// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Traits are Rust's way of defining shared behaviour —
// similar to interfaces in Java or abstract classes in Python.
//
// By programming against traits instead of concrete types,
// we can swap implementations without changing the code
// that uses them. For example:
//   - SyntheticScenes implements SceneSource
//   - A future CocoScenes could also implement SceneSource
//   - The application layer only sees SceneSource
//     and works with both without any changes
//
// This is the Dependency Inversion Principle from SOLID,
// applied using Rust's trait system.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)
//            Rust Book §17 (Object Oriented Patterns)

use anyhow::Result;
use crate::domain::scene::Scene;

// ─── SceneSource ──────────────────────────────────────────────────────────────
/// Any component that can produce labelled scenes.
///
/// Implementations:
///   - SyntheticScenes → seeded in-memory scene generator
///   - (future) CocoScenes → annotations parsed from disk
///
/// Takes &mut self because realistic sources advance internal
/// state (an RNG, a file cursor) between calls.
pub trait SceneSource {
    /// Produce the next `count` labelled scenes from this source.
    fn next_scenes(&mut self, count: usize) -> Result<Vec<Scene>>;
}
