// crates/flockmesh-core/src/policy/mod.rs
// ============================================================================
// Module: Flockmesh Policy
// Description: Policy lattice evaluation and the profile library.
// Purpose: Group the decision engine with its profile lookup surfaces.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The policy module owns the lattice evaluation engine and the process-wide
//! profile library it reads from. Patch simulation uses overlays to evaluate
//! against a candidate library without mutating the live one.

/// Lattice evaluation engine.
pub mod engine;
/// Profile library and overlays.
pub mod library;

pub use engine::PolicyContext;
pub use engine::evaluate_intent;
pub use engine::fail_closed;
pub use library::LibraryOverlay;
pub use library::PolicyLibrary;
pub use library::ProfileLookup;
