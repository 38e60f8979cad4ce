//! PRISM Adapters - Raw collector payloads to canonical objects
//!
//! This crate provides the boundary layer:
//! - Typed raw payload shapes (alerts, feed indicators, seed targets)
//! - Conversion into canonical artifacts and signals with stable ids
//! - Per-source band inference and value normalization

pub mod convert;
pub mod raw;

pub use convert::*;
pub use raw::*;

// Callers working at the collection boundary usually need the
// canonical signal type alongside the raw shapes.
pub use prism_core::Signal;
