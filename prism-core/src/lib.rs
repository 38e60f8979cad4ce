//! PRISM Core - Canonical intel model and band scoring
//!
//! This crate provides the foundational primitives:
//! - Canonical object model (artifacts, signals, entities, edges, events, claims, clusters)
//! - Reliability band table with weights, priorities, and confidence caps
//! - Confidence/edge-weight scoring engine
//! - Structural schema validation with quarantine-friendly outcomes
//! - Deterministic content-derived identifiers

pub mod band;
pub mod ids;
pub mod objects;
pub mod schema;
pub mod scoring;

pub use band::*;
pub use ids::*;
pub use objects::*;
pub use schema::*;
pub use scoring::*;

/// Base confidence when a stage emits an object without one.
pub const DEFAULT_BASE_CONFIDENCE: f64 = 0.5;

/// Default base weight for co-occurrence edges.
pub const CO_OCCURRENCE_EDGE_WEIGHT: f64 = 45.0;

/// Bundle format version stamped on every export.
pub const BUNDLE_VERSION: &str = "1.0";
