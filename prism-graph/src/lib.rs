//! PRISM Graph - Spectrum graph synthesis and layout
//!
//! This crate turns canonical intel objects into a living graph:
//! - Element model with structural validation
//! - Synthesizer (retention, corroboration scoring, synthetic edges,
//!   deterministic position seeding)
//! - Percentile-normalized energy index and spectral coloring
//! - Deterministic force-directed layout
//! - Denormalized 3D export and atomic on-disk persistence

pub mod color;
pub mod domain;
pub mod elements;
pub mod energy;
pub mod error;
pub mod export;
pub mod math;
pub mod physics;
pub mod store;
pub mod synth;
pub mod weights;

pub use elements::{
    elements_from_objects, validate_elements, EdgeData, NodeData, NodeKind, Position, Positions,
    Severity,
};
pub use error::GraphError;
pub use export::{build_layout_export, ExportConfig, LayoutExport};
pub use physics::{relax, z_lift, LayoutConfig};
pub use store::GraphStore;
pub use synth::{synthesize, SynthConfig, SynthReport};
