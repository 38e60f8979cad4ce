//! PRISM Pipeline - Declarative stage execution
//!
//! This crate provides the run engine:
//! - Stage plan model (validate, collect, extract, resolve, track, score, build, export)
//! - Strictly sequential runner over a per-run object context
//! - Stage-boundary validation with quarantine files
//! - Snapshot and record stores with atomic-replace persistence
//! - Bundle, graph, timeline, and manifest exporters

pub mod context;
pub mod error;
pub mod export;
pub mod handlers;
pub mod plan;
pub mod runner;
pub mod state;
pub mod validation;

pub use context::{Context, StageOutputs};
pub use error::PipelineError;
pub use export::ExportRecord;
pub use plan::{ExporterSpec, Plan, StageKind, StageSpec};
pub use runner::{LiveSource, RunReport, Runner, RunnerConfig, StageReport};
pub use state::{RecordStore, RunSnapshot, SnapshotStore, StoreError};
pub use validation::QuarantineWriter;
