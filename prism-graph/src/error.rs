//! Graph-layer error types

use thiserror::Error;

/// Errors raised by element validation and the graph store.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("edge {edge_id} references unknown node {node_id}")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("duplicate edge ({source_id}, {target}, {relation})")]
    DuplicateEdge {
        source_id: String,
        target: String,
        relation: String,
    },

    #[error("node {0} has an empty label")]
    EmptyLabel(String),

    #[error("node {id} confidence {confidence} out of [0, 1]")]
    ConfidenceOutOfRange { id: String, confidence: f64 },

    #[error("store io failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}
