//! Graph element model
//!
//! Nodes and edges are the flat records the synthesizer and layout
//! engine operate on. Canonical intel objects are projected into this
//! model on ingestion; positions live in a separate id -> {x, y} map so
//! layout state survives re-synthesis.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use prism_core::{Band, IntelObject};

use crate::error::GraphError;

/// 2D layout position, persisted separately from element data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Persisted positions keyed by node id.
pub type Positions = BTreeMap<String, Position>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Alert,
    Ioc,
    Entity,
    Source,
    SourceHub,
    RelationHub,
    Group,
}

impl NodeKind {
    /// Hub kinds are structural; they are excluded from overlap
    /// inference and get boosted repulsion in the layout.
    pub fn is_hub(self) -> bool {
        matches!(self, NodeKind::SourceHub | NodeKind::RelationHub)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.85 {
            Severity::High
        } else if confidence >= 0.65 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

fn default_confidence() -> f64 {
    0.5
}

fn default_opacity() -> f64 {
    1.0
}

fn default_weight() -> f64 {
    1.0
}

fn is_zero_f64(v: &f64) -> bool {
    *v == 0.0
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

/// One graph node, with synthesis-derived fields filled in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeData {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub severity: Severity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsource: Option<String>,
    /// Epoch seconds.
    pub timestamp: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub alert_count: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub ioc_count: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub evidence_count: u32,

    // Derived during synthesis.
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub adjusted_confidence: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub recency: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub domain_convergence: f64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub cross_source_degree: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub same_source_degree: u32,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub signal_density: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub band_weight: f64,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub volume_count: u32,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub size: u32,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub temporal_alignment: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub indicator_convergence: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub spectrum_index: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub convergence: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub mass: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
}

impl NodeData {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: NodeKind,
        source: impl Into<String>,
        timestamp: f64,
        confidence: f64,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            severity: Severity::from_confidence(confidence),
            source: source.into(),
            subsource: None,
            timestamp,
            confidence,
            band: None,
            object_type: None,
            indicator: None,
            url: None,
            alert_count: 0,
            ioc_count: 0,
            evidence_count: 0,
            adjusted_confidence: 0.0,
            recency: 0.0,
            domain_convergence: 0.0,
            cross_source_degree: 0,
            same_source_degree: 0,
            signal_density: 0.0,
            band_weight: 0.0,
            volume_count: 0,
            size: 0,
            temporal_alignment: 0.0,
            indicator_convergence: 0.0,
            spectrum_index: 0.0,
            convergence: 0.0,
            mass: 0.0,
            color: None,
            opacity: 1.0,
        }
    }

    /// Lowercased subsource-or-source grouping key.
    pub fn source_key(&self) -> String {
        self.subsource
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&self.source)
            .trim()
            .to_lowercase()
    }

    /// Evidence volume for sizing; every node counts at least once.
    pub fn volume(&self) -> u32 {
        let total = self.alert_count + self.ioc_count + self.evidence_count;
        total.max(1)
    }
}

/// One graph edge, with synthesis-derived fields filled in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeData {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,

    // Derived during synthesis and layout export.
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub semantic_weight: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub temporal_alignment: f64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cross_domain: bool,
    #[serde(default, skip_serializing_if = "is_zero_u32")]
    pub evidence_count: u32,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub dispersion: f64,
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub coherence: f64,
}

impl EdgeData {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
        relation: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            relation: relation.into(),
            weight,
            band: None,
            semantic_weight: 0.0,
            temporal_alignment: 0.0,
            cross_domain: false,
            evidence_count: 0,
            dispersion: 0.0,
            coherence: 0.0,
        }
    }
}

/// Project canonical objects into graph elements.
///
/// Entities and clusters become nodes, edge objects become edges,
/// artifacts and signals become alert/ioc nodes so overlap inference
/// can connect them across sources. Events and claims have no graph
/// representation.
pub fn elements_from_objects(objects: &[IntelObject]) -> (Vec<NodeData>, Vec<EdgeData>) {
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    for obj in objects {
        match obj {
            IntelObject::Edge(edge) => {
                let mut out = EdgeData::new(
                    edge.envelope.id.clone(),
                    edge.from_id.clone(),
                    edge.to_id.clone(),
                    edge.edge_type.clone(),
                    edge.weight,
                );
                out.band = edge.envelope.band;
                edges.push(out);
            }
            _ => {
                if let Some(node) = node_from_object(obj) {
                    nodes.push(node);
                }
            }
        }
    }
    (nodes, edges)
}

fn first_tag_or_label(obj: &IntelObject) -> String {
    let env = obj.envelope();
    env.tags
        .iter()
        .chain(env.labels.iter())
        .find(|s| !s.trim().is_empty())
        .map(|s| s.trim().to_lowercase())
        .unwrap_or_else(|| "intel".to_string())
}

fn node_from_object(obj: &IntelObject) -> Option<NodeData> {
    let env = obj.envelope();
    let timestamp = env.created_at.timestamp() as f64;
    let confidence = env.confidence.unwrap_or(0.5);
    let source = first_tag_or_label(obj);
    let mut node = match obj {
        IntelObject::Artifact(artifact) => {
            let mut n = NodeData::new(
                env.id.clone(),
                artifact.uri.clone(),
                NodeKind::Alert,
                source,
                timestamp,
                confidence,
            );
            n.url = Some(artifact.uri.clone());
            n
        }
        IntelObject::Signal(signal) => {
            let mut n = NodeData::new(
                env.id.clone(),
                signal.dedup_value(),
                NodeKind::Ioc,
                source,
                timestamp,
                confidence,
            );
            n.indicator = Some(signal.dedup_value());
            n
        }
        IntelObject::Entity(entity) => NodeData::new(
            env.id.clone(),
            entity.name.clone(),
            NodeKind::Entity,
            source,
            timestamp,
            confidence,
        ),
        IntelObject::Cluster(cluster) => NodeData::new(
            env.id.clone(),
            cluster.cluster_type.clone(),
            NodeKind::Group,
            source,
            timestamp,
            confidence,
        ),
        IntelObject::Edge(_) | IntelObject::Event(_) | IntelObject::Claim(_) => return None,
    };
    node.subsource = Some(node.source.clone());
    node.band = env.band;
    node.object_type = Some(obj.kind().to_string());
    node.evidence_count = obj.evidence().len() as u32;
    Some(node)
}

/// Structural checks applied before any element list is persisted.
pub fn validate_elements(nodes: &[NodeData], edges: &[EdgeData]) -> Result<(), GraphError> {
    let mut node_ids: HashSet<&str> = HashSet::with_capacity(nodes.len());
    for node in nodes {
        if node.label.trim().is_empty() {
            return Err(GraphError::EmptyLabel(node.id.clone()));
        }
        if !(0.0..=1.0).contains(&node.confidence) {
            return Err(GraphError::ConfidenceOutOfRange {
                id: node.id.clone(),
                confidence: node.confidence,
            });
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
    }
    let mut edge_keys: HashSet<(&str, &str, &str)> = HashSet::with_capacity(edges.len());
    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains(endpoint.as_str()) {
                return Err(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        let key = (
            edge.source.as_str(),
            edge.target.as_str(),
            edge.relation.as_str(),
        );
        if !edge_keys.insert(key) {
            return Err(GraphError::DuplicateEdge {
                source_id: edge.source.clone(),
                target: edge.target.clone(),
                relation: edge.relation.clone(),
            });
        }
    }
    Ok(())
}
