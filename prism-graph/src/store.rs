//! On-disk graph persistence
//!
//! The element list is stored in the wire shape the viewer consumes
//! (a flat array of `{ "data": ... }` entries, nodes and edges mixed)
//! and positions live beside it as an id -> {x, y} map. Every write
//! goes to a temp file first and is renamed into place, so concurrent
//! readers never observe a partial file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::elements::{EdgeData, NodeData, Positions};
use crate::error::GraphError;
use crate::export::LayoutExport;

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ElementData {
    // Edges first: they are distinguished by required target/relation
    // fields that nodes never carry.
    Edge(Box<EdgeData>),
    Node(Box<NodeData>),
}

#[derive(Debug, Serialize, Deserialize)]
struct Element {
    data: ElementData,
}

fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), GraphError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let body = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json_or_default<T: for<'de> Deserialize<'de> + Default>(
    path: &Path,
) -> Result<T, GraphError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let body = fs::read(path)?;
    Ok(serde_json::from_slice(&body)?)
}

/// File-backed element and position storage under one root directory.
#[derive(Debug, Clone)]
pub struct GraphStore {
    elements_path: PathBuf,
    positions_path: PathBuf,
    export_path: PathBuf,
}

impl GraphStore {
    pub fn new(root: &Path) -> Self {
        Self {
            elements_path: root.join("graph_elements.json"),
            positions_path: root.join("graph_positions.json"),
            export_path: root.join("graph_3d.json"),
        }
    }

    pub fn export_path(&self) -> &Path {
        &self.export_path
    }

    /// Load the persisted element list; a missing file is an empty
    /// graph.
    pub fn load_elements(&self) -> Result<(Vec<NodeData>, Vec<EdgeData>), GraphError> {
        let elements: Vec<Element> = read_json_or_default(&self.elements_path)?;
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for el in elements {
            match el.data {
                ElementData::Node(node) => nodes.push(*node),
                ElementData::Edge(edge) => edges.push(*edge),
            }
        }
        Ok((nodes, edges))
    }

    pub fn save_elements(&self, nodes: &[NodeData], edges: &[EdgeData]) -> Result<(), GraphError> {
        let elements: Vec<Element> = nodes
            .iter()
            .map(|n| Element {
                data: ElementData::Node(Box::new(n.clone())),
            })
            .chain(edges.iter().map(|e| Element {
                data: ElementData::Edge(Box::new(e.clone())),
            }))
            .collect();
        atomic_write_json(&self.elements_path, &elements)?;
        info!(
            nodes = nodes.len(),
            edges = edges.len(),
            path = %self.elements_path.display(),
            "graph elements persisted"
        );
        Ok(())
    }

    pub fn load_positions(&self) -> Result<Positions, GraphError> {
        read_json_or_default(&self.positions_path)
    }

    pub fn save_positions(&self, positions: &Positions) -> Result<(), GraphError> {
        atomic_write_json(&self.positions_path, positions)
    }

    pub fn save_export(&self, export: &LayoutExport) -> Result<(), GraphError> {
        atomic_write_json(&self.export_path, export)?;
        info!(
            nodes = export.meta.nodes,
            edges = export.meta.edges,
            path = %self.export_path.display(),
            "3d layout exported"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{NodeKind, Position};

    fn sample() -> (Vec<NodeData>, Vec<EdgeData>) {
        let a = NodeData::new("a", "alpha", NodeKind::Ioc, "feed", 1_700_000_000.0, 0.6);
        let b = NodeData::new("b", "beta", NodeKind::Alert, "reddit", 1_700_000_100.0, 0.4);
        let e = EdgeData::new("e1", "a", "b", "mentions", 1.2);
        (vec![a, b], vec![e])
    }

    #[test]
    fn test_elements_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path());
        let (nodes, edges) = sample();
        store.save_elements(&nodes, &edges).unwrap();

        let (loaded_nodes, loaded_edges) = store.load_elements().unwrap();
        assert_eq!(loaded_nodes.len(), 2);
        assert_eq!(loaded_edges.len(), 1);
        assert_eq!(loaded_nodes[0].id, "a");
        assert_eq!(loaded_edges[0].relation, "mentions");
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path());
        let (nodes, edges) = store.load_elements().unwrap();
        assert!(nodes.is_empty() && edges.is_empty());
        assert!(store.load_positions().unwrap().is_empty());
    }

    #[test]
    fn test_positions_round_trip_and_no_temp_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = GraphStore::new(dir.path());
        let mut positions = Positions::new();
        positions.insert("a".to_string(), Position { x: 4.5, y: -2.0 });
        store.save_positions(&positions).unwrap();

        let loaded = store.load_positions().unwrap();
        assert_eq!(loaded.get("a").unwrap().x, 4.5);
        assert!(!dir.path().join("graph_positions.tmp").exists());
    }
}
