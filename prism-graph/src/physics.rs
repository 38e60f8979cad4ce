//! Force-directed layout
//!
//! A fixed number of iterations over four forces: grid-bucketed
//! inverse-square repulsion, attraction along real edges toward a
//! coherence-shrunk ideal length, radial ordering (high-energy nodes
//! pulled to center, low-energy nodes drifting outward), and a small
//! anchor back to each node's seeded position. There is no random
//! source anywhere in the loop; identical inputs relax to
//! bit-identical positions.

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::elements::{EdgeData, NodeData, Position, Positions};
use crate::weights::{edge_coherence, node_repulsion, node_stability};

/// Layout tunables; defaults match the production rendering.
#[derive(Debug, Clone)]
pub struct LayoutConfig {
    pub iterations: usize,
    pub base_repulse: f64,
    pub base_attract: f64,
    pub edge_ideal: f64,
    pub repulse_radius: f64,
    pub outward_drift: f64,
    pub center_pull: f64,
    pub anchor_strength: f64,
    pub step_size: f64,
    pub max_step: f64,
    pub xy_clamp: f64,
    pub z_scale: f64,
    /// Extra repulsion between two structural hub nodes.
    pub hub_repulse_boost: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            iterations: 120,
            base_repulse: 220.0,
            base_attract: 0.006,
            edge_ideal: 110.0,
            repulse_radius: 240.0,
            outward_drift: 0.55,
            center_pull: 0.0035,
            anchor_strength: 0.006,
            step_size: 0.022,
            max_step: 9.0,
            xy_clamp: 1800.0,
            z_scale: 900.0,
            hub_repulse_boost: 2.5,
        }
    }
}

/// Elevation for the 3D view: significance times corroboration.
pub fn z_lift(spectrum_index: f64, convergence: f64, config: &LayoutConfig) -> f64 {
    spectrum_index * convergence * config.z_scale
}

fn grid_key(x: f64, y: f64, cell: f64) -> (i64, i64) {
    ((x / cell).floor() as i64, (y / cell).floor() as i64)
}

/// Relax positions in place for `config.iterations` steps.
pub fn relax(
    nodes: &[NodeData],
    edges: &[EdgeData],
    positions: &mut Positions,
    config: &LayoutConfig,
) {
    if nodes.is_empty() {
        return;
    }
    let id_to_idx: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut pos: Vec<(f64, f64)> = nodes
        .iter()
        .map(|n| {
            positions
                .get(&n.id)
                .map(|p| (p.x, p.y))
                .unwrap_or((0.0, 0.0))
        })
        .collect();
    let initial = pos.clone();

    let mut degree = vec![0u32; nodes.len()];
    let mut edge_pairs: Vec<(usize, usize, f64)> = Vec::with_capacity(edges.len());
    for e in edges {
        let (Some(&s), Some(&t)) = (id_to_idx.get(e.source.as_str()), id_to_idx.get(e.target.as_str()))
        else {
            continue;
        };
        if s == t {
            continue;
        }
        degree[s] += 1;
        degree[t] += 1;
        edge_pairs.push((s, t, edge_coherence(&nodes[s], &nodes[t])));
    }

    // Per-node constants over the whole run.
    let repulse: Vec<f64> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| config.base_repulse * node_repulsion(n, degree[i]))
        .collect();
    let anchor: Vec<f64> = nodes
        .iter()
        .map(|n| config.anchor_strength * node_stability(n))
        .collect();
    let spectrum: Vec<f64> = nodes.iter().map(|n| n.spectrum_index).collect();
    let convergence: Vec<f64> = nodes.iter().map(|n| n.convergence).collect();
    let is_hub: Vec<bool> = nodes.iter().map(|n| n.kind.is_hub()).collect();

    let radius_sq = config.repulse_radius * config.repulse_radius;
    for _ in 0..config.iterations {
        let mut deltas = vec![(0.0f64, 0.0f64); nodes.len()];

        // Uniform grid so repulsion only scans adjacent cells. The
        // BTreeMap keeps accumulation order independent of hashing.
        let mut cells: BTreeMap<(i64, i64), Vec<usize>> = BTreeMap::new();
        for (i, &(x, y)) in pos.iter().enumerate() {
            cells
                .entry(grid_key(x, y, config.repulse_radius))
                .or_default()
                .push(i);
        }

        for (&(cx, cy), idxs) in &cells {
            let mut neighbors: Vec<usize> = Vec::new();
            for ox in -1..=1 {
                for oy in -1..=1 {
                    if let Some(found) = cells.get(&(cx + ox, cy + oy)) {
                        neighbors.extend_from_slice(found);
                    }
                }
            }
            for &i in idxs {
                let (xi, yi) = pos[i];
                for &j in &neighbors {
                    if j <= i {
                        continue;
                    }
                    let dx = xi - pos[j].0;
                    let dy = yi - pos[j].1;
                    let dist_sq = dx * dx + dy * dy + 1.0;
                    if dist_sq > radius_sq {
                        continue;
                    }
                    let dist = dist_sq.sqrt();
                    let mut force = (repulse[i] + repulse[j]) * 0.5 / dist_sq;
                    if is_hub[i] && is_hub[j] {
                        force *= config.hub_repulse_boost;
                    }
                    let fx = dx / dist * force;
                    let fy = dy / dist * force;
                    deltas[i].0 += fx;
                    deltas[i].1 += fy;
                    deltas[j].0 -= fx;
                    deltas[j].1 -= fy;
                }
            }
        }

        for &(s, t, coherence) in &edge_pairs {
            let dx = pos[t].0 - pos[s].0;
            let dy = pos[t].1 - pos[s].1;
            let dist = (dx * dx + dy * dy).sqrt() + 1e-6;
            let ideal = config.edge_ideal * (1.15 - coherence * 0.6);
            let attract = config.base_attract * (0.4 + 0.8 * coherence);
            let delta = (dist - ideal) * attract;
            let fx = dx / dist * delta;
            let fy = dy / dist * delta;
            deltas[s].0 += fx;
            deltas[s].1 += fy;
            deltas[t].0 -= fx;
            deltas[t].1 -= fy;
        }

        for i in 0..nodes.len() {
            let (x, y) = pos[i];
            let spec = spectrum[i];
            let center = config.center_pull * spec.powf(1.3) * (0.6 + convergence[i] * 0.8);
            deltas[i].0 += -x * center;
            deltas[i].1 += -y * center;

            let r = (x * x + y * y).sqrt() + 1e-6;
            let outward = config.outward_drift * (1.0 - spec).powf(1.2);
            deltas[i].0 += x / r * outward;
            deltas[i].1 += y / r * outward;

            deltas[i].0 += (initial[i].0 - x) * anchor[i];
            deltas[i].1 += (initial[i].1 - y) * anchor[i];
        }

        for i in 0..nodes.len() {
            let step_scale = 0.35 + (1.0 - spectrum[i]) * 0.7;
            let dx = (deltas[i].0 * config.step_size * step_scale)
                .clamp(-config.max_step, config.max_step);
            let dy = (deltas[i].1 * config.step_size * step_scale)
                .clamp(-config.max_step, config.max_step);
            pos[i] = (
                (pos[i].0 + dx).clamp(-config.xy_clamp, config.xy_clamp),
                (pos[i].1 + dy).clamp(-config.xy_clamp, config.xy_clamp),
            );
        }
    }

    for (i, n) in nodes.iter().enumerate() {
        positions.insert(n.id.clone(), Position { x: pos[i].0, y: pos[i].1 });
    }
    debug!(nodes = nodes.len(), iterations = config.iterations, "layout relaxed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::NodeKind;

    fn node(id: &str, spec: f64) -> NodeData {
        let mut n = NodeData::new(id, id, NodeKind::Ioc, "feed", 1_700_000_000.0, 0.5);
        n.spectrum_index = spec;
        n.convergence = 0.4;
        n
    }

    fn seeded(ids: &[&str]) -> Positions {
        let mut positions = Positions::new();
        for (i, id) in ids.iter().enumerate() {
            positions.insert(
                id.to_string(),
                Position {
                    x: 100.0 * (i as f64 + 1.0),
                    y: -40.0 * (i as f64 + 1.0),
                },
            );
        }
        positions
    }

    #[test]
    fn test_relax_is_bit_deterministic() {
        let nodes = vec![node("a", 0.8), node("b", 0.2), node("c", 0.5)];
        let edges = vec![EdgeData::new("e1", "a", "b", "mentions", 1.0)];

        let mut first = seeded(&["a", "b", "c"]);
        relax(&nodes, &edges, &mut first, &LayoutConfig::default());
        let mut second = seeded(&["a", "b", "c"]);
        relax(&nodes, &edges, &mut second, &LayoutConfig::default());

        for id in ["a", "b", "c"] {
            assert_eq!(first.get(id).unwrap().x, second.get(id).unwrap().x);
            assert_eq!(first.get(id).unwrap().y, second.get(id).unwrap().y);
        }
    }

    #[test]
    fn test_positions_stay_within_clamp() {
        let nodes = vec![node("a", 0.0), node("b", 0.0)];
        let mut positions = Positions::new();
        positions.insert("a".to_string(), Position { x: 1799.0, y: 1799.0 });
        positions.insert("b".to_string(), Position { x: -1799.0, y: -1799.0 });
        let config = LayoutConfig::default();
        relax(&nodes, &[], &mut positions, &config);
        for p in positions.values() {
            assert!(p.x.abs() <= config.xy_clamp);
            assert!(p.y.abs() <= config.xy_clamp);
        }
    }

    #[test]
    fn test_edges_pull_endpoints_together() {
        let nodes = vec![node("a", 0.5), node("b", 0.5), node("c", 0.5)];
        let edges = vec![EdgeData::new("e1", "a", "b", "mentions", 1.0)];
        let mut positions = Positions::new();
        positions.insert("a".to_string(), Position { x: 0.0, y: 0.0 });
        positions.insert("b".to_string(), Position { x: 600.0, y: 0.0 });
        positions.insert("c".to_string(), Position { x: -600.0, y: 0.0 });

        relax(&nodes, &edges, &mut positions, &LayoutConfig::default());
        let dist = |p: &Position, q: &Position| ((p.x - q.x).powi(2) + (p.y - q.y).powi(2)).sqrt();
        let a = *positions.get("a").unwrap();
        let b = *positions.get("b").unwrap();
        let c = *positions.get("c").unwrap();
        assert!(dist(&a, &b) < dist(&a, &c));
    }

    #[test]
    fn test_z_lift_scales_with_energy_and_convergence() {
        let config = LayoutConfig::default();
        assert_eq!(z_lift(0.0, 1.0, &config), 0.0);
        assert_eq!(z_lift(1.0, 1.0, &config), config.z_scale);
        assert!(z_lift(0.5, 0.5, &config) < z_lift(0.9, 0.9, &config));
    }
}
