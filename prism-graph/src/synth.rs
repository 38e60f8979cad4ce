//! Graph synthesizer
//!
//! One synthesis pass takes the accumulated node/edge records plus any
//! persisted positions and produces a validated, enriched element set:
//! stale records pruned, confidence and recency adjusted by
//! corroboration, synthetic edges inferred across sources, energy and
//! color assigned, and new nodes seeded deterministically. Re-running
//! the pass over its own output converges.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

use prism_core::{band_weight, dominant_band};

use crate::color::spectrum_color;
use crate::domain::{domains_from_text, node_domain};
use crate::elements::{
    validate_elements, EdgeData, NodeData, NodeKind, Position, Positions, Severity,
};
use crate::energy;
use crate::error::GraphError;
use crate::math::{clamp01, hash_float, recency_factor, round_to};

/// Base weights per relation, used for semantic weighting.
fn relation_base_weight(relation: &str, fallback: f64) -> f64 {
    match relation {
        "source_cluster" => 1.2,
        "mentions" => 1.2,
        "indicator_overlap" => 1.6,
        "domain_overlap" => 1.4,
        "cross_match" => 1.8,
        _ => fallback,
    }
}

/// Tunables for one synthesis pass. The defaults reproduce the
/// behavior of the production deployment.
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Nodes older than this are dropped, edges follow their endpoints.
    pub retention_days: i64,
    /// Half-life for recency decay, in hours.
    pub half_life_hours: f64,
    /// Window for the per-source signal density boost, in hours.
    pub density_window_hours: f64,
    /// Hard cap on distinct indicators scanned for cross matching.
    pub max_cross_indicators: usize,
    /// Cap on domain-derived cross_match edges per alert node.
    pub max_domain_links: usize,
    /// Cap on indicator_overlap edges per shared indicator value.
    pub max_edges_per_indicator: usize,
    /// Cap on domain_overlap edges per shared root domain.
    pub max_edges_per_domain: usize,
    /// Minimum members before a source hub node is synthesized.
    pub hub_min_members: usize,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            half_life_hours: 48.0,
            density_window_hours: 24.0,
            max_cross_indicators: 2000,
            max_domain_links: 20,
            max_edges_per_indicator: 30,
            max_edges_per_domain: 20,
            hub_min_members: 2,
        }
    }
}

/// Counters from one synthesis pass.
#[derive(Debug, Clone, Default)]
pub struct SynthReport {
    pub pruned_nodes: usize,
    pub pruned_edges: usize,
    pub hub_nodes: usize,
    pub synthetic_edges: usize,
}

struct EdgeSet {
    ids: HashSet<String>,
    keys: HashSet<(String, String, String)>,
}

impl EdgeSet {
    fn from_edges(edges: &[EdgeData]) -> Self {
        let mut ids = HashSet::with_capacity(edges.len());
        let mut keys = HashSet::with_capacity(edges.len());
        for e in edges {
            ids.insert(e.id.clone());
            keys.insert((e.source.clone(), e.target.clone(), e.relation.clone()));
        }
        Self { ids, keys }
    }

    /// Add the edge unless its id or (source, target, relation) key
    /// already exists.
    fn push(&mut self, edges: &mut Vec<EdgeData>, edge: EdgeData) -> bool {
        let key = (edge.source.clone(), edge.target.clone(), edge.relation.clone());
        if self.ids.contains(&edge.id) || self.keys.contains(&key) {
            return false;
        }
        self.ids.insert(edge.id.clone());
        self.keys.insert(key);
        edges.push(edge);
        true
    }
}

/// Run one full synthesis pass. Returns the enriched elements and a
/// report; `positions` gains a deterministic seed for every node that
/// did not already have one.
pub fn synthesize(
    nodes: Vec<NodeData>,
    edges: Vec<EdgeData>,
    positions: &mut Positions,
    config: &SynthConfig,
    now: DateTime<Utc>,
) -> Result<(Vec<NodeData>, Vec<EdgeData>, SynthReport), GraphError> {
    let now_secs = now.timestamp() as f64;
    let mut report = SynthReport::default();

    // Retention pruning. A missing timestamp counts as fresh so
    // unstamped records are never silently dropped.
    let cutoff = now_secs - (config.retention_days as f64) * 86_400.0;
    let initial_nodes = nodes.len();
    let initial_edges = edges.len();
    let mut nodes: Vec<NodeData> = nodes
        .into_iter()
        .filter(|n| n.timestamp <= 0.0 || n.timestamp >= cutoff)
        .collect();
    let surviving: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let mut edges: Vec<EdgeData> = edges
        .into_iter()
        .filter(|e| surviving.contains(&e.source) && surviving.contains(&e.target))
        .collect();
    report.pruned_nodes = initial_nodes - nodes.len();
    report.pruned_edges = initial_edges - edges.len();
    if report.pruned_nodes > 0 || report.pruned_edges > 0 {
        info!(
            pruned_nodes = report.pruned_nodes,
            pruned_edges = report.pruned_edges,
            retention_days = config.retention_days,
            "retention pruning"
        );
    }

    // Source hubs: one structural node per source with enough members.
    let mut members_by_source: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for n in &nodes {
        if n.kind.is_hub() {
            continue;
        }
        members_by_source
            .entry(n.source_key())
            .or_default()
            .push(n.id.clone());
    }
    let mut edge_set = EdgeSet::from_edges(&edges);
    let existing_ids: HashSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    for (source, members) in &members_by_source {
        if source.is_empty() || members.len() < config.hub_min_members {
            continue;
        }
        let hub_id = format!("hub::{source}");
        if !existing_ids.contains(&hub_id) {
            let mut hub = NodeData::new(
                hub_id.clone(),
                source.clone(),
                NodeKind::SourceHub,
                source.clone(),
                now_secs,
                0.5,
            );
            hub.severity = Severity::Low;
            hub.object_type = Some("source_hub".to_string());
            nodes.push(hub);
            report.hub_nodes += 1;
        }
        for member in members {
            let edge = EdgeData::new(
                format!("{hub_id}\u{2192}{member}"),
                hub_id.clone(),
                member.clone(),
                "source_cluster",
                1.2,
            );
            edge_set.push(&mut edges, edge);
        }
    }

    // Index the final node set.
    let id_to_idx: HashMap<String, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.clone(), i))
        .collect();
    let source_keys: Vec<String> = nodes.iter().map(|n| n.source_key()).collect();
    let domains: Vec<String> = nodes.iter().map(node_domain).collect();

    let mut degree = vec![0u32; nodes.len()];
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut cross_degree = vec![0u32; nodes.len()];
    let mut same_degree = vec![0u32; nodes.len()];
    let mut domain_edge_counts = vec![0u32; nodes.len()];
    let mut domain_neighbors: Vec<HashSet<String>> = vec![HashSet::new(); nodes.len()];
    for e in &edges {
        let (Some(&s), Some(&t)) = (id_to_idx.get(&e.source), id_to_idx.get(&e.target)) else {
            continue;
        };
        degree[s] += 1;
        degree[t] += 1;
        neighbors[s].push(t);
        neighbors[t].push(s);
        let (sk, tk) = (&source_keys[s], &source_keys[t]);
        if !sk.is_empty() && !tk.is_empty() && sk != tk {
            cross_degree[s] += 1;
            cross_degree[t] += 1;
        } else {
            same_degree[s] += 1;
            same_degree[t] += 1;
        }
        if !domains[t].is_empty() {
            domain_edge_counts[s] += 1;
            domain_neighbors[s].insert(domains[t].clone());
        }
        if !domains[s].is_empty() {
            domain_edge_counts[t] += 1;
            domain_neighbors[t].insert(domains[s].clone());
        }
    }

    // Signal density: distinct indicators per source inside the
    // density window.
    let density_cutoff = now_secs - config.density_window_hours * 3600.0;
    let mut per_source_signals: HashMap<&str, HashSet<String>> = HashMap::new();
    for (i, n) in nodes.iter().enumerate() {
        if n.timestamp < density_cutoff {
            continue;
        }
        let key = source_keys[i].as_str();
        if key.is_empty() {
            continue;
        }
        let indicator = n
            .indicator
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(&n.label)
            .trim()
            .to_lowercase();
        if indicator.is_empty() {
            continue;
        }
        per_source_signals.entry(key).or_default().insert(indicator);
    }
    let density: HashMap<&str, f64> = per_source_signals
        .iter()
        .map(|(k, v)| (*k, v.len() as f64))
        .collect();

    // Per-node adjustment: confidence, recency, volume, mass, size,
    // and a deterministic position seed.
    for i in 0..nodes.len() {
        let domain_total = domain_edge_counts[i];
        let domain_conv = if domain_total > 0 {
            domain_neighbors[i].len() as f64 / f64::from(domain_total)
        } else {
            0.0
        };
        let x_degree = cross_degree[i];
        let s_degree = same_degree[i];

        let mut adjusted = nodes[i].confidence
            + domain_conv * 0.8
            + f64::from(x_degree).ln_1p() * 0.6;
        if s_degree > 12 && domain_conv < 0.25 {
            adjusted *= 0.85;
        }
        let adjusted = clamp01(adjusted);

        let decay = recency_factor(nodes[i].timestamp, now_secs, config.half_life_hours);
        let signal_density = density
            .get(source_keys[i].as_str())
            .copied()
            .unwrap_or(0.0);
        let recency = clamp01(decay * (1.0 + signal_density * 0.15));

        let band_w = band_weight(nodes[i].band);
        {
            let node = &mut nodes[i];
            node.adjusted_confidence = round_to(adjusted, 4);
            node.confidence = adjusted;
            node.recency = round_to(recency, 4);
            node.domain_convergence = round_to(domain_conv, 4);
            node.cross_source_degree = x_degree;
            node.same_source_degree = s_degree;
            node.signal_density = round_to(signal_density, 4);
            node.band_weight = round_to(band_w, 3);
            node.volume_count = node.volume();

            let mass = f64::from(degree[i]) * 1.6 + adjusted * 12.0 * band_w + recency * 10.0;
            node.mass = round_to(mass, 3);
            let size = 12.0 + mass.ln_1p() * 16.0;
            node.size = size.clamp(12.0, 100.0).round() as u32;
        }

        if !positions.contains_key(&nodes[i].id) {
            let neighbor_positions: Vec<Position> = neighbors[i]
                .iter()
                .filter_map(|&j| positions.get(&nodes[j].id))
                .copied()
                .collect();
            let seed = seed_position(&nodes[i].id, &neighbor_positions);
            positions.insert(nodes[i].id.clone(), seed);
        }
    }

    // Synthetic edge inference, cross-source only and capped per key.
    let synthetic_before = edges.len();
    infer_cross_matches(
        &nodes,
        &mut edges,
        &mut edge_set,
        &source_keys,
        &domains,
        config,
    );
    infer_indicator_overlap(&nodes, &mut edges, &mut edge_set, &source_keys, config);
    infer_domain_overlap(
        &nodes,
        &mut edges,
        &mut edge_set,
        &source_keys,
        &domains,
        config,
    );
    report.synthetic_edges = edges.len() - synthetic_before;
    debug!(
        synthetic_edges = report.synthetic_edges,
        "synthetic edge inference"
    );

    // Edge semantic metadata, accumulated back onto the endpoints.
    let mut temporal_sum = vec![0.0f64; nodes.len()];
    let mut temporal_count = vec![0u32; nodes.len()];
    let mut indicator_hits = vec![0u32; nodes.len()];
    for e in &mut edges {
        let (Some(&s), Some(&t)) = (id_to_idx.get(&e.source), id_to_idx.get(&e.target)) else {
            continue;
        };
        let ts_a = nodes[s].timestamp;
        let ts_b = nodes[t].timestamp;
        let temporal_alignment = if ts_a > 0.0 && ts_b > 0.0 {
            (-(ts_a - ts_b).abs() / (config.half_life_hours * 3600.0)).exp()
        } else {
            0.0
        };
        temporal_sum[s] += temporal_alignment;
        temporal_count[s] += 1;
        temporal_sum[t] += temporal_alignment;
        temporal_count[t] += 1;

        let cross_domain =
            !domains[s].is_empty() && !domains[t].is_empty() && domains[s] != domains[t];
        let base = relation_base_weight(&e.relation, e.weight);
        let semantic = base
            * (1.0 + temporal_alignment)
            * if cross_domain { 1.6 } else { 1.0 };
        e.semantic_weight = round_to(semantic.clamp(0.0, 3.0), 4);
        e.temporal_alignment = round_to(temporal_alignment, 4);
        e.cross_domain = cross_domain;
        e.evidence_count = if e.relation == "indicator_overlap" { 2 } else { 1 };
        if matches!(
            e.relation.as_str(),
            "indicator_overlap" | "domain_overlap" | "cross_match"
        ) {
            indicator_hits[s] += 1;
            indicator_hits[t] += 1;
        }
        e.band = dominant_band([nodes[s].band, nodes[t].band].into_iter().flatten());
    }

    // Hub edges do not contribute to cross-source degree, but they do
    // contribute to total degree; recompute with synthetic edges in.
    let mut final_degree = vec![0u32; nodes.len()];
    for e in &edges {
        if let (Some(&s), Some(&t)) = (id_to_idx.get(&e.source), id_to_idx.get(&e.target)) {
            final_degree[s] += 1;
            final_degree[t] += 1;
        }
    }

    // Energy, convergence, and color.
    let indices = energy::spectrum_indices(&nodes);
    for i in 0..nodes.len() {
        let temporal = temporal_sum[i] / f64::from(temporal_count[i].max(1));
        let indicator_conv = if final_degree[i] > 0 {
            f64::from(indicator_hits[i]) / f64::from(final_degree[i])
        } else {
            0.0
        };
        let conv = energy::convergence(cross_degree[i], final_degree[i]);
        let node = &mut nodes[i];
        node.temporal_alignment = round_to(temporal, 4);
        node.indicator_convergence = round_to(indicator_conv, 4);
        node.spectrum_index = round_to(indices[i], 4);
        node.convergence = round_to(conv, 4);
        let color = spectrum_color(node.spectrum_index, node.confidence, node.recency);
        node.color = Some(color);
    }

    // Render weights per edge.
    for e in &mut edges {
        let (Some(&s), Some(&t)) = (id_to_idx.get(&e.source), id_to_idx.get(&e.target)) else {
            continue;
        };
        let src_spec = nodes[s].spectrum_index;
        let tgt_spec = nodes[t].spectrum_index;
        let spec_avg = (src_spec + tgt_spec) / 2.0;
        let dispersion = (src_spec - tgt_spec).abs();
        let coherence = (1.0 - dispersion).max(0.05);
        let conv_boost = nodes[s].convergence.max(nodes[t].convergence);
        e.dispersion = round_to(dispersion, 4);
        e.coherence = round_to(coherence, 4);
        e.weight = round_to(
            (0.8 + spec_avg * 1.4 + conv_boost) * (0.6 + 0.8 * coherence),
            3,
        );
    }

    validate_elements(&nodes, &edges)?;
    Ok((nodes, edges, report))
}

/// Centroid of positioned neighbors plus hash jitter; deterministic
/// spiral when the node has none.
fn seed_position(id: &str, placed: &[Position]) -> Position {
    if !placed.is_empty() {
        let n = placed.len() as f64;
        let avg_x = placed.iter().map(|p| p.x).sum::<f64>() / n;
        let avg_y = placed.iter().map(|p| p.y).sum::<f64>() / n;
        return Position {
            x: avg_x + hash_float(id, "jitter", -90.0, 90.0),
            y: avg_y + hash_float(id, "jitterY", -90.0, 90.0),
        };
    }
    let angle = hash_float(id, "angle", 0.0, std::f64::consts::TAU);
    let radius = 280.0 + hash_float(id, "radius", 0.0, 140.0);
    Position {
        x: angle.cos() * radius,
        y: angle.sin() * radius,
    }
}

fn indicator_key(node: &NodeData) -> Option<String> {
    let raw = node
        .indicator
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(&node.label)
        .trim()
        .to_lowercase();
    if raw.len() < 6 {
        None
    } else {
        Some(raw)
    }
}

/// Link alert nodes to indicators from other sources that appear in
/// their label text, by value or by shared root domain.
fn infer_cross_matches(
    nodes: &[NodeData],
    edges: &mut Vec<EdgeData>,
    edge_set: &mut EdgeSet,
    source_keys: &[String],
    domains: &[String],
    config: &SynthConfig,
) {
    let mut indicator_map: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut domain_map: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, n) in nodes.iter().enumerate() {
        if n.kind == NodeKind::Alert || n.kind.is_hub() {
            continue;
        }
        if domains[i].len() >= 4 {
            domain_map.entry(domains[i].clone()).or_default().push(i);
        }
        if let Some(key) = indicator_key(n) {
            indicator_map.entry(key).or_default().push(i);
        }
    }
    let indicators: Vec<(&String, &Vec<usize>)> = indicator_map
        .iter()
        .take(config.max_cross_indicators)
        .collect();

    for (a_idx, alert) in nodes.iter().enumerate() {
        if alert.kind != NodeKind::Alert {
            continue;
        }
        let label = alert.label.to_lowercase();
        if !label.is_empty() {
            for (indicator, candidates) in &indicators {
                if !label.contains(indicator.as_str()) {
                    continue;
                }
                for &i in *candidates {
                    if source_keys[i] == source_keys[a_idx] {
                        continue;
                    }
                    let edge = EdgeData::new(
                        format!("cross::{}\u{2192}{}", nodes[i].id, alert.id),
                        nodes[i].id.clone(),
                        alert.id.clone(),
                        "cross_match",
                        1.8,
                    );
                    edge_set.push(edges, edge);
                }
            }
        }

        let mut alert_domains = domains_from_text(&alert.label);
        if !domains[a_idx].is_empty() {
            alert_domains.insert(domains[a_idx].clone());
        }
        let mut sorted_domains: Vec<String> = alert_domains.into_iter().collect();
        sorted_domains.sort();
        let mut links = 0usize;
        'outer: for dom in sorted_domains {
            let Some(candidates) = domain_map.get(&dom) else {
                continue;
            };
            for &i in candidates {
                if source_keys[i] == source_keys[a_idx] {
                    continue;
                }
                let edge = EdgeData::new(
                    format!("cross::domain::{dom}::{}\u{2192}{}", nodes[i].id, alert.id),
                    nodes[i].id.clone(),
                    alert.id.clone(),
                    "cross_match",
                    1.7,
                );
                if edge_set.push(edges, edge) {
                    links += 1;
                    if links >= config.max_domain_links {
                        break 'outer;
                    }
                }
            }
        }
    }
}

/// Connect alert/ioc nodes sharing the same indicator value across
/// different sources.
fn infer_indicator_overlap(
    nodes: &[NodeData],
    edges: &mut Vec<EdgeData>,
    edge_set: &mut EdgeSet,
    source_keys: &[String],
    config: &SynthConfig,
) {
    let mut index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, n) in nodes.iter().enumerate() {
        if !matches!(n.kind, NodeKind::Alert | NodeKind::Ioc) {
            continue;
        }
        if let Some(key) = indicator_key(n) {
            index.entry(key).or_default().push(i);
        }
    }
    for (key, members) in &index {
        if members.len() < 2 {
            continue;
        }
        let mut budget = config.max_edges_per_indicator;
        'pairs: for (pos, &a) in members.iter().enumerate() {
            for &b in &members[pos + 1..] {
                if budget == 0 {
                    break 'pairs;
                }
                if source_keys[a].is_empty()
                    || source_keys[b].is_empty()
                    || source_keys[a] == source_keys[b]
                {
                    continue;
                }
                let edge = EdgeData::new(
                    format!("overlap::{key}::{}\u{2192}{}", nodes[a].id, nodes[b].id),
                    nodes[a].id.clone(),
                    nodes[b].id.clone(),
                    "indicator_overlap",
                    1.6,
                );
                if edge_set.push(edges, edge) {
                    budget -= 1;
                }
            }
        }
    }
}

/// Connect alert/ioc nodes sharing a root domain across different
/// sources.
fn infer_domain_overlap(
    nodes: &[NodeData],
    edges: &mut Vec<EdgeData>,
    edge_set: &mut EdgeSet,
    source_keys: &[String],
    domains: &[String],
    config: &SynthConfig,
) {
    let mut index: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (i, n) in nodes.iter().enumerate() {
        if !matches!(n.kind, NodeKind::Alert | NodeKind::Ioc) {
            continue;
        }
        if domains[i].len() >= 4 {
            index.entry(domains[i].clone()).or_default().push(i);
        }
    }
    for (dom, members) in &index {
        if members.len() < 2 {
            continue;
        }
        let mut budget = config.max_edges_per_domain;
        'pairs: for (pos, &a) in members.iter().enumerate() {
            for &b in &members[pos + 1..] {
                if budget == 0 {
                    break 'pairs;
                }
                if source_keys[a].is_empty()
                    || source_keys[b].is_empty()
                    || source_keys[a] == source_keys[b]
                {
                    continue;
                }
                let edge = EdgeData::new(
                    format!("domain::{dom}::{}\u{2192}{}", nodes[a].id, nodes[b].id),
                    nodes[a].id.clone(),
                    nodes[b].id.clone(),
                    "domain_overlap",
                    1.4,
                );
                if edge_set.push(edges, edge) {
                    budget -= 1;
                }
            }
        }
    }
}
