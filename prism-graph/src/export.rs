//! Denormalized 3D layout export
//!
//! Produces the render-ready bundle: every node carries its color,
//! size, and full 3D position inline so the viewer needs no joins.
//! X encodes the energy index, Y comes from the relaxed 2D layout,
//! and Z is a monotonic curve over energy boosted by convergence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use prism_core::Band;

use crate::color::spectrum_color;
use crate::elements::{EdgeData, NodeData, NodeKind, Positions, Severity};
use crate::energy;
use crate::math::{clamp01, extract_confidence, hash_unit, recency_factor, round_to};

/// Caps and spans for the exported scene.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub max_nodes: usize,
    pub max_edges: usize,
    pub x_span: f64,
    pub y_span: f64,
    pub z_span: f64,
    pub z_bonus: f64,
    pub z_clamp: f64,
    pub half_life_hours: f64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_nodes: 9000,
            max_edges: 18_000,
            x_span: 3000.0,
            y_span: 900.0,
            z_span: 1800.0,
            z_bonus: 600.0,
            z_clamp: 2600.0,
            half_life_hours: 48.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub severity: Severity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    pub spectrum_index: f64,
    pub energy_weight: f64,
    pub confidence: f64,
    pub recency: f64,
    pub convergence: f64,
    pub volume_count: u32,
    pub size: f64,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub relation: String,
    pub weight: f64,
    pub coherence: f64,
    pub dispersion: f64,
    pub opacity: f64,
    pub thickness: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportMeta {
    /// Epoch seconds.
    pub built_at: i64,
    pub nodes: usize,
    pub edges: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutExport {
    pub nodes: Vec<ExportNode>,
    pub edges: Vec<ExportEdge>,
    pub meta: ExportMeta,
}

fn looks_like_domain(value: &str) -> bool {
    !value.is_empty()
        && value.contains('.')
        && !value.contains(['/', ' ', ':', '@'])
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'))
}

fn looks_like_ip(value: &str) -> bool {
    value.parse::<std::net::Ipv4Addr>().is_ok()
}

fn looks_like_hash(value: &str) -> bool {
    (32..=64).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Best clickthrough URL for a node: an explicit URL wins, then a
/// URL-shaped or domain-shaped indicator; ip- and hash-shaped
/// indicators pivot to VirusTotal.
fn derive_source_url(node: &NodeData) -> Option<String> {
    if let Some(url) = node.url.as_deref() {
        let url = url.trim();
        if url.starts_with("http://") || url.starts_with("https://") {
            return Some(url.to_string());
        }
    }
    let indicator = node.indicator.as_deref().unwrap_or("").trim();
    if indicator.starts_with("http://") || indicator.starts_with("https://") {
        return Some(indicator.to_string());
    }
    if looks_like_ip(indicator) {
        return Some(format!(
            "https://www.virustotal.com/gui/ip-address/{indicator}"
        ));
    }
    if looks_like_hash(indicator) {
        return Some(format!("https://www.virustotal.com/gui/search/{indicator}"));
    }
    if looks_like_domain(indicator) {
        return Some(format!("https://{indicator}"));
    }
    None
}

/// Build the denormalized bundle from synthesized elements plus the
/// relaxed 2D positions.
pub fn build_layout_export(
    nodes: &[NodeData],
    edges: &[EdgeData],
    positions: &Positions,
    config: &ExportConfig,
    now: DateTime<Utc>,
) -> LayoutExport {
    let now_secs = now.timestamp() as f64;
    let capped_nodes = &nodes[..nodes.len().min(config.max_nodes)];

    let mut degree: HashMap<&str, u32> = HashMap::new();
    for e in edges {
        *degree.entry(e.source.as_str()).or_default() += 1;
        *degree.entry(e.target.as_str()).or_default() += 1;
    }

    // Composite energy, percentile-normalized across the export set.
    let mut raw = Vec::with_capacity(capped_nodes.len());
    let mut keys = Vec::with_capacity(capped_nodes.len());
    for n in capped_nodes {
        let deg = degree.get(n.id.as_str()).copied().unwrap_or(0);
        let evidence = if n.volume_count > 0 {
            n.volume_count
        } else {
            n.volume().max(deg.max(1))
        };
        let conf = extract_confidence(n.confidence);
        let rec = if n.recency > 0.0 {
            clamp01(n.recency)
        } else {
            recency_factor(n.timestamp, now_secs, config.half_life_hours)
        };
        raw.push(energy::raw_energy(conf, evidence, n.cross_source_degree, rec));
        keys.push(n.id.as_str());
    }
    let spectrum = crate::math::percentile_normalize(&raw, &keys);

    let mut out_nodes = Vec::with_capacity(capped_nodes.len());
    for (i, n) in capped_nodes.iter().enumerate() {
        let deg = degree.get(n.id.as_str()).copied().unwrap_or(0);
        let spec = clamp01(spectrum[i]);
        let conf = extract_confidence(n.confidence);
        let rec = if n.recency > 0.0 {
            clamp01(n.recency)
        } else {
            recency_factor(n.timestamp, now_secs, config.half_life_hours)
        };
        let conv = energy::convergence(n.cross_source_degree, deg);
        let color = spectrum_color(spec, conf, rec);
        let volume = if n.volume_count > 0 { n.volume_count } else { n.volume() };
        let size = (8.0 + f64::from(volume).ln_1p() * 6.0).clamp(6.0, 90.0);

        let x = (spec - 0.5) * config.x_span;
        let y = positions
            .get(&n.id)
            .map(|p| p.y)
            .unwrap_or_else(|| (hash_unit(&n.id, "y") - 0.5) * config.y_span);
        let z = (spec.powf(1.35) * config.z_span + conv * config.z_bonus)
            .clamp(-config.z_clamp, config.z_clamp);

        out_nodes.push(ExportNode {
            id: n.id.clone(),
            label: n.label.clone(),
            kind: n.kind,
            severity: n.severity,
            source: n.source.clone(),
            subsource: n.subsource.clone(),
            band: n.band,
            spectrum_index: round_to(spec, 4),
            energy_weight: round_to(spec, 4),
            confidence: round_to(conf, 4),
            recency: round_to(rec, 4),
            convergence: round_to(conv, 4),
            volume_count: volume,
            size,
            color,
            source_url: derive_source_url(n),
            x,
            y,
            z,
        });
    }

    let by_id: HashMap<&str, &ExportNode> = out_nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut out_edges = Vec::new();
    for e in edges.iter().take(config.max_edges) {
        let (Some(src), Some(tgt)) = (by_id.get(e.source.as_str()), by_id.get(e.target.as_str()))
        else {
            continue;
        };
        let dispersion = (src.spectrum_index - tgt.spectrum_index).abs();
        let min_conf = src.confidence.min(tgt.confidence);
        let coherence = clamp01((1.0 - dispersion) * min_conf);
        let color = spectrum_color(
            (src.spectrum_index + tgt.spectrum_index) * 0.5,
            (src.confidence + tgt.confidence) * 0.5,
            (src.recency + tgt.recency) * 0.5,
        );
        let opacity = ((0.05 + 0.55 * coherence) * (1.0 - dispersion * 0.6)).clamp(0.02, 0.75);
        out_edges.push(ExportEdge {
            id: e.id.clone(),
            source: e.source.clone(),
            target: e.target.clone(),
            relation: e.relation.clone(),
            weight: e.weight,
            coherence: round_to(coherence, 4),
            dispersion: round_to(dispersion, 4),
            opacity: round_to(opacity, 4),
            thickness: round_to(0.25 + 1.25 * coherence, 4),
            color,
        });
    }

    // Nodes with no URL of their own inherit the first connected
    // neighbor's, so synthetic nodes stay clickable.
    let url_by_id: HashMap<String, String> = out_nodes
        .iter()
        .filter_map(|n| n.source_url.clone().map(|u| (n.id.clone(), u)))
        .collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for e in &out_edges {
        adjacency
            .entry(e.source.as_str())
            .or_default()
            .push(e.target.as_str());
        adjacency
            .entry(e.target.as_str())
            .or_default()
            .push(e.source.as_str());
    }
    for n in &mut out_nodes {
        if n.source_url.is_some() {
            continue;
        }
        let Some(neighbors) = adjacency.get(n.id.as_str()) else {
            continue;
        };
        if let Some(url) = neighbors.iter().find_map(|nb| url_by_id.get(*nb)) {
            n.source_url = Some(url.clone());
        }
    }

    let meta = ExportMeta {
        built_at: now.timestamp(),
        nodes: out_nodes.len(),
        edges: out_edges.len(),
    };
    LayoutExport {
        nodes: out_nodes,
        edges: out_edges,
        meta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
    }

    fn node(id: &str, confidence: f64) -> NodeData {
        let ts = now().timestamp() as f64 - 3600.0;
        let mut n = NodeData::new(id, id, NodeKind::Ioc, "feed", ts, confidence);
        n.recency = 0.9;
        n
    }

    #[test]
    fn test_export_is_denormalized_and_bounded() {
        let nodes = vec![node("a", 0.9), node("b", 0.3)];
        let edges = vec![EdgeData::new("e1", "a", "b", "mentions", 1.0)];
        let config = ExportConfig::default();
        let export = build_layout_export(&nodes, &edges, &Positions::new(), &config, now());

        assert_eq!(export.meta.nodes, 2);
        assert_eq!(export.meta.edges, 1);
        for n in &export.nodes {
            assert!(n.color.starts_with('#'));
            assert!(n.z.abs() <= config.z_clamp);
            assert!(n.x.abs() <= config.x_span / 2.0);
            assert!((6.0..=90.0).contains(&n.size));
        }
        let e = &export.edges[0];
        assert!((0.02..=0.75).contains(&e.opacity));
        assert!(e.coherence <= 1.0);
    }

    #[test]
    fn test_caps_limit_output() {
        let nodes: Vec<NodeData> = (0..5).map(|i| node(&format!("n{i}"), 0.5)).collect();
        let config = ExportConfig {
            max_nodes: 3,
            ..ExportConfig::default()
        };
        let export = build_layout_export(&nodes, &[], &Positions::new(), &config, now());
        assert_eq!(export.nodes.len(), 3);
    }

    #[test]
    fn test_edges_to_capped_out_nodes_are_dropped() {
        let nodes = vec![node("a", 0.5), node("b", 0.5)];
        let edges = vec![EdgeData::new("e1", "a", "b", "mentions", 1.0)];
        let config = ExportConfig {
            max_nodes: 1,
            ..ExportConfig::default()
        };
        let export = build_layout_export(&nodes, &edges, &Positions::new(), &config, now());
        assert!(export.edges.is_empty());
    }

    #[test]
    fn test_fallback_y_is_deterministic() {
        let nodes = vec![node("a", 0.5)];
        let config = ExportConfig::default();
        let first = build_layout_export(&nodes, &[], &Positions::new(), &config, now());
        let second = build_layout_export(&nodes, &[], &Positions::new(), &config, now());
        assert_eq!(first.nodes[0].y, second.nodes[0].y);
        assert!(first.nodes[0].y.abs() <= config.y_span / 2.0);
    }

    #[test]
    fn test_source_url_derived_from_indicator() {
        let mut n = node("a", 0.5);
        n.indicator = Some("bad.example.com".to_string());
        let export = build_layout_export(&[n], &[], &Positions::new(), &ExportConfig::default(), now());
        assert_eq!(
            export.nodes[0].source_url.as_deref(),
            Some("https://bad.example.com")
        );
    }

    #[test]
    fn test_ip_and_hash_indicators_pivot_to_virustotal() {
        let mut ip = node("a", 0.5);
        ip.indicator = Some("203.0.113.9".to_string());
        let mut hash = node("b", 0.5);
        hash.indicator = Some("d41d8cd98f00b204e9800998ecf8427e".to_string());

        let export = build_layout_export(
            &[ip, hash],
            &[],
            &Positions::new(),
            &ExportConfig::default(),
            now(),
        );
        assert_eq!(
            export.nodes[0].source_url.as_deref(),
            Some("https://www.virustotal.com/gui/ip-address/203.0.113.9")
        );
        assert_eq!(
            export.nodes[1].source_url.as_deref(),
            Some("https://www.virustotal.com/gui/search/d41d8cd98f00b204e9800998ecf8427e")
        );
    }

    #[test]
    fn test_url_less_node_inherits_neighbor_url() {
        let mut with_url = node("a", 0.5);
        with_url.indicator = Some("bad.example.com".to_string());
        let bare = node("b", 0.5);
        let isolated = node("c", 0.5);
        let edges = vec![EdgeData::new("e1", "a", "b", "mentions", 1.0)];

        let export = build_layout_export(
            &[with_url, bare, isolated],
            &edges,
            &Positions::new(),
            &ExportConfig::default(),
            now(),
        );
        assert_eq!(
            export.nodes[1].source_url.as_deref(),
            Some("https://bad.example.com")
        );
        assert!(export.nodes[2].source_url.is_none());
    }
}
