//! Energy index and convergence scoring
//!
//! Every node gets a composite "energy" from confidence, evidence
//! volume, cross-source corroboration, and recency. Energies are then
//! percentile-normalized across the whole graph so the index always
//! spans [0, 1] regardless of absolute score distribution. Convergence
//! measures how much of a node's neighborhood crosses source
//! boundaries.

use crate::elements::NodeData;
use crate::math::{clamp01, norm_count, percentile_normalize};

/// Raw composite energy before percentile normalization.
pub fn raw_energy(confidence: f64, evidence: u32, cross_degree: u32, recency: f64) -> f64 {
    0.45 * clamp01(confidence)
        + 0.20 * f64::from(evidence).ln_1p()
        + 0.20 * f64::from(cross_degree).ln_1p()
        + 0.15 * clamp01(recency)
}

/// Convergence scalar: cross-source neighbors dominate, raw degree
/// contributes a smaller structural term.
pub fn convergence(cross_degree: u32, total_degree: u32) -> f64 {
    let cross_norm = if cross_degree > 0 {
        norm_count(f64::from(cross_degree), 3.0)
    } else {
        0.0
    };
    let degree_norm = if total_degree > 0 {
        norm_count(f64::from(total_degree), 4.0)
    } else {
        0.0
    };
    clamp01(0.65 * cross_norm + 0.35 * degree_norm)
}

/// Percentile-normalized spectrum index per node, aligned with the
/// input slice. Expects adjusted confidence, volume, cross-source
/// degree, and recency to already be populated.
pub fn spectrum_indices(nodes: &[NodeData]) -> Vec<f64> {
    let energies: Vec<f64> = nodes
        .iter()
        .map(|n| {
            raw_energy(
                n.confidence,
                n.volume(),
                n.cross_source_degree,
                n.recency,
            )
        })
        .collect();
    let keys: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    percentile_normalize(&energies, &keys)
}
