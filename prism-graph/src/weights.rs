//! Per-node and per-edge weights consumed by the layout engine.

use crate::elements::NodeData;
use crate::math::clamp01;

/// Evidence volume with a degree fallback, floored at 1.
pub fn volume_weight(node: &NodeData, degree: u32) -> f64 {
    let total = node.alert_count + node.ioc_count + node.evidence_count;
    if total > 0 {
        f64::from(total)
    } else {
        f64::from(degree.max(1))
    }
}

/// The percentile-normalized energy index, clamped.
pub fn energy_weight(node: &NodeData) -> f64 {
    clamp01(node.spectrum_index)
}

/// Low-energy, high-volume nodes repel hardest; they carry bulk
/// without significance and get pushed to the periphery.
pub fn node_repulsion(node: &NodeData, degree: u32) -> f64 {
    let spec = energy_weight(node);
    let volume_boost = 1.0 + volume_weight(node, degree).ln_1p() * 0.15;
    (1.0 - spec) * volume_boost
}

/// Anchor strength toward the seeded position. Significant,
/// well-corroborated nodes move less.
pub fn node_stability(node: &NodeData) -> f64 {
    clamp01(0.35 + 0.45 * energy_weight(node) + 0.2 * clamp01(node.convergence))
}

/// Edge coherence: energy similarity of the endpoints, tempered by
/// the weaker endpoint's convergence.
pub fn edge_coherence(src: &NodeData, tgt: &NodeData) -> f64 {
    let similarity = 1.0 - (energy_weight(src) - energy_weight(tgt)).abs();
    let conv = clamp01(src.convergence).min(clamp01(tgt.convergence));
    clamp01(0.7 * similarity + 0.3 * conv)
}
