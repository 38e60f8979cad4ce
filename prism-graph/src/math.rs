//! Deterministic numeric helpers shared by the energy model, the
//! synthesizer, and the layout engine.
//!
//! Nothing in this module draws from a random source. Jitter and
//! tie-breaking are derived from stable string hashes so that two runs
//! over the same ids produce bit-identical output.

use sha2::{Digest, Sha256};

/// Clamp to [0, 1]; non-finite values collapse to 0.
pub fn clamp01(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Saturating count normalization: `1 - e^(-v / scale)`.
pub fn norm_count(value: f64, scale: f64) -> f64 {
    if scale <= 0.0 {
        return 0.0;
    }
    1.0 - (-value.max(0.0) / scale).exp()
}

/// Half-life decay from an epoch-seconds timestamp.
///
/// A missing or non-positive timestamp scores a neutral 0.5 rather
/// than fully stale, so unstamped records stay visible.
pub fn recency_factor(ts_secs: f64, now_secs: f64, half_life_hours: f64) -> f64 {
    if ts_secs <= 0.0 {
        return 0.5;
    }
    let age_hours = ((now_secs - ts_secs) / 3600.0).max(0.0);
    (-std::f64::consts::LN_2 * age_hours / half_life_hours).exp()
}

/// Normalize a confidence that may be on a 0-100 scale.
pub fn extract_confidence(value: f64) -> f64 {
    if value > 1.0 {
        clamp01(value / 100.0)
    } else {
        clamp01(value)
    }
}

/// 32-bit string hash (the `((h << 5) - h) + ch` rolling form).
///
/// Used for percentile tie-breaking and unit jitter; stability across
/// runs and platforms matters more than distribution quality here.
pub fn stable_hash(text: &str) -> u32 {
    let mut h: u32 = 0;
    for ch in text.chars() {
        h = h.wrapping_shl(5).wrapping_sub(h).wrapping_add(ch as u32);
    }
    h
}

/// Deterministic value in [0, 1) keyed on `salt:text`.
pub fn hash_unit(text: &str, salt: &str) -> f64 {
    f64::from(stable_hash(&format!("{salt}:{text}")) % 100_000) / 100_000.0
}

/// Deterministic value in [lo, hi] keyed on `salt:key`, with more
/// entropy than [`hash_unit`]. Used for position jitter.
pub fn hash_float(key: &str, salt: &str, lo: f64, hi: f64) -> f64 {
    let digest = Sha256::digest(format!("{salt}:{key}").as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let n = u64::from_be_bytes(bytes) as f64 / u64::MAX as f64;
    lo + (hi - lo) * n
}

/// Map raw values to percentile ranks in [0, 1].
///
/// Equal values are ordered by the stable hash of their key, so the
/// ranking never depends on input order. A single value ranks 0.5.
pub fn percentile_normalize(values: &[f64], keys: &[&str]) -> Vec<f64> {
    let n = values.len();
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![0.5];
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        values[a]
            .total_cmp(&values[b])
            .then_with(|| stable_hash(keys[a]).cmp(&stable_hash(keys[b])))
    });
    let mut ranks = vec![0.0; n];
    let denom = (n - 1) as f64;
    for (rank, &idx) in order.iter().enumerate() {
        ranks[idx] = rank as f64 / denom;
    }
    ranks
}

/// Round to `places` decimal places.
pub fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp01_bounds() {
        assert_eq!(clamp01(-0.5), 0.0);
        assert_eq!(clamp01(1.5), 1.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
        assert_eq!(clamp01(0.42), 0.42);
    }

    #[test]
    fn test_recency_half_life() {
        let now = 1_700_000_000.0;
        let fresh = recency_factor(now, now, 48.0);
        let half = recency_factor(now - 48.0 * 3600.0, now, 48.0);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!((half - 0.5).abs() < 1e-9);
        assert_eq!(recency_factor(0.0, now, 48.0), 0.5);
    }

    #[test]
    fn test_extract_confidence_scales_percentages() {
        assert_eq!(extract_confidence(85.0), 0.85);
        assert_eq!(extract_confidence(0.85), 0.85);
        assert_eq!(extract_confidence(150.0), 1.0);
    }

    #[test]
    fn test_percentile_tie_break_is_order_independent() {
        let values = [0.5, 0.5, 0.5];
        let keys = ["a", "b", "c"];
        let forward = percentile_normalize(&values, &keys);

        let rev_values = [0.5, 0.5, 0.5];
        let rev_keys = ["c", "b", "a"];
        let reversed = percentile_normalize(&rev_values, &rev_keys);

        // Same key must land on the same rank regardless of input order.
        assert_eq!(forward[0], reversed[2]);
        assert_eq!(forward[1], reversed[1]);
        assert_eq!(forward[2], reversed[0]);
    }

    #[test]
    fn test_percentile_degenerate_sizes() {
        assert!(percentile_normalize(&[], &[]).is_empty());
        assert_eq!(percentile_normalize(&[3.0], &["x"]), vec![0.5]);
    }

    #[test]
    fn test_hash_float_is_stable_and_bounded() {
        let a = hash_float("node-1", "jitter", -90.0, 90.0);
        let b = hash_float("node-1", "jitter", -90.0, 90.0);
        assert_eq!(a, b);
        assert!((-90.0..=90.0).contains(&a));
        assert_ne!(a, hash_float("node-2", "jitter", -90.0, 90.0));
    }
}
