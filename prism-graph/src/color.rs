//! Spectral color mapping
//!
//! The energy index selects a hue from a fixed six-stop gradient;
//! confidence drives saturation and recency drives brightness. The
//! mapping is pure arithmetic so two runs over the same inputs always
//! emit the same hex string.

use crate::math::clamp01;

/// Gradient stops from deep red (low energy) to violet (high energy).
const SPECTRUM_STOPS: [(f64, [f64; 3]); 6] = [
    (0.00, [179.0, 0.0, 0.0]),
    (0.20, [255.0, 122.0, 0.0]),
    (0.40, [140.0, 212.0, 0.0]),
    (0.60, [0.0, 179.0, 255.0]),
    (0.80, [75.0, 44.0, 255.0]),
    (1.00, [127.0, 0.0, 255.0]),
];

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn base_rgb(spectrum_index: f64) -> [f64; 3] {
    let idx = clamp01(spectrum_index);
    for window in SPECTRUM_STOPS.windows(2) {
        let (a_pos, a_rgb) = window[0];
        let (b_pos, b_rgb) = window[1];
        if idx <= b_pos {
            let span = (b_pos - a_pos).max(1e-6);
            let t = (idx - a_pos) / span;
            return [
                lerp(a_rgb[0], b_rgb[0], t),
                lerp(a_rgb[1], b_rgb[1], t),
                lerp(a_rgb[2], b_rgb[2], t),
            ];
        }
    }
    SPECTRUM_STOPS[SPECTRUM_STOPS.len() - 1].1
}

/// Hue component of an RGB triple in [0, 1) space.
fn rgb_to_hue(r: f64, g: f64, b: f64) -> f64 {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    if delta == 0.0 {
        return 0.0;
    }
    let h = if max == r {
        ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        (b - r) / delta + 2.0
    } else {
        (r - g) / delta + 4.0
    };
    h / 6.0
}

/// HSV to RGB, all components in [0, 1].
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> [f64; 3] {
    if s == 0.0 {
        return [v, v, v];
    }
    let h6 = (h.rem_euclid(1.0)) * 6.0;
    let i = h6.floor() as i64 % 6;
    let f = h6 - h6.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match i {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Deterministic `#rrggbb` for a node.
pub fn spectrum_color(spectrum_index: f64, confidence: f64, recency: f64) -> String {
    let base = base_rgb(spectrum_index);
    let hue = rgb_to_hue(base[0] / 255.0, base[1] / 255.0, base[2] / 255.0);
    let sat = clamp01(0.35 + 0.65 * clamp01(confidence));
    let val = clamp01(0.25 + 0.75 * clamp01(recency));
    let rgb = hsv_to_rgb(hue, sat, val);
    format!(
        "#{:02x}{:02x}{:02x}",
        (rgb[0] * 255.0) as u8,
        (rgb[1] * 255.0) as u8,
        (rgb[2] * 255.0) as u8
    )
}

/// Average two hex colors channel-wise; used for edge tinting.
pub fn blend_hex(a: &str, b: &str) -> String {
    let pa = parse_hex(a).unwrap_or([34, 211, 238]);
    let pb = parse_hex(b).unwrap_or([34, 211, 238]);
    format!(
        "#{:02x}{:02x}{:02x}",
        ((pa[0] as u16 + pb[0] as u16) / 2) as u8,
        ((pa[1] as u16 + pb[1] as u16) / 2) as u8,
        ((pa[2] as u16 + pb[2] as u16) / 2) as u8
    )
}

fn parse_hex(value: &str) -> Option<[u8; 3]> {
    let text = value.trim().trim_start_matches('#');
    if text.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&text[0..2], 16).ok()?;
    let g = u8::from_str_radix(&text[2..4], 16).ok()?;
    let b = u8::from_str_radix(&text[4..6], 16).ok()?;
    Some([r, g, b])
}
