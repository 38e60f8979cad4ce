//! Reliability bands for intel sources
//!
//! Every source and object carries an optional band: a categorical
//! reliability tier named after a radio/EM band. Each band maps to a
//! numeric weight (scoring multiplier), a priority rank (dominant-band
//! selection across mixed evidence), and a confidence ceiling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The ten reliability bands, highest-gain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Band {
    Gamma,
    Xray,
    Uv,
    Ir,
    Radar,
    Fm,
    Tv,
    Shortwave,
    Visible,
    Am,
}

impl Band {
    pub const ALL: [Band; 10] = [
        Band::Gamma,
        Band::Xray,
        Band::Uv,
        Band::Ir,
        Band::Radar,
        Band::Fm,
        Band::Tv,
        Band::Shortwave,
        Band::Visible,
        Band::Am,
    ];

    /// Scoring weight multiplier for this band.
    pub fn weight(self) -> f64 {
        match self {
            Band::Gamma => 1.9,
            Band::Xray => 1.6,
            Band::Uv => 1.3,
            Band::Ir => 1.3,
            Band::Radar => 1.2,
            Band::Fm => 1.4,
            Band::Tv => 0.9,
            Band::Shortwave => 1.1,
            Band::Visible => 1.0,
            Band::Am => 0.6,
        }
    }

    /// Rank used when picking the dominant band of a mixed set.
    pub fn priority(self) -> u8 {
        match self {
            Band::Gamma => 10,
            Band::Xray => 9,
            Band::Uv => 8,
            Band::Ir => 7,
            Band::Radar => 6,
            Band::Fm => 5,
            Band::Tv => 4,
            Band::Shortwave => 3,
            Band::Visible => 2,
            Band::Am => 1,
        }
    }

    /// Maximum confidence an object in this band may carry.
    pub fn confidence_cap(self) -> f64 {
        match self {
            Band::Gamma => 1.0,
            Band::Xray => 1.0,
            Band::Uv => 0.95,
            Band::Ir => 0.95,
            Band::Radar => 0.9,
            Band::Fm => 0.9,
            Band::Tv => 0.85,
            Band::Shortwave => 0.85,
            Band::Visible => 0.75,
            Band::Am => 0.6,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Band::Gamma => "GAMMA",
            Band::Xray => "XRAY",
            Band::Uv => "UV",
            Band::Ir => "IR",
            Band::Radar => "RADAR",
            Band::Fm => "FM",
            Band::Tv => "TV",
            Band::Shortwave => "SHORTWAVE",
            Band::Visible => "VISIBLE",
            Band::Am => "AM",
        }
    }

    /// Largest weight in the table, for normalizing weights to [0, 1].
    pub fn max_weight() -> f64 {
        Band::ALL
            .iter()
            .map(|b| b.weight())
            .fold(f64::MIN, f64::max)
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Band {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GAMMA" => Ok(Band::Gamma),
            "XRAY" => Ok(Band::Xray),
            "UV" => Ok(Band::Uv),
            "IR" => Ok(Band::Ir),
            "RADAR" => Ok(Band::Radar),
            "FM" => Ok(Band::Fm),
            "TV" => Ok(Band::Tv),
            "SHORTWAVE" => Ok(Band::Shortwave),
            "VISIBLE" => Ok(Band::Visible),
            "AM" => Ok(Band::Am),
            _ => Err(()),
        }
    }
}

/// Weight for an optional band; unbanded objects score neutrally.
pub fn band_weight(band: Option<Band>) -> f64 {
    band.map(Band::weight).unwrap_or(1.0)
}

/// Confidence cap for an optional band; unbanded objects are uncapped.
pub fn confidence_cap(band: Option<Band>) -> f64 {
    band.map(Band::confidence_cap).unwrap_or(1.0)
}

/// Highest-priority band across a mixed set, if any.
pub fn dominant_band<I>(bands: I) -> Option<Band>
where
    I: IntoIterator<Item = Band>,
{
    bands.into_iter().max_by_key(|b| b.priority())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dominant_band_prefers_priority() {
        let dominant = dominant_band([Band::Am, Band::Visible, Band::Xray, Band::Fm]);
        assert_eq!(dominant, Some(Band::Xray));
    }

    #[test]
    fn test_dominant_band_empty() {
        assert_eq!(dominant_band([]), None);
    }

    #[test]
    fn test_caps_never_exceed_one() {
        for band in Band::ALL {
            assert!(band.confidence_cap() <= 1.0);
            assert!(band.confidence_cap() > 0.0);
        }
    }

    #[test]
    fn test_parse_roundtrip() {
        for band in Band::ALL {
            assert_eq!(band.as_str().parse::<Band>(), Ok(band));
        }
        assert!("microwave".parse::<Band>().is_err());
    }

    #[test]
    fn test_serde_uppercase() {
        let json = serde_json::to_string(&Band::Shortwave).unwrap();
        assert_eq!(json, "\"SHORTWAVE\"");
    }
}
