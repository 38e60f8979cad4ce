//! Band/confidence scoring engine
//!
//! A pure function over (objects, band-weight table, edge-weight
//! table, confidence-rule constants). Confidence grows with distinct
//! evidence artifacts and cross-band corroboration, shrinks on
//! contradiction, is multiplied by the band weight, and is always
//! clamped to the band's confidence cap.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::{band_weight, confidence_cap, Band, ClaimType, IntelObject};

/// Additive/subtractive confidence constants. All default to zero so
/// an empty stage config scores by band weight alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfidenceRules {
    #[serde(default)]
    pub evidence_count_boost: f64,
    #[serde(default)]
    pub cross_band_boost: f64,
    #[serde(default)]
    pub contradiction_penalty: f64,
}

/// Base weight for one edge type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeWeightRule {
    pub edge_type: String,
    pub base: f64,
}

/// Full scoring configuration, deserialized from the stage plan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Overrides for the built-in band weight table.
    #[serde(default)]
    pub band_weights: HashMap<Band, f64>,
    #[serde(default)]
    pub edge_weight_rules: Vec<EdgeWeightRule>,
    #[serde(default)]
    pub confidence_rules: ConfidenceRules,
}

impl ScoringConfig {
    fn band_weight(&self, band: Option<Band>) -> f64 {
        match band {
            Some(b) => self.band_weights.get(&b).copied().unwrap_or_else(|| b.weight()),
            None => band_weight(None),
        }
    }

    fn edge_base(&self, edge_type: &str, fallback: f64) -> f64 {
        self.edge_weight_rules
            .iter()
            .find(|r| r.edge_type == edge_type)
            .map(|r| r.base)
            .unwrap_or(fallback)
    }
}

/// Index from object id to band, built from already-banded objects.
pub type BandIndex = HashMap<String, Band>;

pub fn build_band_index<'a, I>(objects: I) -> BandIndex
where
    I: IntoIterator<Item = &'a IntelObject>,
{
    let mut index = BandIndex::new();
    for obj in objects {
        if let Some(band) = obj.band() {
            index.insert(obj.id().to_string(), band);
        }
    }
    index
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Score a batch in place. Every object ends up with a band-capped
/// confidence; edges additionally get a semantic base weight scaled by
/// `1 + ln(1 + band_weight)`.
pub fn score_objects(objects: &mut [IntelObject], config: &ScoringConfig, bands: &BandIndex) {
    let rules = &config.confidence_rules;

    for obj in objects.iter_mut() {
        let band = obj
            .band()
            .or_else(|| bands.get(obj.id()).copied());
        let band_w = config.band_weight(band);

        let base = obj.confidence().unwrap_or(0.5).clamp(0.0, 1.0);

        let evidence_ids: HashSet<&str> = obj
            .evidence()
            .iter()
            .map(|e| e.artifact_id.as_str())
            .filter(|id| !id.is_empty())
            .collect();
        let evidence_count = evidence_ids.len();

        let mut confidence = base + evidence_count as f64 * rules.evidence_count_boost;

        let evidence_bands: HashSet<Band> = evidence_ids
            .iter()
            .filter_map(|id| bands.get(*id).copied())
            .collect();
        if evidence_bands.len() > 1 {
            confidence += rules.cross_band_boost;
        }

        if let IntelObject::Claim(claim) = &*obj {
            if claim.claim_type == ClaimType::Denial {
                confidence -= rules.contradiction_penalty;
            }
        }

        confidence *= band_w;
        confidence = confidence.clamp(0.0, confidence_cap(band));
        debug!(
            id = obj.id(),
            kind = obj.kind(),
            evidence_count,
            confidence,
            "scored object"
        );

        let envelope = obj.envelope_mut();
        envelope.confidence = Some(round_to(confidence, 4));
        if envelope.band.is_none() {
            envelope.band = band;
        }

        if let IntelObject::Edge(edge) = obj {
            // Unruled edge types keep their existing weight as the
            // base; only a missing or zero weight falls back to 10.
            let fallback = if edge.weight > 0.0 { edge.weight } else { 10.0 };
            let base = config.edge_base(&edge.edge_type, fallback);
            edge.weight = round_to(base * (1.0 + (1.0 + band_w).ln()), 3);
        }
    }
}

/// Dominant band across a batch, for labeling merged outputs.
pub fn dominant_band_for_objects(objects: &[IntelObject]) -> Option<Band> {
    crate::dominant_band(objects.iter().filter_map(|o| o.band()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Claim, Entity, EntityType, Envelope, EvidenceRef};
    use chrono::Utc;

    fn rules() -> ScoringConfig {
        ScoringConfig {
            band_weights: HashMap::new(),
            edge_weight_rules: vec![EdgeWeightRule {
                edge_type: "CO_OCCURS_WITH".to_string(),
                base: 45.0,
            }],
            confidence_rules: ConfidenceRules {
                evidence_count_boost: 0.05,
                cross_band_boost: 0.1,
                contradiction_penalty: 0.2,
            },
        }
    }

    fn entity(id: &str, band: Band, conf: f64, evidence: Vec<EvidenceRef>) -> IntelObject {
        IntelObject::Entity(Entity {
            envelope: Envelope::new(id, Utc::now())
                .with_band(band)
                .with_confidence(conf),
            entity_type: EntityType::Domain,
            name: id.to_string(),
            aliases: Vec::new(),
            evidence,
        })
    }

    #[test]
    fn test_confidence_clamped_to_band_cap() {
        let mut objects = vec![entity(
            "e1",
            Band::Visible,
            0.9,
            vec![EvidenceRef::new("a1"), EvidenceRef::new("a2")],
        )];
        score_objects(&mut objects, &rules(), &BandIndex::new());
        let conf = objects[0].confidence().unwrap();
        assert!(conf <= Band::Visible.confidence_cap());
        assert!(conf >= 0.0);
    }

    #[test]
    fn test_evidence_count_uses_distinct_artifacts() {
        let dup = vec![EvidenceRef::new("a1"), EvidenceRef::new("a1")];
        let distinct = vec![EvidenceRef::new("a1"), EvidenceRef::new("a2")];
        let mut with_dup = vec![entity("e1", Band::Gamma, 0.3, dup)];
        let mut with_distinct = vec![entity("e1", Band::Gamma, 0.3, distinct)];
        score_objects(&mut with_dup, &rules(), &BandIndex::new());
        score_objects(&mut with_distinct, &rules(), &BandIndex::new());
        assert!(with_distinct[0].confidence().unwrap() > with_dup[0].confidence().unwrap());
    }

    #[test]
    fn test_cross_band_boost_applied() {
        let mut bands = BandIndex::new();
        bands.insert("a1".to_string(), Band::Visible);
        bands.insert("a2".to_string(), Band::Xray);
        let evidence = vec![EvidenceRef::new("a1"), EvidenceRef::new("a2")];

        let mut cross = vec![entity("e1", Band::Gamma, 0.2, evidence.clone())];
        score_objects(&mut cross, &rules(), &bands);

        let mut single_bands = BandIndex::new();
        single_bands.insert("a1".to_string(), Band::Visible);
        single_bands.insert("a2".to_string(), Band::Visible);
        let mut same = vec![entity("e1", Band::Gamma, 0.2, evidence)];
        score_objects(&mut same, &rules(), &single_bands);

        assert!(cross[0].confidence().unwrap() > same[0].confidence().unwrap());
    }

    #[test]
    fn test_denial_claim_penalized() {
        let claim = |claim_type| {
            IntelObject::Claim(Claim {
                envelope: Envelope::new("c1", Utc::now())
                    .with_band(Band::Gamma)
                    .with_confidence(0.5),
                text: "actor denies involvement".to_string(),
                claim_type,
                about: Vec::new(),
                evidence: Vec::new(),
            })
        };
        let mut denial = vec![claim(ClaimType::Denial)];
        let mut assertion = vec![claim(ClaimType::Assertion)];
        score_objects(&mut denial, &rules(), &BandIndex::new());
        score_objects(&mut assertion, &rules(), &BandIndex::new());
        assert!(denial[0].confidence().unwrap() < assertion[0].confidence().unwrap());
    }

    #[test]
    fn test_unruled_edge_type_keeps_existing_weight_as_base() {
        let edge = |weight| {
            IntelObject::Edge(crate::Edge {
                envelope: Envelope::new("edge-1", Utc::now()).with_band(Band::Gamma),
                from_id: "e1".to_string(),
                to_id: "e2".to_string(),
                edge_type: "MENTIONS".to_string(),
                weight,
                evidence: Vec::new(),
            })
        };
        let scale = 1.0 + (1.0f64 + Band::Gamma.weight()).ln();

        let mut small = vec![edge(5.0)];
        score_objects(&mut small, &rules(), &BandIndex::new());
        if let IntelObject::Edge(e) = &small[0] {
            assert!((e.weight - round_to(5.0 * scale, 3)).abs() < 1e-9);
        } else {
            panic!("expected edge");
        }

        let mut zero = vec![edge(0.0)];
        score_objects(&mut zero, &rules(), &BandIndex::new());
        if let IntelObject::Edge(e) = &zero[0] {
            assert!((e.weight - round_to(10.0 * scale, 3)).abs() < 1e-9);
        } else {
            panic!("expected edge");
        }
    }

    #[test]
    fn test_edge_weight_from_rule() {
        let mut objects = vec![IntelObject::Edge(crate::Edge {
            envelope: Envelope::new("edge-1", Utc::now()).with_band(Band::Gamma),
            from_id: "e1".to_string(),
            to_id: "e2".to_string(),
            edge_type: "CO_OCCURS_WITH".to_string(),
            weight: 1.0,
            evidence: Vec::new(),
        })];
        score_objects(&mut objects, &rules(), &BandIndex::new());
        if let IntelObject::Edge(edge) = &objects[0] {
            let expected = 45.0 * (1.0 + (1.0f64 + Band::Gamma.weight()).ln());
            assert!((edge.weight - round_to(expected, 3)).abs() < 1e-9);
        } else {
            panic!("expected edge");
        }
    }
}
