//! Structural validation for canonical objects and intel bundles
//!
//! Validation never aborts a batch: [`validate_batch`] partitions into
//! valid and rejected halves so callers can quarantine the rejects and
//! keep going. Bundle validation is stricter and also checks that
//! evidence references resolve inside the bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::{confidence_cap, IntelObject};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("object has an empty id")]
    EmptyId,

    #[error("confidence {value} outside [0, {cap}] for {id}")]
    ConfidenceOutOfRange { id: String, value: f64, cap: f64 },

    #[error("artifact {id} missing required field {field}")]
    MissingField { id: String, field: &'static str },

    #[error("edge {id} has an empty endpoint")]
    EmptyEndpoint { id: String },

    #[error("edge {id} has negative weight {weight}")]
    NegativeWeight { id: String, weight: f64 },

    #[error("cluster {id} has no members")]
    EmptyCluster { id: String },

    #[error("event {id} ends before it starts")]
    InvertedInterval { id: String },

    #[error("object {id} carries an empty evidence reference")]
    EmptyEvidenceRef { id: String },

    #[error("bundle case_id is empty")]
    EmptyCaseId,

    #[error("bundle provenance has an empty {field}")]
    EmptyProvenance { field: &'static str },

    #[error("evidence {artifact_id} referenced by {id} not present in bundle")]
    DanglingEvidence { id: String, artifact_id: String },

    #[error("duplicate object id {id} in bundle")]
    DuplicateId { id: String },
}

/// One rejected object paired with the reason, for quarantine files.
#[derive(Debug, Clone, Serialize)]
pub struct Rejected {
    pub object: IntelObject,
    pub error: String,
}

/// Partition produced by [`validate_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub valid: Vec<IntelObject>,
    pub rejected: Vec<Rejected>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Case metadata carried on every exported bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseInfo {
    pub case_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Who produced a bundle and under which run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub producer: String,
    pub produced_at: DateTime<Utc>,
    pub toolchain: Vec<String>,
    pub run_id: String,
}

/// The exported intel bundle envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelBundle {
    pub version: String,
    pub case: CaseInfo,
    pub provenance: Provenance,
    pub objects: Vec<IntelObject>,
}

fn check_evidence(obj: &IntelObject) -> Result<(), SchemaError> {
    for evidence in obj.evidence() {
        if evidence.artifact_id.trim().is_empty() {
            return Err(SchemaError::EmptyEvidenceRef {
                id: obj.id().to_string(),
            });
        }
    }
    Ok(())
}

/// Structural checks for a single object.
pub fn validate_object(obj: &IntelObject) -> Result<(), SchemaError> {
    let envelope = obj.envelope();
    if envelope.id.trim().is_empty() {
        return Err(SchemaError::EmptyId);
    }
    if let Some(conf) = envelope.confidence {
        let cap = confidence_cap(envelope.band);
        if !(0.0..=cap).contains(&conf) || !conf.is_finite() {
            return Err(SchemaError::ConfidenceOutOfRange {
                id: envelope.id.clone(),
                value: conf,
                cap,
            });
        }
    }
    check_evidence(obj)?;

    match obj {
        IntelObject::Artifact(artifact) => {
            if artifact.uri.trim().is_empty() {
                return Err(SchemaError::MissingField {
                    id: artifact.envelope.id.clone(),
                    field: "uri",
                });
            }
            if artifact.content_type.trim().is_empty() {
                return Err(SchemaError::MissingField {
                    id: artifact.envelope.id.clone(),
                    field: "content_type",
                });
            }
            if artifact.source.platform.trim().is_empty() {
                return Err(SchemaError::MissingField {
                    id: artifact.envelope.id.clone(),
                    field: "source.platform",
                });
            }
        }
        IntelObject::Edge(edge) => {
            if edge.from_id.trim().is_empty() || edge.to_id.trim().is_empty() {
                return Err(SchemaError::EmptyEndpoint {
                    id: edge.envelope.id.clone(),
                });
            }
            if edge.weight < 0.0 || !edge.weight.is_finite() {
                return Err(SchemaError::NegativeWeight {
                    id: edge.envelope.id.clone(),
                    weight: edge.weight,
                });
            }
        }
        IntelObject::Cluster(cluster) => {
            if cluster.members.is_empty() {
                return Err(SchemaError::EmptyCluster {
                    id: cluster.envelope.id.clone(),
                });
            }
        }
        IntelObject::Event(event) => {
            if let Some(end) = event.time_end {
                if end < event.time_start {
                    return Err(SchemaError::InvertedInterval {
                        id: event.envelope.id.clone(),
                    });
                }
            }
        }
        IntelObject::Claim(claim) => {
            if claim.text.trim().is_empty() {
                return Err(SchemaError::MissingField {
                    id: claim.envelope.id.clone(),
                    field: "text",
                });
            }
        }
        IntelObject::Entity(entity) => {
            if entity.name.trim().is_empty() {
                return Err(SchemaError::MissingField {
                    id: entity.envelope.id.clone(),
                    field: "name",
                });
            }
        }
        IntelObject::Signal(_) => {}
    }
    Ok(())
}

/// Validate a batch without dropping anything: every input ends up in
/// exactly one half of the outcome.
pub fn validate_batch(objects: Vec<IntelObject>) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for obj in objects {
        match validate_object(&obj) {
            Ok(()) => outcome.valid.push(obj),
            Err(err) => outcome.rejected.push(Rejected {
                object: obj,
                error: err.to_string(),
            }),
        }
    }
    outcome
}

/// Stricter whole-bundle validation for export.
pub fn validate_bundle(bundle: &IntelBundle) -> Result<(), SchemaError> {
    if bundle.case.case_id.trim().is_empty() {
        return Err(SchemaError::EmptyCaseId);
    }
    if bundle.provenance.producer.trim().is_empty() {
        return Err(SchemaError::EmptyProvenance { field: "producer" });
    }
    if bundle.provenance.run_id.trim().is_empty() {
        return Err(SchemaError::EmptyProvenance { field: "run_id" });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut artifact_ids: HashSet<&str> = HashSet::new();
    for obj in &bundle.objects {
        validate_object(obj)?;
        if !seen.insert(obj.id()) {
            return Err(SchemaError::DuplicateId {
                id: obj.id().to_string(),
            });
        }
        if matches!(obj, IntelObject::Artifact(_)) {
            artifact_ids.insert(obj.id());
        }
    }

    for obj in &bundle.objects {
        for evidence in obj.evidence() {
            if !artifact_ids.contains(evidence.artifact_id.as_str()) {
                return Err(SchemaError::DanglingEvidence {
                    id: obj.id().to_string(),
                    artifact_id: evidence.artifact_id.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Artifact, Band, Edge, Entity, EntityType, Envelope, EvidenceRef, Event, SourceRef,
    };

    fn artifact(id: &str) -> IntelObject {
        IntelObject::Artifact(Artifact {
            envelope: Envelope::new(id, Utc::now()).with_band(Band::Visible),
            uri: "https://example.com/post/1".to_string(),
            captured_at: Utc::now(),
            content_type: "text/plain".to_string(),
            source: SourceRef {
                platform: "reddit".to_string(),
                collection_method: "scrape".to_string(),
                channel: None,
                account_handle: None,
            },
            hashes: None,
            size_bytes: None,
        })
    }

    fn entity(id: &str, evidence: Vec<EvidenceRef>) -> IntelObject {
        IntelObject::Entity(Entity {
            envelope: Envelope::new(id, Utc::now())
                .with_band(Band::Gamma)
                .with_confidence(0.8),
            entity_type: EntityType::Domain,
            name: "example.com".to_string(),
            aliases: Vec::new(),
            evidence,
        })
    }

    fn bundle(objects: Vec<IntelObject>) -> IntelBundle {
        IntelBundle {
            version: "1.0".to_string(),
            case: CaseInfo {
                case_id: "case-7".to_string(),
                created_at: Utc::now(),
                name: None,
                tags: Vec::new(),
            },
            provenance: Provenance {
                producer: "prism".to_string(),
                produced_at: Utc::now(),
                toolchain: vec!["prism-pipeline".to_string()],
                run_id: "run-1".to_string(),
            },
            objects,
        }
    }

    #[test]
    fn test_batch_partitions_without_loss() {
        let mut bad = entity("e-bad", Vec::new());
        bad.envelope_mut().confidence = Some(3.0);
        let outcome = validate_batch(vec![artifact("a1"), bad, entity("e1", Vec::new())]);
        assert_eq!(outcome.valid.len(), 2);
        assert_eq!(outcome.rejected.len(), 1);
        assert!(outcome.rejected[0].error.contains("confidence"));
    }

    #[test]
    fn test_confidence_checked_against_band_cap() {
        let mut over_cap = entity("e1", Vec::new());
        over_cap.envelope_mut().band = Some(Band::Am);
        over_cap.envelope_mut().confidence = Some(0.7);
        assert!(matches!(
            validate_object(&over_cap),
            Err(SchemaError::ConfidenceOutOfRange { .. })
        ));
    }

    #[test]
    fn test_edge_endpoints_required() {
        let edge = IntelObject::Edge(Edge {
            envelope: Envelope::new("edge-1", Utc::now()),
            from_id: String::new(),
            to_id: "e2".to_string(),
            edge_type: "CO_OCCURS_WITH".to_string(),
            weight: 45.0,
            evidence: Vec::new(),
        });
        assert!(matches!(
            validate_object(&edge),
            Err(SchemaError::EmptyEndpoint { .. })
        ));
    }

    #[test]
    fn test_inverted_event_interval_rejected() {
        let start = Utc::now();
        let event = IntelObject::Event(Event {
            envelope: Envelope::new("ev-1", start),
            event_type: "POST_PUBLISHED".to_string(),
            time_start: start,
            time_end: Some(start - chrono::Duration::hours(1)),
            participants: Vec::new(),
            evidence: Vec::new(),
        });
        assert!(matches!(
            validate_object(&event),
            Err(SchemaError::InvertedInterval { .. })
        ));
    }

    #[test]
    fn test_bundle_rejects_dangling_evidence() {
        let bad = bundle(vec![
            artifact("a1"),
            entity("e1", vec![EvidenceRef::new("a-missing")]),
        ]);
        assert!(matches!(
            validate_bundle(&bad),
            Err(SchemaError::DanglingEvidence { .. })
        ));

        let good = bundle(vec![artifact("a1"), entity("e1", vec![EvidenceRef::new("a1")])]);
        assert!(validate_bundle(&good).is_ok());
    }

    #[test]
    fn test_bundle_rejects_duplicate_ids() {
        let dup = bundle(vec![artifact("a1"), artifact("a1")]);
        assert!(matches!(
            validate_bundle(&dup),
            Err(SchemaError::DuplicateId { .. })
        ));
    }
}
