//! Bundle assembly and file exporters
//!
//! Each exporter writes one artifact independently; a failing exporter
//! is logged and skipped without aborting the others.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use prism_core::{CaseInfo, IntelBundle, IntelObject, Provenance, EvidenceRef, Band};

use crate::state::{atomic_write_json, StoreError};

/// Record of one successfully written export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,
    pub path: String,
}

/// Assemble the bundle envelope around the run's objects.
pub fn build_bundle(
    case_id: &str,
    objects: Vec<IntelObject>,
    producer: &str,
    run_id: &str,
    version: &str,
    toolchain: Vec<String>,
    now: DateTime<Utc>,
) -> IntelBundle {
    IntelBundle {
        version: version.to_string(),
        case: CaseInfo {
            case_id: case_id.to_string(),
            created_at: now,
            name: None,
            tags: Vec::new(),
        },
        provenance: Provenance {
            producer: producer.to_string(),
            produced_at: now,
            toolchain,
            run_id: run_id.to_string(),
        },
        objects,
    }
}

pub fn write_bundle(path: &Path, bundle: &IntelBundle) -> Result<(), StoreError> {
    atomic_write_json(path, bundle)
}

/// Graph exporters hand the canonical graph objects straight through;
/// the graph crate ingests this file for synthesis.
pub fn write_graph_objects(path: &Path, objects: &[IntelObject]) -> Result<(), StoreError> {
    atomic_write_json(path, &objects)
}

/// Flattened view of one timeline event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: String,
    pub event_type: String,
    pub time_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

/// Project the event objects out of a mixed list.
pub fn timeline_entries(objects: &[IntelObject]) -> Vec<TimelineEntry> {
    objects
        .iter()
        .filter_map(|obj| match obj {
            IntelObject::Event(event) => Some(TimelineEntry {
                id: event.envelope.id.clone(),
                event_type: event.event_type.clone(),
                time_start: event.time_start,
                time_end: event.time_end,
                participants: event.participants.clone(),
                band: event.envelope.band,
                confidence: event.envelope.confidence,
                evidence: event.evidence.clone(),
            }),
            _ => None,
        })
        .collect()
}

pub fn write_timeline(path: &Path, objects: &[IntelObject]) -> Result<(), StoreError> {
    atomic_write_json(path, &timeline_entries(objects))
}

/// The manifest is the artifact list verbatim.
pub fn write_artifact_manifest(path: &Path, artifacts: &[IntelObject]) -> Result<(), StoreError> {
    atomic_write_json(path, &artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{validate_bundle, Envelope, Event};

    #[test]
    fn test_bundle_envelope_validates() {
        let bundle = build_bundle(
            "case-9",
            Vec::new(),
            "prism",
            "run-1",
            "1.0.0",
            vec!["prism_osint_spectrum".to_string()],
            Utc::now(),
        );
        assert!(validate_bundle(&bundle).is_ok());
        assert_eq!(bundle.provenance.run_id, "run-1");
    }

    #[test]
    fn test_timeline_projection_keeps_only_events() {
        let now = Utc::now();
        let event = IntelObject::Event(Event {
            envelope: Envelope::new("ev1", now)
                .with_band(Band::Radar)
                .with_confidence(0.6),
            event_type: "INCIDENT_REPORTED".to_string(),
            time_start: now,
            time_end: None,
            participants: Vec::new(),
            evidence: vec![EvidenceRef::new("a1")],
        });
        let entity = IntelObject::Entity(prism_core::Entity {
            envelope: Envelope::new("e1", now),
            entity_type: prism_core::EntityType::Domain,
            name: "example.com".to_string(),
            aliases: Vec::new(),
            evidence: Vec::new(),
        });
        let entries = timeline_entries(&[event, entity]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "INCIDENT_REPORTED");
        assert_eq!(entries[0].band, Some(Band::Radar));
    }
}
