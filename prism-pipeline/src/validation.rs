//! Stage-boundary validation and quarantine
//!
//! Invalid objects never abort a run and are never dropped silently:
//! each invalid batch is written to one quarantine file named
//! `<stage_id>_<UTC timestamp>.json` holding `[{object, error}]`.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::warn;

use prism_core::{validate_batch, IntelObject, Rejected};

use crate::state::{atomic_write_json, StoreError};

/// Writes quarantine files under a fixed root directory.
#[derive(Debug, Clone)]
pub struct QuarantineWriter {
    root: PathBuf,
}

impl QuarantineWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, stage_id: &str, now: DateTime<Utc>) -> PathBuf {
        let ts = now.format("%Y%m%dT%H%M%SZ");
        self.root.join(format!("{stage_id}_{ts}.json"))
    }

    /// Write one batch of rejects. Returns the file path when anything
    /// was written.
    pub fn write(
        &self,
        stage_id: &str,
        rejected: &[Rejected],
        now: DateTime<Utc>,
    ) -> Result<Option<PathBuf>, StoreError> {
        if rejected.is_empty() {
            return Ok(None);
        }
        let path = self.file_path(stage_id, now);
        atomic_write_json(&path, &rejected)?;
        warn!(
            stage = stage_id,
            count = rejected.len(),
            path = %path.display(),
            "quarantined invalid objects"
        );
        Ok(Some(path))
    }
}

/// Validate a batch, quarantine the rejects, return the valid half and
/// the reject count.
pub fn validate_and_quarantine(
    objects: Vec<IntelObject>,
    quarantine: &QuarantineWriter,
    stage_id: &str,
    now: DateTime<Utc>,
) -> Result<(Vec<IntelObject>, usize), StoreError> {
    let outcome = validate_batch(objects);
    let rejected = outcome.rejected.len();
    quarantine.write(stage_id, &outcome.rejected, now)?;
    Ok((outcome.valid, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::{Entity, EntityType, Envelope};

    fn entity(id: &str, confidence: Option<f64>) -> IntelObject {
        let mut envelope = Envelope::new(id, Utc::now());
        envelope.confidence = confidence;
        IntelObject::Entity(Entity {
            envelope,
            entity_type: EntityType::Domain,
            name: "example.com".to_string(),
            aliases: Vec::new(),
            evidence: Vec::new(),
        })
    }

    #[test]
    fn test_quarantine_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine = QuarantineWriter::new(dir.path());
        let now = Utc::now();

        let batch = vec![
            entity("e1", Some(0.5)),
            entity("e2", Some(7.0)),
            entity("e3", None),
            entity("e4", Some(-1.0)),
        ];
        let (valid, rejected) =
            validate_and_quarantine(batch, &quarantine, "resolve_identity", now).unwrap();
        assert_eq!(valid.len(), 2);
        assert_eq!(rejected, 2);

        let expected = dir
            .path()
            .join(format!("resolve_identity_{}.json", now.format("%Y%m%dT%H%M%SZ")));
        let raw = std::fs::read_to_string(expected).unwrap();
        let entries: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(entries.as_array().unwrap().len(), 2);
        assert!(entries[0]["error"].as_str().unwrap().contains("confidence"));
        assert_eq!(entries[0]["object"]["type"], "entity");
    }

    #[test]
    fn test_clean_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let quarantine = QuarantineWriter::new(dir.path());
        let (valid, rejected) =
            validate_and_quarantine(vec![entity("e1", None)], &quarantine, "noop", Utc::now())
                .unwrap();
        assert_eq!(valid.len(), 1);
        assert_eq!(rejected, 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
