//! Declarative stage plan
//!
//! A plan is an ordered list of stages; each stage names the context
//! keys it reads and the keys it may write. The runner executes the
//! list strictly in order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use prism_core::{Band, ScoringConfig};

use crate::error::PipelineError;

/// Closed set of stage handler kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Validate,
    Collect,
    Extract,
    Resolve,
    Track,
    Score,
    Build,
    Export,
}

/// One exporter entry of an export stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSpec {
    pub name: String,
    pub path: String,
}

/// One stage of the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StageKind,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub collectors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scoring: Option<ScoringConfig>,
    #[serde(default)]
    pub exporters: Vec<ExporterSpec>,
}

impl StageSpec {
    /// Collector tags as a set for group membership checks.
    pub fn collector_set(&self) -> HashSet<&str> {
        self.collectors.iter().map(String::as_str).collect()
    }
}

/// The whole pipeline plan document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "default_pipeline_id")]
    pub pipeline_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub stages: Vec<StageSpec>,
}

fn default_pipeline_id() -> String {
    "prism".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Plan {
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::PlanNotFound {
                path: path.display().to_string(),
            });
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parses_with_defaults() {
        let raw = r#"{
            "pipeline_id": "prism_osint_spectrum",
            "stages": [
                {"id": "seed_validate", "type": "validate", "inputs": ["seed"], "outputs": ["validated_targets"]},
                {"id": "collect_posts", "type": "collect", "inputs": ["validated_targets"],
                 "outputs": ["artifacts_visible"], "collectors": ["posts"], "band": "VISIBLE"},
                {"id": "score_all", "type": "score", "inputs": ["entities"], "outputs": ["scored_objects"],
                 "scoring": {"confidence_rules": {"evidence_count_boost": 0.05}}}
            ]
        }"#;
        let plan = Plan::from_json(raw).unwrap();
        assert_eq!(plan.version, "1.0.0");
        assert_eq!(plan.stages.len(), 3);
        assert_eq!(plan.stages[1].kind, StageKind::Collect);
        assert_eq!(plan.stages[1].band, Some(Band::Visible));
        let scoring = plan.stages[2].scoring.as_ref().unwrap();
        assert_eq!(scoring.confidence_rules.evidence_count_boost, 0.05);
    }

    #[test]
    fn test_unknown_stage_kind_rejected() {
        let raw = r#"{"stages": [{"id": "x", "type": "transmogrify"}]}"#;
        assert!(Plan::from_json(raw).is_err());
    }
}
