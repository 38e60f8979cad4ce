//! Sequential pipeline runner
//!
//! Executes the plan's stages strictly in order over a single owned
//! context. Stage outputs are validated (rejects quarantined) before
//! commit; a handler error aborts the run before anything from that
//! stage reaches the context.

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use prism_adapters::{CollectedBatch, Seed, Signal};
use prism_core::{validate_bundle, IntelObject};

use crate::context::{Context, StageOutputs};
use crate::error::PipelineError;
use crate::export::{
    build_bundle, write_artifact_manifest, write_bundle, write_graph_objects, write_timeline,
    ExportRecord,
};
use crate::handlers;
use crate::plan::{Plan, StageKind, StageSpec};
use crate::state::{RecordStore, SnapshotStore};
use crate::validation::{validate_and_quarantine, QuarantineWriter};

/// Live collection boundary. Implementations own their retries and
/// rate limits; a cycle that fails entirely just returns an empty
/// batch. `Send` so a runner holding one can execute off-thread.
pub trait LiveSource: Send {
    fn collect(&mut self, targets: &[Signal]) -> CollectedBatch;
}

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub retention_days: i64,
    pub live_collect: bool,
    pub run_id: String,
    pub producer: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            retention_days: 30,
            live_collect: false,
            run_id: "prism-pipeline".to_string(),
            producer: "prism".to_string(),
        }
    }
}

/// Per-stage commit summary.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub id: String,
    pub committed: BTreeMap<String, usize>,
    pub quarantined: usize,
}

/// Whole-run summary returned to the caller.
#[derive(Debug, Default)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub exports: Vec<ExportRecord>,
    pub bundle_written: bool,
}

pub struct Runner {
    plan: Plan,
    seed: Seed,
    output_root: PathBuf,
    config: RunnerConfig,
    records: RecordStore,
    snapshots: SnapshotStore,
    quarantine: QuarantineWriter,
    live: Option<Box<dyn LiveSource>>,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan: Plan,
        seed: Seed,
        output_root: impl Into<PathBuf>,
        config: RunnerConfig,
        records: RecordStore,
        snapshots: SnapshotStore,
        quarantine: QuarantineWriter,
    ) -> Self {
        Self {
            plan,
            seed,
            output_root: output_root.into(),
            config,
            records,
            snapshots,
            quarantine,
            live: None,
        }
    }

    /// Attach a live collection source, used when `live_collect` is set.
    pub fn with_live_source(mut self, live: Box<dyn LiveSource>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn run(&mut self) -> Result<RunReport, PipelineError> {
        let mut context = Context::new();
        let mut report = RunReport::default();
        let stages = self.plan.stages.clone();

        for stage in &stages {
            info!(stage = %stage.id, kind = ?stage.kind, "running stage");
            let now = Utc::now();

            let outputs = match stage.kind {
                StageKind::Validate => handlers::validate_stage(stage, &self.seed, now),
                StageKind::Collect => self.run_collect(stage, &context)?,
                StageKind::Extract => handlers::extract_stage(stage, &context),
                StageKind::Resolve => handlers::resolve_stage(stage, &context, now),
                StageKind::Track => {
                    let previous = self.snapshots.load()?;
                    let (outputs, next) = handlers::track_stage(stage, &context, &previous);
                    self.snapshots.save(&next)?;
                    outputs
                }
                StageKind::Score => handlers::score_stage(stage, &context),
                StageKind::Build => handlers::build_stage(stage, &context),
                StageKind::Export => {
                    let (exports, bundle_written) = self.run_export(stage, &context)?;
                    report.exports.extend(exports);
                    report.bundle_written = bundle_written;
                    StageOutputs::new()
                }
            };

            let mut stage_report = StageReport {
                id: stage.id.clone(),
                committed: BTreeMap::new(),
                quarantined: 0,
            };
            for (name, objects) in outputs {
                let (valid, rejected) =
                    validate_and_quarantine(objects, &self.quarantine, &stage.id, now)?;
                stage_report.quarantined += rejected;
                stage_report.committed.insert(name.clone(), valid.len());
                context.insert(name, valid);
            }
            info!(
                stage = %stage.id,
                outputs = stage_report.committed.len(),
                quarantined = stage_report.quarantined,
                "stage committed"
            );
            report.stages.push(stage_report);
        }

        Ok(report)
    }

    fn run_collect(
        &mut self,
        stage: &StageSpec,
        context: &Context,
    ) -> Result<StageOutputs, PipelineError> {
        let now = Utc::now();
        let targets = context.gather(&stage.inputs);

        if self.config.live_collect {
            if let Some(live) = self.live.as_mut() {
                let target_signals: Vec<Signal> = targets
                    .iter()
                    .filter_map(|obj| match obj {
                        IntelObject::Signal(signal) => Some(signal.clone()),
                        _ => None,
                    })
                    .collect();
                let batch = live.collect(&target_signals);
                if !batch.is_empty() {
                    self.records.ingest(&batch)?;
                }
            } else {
                warn!(stage = %stage.id, "live collection enabled but no source attached");
            }
        }

        let alerts = self.records.alerts_within(self.config.retention_days, now)?;
        let indicators = self
            .records
            .indicators_within(self.config.retention_days, now)?;
        Ok(handlers::collect_stage(stage, &targets, alerts, indicators, now))
    }

    fn exporter_path(&self, raw: &str) -> PathBuf {
        let path = Path::new(raw);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.output_root.join(path)
        }
    }

    fn run_export(
        &self,
        stage: &StageSpec,
        context: &Context,
    ) -> Result<(Vec<ExportRecord>, bool), PipelineError> {
        let now = Utc::now();
        let graph_objects = context.gather_prefixed(&stage.inputs, "graph_objects");
        let timeline_objects = context.gather_prefixed(&stage.inputs, "timeline_objects");
        let artifacts = context.gather_prefixed(&stage.inputs, "artifacts");

        // Exports re-validate; anything that slipped by a stage
        // boundary is quarantined here rather than shipped.
        let (graph_objects, _) = validate_and_quarantine(
            graph_objects,
            &self.quarantine,
            &format!("{}_graph", stage.id),
            now,
        )?;
        let (timeline_objects, _) = validate_and_quarantine(
            timeline_objects,
            &self.quarantine,
            &format!("{}_timeline", stage.id),
            now,
        )?;

        let mut all_objects = Vec::with_capacity(
            graph_objects.len() + timeline_objects.len() + artifacts.len(),
        );
        all_objects.extend(graph_objects.iter().cloned());
        all_objects.extend(timeline_objects.iter().cloned());
        all_objects.extend(artifacts.iter().cloned());

        let bundle = build_bundle(
            &self.seed.case_id,
            all_objects,
            &self.config.producer,
            &self.config.run_id,
            &self.plan.version,
            vec![self.plan.pipeline_id.clone()],
            now,
        );
        let bundle_valid = match validate_bundle(&bundle) {
            Ok(()) => true,
            Err(err) => {
                warn!(stage = %stage.id, error = %err, "bundle validation failed, skipping bundle export");
                false
            }
        };

        let mut exports = Vec::new();
        let mut bundle_written = false;
        for exporter in &stage.exporters {
            let path = self.exporter_path(&exporter.path);
            let result = match exporter.name.as_str() {
                "bundle_json" => {
                    if !bundle_valid {
                        continue;
                    }
                    write_bundle(&path, &bundle).map(|()| bundle_written = true)
                }
                "graph_json" => write_graph_objects(&path, &graph_objects),
                "timeline_json" => write_timeline(&path, &timeline_objects),
                "artifact_manifest" => write_artifact_manifest(&path, &artifacts),
                other => {
                    warn!(stage = %stage.id, exporter = other, "unknown exporter, skipping");
                    continue;
                }
            };
            match result {
                Ok(()) => {
                    info!(exporter = %exporter.name, path = %path.display(), "export written");
                    exports.push(ExportRecord {
                        name: exporter.name.clone(),
                        path: path.display().to_string(),
                    });
                }
                Err(err) => {
                    warn!(exporter = %exporter.name, error = %err, "exporter failed, continuing");
                }
            }
        }
        Ok((exports, bundle_written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_adapters::{AlertPayload, AlertRecord, SeedTarget};

    fn full_plan() -> Plan {
        let raw = r#"{
            "pipeline_id": "prism_osint_spectrum",
            "version": "1.0.0",
            "stages": [
                {"id": "seed_validate", "type": "validate", "inputs": ["seed"],
                 "outputs": ["validated_targets"]},
                {"id": "collect_posts", "type": "collect", "inputs": ["validated_targets"],
                 "outputs": ["artifacts_visible"], "collectors": ["posts"], "band": "VISIBLE"},
                {"id": "extract_signals", "type": "extract", "inputs": ["artifacts_visible"],
                 "outputs": ["signals_uv", "signals_ir", "claims", "events_raw"]},
                {"id": "resolve_identity", "type": "resolve",
                 "inputs": ["signals_uv", "signals_ir", "artifacts_visible"],
                 "outputs": ["entities", "edges_identity", "clusters_identity"]},
                {"id": "track_deltas", "type": "track",
                 "inputs": ["artifacts_visible", "signals_uv"],
                 "outputs": ["events_tracking", "signals_deltas"]},
                {"id": "score_all", "type": "score",
                 "inputs": ["entities", "edges_identity", "clusters_identity", "events_raw", "events_tracking", "claims"],
                 "outputs": ["scored_objects"],
                 "scoring": {"confidence_rules": {"evidence_count_boost": 0.05, "cross_band_boost": 0.1, "contradiction_penalty": 0.2},
                             "edge_weight_rules": [{"edge_type": "CO_OCCURS_WITH", "base": 45.0}]}},
                {"id": "build_views", "type": "build", "inputs": ["scored_objects"],
                 "outputs": ["graph_objects", "timeline_objects"]},
                {"id": "export_all", "type": "export",
                 "inputs": ["graph_objects", "timeline_objects", "artifacts_visible"],
                 "exporters": [
                    {"name": "bundle_json", "path": "out/bundle.json"},
                    {"name": "graph_json", "path": "out/graph.json"},
                    {"name": "timeline_json", "path": "out/timeline.json"},
                    {"name": "artifact_manifest", "path": "out/artifacts.json"}
                 ]}
            ]
        }"#;
        Plan::from_json(raw).unwrap()
    }

    fn seeded_runner(dir: &Path) -> Runner {
        let seed = Seed {
            case_id: "case-run".to_string(),
            targets: vec![SeedTarget {
                target_type: "domain".to_string(),
                value: "Example.COM.".to_string(),
                confidence: None,
            }],
        };
        let records = RecordStore::new(dir.join("records.json"));
        records
            .ingest(&CollectedBatch {
                alerts: vec![AlertRecord {
                    content_hash: "b".repeat(64),
                    source_name: "reddit".to_string(),
                    detected_at: Some(Utc::now()),
                    payload: AlertPayload {
                        post_url: Some("https://reddit.com/r/osint/comments/x1".to_string()),
                        title: Some("dump hosted on example.com".to_string()),
                        content: Some("see files.example.com/archive".to_string()),
                        subreddit: Some("osint".to_string()),
                        author: Some("watcher".to_string()),
                        ..AlertPayload::default()
                    },
                }],
                indicators: Vec::new(),
            })
            .unwrap();

        Runner::new(
            full_plan(),
            seed,
            dir,
            RunnerConfig::default(),
            records,
            SnapshotStore::new(dir.join("snapshot.json")),
            QuarantineWriter::new(dir.join("quarantine")),
        )
    }

    #[test]
    fn test_full_run_exports_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = seeded_runner(dir.path());
        let report = runner.run().unwrap();

        assert_eq!(report.stages.len(), 8);
        assert!(report.bundle_written);
        assert_eq!(report.exports.len(), 4);
        for file in ["bundle.json", "graph.json", "timeline.json", "artifacts.json"] {
            assert!(dir.path().join("out").join(file).exists(), "{file} missing");
        }

        let bundle: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/bundle.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(bundle["case"]["case_id"], "case-run");
        assert!(!bundle["objects"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_validated_targets_normalized_in_context() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = seeded_runner(dir.path());
        let report = runner.run().unwrap();
        let validate = &report.stages[0];
        assert_eq!(validate.committed.get("validated_targets"), Some(&1));
    }

    #[test]
    fn test_second_run_has_no_tracking_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = seeded_runner(dir.path());
        runner.run().unwrap();
        let report = runner.run().unwrap();
        let track = report
            .stages
            .iter()
            .find(|s| s.id == "track_deltas")
            .unwrap();
        assert_eq!(track.committed.get("events_tracking"), Some(&0));
        assert_eq!(track.committed.get("signals_deltas"), Some(&0));
    }

    #[test]
    fn test_scored_confidence_within_band_caps() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = seeded_runner(dir.path());
        runner.run().unwrap();

        let graph: Vec<IntelObject> = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out/graph.json")).unwrap(),
        )
        .unwrap();
        assert!(!graph.is_empty());
        for obj in &graph {
            if let (Some(conf), Some(band)) = (obj.confidence(), obj.band()) {
                assert!(conf <= band.confidence_cap(), "{} over cap", obj.id());
                assert!(conf >= 0.0);
            }
        }
        assert!(graph.iter().any(|o| matches!(o, IntelObject::Edge(_))));
    }
}
