//! Stage handlers
//!
//! Each handler is a function from (stage spec, context slices) to a
//! proposed output map. Handlers never mutate the context directly;
//! the runner validates and commits their outputs.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

use prism_adapters::{
    alert_to_artifact, domain_signal_from_url, indicator_to_artifact, indicator_to_signal,
    target_to_signal, url_to_signal, AlertRecord, IndicatorRecord, Seed,
};
use prism_core::{
    build_band_index, score_objects, stable_id, Artifact, Band, Claim, ClaimType, Cluster, Edge,
    Entity, EntityType, Envelope, Event, EvidenceRef, IntelObject, ScoringConfig, Signal,
    SignalType, CO_OCCURRENCE_EDGE_WEIGHT,
};

use crate::context::{Context, StageOutputs};
use crate::plan::StageSpec;

/// Subreddits treated as news coverage rather than primary posts.
const NEWS_CHANNELS: [&str; 5] = [
    "infosecnews",
    "threatintel",
    "osint",
    "netsec",
    "cybersecurity",
];

const ARCHIVE_TOKENS: [&str; 3] = ["archive.org", "webcache", "wayback"];

fn push_output(outputs: &mut StageOutputs, name: &str, objects: Vec<IntelObject>) {
    outputs.entry(name.to_string()).or_default().extend(objects);
}

fn init_outputs(stage: &StageSpec) -> StageOutputs {
    stage
        .outputs
        .iter()
        .map(|name| (name.clone(), Vec::new()))
        .collect()
}

/// Seed targets to deduplicated target signals.
pub fn validate_stage(_stage: &StageSpec, seed: &Seed, now: DateTime<Utc>) -> StageOutputs {
    let mut seen: HashSet<(SignalType, String)> = HashSet::new();
    let mut validated = Vec::new();
    for target in &seed.targets {
        let Some(signal) = target_to_signal(target, Some(Band::Am), now) else {
            continue;
        };
        let key = (signal.signal_type, signal.dedup_value());
        if seen.insert(key) {
            validated.push(IntelObject::Signal(signal));
        }
    }
    let mut outputs = StageOutputs::new();
    outputs.insert("validated_targets".to_string(), validated);
    outputs
}

fn target_values(targets: &[IntelObject]) -> BTreeSet<String> {
    targets
        .iter()
        .filter_map(|obj| match obj {
            IntelObject::Signal(signal) => {
                let value = signal.dedup_value().to_lowercase();
                (!value.is_empty()).then_some(value)
            }
            _ => None,
        })
        .collect()
}

fn alert_blob(alert: &AlertRecord) -> String {
    let p = &alert.payload;
    [
        p.title.as_deref().unwrap_or_default(),
        p.content
            .as_deref()
            .or(p.context.as_deref())
            .unwrap_or_default(),
        p.best_url().unwrap_or_default(),
        p.handle().unwrap_or_default(),
        p.channel_name().unwrap_or_default(),
    ]
    .join(" ")
    .to_lowercase()
}

fn is_archive_alert(alert: &AlertRecord) -> bool {
    let url = alert.payload.best_url().unwrap_or_default();
    ARCHIVE_TOKENS.iter().any(|token| url.contains(token))
}

fn is_news_alert(alert: &AlertRecord) -> bool {
    let channel = alert
        .payload
        .channel_name()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if NEWS_CHANNELS.contains(&channel.as_str()) {
        return true;
    }
    alert
        .payload
        .title
        .as_deref()
        .unwrap_or_default()
        .to_lowercase()
        .contains("news")
}

fn route_artifacts(outputs: &mut StageOutputs, prefix: &str, artifacts: &[IntelObject]) {
    for (name, slot) in outputs.iter_mut() {
        if name.starts_with(prefix) {
            *slot = artifacts.to_vec();
        }
    }
}

/// Persisted records filtered by target relevance, routed to outputs
/// by collector tag group with inferred bands.
pub fn collect_stage(
    stage: &StageSpec,
    targets: &[IntelObject],
    mut alerts: Vec<AlertRecord>,
    mut indicators: Vec<IndicatorRecord>,
    now: DateTime<Utc>,
) -> StageOutputs {
    let mut outputs = init_outputs(stage);
    let collectors = stage.collector_set();
    let band = stage.band;

    let values = target_values(targets);
    if !values.is_empty() {
        alerts.retain(|alert| {
            let blob = alert_blob(alert);
            values.iter().any(|v| blob.contains(v))
        });
        indicators.retain(|ioc| {
            let indicator = ioc.indicator.to_lowercase();
            values.iter().any(|v| indicator.contains(v))
        });
    }
    debug!(
        stage = %stage.id,
        alerts = alerts.len(),
        indicators = indicators.len(),
        "collect stage records after relevance filter"
    );

    if collectors.contains("posts") {
        let artifacts: Vec<IntelObject> = alerts
            .iter()
            .filter(|a| a.source_name.eq_ignore_ascii_case("reddit"))
            .map(|a| IntelObject::Artifact(alert_to_artifact(a, band.or(Some(Band::Visible)), now)))
            .collect();
        route_artifacts(&mut outputs, "artifacts_visible", &artifacts);
    }

    if ["archives", "mirrors", "cache_hunts", "reuploads"]
        .iter()
        .any(|tag| collectors.contains(tag))
    {
        let artifacts: Vec<IntelObject> = alerts
            .iter()
            .filter(|a| is_archive_alert(a))
            .map(|a| {
                IntelObject::Artifact(alert_to_artifact(a, band.or(Some(Band::Shortwave)), now))
            })
            .collect();
        route_artifacts(&mut outputs, "artifacts_mirrors", &artifacts);
    }

    if ["news", "press", "high_reach_mentions"]
        .iter()
        .any(|tag| collectors.contains(tag))
    {
        let artifacts: Vec<IntelObject> = alerts
            .iter()
            .filter(|a| is_news_alert(a))
            .map(|a| IntelObject::Artifact(alert_to_artifact(a, band.or(Some(Band::Tv)), now)))
            .collect();
        route_artifacts(&mut outputs, "artifacts_narrative", &artifacts);
    }

    if ["rss", "open_datasets", "official_feeds", "public_apis"]
        .iter()
        .any(|tag| collectors.contains(tag))
    {
        let artifacts: Vec<IntelObject> = indicators
            .iter()
            .map(|i| IntelObject::Artifact(indicator_to_artifact(i, band.or(Some(Band::Fm)), now)))
            .collect();
        route_artifacts(&mut outputs, "artifacts_structured", &artifacts);
    }

    if ["dns", "certs", "asns", "repos", "exposure_discovery"]
        .iter()
        .any(|tag| collectors.contains(tag))
    {
        let mut artifacts = Vec::new();
        let mut signals = Vec::new();
        for ioc in &indicators {
            let artifact = indicator_to_artifact(ioc, band.or(Some(Band::Xray)), now);
            let signal = indicator_to_signal(
                ioc,
                Some(artifact.envelope.id.as_str()),
                band.or(Some(Band::Xray)),
                now,
            );
            artifacts.push(IntelObject::Artifact(artifact));
            signals.push(IntelObject::Signal(signal));
        }
        route_artifacts(&mut outputs, "artifacts_infra", &artifacts);
        route_artifacts(&mut outputs, "signals_infra", &signals);
    }

    let nothing_routed = outputs.values().all(Vec::is_empty);
    if nothing_routed && matches!(band, Some(Band::Visible | Band::Shortwave | Band::Tv)) {
        let artifacts: Vec<IntelObject> = alerts
            .iter()
            .map(|a| IntelObject::Artifact(alert_to_artifact(a, band, now)))
            .collect();
        route_artifacts(&mut outputs, "artifacts", &artifacts);
    }

    outputs
}

fn cap_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

fn extract_from_artifact(artifact: &Artifact, outputs: &mut StageOutputs) {
    let artifact_id = artifact.envelope.id.clone();
    let captured_at = artifact.captured_at;
    let evidence = vec![EvidenceRef::new(artifact_id.clone())];

    let iso = captured_at.to_rfc3339();
    let time_signal = Signal {
        envelope: Envelope::new(format!("time::{artifact_id}"), captured_at)
            .with_band(Band::Uv)
            .with_confidence(0.6)
            .with_labels(vec!["time".to_string()]),
        signal_type: SignalType::Time,
        value: serde_json::Value::String(iso.clone()),
        normalized: Some(iso),
        evidence: evidence.clone(),
    };
    push_output(outputs, "signals_uv", vec![IntelObject::Signal(time_signal)]);

    if artifact.uri.starts_with("http") {
        let mut derived = vec![IntelObject::Signal(url_to_signal(
            &artifact.uri,
            Some(&artifact_id),
            Band::Uv,
            captured_at,
        ))];
        if let Some(domain) =
            domain_signal_from_url(&artifact.uri, Some(&artifact_id), Band::Uv, captured_at)
        {
            derived.push(IntelObject::Signal(domain));
        }
        push_output(outputs, "signals_uv", derived);
    }

    let doc_meta = Signal {
        envelope: Envelope::new(format!("meta::{artifact_id}"), captured_at)
            .with_band(Band::Uv)
            .with_confidence(0.6)
            .with_labels(vec!["doc_meta".to_string()]),
        signal_type: SignalType::DocMeta,
        value: serde_json::json!({
            "content_type": artifact.content_type,
            "size_bytes": artifact.size_bytes,
            "source": artifact.source.platform,
        }),
        normalized: None,
        evidence: evidence.clone(),
    };
    push_output(outputs, "signals_uv", vec![IntelObject::Signal(doc_meta)]);

    let tags = if artifact.envelope.tags.is_empty() {
        &artifact.envelope.labels
    } else {
        &artifact.envelope.tags
    };
    let topics: Vec<IntelObject> = tags
        .iter()
        .filter(|tag| !tag.is_empty())
        .map(|tag| {
            IntelObject::Signal(Signal {
                envelope: Envelope::new(format!("topic::{artifact_id}:{tag}"), captured_at)
                    .with_band(Band::Ir)
                    .with_confidence(0.55)
                    .with_labels(vec!["topic".to_string()]),
                signal_type: SignalType::Topic,
                value: serde_json::Value::String(tag.clone()),
                normalized: Some(tag.to_lowercase()),
                evidence: evidence.clone(),
            })
        })
        .collect();
    if !topics.is_empty() {
        push_output(outputs, "signals_ir", topics);
    }

    if let Some(notes) = artifact.envelope.notes.as_deref().filter(|n| !n.is_empty()) {
        let claim = Claim {
            envelope: Envelope::new(format!("claim::{artifact_id}"), captured_at)
                .with_band(Band::Visible)
                .with_confidence(0.5)
                .with_labels(vec!["extracted".to_string()]),
            text: cap_chars(notes, 512),
            claim_type: ClaimType::Assertion,
            about: Vec::new(),
            evidence: evidence.clone(),
        };
        push_output(outputs, "claims", vec![IntelObject::Claim(claim)]);
    }

    let platform = artifact.source.platform.as_str();
    let event_type = if platform.eq_ignore_ascii_case("reddit") {
        "POST_PUBLISHED"
    } else {
        "INCIDENT_REPORTED"
    };
    let labels = if platform.is_empty() {
        Vec::new()
    } else {
        vec![platform.to_string()]
    };
    let event = Event {
        envelope: Envelope::new(format!("event::{artifact_id}"), captured_at)
            .with_band(Band::Uv)
            .with_confidence(0.55)
            .with_labels(labels),
        event_type: event_type.to_string(),
        time_start: captured_at,
        time_end: None,
        participants: Vec::new(),
        evidence,
    };
    push_output(outputs, "events_raw", vec![IntelObject::Event(event)]);
}

/// Per-artifact signal, claim, and event extraction.
pub fn extract_stage(stage: &StageSpec, context: &Context) -> StageOutputs {
    let mut outputs = init_outputs(stage);
    for obj in context.gather_prefixed(&stage.inputs, "artifacts") {
        if let IntelObject::Artifact(artifact) = &obj {
            extract_from_artifact(artifact, &mut outputs);
        }
    }
    outputs
}

/// Entity resolution, co-occurrence edges, and domain clusters.
pub fn resolve_stage(stage: &StageSpec, context: &Context, now: DateTime<Utc>) -> StageOutputs {
    let mut outputs = init_outputs(stage);
    let signals = context.gather_prefixed(&stage.inputs, "signals");
    let artifacts = context.gather_prefixed(&stage.inputs, "artifacts");

    let mut artifact_sources: BTreeMap<String, String> = BTreeMap::new();
    for obj in &artifacts {
        if let IntelObject::Artifact(artifact) = obj {
            let value = artifact
                .source
                .channel
                .as_deref()
                .filter(|c| !c.is_empty())
                .unwrap_or(&artifact.source.platform);
            if !value.is_empty() {
                artifact_sources
                    .insert(artifact.envelope.id.clone(), value.trim().to_lowercase());
            }
        }
    }

    let mut seen: HashSet<(EntityType, String)> = HashSet::new();
    let mut entities: Vec<Entity> = Vec::new();
    for obj in &signals {
        let IntelObject::Signal(signal) = obj else {
            continue;
        };
        let value = signal.dedup_value();
        if value.is_empty() {
            continue;
        }
        let entity_type = EntityType::for_signal(signal.signal_type);
        if !seen.insert((entity_type, value.clone())) {
            continue;
        }

        let mut source_tags: Vec<String> = Vec::new();
        for evidence in &signal.evidence {
            if let Some(source) = artifact_sources.get(&evidence.artifact_id) {
                if !source_tags.contains(source) {
                    source_tags.push(source.clone());
                }
            }
        }

        entities.push(Entity {
            envelope: Envelope::new(
                stable_id("entity", &[entity_type.as_str(), &value]),
                signal.envelope.created_at,
            )
            .with_band(Band::Gamma)
            .with_confidence(signal.envelope.confidence.unwrap_or(0.6))
            .with_labels(vec![signal.signal_type.as_str().to_string()])
            .with_tags(source_tags),
            entity_type,
            name: value,
            aliases: Vec::new(),
            evidence: signal.evidence.clone(),
        });
    }

    let mut artifact_to_entities: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entity in &entities {
        for evidence in &entity.evidence {
            artifact_to_entities
                .entry(evidence.artifact_id.clone())
                .or_default()
                .push(entity.envelope.id.clone());
        }
    }

    let mut edges: Vec<IntelObject> = Vec::new();
    for (artifact_id, members) in &artifact_to_entities {
        if members.len() < 2 {
            continue;
        }
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                let (a, b) = (&members[i], &members[j]);
                edges.push(IntelObject::Edge(Edge {
                    envelope: Envelope::new(stable_id("edge", &[a, b, artifact_id]), now)
                        .with_band(Band::Gamma)
                        .with_confidence(0.7),
                    from_id: a.clone(),
                    to_id: b.clone(),
                    edge_type: "CO_OCCURS_WITH".to_string(),
                    weight: CO_OCCURRENCE_EDGE_WEIGHT,
                    evidence: vec![EvidenceRef::new(artifact_id.clone())],
                }));
            }
        }
    }

    let mut domain_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entity in &entities {
        if entity.entity_type != EntityType::Domain {
            continue;
        }
        let parts: Vec<&str> = entity.name.split('.').filter(|p| !p.is_empty()).collect();
        if parts.len() < 2 {
            continue;
        }
        let root = parts[parts.len() - 2..].join(".");
        domain_groups
            .entry(root)
            .or_default()
            .push(entity.envelope.id.clone());
    }
    let clusters: Vec<IntelObject> = domain_groups
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(root, members)| {
            IntelObject::Cluster(Cluster {
                envelope: Envelope::new(stable_id("cluster", &["domain", &root]), now)
                    .with_band(Band::Gamma)
                    .with_confidence(0.7)
                    .with_labels(vec!["domain_group".to_string()]),
                cluster_type: "IDENTITY".to_string(),
                members,
                centroid: None,
                evidence: Vec::new(),
            })
        })
        .collect();

    push_output(
        &mut outputs,
        "entities",
        entities.into_iter().map(IntelObject::Entity).collect(),
    );
    push_output(&mut outputs, "edges_identity", edges);
    push_output(&mut outputs, "clusters_identity", clusters);
    outputs
}

/// Delta detection against a prior-run snapshot. The caller supplies
/// the previous snapshot and persists the one this returns.
pub fn track_stage(
    stage: &StageSpec,
    context: &Context,
    previous: &crate::state::RunSnapshot,
) -> (StageOutputs, crate::state::RunSnapshot) {
    let mut outputs = init_outputs(stage);
    let artifacts = context.gather_prefixed(&stage.inputs, "artifacts");
    let signals = context.gather_prefixed(&stage.inputs, "signals");

    let artifact_ids: BTreeSet<String> =
        artifacts.iter().map(|a| a.id().to_string()).collect();
    let signal_ids: BTreeSet<String> = signals.iter().map(|s| s.id().to_string()).collect();

    let mut events: Vec<IntelObject> = Vec::new();
    for obj in &artifacts {
        let IntelObject::Artifact(artifact) = obj else {
            continue;
        };
        if previous.artifacts.contains(&artifact.envelope.id) {
            continue;
        }
        let event_type = if artifact.source.platform.eq_ignore_ascii_case("reddit") {
            "POST_PUBLISHED"
        } else {
            "INCIDENT_REPORTED"
        };
        events.push(IntelObject::Event(Event {
            envelope: Envelope::new(
                format!("track::{}", artifact.envelope.id),
                artifact.captured_at,
            )
            .with_band(Band::Radar)
            .with_confidence(0.6)
            .with_labels(vec!["track".to_string()]),
            event_type: event_type.to_string(),
            time_start: artifact.captured_at,
            time_end: None,
            participants: Vec::new(),
            evidence: vec![EvidenceRef::new(artifact.envelope.id.clone())],
        }));
    }

    let deltas: Vec<IntelObject> = signals
        .iter()
        .filter(|s| !previous.signals.contains(s.id()))
        .cloned()
        .collect();

    push_output(&mut outputs, "events_tracking", events);
    push_output(&mut outputs, "signals_deltas", deltas);

    let next = crate::state::RunSnapshot {
        artifacts: artifact_ids,
        signals: signal_ids,
    };
    (outputs, next)
}

/// Merge named inputs, build the band index (including all artifact
/// entries), and run the scoring engine.
pub fn score_stage(stage: &StageSpec, context: &Context) -> StageOutputs {
    let mut merged = context.gather(&stage.inputs);
    let artifacts = context.gather_all_prefixed("artifacts");

    let bands = build_band_index(merged.iter().chain(artifacts.iter()));
    let default_config = ScoringConfig::default();
    let config = stage.scoring.as_ref().unwrap_or(&default_config);
    score_objects(&mut merged, config, &bands);

    let mut outputs = StageOutputs::new();
    outputs.insert("scored_objects".to_string(), merged);
    outputs
}

/// Partition scored objects into graph and timeline halves.
pub fn build_stage(stage: &StageSpec, context: &Context) -> StageOutputs {
    let scored = context.gather(&stage.inputs);
    let (graph, rest): (Vec<IntelObject>, Vec<IntelObject>) =
        scored.into_iter().partition(IntelObject::is_graph_object);
    let timeline: Vec<IntelObject> = rest
        .into_iter()
        .filter(IntelObject::is_timeline_object)
        .collect();

    let mut outputs = StageOutputs::new();
    outputs.insert("graph_objects".to_string(), graph);
    outputs.insert("timeline_objects".to_string(), timeline);
    outputs
}
