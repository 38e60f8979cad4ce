//! Raw payload to canonical object conversions
//!
//! Every conversion derives its id from stable content fields via
//! [`stable_id`], so re-adapting the same record merges instead of
//! duplicating. Bands come from an explicit override first, then a
//! per-source default.

use chrono::{DateTime, Utc};
use tracing::debug;

use prism_core::{
    is_sha256_hex, sha256_hex, stable_id, Artifact, Band, Envelope, EvidenceRef, HashBundle,
    Signal, SignalType, SourceRef,
};

use crate::raw::{AlertPayload, AlertRecord, IndicatorRecord, SeedTarget};

/// Default band for a content source.
pub fn infer_band_for_source(source_name: &str) -> Band {
    if source_name.eq_ignore_ascii_case("reddit") {
        Band::Visible
    } else {
        Band::Fm
    }
}

fn infer_content_type(payload: &AlertPayload) -> &'static str {
    if payload.content.is_some() || payload.title.is_some() {
        return "text/plain";
    }
    let has_fields = serde_json::to_value(payload)
        .ok()
        .and_then(|v| v.as_object().map(|o| !o.is_empty()))
        .unwrap_or(false);
    if has_fields {
        "application/json"
    } else {
        "text/plain"
    }
}

fn clamp_conf(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default).clamp(0.0, 1.0)
}

/// Reuse a well-formed content hash, otherwise hash the serialized
/// payload.
fn hash_bundle<T: serde::Serialize>(content_hash: &str, payload: &T) -> HashBundle {
    if is_sha256_hex(content_hash) {
        return HashBundle {
            sha256: content_hash.to_ascii_lowercase(),
        };
    }
    let serialized = serde_json::to_string(payload).unwrap_or_default();
    HashBundle {
        sha256: sha256_hex(&serialized),
    }
}

/// Authority part of a URL, without scheme, userinfo, port, or
/// trailing dots. Lowercased.
pub fn host_from_url(url: &str) -> Option<String> {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();
    let host = authority.split(':').next().unwrap_or_default();
    let host = host.trim_matches('.').trim();
    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host.to_ascii_lowercase())
}

/// Convert a persisted alert into an artifact.
pub fn alert_to_artifact(alert: &AlertRecord, band: Option<Band>, now: DateTime<Utc>) -> Artifact {
    let payload = &alert.payload;
    let source_name = if alert.source_name.is_empty() {
        payload.source_name.clone().unwrap_or_else(|| "prism".to_string())
    } else {
        alert.source_name.clone()
    };
    let detected_at = alert.detected_at.unwrap_or(now);
    let uri = payload
        .best_url()
        .map(str::to_string)
        .unwrap_or_else(|| format!("prism://alert/{}", alert.content_hash));
    let method = if source_name.eq_ignore_ascii_case("reddit") {
        "API"
    } else {
        "INGEST"
    };

    let mut notes = payload
        .content
        .clone()
        .or_else(|| payload.context.clone())
        .unwrap_or_default();
    if let Some(title) = &payload.title {
        notes = if notes.is_empty() {
            title.clone()
        } else {
            format!("{title}\n\n{notes}")
        };
    }

    let mut envelope = Envelope::new(
        stable_id("artifact", &[&source_name, &alert.content_hash, &uri]),
        detected_at,
    )
    .with_band(band.unwrap_or_else(|| infer_band_for_source(&source_name)))
    .with_confidence(clamp_conf(payload.confidence, 0.55))
    .with_labels(vec![source_name.clone()])
    .with_tags(payload.tags.clone());
    envelope.updated_at = Some(detected_at);
    if !notes.is_empty() {
        envelope.notes = Some(notes);
    }

    debug!(source = %source_name, uri = %uri, "adapted alert to artifact");
    Artifact {
        envelope,
        uri,
        captured_at: detected_at,
        content_type: infer_content_type(payload).to_string(),
        source: SourceRef {
            platform: source_name,
            collection_method: method.to_string(),
            channel: payload.channel_name().map(str::to_string),
            account_handle: payload.handle().map(str::to_string),
        },
        hashes: Some(hash_bundle(&alert.content_hash, payload)),
        size_bytes: None,
    }
}

fn indicator_hash(ioc: &IndicatorRecord) -> String {
    if ioc.ioc_hash.is_empty() {
        stable_id("ioc", &[&ioc.source_feed, &ioc.indicator])
    } else {
        ioc.ioc_hash.clone()
    }
}

fn indicator_confidence(ioc: &IndicatorRecord) -> f64 {
    clamp_conf(ioc.confidence.map(|c| c / 100.0), 0.5)
}

/// Convert a feed indicator into an artifact carrying its reference.
pub fn indicator_to_artifact(
    ioc: &IndicatorRecord,
    band: Option<Band>,
    now: DateTime<Utc>,
) -> Artifact {
    let ioc_hash = indicator_hash(ioc);
    let uri = ioc
        .reference
        .clone()
        .filter(|r| !r.is_empty())
        .or_else(|| Some(ioc.indicator.clone()).filter(|i| !i.is_empty()))
        .unwrap_or_else(|| format!("prism://ioc/{ioc_hash}"));
    let detected_at = ioc.first_seen.or(ioc.last_seen).unwrap_or(now);

    let mut envelope = Envelope::new(
        stable_id("artifact", &[&ioc.source_feed, &ioc_hash, &uri]),
        detected_at,
    )
    .with_band(band.unwrap_or(Band::Fm))
    .with_confidence(indicator_confidence(ioc))
    .with_labels(vec![ioc.source_feed.clone()])
    .with_tags(ioc.tags.clone())
    .with_notes(format!("Indicator {} ({})", ioc.indicator, ioc.ioc_type));
    envelope.updated_at = Some(detected_at);

    Artifact {
        envelope,
        uri,
        captured_at: detected_at,
        content_type: "application/json".to_string(),
        source: SourceRef {
            platform: ioc.source_feed.clone(),
            collection_method: "INGEST".to_string(),
            channel: None,
            account_handle: None,
        },
        hashes: Some(hash_bundle(&ioc_hash, ioc)),
        size_bytes: None,
    }
}

fn signal_type_for_ioc(ioc_type: &str) -> SignalType {
    match ioc_type.to_ascii_lowercase().as_str() {
        "ip" => SignalType::Ip,
        "domain" => SignalType::Domain,
        "url" => SignalType::Url,
        "hash" => SignalType::MediaHash,
        _ => SignalType::IdToken,
    }
}

/// Convert a feed indicator into its atomic signal.
pub fn indicator_to_signal(
    ioc: &IndicatorRecord,
    artifact_id: Option<&str>,
    band: Option<Band>,
    now: DateTime<Utc>,
) -> Signal {
    let signal_type = signal_type_for_ioc(&ioc.ioc_type);
    let type_str = signal_type.as_str();
    let normalized = ioc.indicator.trim().to_ascii_lowercase();

    Signal {
        envelope: Envelope::new(
            stable_id("signal", &[type_str, &ioc.indicator]),
            ioc.first_seen.or(ioc.last_seen).unwrap_or(now),
        )
        .with_band(band.unwrap_or(Band::Xray))
        .with_confidence(indicator_confidence(ioc))
        .with_labels(vec![ioc.source_feed.clone()]),
        signal_type,
        value: serde_json::Value::String(ioc.indicator.clone()),
        normalized: Some(normalized),
        evidence: artifact_id.map(EvidenceRef::new).into_iter().collect(),
    }
}

fn signal_type_for_target(target_type: &str) -> SignalType {
    match target_type.to_ascii_lowercase().as_str() {
        "handle" | "account" | "username" => SignalType::Handle,
        "domain" | "hostname" => SignalType::Domain,
        "url" => SignalType::Url,
        "ip" => SignalType::Ip,
        "email" => SignalType::Email,
        _ => SignalType::IdToken,
    }
}

/// Normalize a raw target value by signal type.
pub fn normalize_target_value(signal_type: SignalType, value: &str) -> String {
    let mut normalized = value.trim().to_ascii_lowercase();
    match signal_type {
        SignalType::Url => {}
        SignalType::Domain => {
            normalized = normalized.trim_matches('.').to_string();
        }
        SignalType::Handle => {
            normalized = normalized.trim_start_matches('@').to_string();
            if let Some(rest) = normalized.strip_prefix("r/") {
                normalized = rest.to_string();
            }
        }
        _ => {}
    }
    normalized
}

/// Convert a seed target into the signal the validate stage dedups.
/// Empty-valued targets yield nothing.
pub fn target_to_signal(
    target: &SeedTarget,
    band: Option<Band>,
    now: DateTime<Utc>,
) -> Option<Signal> {
    if target.value.trim().is_empty() {
        return None;
    }
    let signal_type = signal_type_for_target(&target.target_type);
    let normalized = normalize_target_value(signal_type, &target.value);

    Some(Signal {
        envelope: Envelope::new(
            stable_id("signal", &[signal_type.as_str(), &normalized]),
            now,
        )
        .with_band(band.unwrap_or(Band::Am))
        .with_confidence(clamp_conf(target.confidence, 0.4))
        .with_labels(vec!["seed".to_string()]),
        signal_type,
        value: serde_json::Value::String(target.value.clone()),
        normalized: Some(normalized),
        evidence: Vec::new(),
    })
}

/// URL signal evidencing an artifact.
pub fn url_to_signal(
    url: &str,
    artifact_id: Option<&str>,
    band: Band,
    now: DateTime<Utc>,
) -> Signal {
    Signal {
        envelope: Envelope::new(stable_id("signal", &["URL", url]), now)
            .with_band(band)
            .with_confidence(0.6)
            .with_labels(vec!["url".to_string()]),
        signal_type: SignalType::Url,
        value: serde_json::Value::String(url.to_string()),
        normalized: Some(url.to_string()),
        evidence: artifact_id.map(EvidenceRef::new).into_iter().collect(),
    }
}

/// Domain signal from a URL's host, when one can be extracted.
pub fn domain_signal_from_url(
    url: &str,
    artifact_id: Option<&str>,
    band: Band,
    now: DateTime<Utc>,
) -> Option<Signal> {
    let host = host_from_url(url)?;
    Some(Signal {
        envelope: Envelope::new(stable_id("signal", &["DOMAIN", &host]), now)
            .with_band(band)
            .with_confidence(0.6)
            .with_labels(vec!["domain".to_string()]),
        signal_type: SignalType::Domain,
        value: serde_json::Value::String(host.clone()),
        normalized: Some(host),
        evidence: artifact_id.map(EvidenceRef::new).into_iter().collect(),
    })
}
