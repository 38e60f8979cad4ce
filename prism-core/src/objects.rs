//! Canonical intel object model
//!
//! Every pipeline stage consumes and produces [`IntelObject`] values: a
//! tagged union over the seven canonical record kinds, all sharing the
//! [`Envelope`] base (id, timestamps, band, confidence, labels, tags,
//! notes). Raw collector payloads never cross a stage boundary; the
//! adapter layer converts them first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Band;

/// Reference from a derived object back to the artifact that evidences it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub artifact_id: String,
}

impl EvidenceRef {
    pub fn new(artifact_id: impl Into<String>) -> Self {
        Self {
            artifact_id: artifact_id.into(),
        }
    }
}

/// Shared base fields carried by every canonical object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: String,

    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Band>,

    /// Clamped to [0, band confidence cap] by the scoring engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Envelope {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            updated_at: None,
            band: None,
            confidence: None,
            labels: Vec::new(),
            tags: Vec::new(),
            notes: None,
        }
    }

    pub fn with_band(mut self, band: Band) -> Self {
        self.band = Some(band);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Where an artifact was captured from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub platform: String,

    pub collection_method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_handle: Option<String>,
}

/// Content hash bundle keyed by algorithm name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashBundle {
    pub sha256: String,
}

/// A captured piece of source content. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub uri: String,
    pub captured_at: DateTime<Utc>,
    pub content_type: String,
    pub source: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<HashBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Kinds of atomic extracted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalType {
    Ip,
    Domain,
    Url,
    Handle,
    Email,
    Time,
    Topic,
    DocMeta,
    MediaHash,
    IdToken,
}

impl SignalType {
    /// Discriminator string matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            SignalType::Ip => "IP",
            SignalType::Domain => "DOMAIN",
            SignalType::Url => "URL",
            SignalType::Handle => "HANDLE",
            SignalType::Email => "EMAIL",
            SignalType::Time => "TIME",
            SignalType::Topic => "TOPIC",
            SignalType::DocMeta => "DOC_META",
            SignalType::MediaHash => "MEDIA_HASH",
            SignalType::IdToken => "ID_TOKEN",
        }
    }
}

/// An atomic value extracted from (or seeding) the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub signal_type: SignalType,
    /// Raw value; structured for DOC_META, a plain string otherwise.
    pub value: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

impl Signal {
    /// Normalized value if present, otherwise the raw value as text.
    pub fn dedup_value(&self) -> String {
        match &self.normalized {
            Some(n) => n.clone(),
            None => match &self.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        }
    }
}

/// Kinds of resolved real-world referents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Account,
    Domain,
    Host,
    Document,
    Topic,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Account => "ACCOUNT",
            EntityType::Domain => "DOMAIN",
            EntityType::Host => "HOST",
            EntityType::Document => "DOCUMENT",
            EntityType::Topic => "TOPIC",
        }
    }

    /// Entity kind produced when resolving a signal of the given type.
    pub fn for_signal(signal_type: SignalType) -> EntityType {
        match signal_type {
            SignalType::Handle | SignalType::Email => EntityType::Account,
            SignalType::Domain => EntityType::Domain,
            SignalType::Ip => EntityType::Host,
            SignalType::Url => EntityType::Document,
            _ => EntityType::Topic,
        }
    }
}

/// A resolved real-world referent, deduplicated across signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub entity_type: EntityType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

/// A typed relation between two canonical objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    #[serde(flatten)]
    pub envelope: Envelope,
    #[serde(rename = "from")]
    pub from_id: String,
    #[serde(rename = "to")]
    pub to_id: String,
    pub edge_type: String,
    pub weight: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

/// A timestamped occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub event_type: String,
    pub time_start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_end: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimType {
    Assertion,
    Denial,
}

/// A textual assertion tied to evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub text: String,
    pub claim_type: ClaimType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub about: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

/// A grouping of entities (e.g. domains sharing a registrable root).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub cluster_type: String,
    pub members: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub centroid: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<EvidenceRef>,
}

/// The canonical tagged union every stage trades in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntelObject {
    Artifact(Artifact),
    Signal(Signal),
    Entity(Entity),
    Edge(Edge),
    Event(Event),
    Claim(Claim),
    Cluster(Cluster),
}

impl IntelObject {
    pub fn envelope(&self) -> &Envelope {
        match self {
            IntelObject::Artifact(o) => &o.envelope,
            IntelObject::Signal(o) => &o.envelope,
            IntelObject::Entity(o) => &o.envelope,
            IntelObject::Edge(o) => &o.envelope,
            IntelObject::Event(o) => &o.envelope,
            IntelObject::Claim(o) => &o.envelope,
            IntelObject::Cluster(o) => &o.envelope,
        }
    }

    pub fn envelope_mut(&mut self) -> &mut Envelope {
        match self {
            IntelObject::Artifact(o) => &mut o.envelope,
            IntelObject::Signal(o) => &mut o.envelope,
            IntelObject::Entity(o) => &mut o.envelope,
            IntelObject::Edge(o) => &mut o.envelope,
            IntelObject::Event(o) => &mut o.envelope,
            IntelObject::Claim(o) => &mut o.envelope,
            IntelObject::Cluster(o) => &mut o.envelope,
        }
    }

    pub fn id(&self) -> &str {
        &self.envelope().id
    }

    pub fn band(&self) -> Option<Band> {
        self.envelope().band
    }

    pub fn confidence(&self) -> Option<f64> {
        self.envelope().confidence
    }

    /// Discriminator string matching the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            IntelObject::Artifact(_) => "artifact",
            IntelObject::Signal(_) => "signal",
            IntelObject::Entity(_) => "entity",
            IntelObject::Edge(_) => "edge",
            IntelObject::Event(_) => "event",
            IntelObject::Claim(_) => "claim",
            IntelObject::Cluster(_) => "cluster",
        }
    }

    /// Evidence list for kinds that carry one.
    pub fn evidence(&self) -> &[EvidenceRef] {
        match self {
            IntelObject::Artifact(_) => &[],
            IntelObject::Signal(o) => &o.evidence,
            IntelObject::Entity(o) => &o.evidence,
            IntelObject::Edge(o) => &o.evidence,
            IntelObject::Event(o) => &o.evidence,
            IntelObject::Claim(o) => &o.evidence,
            IntelObject::Cluster(o) => &o.evidence,
        }
    }

    /// Graph objects become nodes/edges; the rest feed the timeline or
    /// the artifact manifest.
    pub fn is_graph_object(&self) -> bool {
        matches!(
            self,
            IntelObject::Entity(_) | IntelObject::Edge(_) | IntelObject::Cluster(_)
        )
    }

    pub fn is_timeline_object(&self) -> bool {
        matches!(self, IntelObject::Event(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signal() -> Signal {
        Signal {
            envelope: Envelope::new("sig-1", Utc::now())
                .with_band(Band::Am)
                .with_confidence(0.4),
            signal_type: SignalType::Domain,
            value: serde_json::json!("Example.COM."),
            normalized: Some("example.com".to_string()),
            evidence: vec![EvidenceRef::new("art-1")],
        }
    }

    #[test]
    fn test_tagged_serialization() {
        let obj = IntelObject::Signal(sample_signal());
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["type"], "signal");
        assert_eq!(json["signal_type"], "DOMAIN");
        assert_eq!(json["band"], "AM");
        assert_eq!(json["id"], "sig-1");
    }

    #[test]
    fn test_roundtrip() {
        let obj = IntelObject::Signal(sample_signal());
        let json = serde_json::to_string(&obj).unwrap();
        let back: IntelObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id(), "sig-1");
        assert_eq!(back.band(), Some(Band::Am));
        match back {
            IntelObject::Signal(s) => assert_eq!(s.dedup_value(), "example.com"),
            other => panic!("expected signal, got {}", other.kind()),
        }
    }

    #[test]
    fn test_entity_type_for_signal() {
        assert_eq!(
            EntityType::for_signal(SignalType::Handle),
            EntityType::Account
        );
        assert_eq!(EntityType::for_signal(SignalType::Ip), EntityType::Host);
        assert_eq!(
            EntityType::for_signal(SignalType::Topic),
            EntityType::Topic
        );
    }

    #[test]
    fn test_dedup_value_falls_back_to_raw() {
        let mut signal = sample_signal();
        signal.normalized = None;
        assert_eq!(signal.dedup_value(), "Example.COM.");
    }
}
