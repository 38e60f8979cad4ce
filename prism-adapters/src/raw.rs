//! Raw collector payload types
//!
//! These are the shapes collectors and the record store trade in,
//! before anything becomes canonical. Typed at the boundary so the
//! adapter functions never touch loosely shaped maps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Free-form body of a persisted alert. Collectors fill whichever
/// fields their platform has; the adapter picks the first usable URL
/// and handle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subreddit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl AlertPayload {
    /// First usable URL, in priority order.
    pub fn best_url(&self) -> Option<&str> {
        [&self.url, &self.post_url, &self.comment_url, &self.source_url]
            .into_iter()
            .filter_map(|u| u.as_deref())
            .find(|u| !u.is_empty())
    }

    pub fn handle(&self) -> Option<&str> {
        self.author.as_deref().or(self.account_handle.as_deref())
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.subreddit.as_deref().or(self.channel.as_deref())
    }
}

/// One persisted alert row from a content collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub content_hash: String,
    pub source_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payload: AlertPayload,
}

/// One persisted indicator row from a threat feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorRecord {
    #[serde(default)]
    pub ioc_hash: String,
    pub indicator: String,
    pub ioc_type: String,
    pub source_feed: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
    /// Feed-native 0..100 scale.
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One cycle's worth of raw records from a collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectedBatch {
    #[serde(default)]
    pub alerts: Vec<AlertRecord>,
    #[serde(default)]
    pub indicators: Vec<IndicatorRecord>,
}

impl CollectedBatch {
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty() && self.indicators.is_empty()
    }

    pub fn merge(&mut self, other: CollectedBatch) {
        self.alerts.extend(other.alerts);
        self.indicators.extend(other.indicators);
    }
}

/// One investigation seed target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTarget {
    #[serde(rename = "type")]
    pub target_type: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// The seed document a run starts from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seed {
    pub case_id: String,
    pub targets: Vec<SeedTarget>,
}
