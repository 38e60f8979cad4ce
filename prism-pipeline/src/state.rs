//! Cross-run persisted state
//!
//! Snapshots and persisted records are plain JSON files replaced
//! atomically (write temp, rename), so concurrent readers never see a
//! partial write. Stores are explicit objects passed into the runner.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use prism_adapters::{AlertRecord, CollectedBatch, IndicatorRecord};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store file at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Serialize to a temp file next to `path`, then rename over it.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(path))?;
    }
    let raw = serde_json::to_string_pretty(value).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, raw).map_err(io_err(&tmp))?;
    fs::rename(&tmp, path).map_err(io_err(path))?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Id sets the track stage diffs against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSnapshot {
    #[serde(default)]
    pub artifacts: BTreeSet<String>,
    #[serde(default)]
    pub signals: BTreeSet<String>,
}

/// Persisted snapshot of ids seen by previous runs.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<RunSnapshot, StoreError> {
        read_json(&self.path)
    }

    pub fn save(&self, snapshot: &RunSnapshot) -> Result<(), StoreError> {
        debug!(
            artifacts = snapshot.artifacts.len(),
            signals = snapshot.signals.len(),
            "saving run snapshot"
        );
        atomic_write_json(&self.path, snapshot)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RecordFile {
    #[serde(default)]
    alerts: Vec<AlertRecord>,
    #[serde(default)]
    indicators: Vec<IndicatorRecord>,
}

/// Persisted raw alerts and indicators, the collect stage's backing
/// store when not collecting live.
#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
}

impl RecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Alerts detected within the retention window, newest first.
    pub fn alerts_within(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<AlertRecord>, StoreError> {
        let cutoff = now - Duration::days(retention_days);
        let file: RecordFile = read_json(&self.path)?;
        let mut alerts: Vec<AlertRecord> = file
            .alerts
            .into_iter()
            .filter(|a| a.detected_at.map(|t| t >= cutoff).unwrap_or(true))
            .collect();
        alerts.sort_by(|a, b| b.detected_at.cmp(&a.detected_at));
        Ok(alerts)
    }

    /// Indicators last seen within the retention window, newest first.
    pub fn indicators_within(
        &self,
        retention_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<IndicatorRecord>, StoreError> {
        let cutoff = now - Duration::days(retention_days);
        let file: RecordFile = read_json(&self.path)?;
        let mut indicators: Vec<IndicatorRecord> = file
            .indicators
            .into_iter()
            .filter(|i| {
                i.last_seen
                    .or(i.first_seen)
                    .map(|t| t >= cutoff)
                    .unwrap_or(true)
            })
            .collect();
        indicators.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(indicators)
    }

    /// Merge a collected batch into the store, deduplicating on
    /// content/ioc hash.
    pub fn ingest(&self, batch: &CollectedBatch) -> Result<(), StoreError> {
        let mut file: RecordFile = read_json(&self.path)?;
        let seen_alerts: BTreeSet<String> =
            file.alerts.iter().map(|a| a.content_hash.clone()).collect();
        let seen_iocs: BTreeSet<String> =
            file.indicators.iter().map(|i| i.ioc_hash.clone()).collect();

        let mut added = 0usize;
        for alert in &batch.alerts {
            if !seen_alerts.contains(&alert.content_hash) {
                file.alerts.push(alert.clone());
                added += 1;
            }
        }
        for ioc in &batch.indicators {
            if !ioc.ioc_hash.is_empty() && seen_iocs.contains(&ioc.ioc_hash) {
                continue;
            }
            file.indicators.push(ioc.clone());
            added += 1;
        }
        if added > 0 {
            info!(added, path = %self.path.display(), "ingested collected records");
        }
        atomic_write_json(&self.path, &file)
    }
}
