//! File-spool collector
//!
//! Ingests batches dropped into a directory as JSON files, one
//! `CollectedBatch` per file. External fetchers write files into the
//! spool; each collection cycle drains whatever has arrived since the
//! last one. Consumed files are renamed with a `.done` suffix and
//! unparseable ones with `.err`, so nothing is picked up twice.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use prism_adapters::CollectedBatch;
use prism_core::Signal;

use crate::collector::Collector;
use crate::error::CollectError;

pub struct SpoolCollector {
    source_id: String,
    dir: PathBuf,
}

impl SpoolCollector {
    pub fn new(source_id: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            source_id: source_id.into(),
            dir: dir.into(),
        }
    }

    /// One collector per immediate subdirectory, named after it.
    pub fn from_spool_root(root: &Path) -> Result<Vec<SpoolCollector>, std::io::Error> {
        let mut collectors = Vec::new();
        if !root.exists() {
            return Ok(collectors);
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        entries.sort();
        for dir in entries {
            if let Some(name) = dir.file_name().and_then(|n| n.to_str()) {
                collectors.push(SpoolCollector::new(name, &dir));
            }
        }
        Ok(collectors)
    }

    fn io_error(&self, err: std::io::Error) -> CollectError {
        CollectError::Network {
            source_id: self.source_id.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl Collector for SpoolCollector {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn collect(&self, _targets: &[Signal]) -> Result<CollectedBatch, CollectError> {
        let mut merged = CollectedBatch::default();
        if !self.dir.exists() {
            return Ok(merged);
        }

        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.io_error(e))?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.io_error(e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();

        for path in files {
            let body = tokio::fs::read(&path).await.map_err(|e| self.io_error(e))?;
            match serde_json::from_slice::<CollectedBatch>(&body) {
                Ok(batch) => {
                    debug!(
                        source = %self.source_id,
                        file = %path.display(),
                        alerts = batch.alerts.len(),
                        indicators = batch.indicators.len(),
                        "spool file ingested"
                    );
                    merged.merge(batch);
                    consume(&path, "done").await;
                }
                Err(err) => {
                    warn!(
                        source = %self.source_id,
                        file = %path.display(),
                        error = %err,
                        "unparseable spool file set aside"
                    );
                    consume(&path, "err").await;
                }
            }
        }
        Ok(merged)
    }
}

async fn consume(path: &Path, suffix: &str) {
    let mut renamed = path.as_os_str().to_owned();
    renamed.push(".");
    renamed.push(suffix);
    if let Err(err) = tokio::fs::rename(path, &renamed).await {
        warn!(file = %path.display(), error = %err, "failed to mark spool file consumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_adapters::{AlertPayload, AlertRecord};

    fn batch_json(hash: &str) -> String {
        serde_json::to_string(&CollectedBatch {
            alerts: vec![AlertRecord {
                content_hash: hash.to_string(),
                source_name: "feed".to_string(),
                detected_at: None,
                payload: AlertPayload::default(),
            }],
            indicators: Vec::new(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_spool_drains_and_marks_files_consumed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), batch_json("h1")).unwrap();
        std::fs::write(dir.path().join("b.json"), batch_json("h2")).unwrap();

        let collector = SpoolCollector::new("feed", dir.path());
        let batch = collector.collect(&[]).await.unwrap();
        assert_eq!(batch.alerts.len(), 2);
        assert!(dir.path().join("a.json.done").exists());

        // Nothing left to pick up on the next cycle.
        let again = collector.collect(&[]).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_spool_file_is_set_aside() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("ok.json"), batch_json("h1")).unwrap();

        let collector = SpoolCollector::new("feed", dir.path());
        let batch = collector.collect(&[]).await.unwrap();
        assert_eq!(batch.alerts.len(), 1);
        assert!(dir.path().join("bad.json.err").exists());
    }

    #[tokio::test]
    async fn test_from_spool_root_builds_one_collector_per_subdir() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("feed")).unwrap();
        std::fs::create_dir(root.path().join("reddit")).unwrap();
        std::fs::write(root.path().join("loose.json"), "{}").unwrap();

        let collectors = SpoolCollector::from_spool_root(root.path()).unwrap();
        let ids: Vec<&str> = collectors.iter().map(|c| c.source_id()).collect();
        assert_eq!(ids, vec!["feed", "reddit"]);
    }

    #[tokio::test]
    async fn test_missing_spool_dir_is_an_empty_cycle() {
        let collector = SpoolCollector::new("feed", "/nonexistent/spool/feed");
        let batch = collector.collect(&[]).await.unwrap();
        assert!(batch.is_empty());
    }
}
