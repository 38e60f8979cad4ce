//! Collector contract
//!
//! A collector wraps one external source. The runtime never cares how
//! a source is fetched or parsed; it only sees batches of raw alerts
//! and indicators keyed by source id.

use async_trait::async_trait;

use prism_adapters::CollectedBatch;
use prism_core::Signal;

use crate::error::CollectError;

/// One completed collection cycle from a single source.
#[derive(Debug, Clone)]
pub struct SourceBatch {
    pub source_id: String,
    pub batch: CollectedBatch,
}

/// Common interface for all source collectors.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Stable identifier for rate limiting and logging.
    fn source_id(&self) -> &str;

    /// Fetch one batch relevant to the validated targets.
    async fn collect(&self, targets: &[Signal]) -> Result<CollectedBatch, CollectError>;
}
