//! PRISM Collect - Concurrent source collection runtime
//!
//! The pipeline itself is single-threaded; concurrency lives here,
//! one layer down:
//! - `Collector` trait wrapping each external source
//! - Per-source rate limiting (semaphore + minimum-interval throttle)
//! - Bounded retry with exponential backoff and jitter
//! - A scheduler running each source on its own jittered ticker,
//!   delivering batches over a channel to the pipeline boundary
//! - A file-spool collector draining batches dropped as JSON files

pub mod collector;
pub mod error;
pub mod limiter;
pub mod retry;
pub mod scheduler;
pub mod sources;

pub use collector::{Collector, SourceBatch};
pub use error::CollectError;
pub use limiter::{LimiterRegistry, RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use sources::SpoolCollector;
