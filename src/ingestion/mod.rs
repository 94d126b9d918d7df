//! 事件接入

pub mod pipeline;
pub mod rate_limiter;

pub use pipeline::{IngestOutcome, IngestionPipeline, SiteKey, TrackRequest};
pub use rate_limiter::{ClickRateLimiter, SlidingWindowCounter, rate_key};
