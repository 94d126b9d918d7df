//! 自动封禁：引擎、触发队列、定时任务

pub mod engine;
pub mod queue;
pub mod scheduler;

pub use engine::{
    AutoBlockEngine, AutoBlockReport, BlockCandidate, ExportFormat, MANUAL_BLOCK_REASON,
    MAX_MANUAL_BLOCK_HOURS, rank_block_candidates, render_csv,
};
pub use queue::{AutoBlockQueue, AutoBlockTrigger, QueueRetryPolicy, QueueStats};
pub use scheduler::{CleanupReport, FraudScheduler, SweepReport};
