use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::blocking::AutoBlockQueue;

/// 关闭超时时间（秒）
const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// 等待 Ctrl+C，然后在超时内完成关闭任务
pub async fn listen_for_shutdown(queue: Arc<AutoBlockQueue>) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received, draining auto-block queue...");
        }
        Err(e) => {
            warn!(
                "Failed to listen for Ctrl+C: {}. Proceeding with shutdown anyway.",
                e
            );
        }
    }

    let shutdown_result = timeout(
        Duration::from_secs(SHUTDOWN_TIMEOUT_SECS),
        perform_shutdown_tasks(&queue),
    )
    .await;

    match shutdown_result {
        Ok(()) => {
            info!("All shutdown tasks completed successfully");
        }
        Err(_) => {
            error!(
                "Shutdown tasks timed out after {} seconds, pending auto-block jobs dropped",
                SHUTDOWN_TIMEOUT_SECS
            );
        }
    }
}

/// 等待队列中已排队的自动封禁任务处理完
async fn perform_shutdown_tasks(queue: &AutoBlockQueue) {
    while queue.pending_jobs() > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let stats = queue.stats();
    info!(
        "Auto-block queue drained: {} completed, {} failed, {} dropped",
        stats.completed, stats.failed, stats.dropped
    );
}
