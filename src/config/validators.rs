//! 配置值验证模块
//!
//! 启动时校验阈值之间的约束，任何一条不满足都拒绝启动。

use super::{AD_NETWORK_EXPORT_CAP, MAX_BLOCK_DURATION_DAYS, StaticConfig};
use crate::errors::{ClickGuardError, Result};

/// 校验判定边界：0 ≤ suspicious_floor < fraud_score_threshold ≤ 100
pub fn validate_verdict_bounds(suspicious_floor: u8, fraud_score_threshold: u8) -> Result<()> {
    if fraud_score_threshold > 100 {
        return Err(ClickGuardError::config(format!(
            "fraud_score_threshold must be <= 100, got {}",
            fraud_score_threshold
        )));
    }
    if suspicious_floor >= fraud_score_threshold {
        return Err(ClickGuardError::config(format!(
            "suspicious_floor ({}) must be lower than fraud_score_threshold ({})",
            suspicious_floor, fraud_score_threshold
        )));
    }
    Ok(())
}

/// 校验站点级的点击阈值
pub fn validate_click_limits(max_clicks_per_hour: u32, min_time_on_site: f64) -> Result<()> {
    if max_clicks_per_hour == 0 {
        return Err(ClickGuardError::config(
            "max_clicks_per_hour must be greater than 0",
        ));
    }
    if !min_time_on_site.is_finite() || min_time_on_site < 0.0 {
        return Err(ClickGuardError::config(format!(
            "min_time_on_site must be a non-negative number, got {}",
            min_time_on_site
        )));
    }
    Ok(())
}

fn require_non_zero(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ClickGuardError::config(format!(
            "{} must be greater than 0",
            name
        )));
    }
    Ok(())
}

impl StaticConfig {
    /// 校验整份配置
    pub fn validate(&self) -> Result<()> {
        let fraud = &self.fraud;
        validate_verdict_bounds(fraud.suspicious_floor, fraud.fraud_score_threshold)?;
        validate_click_limits(fraud.max_clicks_per_hour, fraud.min_time_on_site)?;

        let ab = &self.auto_block;
        require_non_zero("auto_block.window_hours", ab.window_hours as u64)?;
        require_non_zero("auto_block.min_events", ab.min_events as u64)?;
        require_non_zero("auto_block.block_duration_days", ab.block_duration_days as u64)?;
        require_non_zero("auto_block.max_candidates", ab.max_candidates as u64)?;
        require_non_zero("auto_block.export_limit", ab.export_limit as u64)?;
        if ab.export_limit > AD_NETWORK_EXPORT_CAP {
            return Err(ClickGuardError::config(format!(
                "auto_block.export_limit must be <= {}, got {}",
                AD_NETWORK_EXPORT_CAP, ab.export_limit
            )));
        }
        if ab.block_duration_days > MAX_BLOCK_DURATION_DAYS {
            return Err(ClickGuardError::config(format!(
                "auto_block.block_duration_days must be <= {}, got {}",
                MAX_BLOCK_DURATION_DAYS, ab.block_duration_days
            )));
        }
        require_non_zero("auto_block.queue_capacity", ab.queue_capacity as u64)?;
        require_non_zero("auto_block.max_attempts", ab.max_attempts as u64)?;
        if ab.score_floor > 100 {
            return Err(ClickGuardError::config(format!(
                "auto_block.score_floor must be <= 100, got {}",
                ab.score_floor
            )));
        }

        let sched = &self.scheduler;
        require_non_zero(
            "scheduler.auto_block_interval_mins",
            sched.auto_block_interval_mins,
        )?;
        require_non_zero(
            "scheduler.cleanup_interval_hours",
            sched.cleanup_interval_hours,
        )?;
        require_non_zero(
            "scheduler.event_retention_days",
            sched.event_retention_days as u64,
        )?;
        require_non_zero("scheduler.rate_limiter_gc_secs", sched.rate_limiter_gc_secs)?;

        match self.logging.format.as_str() {
            "text" | "json" => {}
            other => {
                return Err(ClickGuardError::config(format!(
                    "logging.format must be 'text' or 'json', got '{}'",
                    other
                )));
            }
        }

        Ok(())
    }
}
