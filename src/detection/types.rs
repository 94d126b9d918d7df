//! 评分使用的数据类型
//!
//! `Fingerprint` 是 tracker 上报的原始键值对，字段缺失或类型不符时
//! 各规则自行决定跳过；`BehaviorMetrics` 的每个字段都是可选的。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

use crate::config::FraudConfig;
use crate::config::validators::{validate_click_limits, validate_verdict_bounds};

/// 浏览器/设备指纹原始数据
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub Map<String, Value>);

impl Fingerprint {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// 字符串字段（数字按文本输出）
    pub fn text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// 小写后的字符串字段，缺失时为空串
    pub fn lowercase(&self, key: &str) -> String {
        self.text(key).map(|s| s.to_lowercase()).unwrap_or_default()
    }

    /// `true` 或字符串 `"true"`
    pub fn flag(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    /// 字段存在且非空：排除 null、false、""、0
    pub fn is_present(&self, key: &str) -> bool {
        truthy(self.get(key))
    }

    /// 数字字段，也接受数字字符串
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn user_agent(&self) -> String {
        self.lowercase("userAgent")
    }

    /// `chrome.runtime` 存在（CDP 自动化痕迹）
    pub fn has_cdp_runtime(&self) -> bool {
        truthy(self.get("chrome").and_then(|c| c.get("runtime")))
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// 页面交互指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorMetrics {
    #[serde(default)]
    pub mouse_movements: Option<i32>,
    #[serde(default)]
    pub clicks: Option<i32>,
    #[serde(default)]
    pub key_presses: Option<i32>,
    #[serde(default)]
    pub scrolls: Option<i32>,
    /// 秒
    #[serde(default)]
    pub time_on_page: Option<f64>,
    /// 秒
    #[serde(default)]
    pub time_to_first_interaction: Option<f64>,
    /// 百分比
    #[serde(default)]
    pub scroll_depth: Option<i32>,
}

/// 三态判定
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Verdict {
    Legitimate,
    Suspicious,
    Fraud,
}

impl Verdict {
    /// 判定只取决于分数和两个边界
    pub fn classify(score: u8, thresholds: &FraudThresholds) -> Self {
        if score >= thresholds.fraud_score_threshold {
            Verdict::Fraud
        } else if score >= thresholds.suspicious_floor {
            Verdict::Suspicious
        } else {
            Verdict::Legitimate
        }
    }

    /// 返回给被追踪客户端的状态，不暴露更多细节
    pub fn client_status(&self) -> &'static str {
        match self {
            Verdict::Legitimate => "ok",
            Verdict::Suspicious => "suspicious",
            Verdict::Fraud => "fraud",
        }
    }
}

/// 站点级阈值覆盖，字段为空时使用全局值
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SiteOverrides {
    pub max_clicks_per_hour: Option<i64>,
    pub min_time_on_site: Option<f64>,
    pub fraud_score_threshold: Option<i32>,
    pub auto_block_enabled: Option<bool>,
}

/// 生效的评分阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FraudThresholds {
    pub max_clicks_per_hour: u32,
    pub min_time_on_site: f64,
    pub fraud_score_threshold: u8,
    pub suspicious_floor: u8,
    pub auto_block_enabled: bool,
    pub low_confidence_missing_inputs: u8,
}

impl Default for FraudThresholds {
    fn default() -> Self {
        Self::from(&FraudConfig::default())
    }
}

impl From<&FraudConfig> for FraudThresholds {
    fn from(config: &FraudConfig) -> Self {
        Self {
            max_clicks_per_hour: config.max_clicks_per_hour,
            min_time_on_site: config.min_time_on_site,
            fraud_score_threshold: config.fraud_score_threshold,
            suspicious_floor: config.suspicious_floor,
            auto_block_enabled: config.auto_block_enabled,
            low_confidence_missing_inputs: config.low_confidence_missing_inputs,
        }
    }
}

impl FraudThresholds {
    /// 合并站点覆盖；不合法的覆盖值回退到全局值
    pub fn with_site_overrides(&self, overrides: &SiteOverrides) -> Self {
        let mut merged = *self;

        if let Some(max_clicks) = overrides.max_clicks_per_hour {
            match u32::try_from(max_clicks) {
                Ok(v) if validate_click_limits(v, merged.min_time_on_site).is_ok() => {
                    merged.max_clicks_per_hour = v;
                }
                _ => tracing::warn!(
                    "Ignoring invalid site override max_clicks_per_hour={}",
                    max_clicks
                ),
            }
        }

        if let Some(min_time) = overrides.min_time_on_site {
            if validate_click_limits(merged.max_clicks_per_hour, min_time).is_ok() {
                merged.min_time_on_site = min_time;
            } else {
                tracing::warn!(
                    "Ignoring invalid site override min_time_on_site={}",
                    min_time
                );
            }
        }

        if let Some(threshold) = overrides.fraud_score_threshold {
            match u8::try_from(threshold) {
                Ok(v) if validate_verdict_bounds(merged.suspicious_floor, v).is_ok() => {
                    merged.fraud_score_threshold = v;
                }
                _ => tracing::warn!(
                    "Ignoring invalid site override fraud_score_threshold={}",
                    threshold
                ),
            }
        }

        if let Some(enabled) = overrides.auto_block_enabled {
            merged.auto_block_enabled = enabled;
        }

        merged
    }
}

/// 历史信号（评分前读取）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoricalSignals {
    /// 该指纹 7 天内在本站出现的次数（含当前事件）
    pub fingerprint_reuse: u64,
    /// 该 IP 30 天内的欺诈事件数
    pub prior_fraud_count: u64,
    /// 当前是否存在未过期的封禁
    pub has_active_block: bool,
    /// 查询失败（按 0 处理）的次数
    pub degraded_lookups: u8,
}

/// 没有任何规则命中时的原因文本
pub const NO_ANOMALIES: &str = "No anomalies detected";

/// 原因之间的分隔符
pub const REASON_SEPARATOR: &str = "; ";

/// 评分结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FraudAssessment {
    pub score: u8,
    pub verdict: Verdict,
    pub reasons: Vec<String>,
    pub low_confidence: bool,
}

impl FraudAssessment {
    /// 拼接后的原因文本
    pub fn reason_text(&self) -> String {
        if self.reasons.is_empty() {
            NO_ANOMALIES.to_string()
        } else {
            self.reasons.join(REASON_SEPARATOR)
        }
    }
}
