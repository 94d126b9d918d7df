//! 欺诈检测
//!
//! 三张声明式规则表（行为、指纹、历史）由 `FraudScorer` 汇总为 0-100 分和三态判定。

pub mod behavior;
pub mod fingerprint;
pub mod history;
pub mod rules;
pub mod scorer;
pub mod types;

pub use behavior::{BEHAVIOR_RULES_V1, BehaviorContext, BehaviorEvaluator, HeadlessMarkers};
pub use fingerprint::{FINGERPRINT_RULES_V1, FingerprintEvaluator};
pub use history::{HISTORY_RULES_V1, HistoricalSignalProvider, HistoryEvaluator};
pub use rules::{Hit, Rule, RuleHit, RuleOutcome, RuleSet};
pub use scorer::{FraudScorer, ScoringInput};
pub use types::{
    BehaviorMetrics, Fingerprint, FraudAssessment, FraudThresholds, HistoricalSignals,
    NO_ANOMALIES, REASON_SEPARATOR, SiteOverrides, Verdict,
};
