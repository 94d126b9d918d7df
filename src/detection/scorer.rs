//! 欺诈评分
//!
//! 依次累加行为、指纹、历史三张规则表，截断到 [0, 100] 后按阈值分类。

use super::behavior::{BehaviorContext, BehaviorEvaluator};
use super::fingerprint::FingerprintEvaluator;
use super::history::HistoryEvaluator;
use super::types::{
    BehaviorMetrics, Fingerprint, FraudAssessment, FraudThresholds, HistoricalSignals, Verdict,
};

pub const MAX_SCORE: u32 = 100;

/// 单次评分的输入
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringInput<'a> {
    pub fingerprint: Option<&'a Fingerprint>,
    pub behavior: Option<&'a BehaviorMetrics>,
    /// 该 IP 最近一小时内的点击数（含本次）
    pub click_count: u64,
}

impl ScoringInput<'_> {
    /// 缺失或降级的输入数量（指纹、行为、历史）
    fn missing_inputs(&self, history: &HistoricalSignals) -> u8 {
        let mut missing = 0;
        if self.fingerprint.is_none_or(Fingerprint::is_empty) {
            missing += 1;
        }
        if self.behavior.is_none() {
            missing += 1;
        }
        if history.degraded_lookups > 0 {
            missing += 1;
        }
        missing
    }
}

/// FraudScorer
#[derive(Default)]
pub struct FraudScorer {
    behavior: BehaviorEvaluator,
    fingerprint: FingerprintEvaluator,
    history: HistoryEvaluator,
}

impl FraudScorer {
    pub fn new(
        behavior: BehaviorEvaluator,
        fingerprint: FingerprintEvaluator,
        history: HistoryEvaluator,
    ) -> Self {
        Self {
            behavior,
            fingerprint,
            history,
        }
    }

    /// 规则表版本，格式 behavior-v1+fingerprint-v1+history-v1
    pub fn rules_version(&self) -> String {
        format!(
            "{}+{}+{}",
            self.behavior.version(),
            self.fingerprint.version(),
            self.history.version()
        )
    }

    pub fn score(
        &self,
        input: &ScoringInput<'_>,
        history: &HistoricalSignals,
        thresholds: &FraudThresholds,
    ) -> FraudAssessment {
        let ctx = BehaviorContext::new(
            input.behavior,
            input.fingerprint,
            input.click_count,
            thresholds,
        );

        let mut outcome = self.behavior.evaluate(&ctx);
        if let Some(fp) = input.fingerprint {
            outcome.merge(self.fingerprint.evaluate(fp));
        }
        outcome.merge(self.history.evaluate(history));

        let score = outcome.score.min(MAX_SCORE) as u8;
        let limit = thresholds.low_confidence_missing_inputs;

        FraudAssessment {
            score,
            verdict: Verdict::classify(score, thresholds),
            reasons: outcome.hits.into_iter().map(|h| h.reason).collect(),
            low_confidence: limit > 0 && input.missing_inputs(history) >= limit,
        }
    }
}
