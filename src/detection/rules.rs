//! 声明式规则表
//!
//! 每条规则是 `{id, points, cap, check}`，`check` 返回命中的次数和原因。
//! 规则之间相互独立、逐条累加，没有提前退出；同一张表按声明顺序输出原因。

/// 一次命中
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// 命中次数，得分 = points * times（受 cap 限制）
    pub times: u32,
    pub reason: String,
}

impl Hit {
    pub fn once(reason: impl Into<String>) -> Self {
        Self {
            times: 1,
            reason: reason.into(),
        }
    }

    pub fn times(times: u32, reason: impl Into<String>) -> Self {
        Self {
            times,
            reason: reason.into(),
        }
    }
}

/// 单条规则
pub struct Rule<C> {
    pub id: &'static str,
    pub points: u32,
    pub cap: Option<u32>,
    pub check: fn(&C) -> Option<Hit>,
}

impl<C> Rule<C> {
    fn award(&self, hit: &Hit) -> u32 {
        let raw = self.points.saturating_mul(hit.times);
        match self.cap {
            Some(cap) => raw.min(cap),
            None => raw,
        }
    }
}

/// 带版本号的规则表
pub struct RuleSet<C: 'static> {
    pub version: &'static str,
    pub rules: &'static [Rule<C>],
}

/// 命中记录
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub id: &'static str,
    pub points: u32,
    pub reason: String,
}

/// 一张表的评估结果（未截断）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleOutcome {
    pub score: u32,
    pub hits: Vec<RuleHit>,
}

impl RuleOutcome {
    pub fn reasons(&self) -> impl Iterator<Item = &str> {
        self.hits.iter().map(|h| h.reason.as_str())
    }

    pub fn merge(&mut self, other: RuleOutcome) {
        self.score = self.score.saturating_add(other.score);
        self.hits.extend(other.hits);
    }
}

impl<C: 'static> RuleSet<C> {
    pub fn evaluate(&self, ctx: &C) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        for rule in self.rules {
            if let Some(hit) = (rule.check)(ctx) {
                let points = rule.award(&hit);
                if points == 0 {
                    continue;
                }
                outcome.score = outcome.score.saturating_add(points);
                outcome.hits.push(RuleHit {
                    id: rule.id,
                    points,
                    reason: hit.reason,
                });
            }
        }
        outcome
    }

    /// 规则 id 列表（审计用）
    pub fn rule_ids(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.id).collect()
    }
}
