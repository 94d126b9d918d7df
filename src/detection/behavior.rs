//! 行为异常检测
//!
//! 点击频率规则总是参与评估；其余规则只在上报了行为数据时生效，
//! 缺失的字段让对应规则跳过。

use serde_json::Value;

use super::rules::{Hit, Rule, RuleOutcome, RuleSet};
use super::types::{BehaviorMetrics, Fingerprint, FraudThresholds};

/// 无头浏览器痕迹
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadlessMarkers {
    pub automation_user_agent: bool,
    pub cdp_runtime: bool,
    pub canvas_missing_with_webgl: bool,
    pub zero_cores: bool,
    pub permissions_denied: bool,
}

impl HeadlessMarkers {
    pub fn detect(fp: &Fingerprint) -> Self {
        let ua = fp.user_agent();
        let webgl_supported = fp.is_present("webgl") && fp.lowercase("webgl") != "not_supported";

        Self {
            automation_user_agent: ["headlesschrome", "headless", "phantomjs", "selenium"]
                .iter()
                .any(|k| ua.contains(k)),
            cdp_runtime: fp.has_cdp_runtime(),
            canvas_missing_with_webgl: !fp.is_present("canvas") && webgl_supported,
            zero_cores: fp.number("hardwareConcurrency") == Some(0.0),
            permissions_denied: matches!(
                fp.get("permissions"),
                Some(Value::Bool(false))
            ) || matches!(fp.get("permissions"), Some(Value::String(s)) if s == "denied"),
        }
    }

    pub fn any(&self) -> bool {
        self.automation_user_agent
            || self.cdp_runtime
            || self.canvas_missing_with_webgl
            || self.zero_cores
            || self.permissions_denied
    }
}

/// 行为规则的输入
#[derive(Debug, Clone, Copy)]
pub struct BehaviorContext {
    pub behavior: Option<BehaviorMetrics>,
    /// 只有同时上报了指纹才会有值
    pub headless: Option<HeadlessMarkers>,
    /// 该 IP 最近一小时内的点击数（含本次）
    pub click_count: u64,
    pub max_clicks_per_hour: u32,
    pub min_time_on_site: f64,
}

impl BehaviorContext {
    pub fn new(
        behavior: Option<&BehaviorMetrics>,
        fingerprint: Option<&Fingerprint>,
        click_count: u64,
        thresholds: &FraudThresholds,
    ) -> Self {
        Self {
            behavior: behavior.copied(),
            headless: fingerprint.map(HeadlessMarkers::detect),
            click_count,
            max_clicks_per_hour: thresholds.max_clicks_per_hour,
            min_time_on_site: thresholds.min_time_on_site,
        }
    }
}

pub static BEHAVIOR_RULES_V1: RuleSet<BehaviorContext> = RuleSet {
    version: "behavior-v1",
    rules: &[
        Rule {
            id: "click_rate",
            points: 40,
            cap: None,
            check: click_rate,
        },
        Rule {
            id: "short_visit",
            points: 25,
            cap: None,
            check: short_visit,
        },
        Rule {
            id: "no_mouse",
            points: 20,
            cap: None,
            check: no_mouse,
        },
        Rule {
            id: "no_interaction",
            points: 10,
            cap: None,
            check: no_interaction,
        },
        Rule {
            id: "instant_interaction",
            points: 15,
            cap: None,
            check: instant_interaction,
        },
        Rule {
            id: "scroll_velocity",
            points: 10,
            cap: None,
            check: scroll_velocity,
        },
        Rule {
            id: "headless",
            points: 30,
            cap: None,
            check: headless,
        },
    ],
};

/// BehaviorAnomalyEvaluator
pub struct BehaviorEvaluator {
    rules: &'static RuleSet<BehaviorContext>,
}

impl Default for BehaviorEvaluator {
    fn default() -> Self {
        Self::new(&BEHAVIOR_RULES_V1)
    }
}

impl BehaviorEvaluator {
    pub fn new(rules: &'static RuleSet<BehaviorContext>) -> Self {
        Self { rules }
    }

    pub fn version(&self) -> &'static str {
        self.rules.version
    }

    pub fn evaluate(&self, ctx: &BehaviorContext) -> RuleOutcome {
        self.rules.evaluate(ctx)
    }
}

fn click_rate(ctx: &BehaviorContext) -> Option<Hit> {
    (ctx.click_count > ctx.max_clicks_per_hour as u64).then(|| {
        Hit::once(format!(
            "Too many clicks: {} in the last hour",
            ctx.click_count
        ))
    })
}

fn short_visit(ctx: &BehaviorContext) -> Option<Hit> {
    let t = ctx.behavior?.time_on_page?;
    (t > 0.0 && t < ctx.min_time_on_site).then(|| Hit::once(format!("Short visit: {}s", t)))
}

fn no_mouse(ctx: &BehaviorContext) -> Option<Hit> {
    let b = ctx.behavior?;
    let t = b.time_on_page?;
    (b.mouse_movements? == 0 && t > 2.0).then(|| Hit::once("No mouse activity"))
}

fn no_interaction(ctx: &BehaviorContext) -> Option<Hit> {
    let b = ctx.behavior?;
    let t = b.time_on_page?;
    (b.clicks? == 0 && b.key_presses? == 0 && t > 1.0).then(|| Hit::once("No interaction"))
}

fn instant_interaction(ctx: &BehaviorContext) -> Option<Hit> {
    let first = ctx.behavior?.time_to_first_interaction?;
    (first < 0.5).then(|| Hit::once("Instant interaction (bot-like)"))
}

fn scroll_velocity(ctx: &BehaviorContext) -> Option<Hit> {
    let b = ctx.behavior?;
    let scrolls = b.scrolls?;
    let t = b.time_on_page?;
    (scrolls > 0 && t > 0.0 && scrolls as f64 / t > 5.0)
        .then(|| Hit::once("Abnormal scroll velocity"))
}

fn headless(ctx: &BehaviorContext) -> Option<Hit> {
    ctx.behavior?;
    ctx.headless?
        .any()
        .then(|| Hit::once("Headless browser detected"))
}
