//! 指纹异常检测
//!
//! 纯函数，不做 I/O。每条检查独立累加，字段缺失时按规则说明跳过或视为异常。

use super::rules::{Hit, Rule, RuleOutcome, RuleSet};
use super::types::Fingerprint;

/// user agent 中出现即视为 VPN/代理
pub const VPN_KEYWORDS: &[&str] = &[
    "vpn",
    "proxy",
    "tor",
    "anonymizer",
    "hidester",
    "proxifier",
    "tunnelbear",
];

/// 当前生效的指纹规则表
pub static FINGERPRINT_RULES_V1: RuleSet<Fingerprint> = RuleSet {
    version: "fingerprint-v1",
    rules: &[
        Rule {
            id: "webdriver",
            points: 25,
            cap: None,
            check: webdriver,
        },
        Rule {
            id: "webgl_missing",
            points: 10,
            cap: None,
            check: webgl_missing,
        },
        Rule {
            id: "no_plugins",
            points: 5,
            cap: None,
            check: no_plugins,
        },
        Rule {
            id: "timezone_language_mismatch",
            points: 15,
            cap: None,
            check: timezone_language_mismatch,
        },
        Rule {
            id: "vpn_user_agent",
            points: 10,
            cap: None,
            check: vpn_user_agent,
        },
        Rule {
            id: "screen_anomaly",
            points: 5,
            cap: None,
            check: screen_anomaly,
        },
        Rule {
            id: "touch_mismatch",
            points: 5,
            cap: None,
            check: touch_mismatch,
        },
        Rule {
            id: "hardware_concurrency",
            points: 10,
            cap: None,
            check: hardware_concurrency,
        },
    ],
};

/// FingerprintAnomalyEvaluator
pub struct FingerprintEvaluator {
    rules: &'static RuleSet<Fingerprint>,
}

impl Default for FingerprintEvaluator {
    fn default() -> Self {
        Self::new(&FINGERPRINT_RULES_V1)
    }
}

impl FingerprintEvaluator {
    pub fn new(rules: &'static RuleSet<Fingerprint>) -> Self {
        Self { rules }
    }

    pub fn version(&self) -> &'static str {
        self.rules.version
    }

    pub fn evaluate(&self, fingerprint: &Fingerprint) -> RuleOutcome {
        self.rules.evaluate(fingerprint)
    }
}

fn webdriver(fp: &Fingerprint) -> Option<Hit> {
    fp.flag("webdriver").then(|| Hit::once("WebDriver detected"))
}

fn webgl_missing(fp: &Fingerprint) -> Option<Hit> {
    let missing = !fp.is_present("webgl") || fp.lowercase("webgl") == "not_supported";
    missing.then(|| Hit::once("WebGL not supported"))
}

fn no_plugins(fp: &Fingerprint) -> Option<Hit> {
    let empty = matches!(fp.text("plugins").as_deref(), Some("none" | "" | "0"));
    empty.then(|| Hit::once("No browser plugins"))
}

/// 语言与时区明显矛盾
pub fn is_timezone_language_mismatch(fp: &Fingerprint) -> bool {
    if !fp.is_present("timezone") || !fp.is_present("language") {
        return false;
    }

    let tz = fp.lowercase("timezone");
    let lang = fp.lowercase("language");

    if (lang.contains("ru") || lang.contains("russian"))
        && (tz.contains("america") || tz.contains("pacific"))
    {
        return true;
    }

    if (lang.contains("en-us") || lang.contains("english"))
        && (tz.contains("asia/shanghai") || tz.contains("asia/kolkata"))
    {
        return true;
    }

    if (lang.contains("zh") || lang.contains("chinese"))
        && (tz.contains("america") || tz.contains("europe"))
    {
        return true;
    }

    false
}

fn timezone_language_mismatch(fp: &Fingerprint) -> Option<Hit> {
    is_timezone_language_mismatch(fp).then(|| Hit::once("Timezone/language mismatch"))
}

fn vpn_user_agent(fp: &Fingerprint) -> Option<Hit> {
    let ua = fp.user_agent();
    if ua.is_empty() {
        return None;
    }
    VPN_KEYWORDS
        .iter()
        .any(|k| ua.contains(k))
        .then(|| Hit::once("VPN/Proxy detected"))
}

/// 分辨率越界或宽高比不在 [1, 3]
pub fn is_screen_anomaly(fp: &Fingerprint) -> bool {
    if !fp.is_present("screenWidth") || !fp.is_present("screenHeight") {
        return false;
    }
    let (Some(width), Some(height)) = (fp.number("screenWidth"), fp.number("screenHeight")) else {
        return false;
    };
    let (width, height) = (width.trunc(), height.trunc());

    if !(800.0..=7680.0).contains(&width) || !(600.0..=4320.0).contains(&height) {
        return true;
    }

    let ratio = width / height;
    !(1.0..=3.0).contains(&ratio)
}

fn screen_anomaly(fp: &Fingerprint) -> Option<Hit> {
    is_screen_anomaly(fp).then(|| Hit::once("Abnormal screen resolution"))
}

fn touch_mismatch(fp: &Fingerprint) -> Option<Hit> {
    let ua = fp.user_agent();
    let mobile = ua.contains("mobile") || ua.contains("android") || ua.contains("iphone");
    (mobile && !fp.flag("touchSupport")).then(|| Hit::once("Touch support mismatch"))
}

fn hardware_concurrency(fp: &Fingerprint) -> Option<Hit> {
    let cores = fp.number("hardwareConcurrency")?;
    (cores == 0.0 || cores > 64.0).then(|| Hit::once("Suspicious CPU core count"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn fp(value: Value) -> Fingerprint {
        serde_json::from_value(value).unwrap()
    }

    fn clean() -> Value {
        json!({
            "userAgent": "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
            "webgl": "ANGLE (NVIDIA GeForce GTX 1060)",
            "canvas": "c4f1a9",
            "plugins": "PDF Viewer,Chrome PDF Viewer",
            "timezone": "Europe/Moscow",
            "language": "ru-RU",
            "screenWidth": 1920,
            "screenHeight": 1080,
            "hardwareConcurrency": 8,
            "touchSupport": false,
            "webdriver": false
        })
    }

    fn with(field: &str, value: Value) -> Fingerprint {
        let mut v = clean();
        v[field] = value;
        fp(v)
    }

    fn evaluate(f: &Fingerprint) -> RuleOutcome {
        FingerprintEvaluator::default().evaluate(f)
    }

    #[test]
    fn test_clean_fingerprint_scores_zero() {
        let outcome = evaluate(&fp(clean()));
        assert_eq!(outcome.score, 0, "unexpected hits: {:?}", outcome.hits);
    }

    #[test]
    fn test_webdriver_bool_and_string() {
        assert_eq!(evaluate(&with("webdriver", json!(true))).score, 25);
        assert_eq!(evaluate(&with("webdriver", json!("true"))).score, 25);
        assert_eq!(evaluate(&with("webdriver", json!("false"))).score, 0);
    }

    #[test]
    fn test_webgl_missing_or_unsupported() {
        assert_eq!(evaluate(&with("webgl", json!("not_supported"))).score, 10);
        assert_eq!(evaluate(&with("webgl", json!(""))).score, 10);
        let mut v = clean();
        v.as_object_mut().unwrap().remove("webgl");
        let outcome = evaluate(&fp(v));
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.hits[0].reason, "WebGL not supported");
    }

    #[test]
    fn test_no_plugins_values() {
        for value in ["none", "", "0"] {
            assert_eq!(evaluate(&with("plugins", json!(value))).score, 5, "{}", value);
        }
        let mut v = clean();
        v.as_object_mut().unwrap().remove("plugins");
        assert_eq!(evaluate(&fp(v)).score, 0);
    }

    #[test]
    fn test_timezone_language_table() {
        let cases = [
            ("ru-RU", "America/New_York", true),
            ("ru", "Pacific/Auckland", true),
            ("en-US", "Asia/Shanghai", true),
            ("en-US", "Asia/Kolkata", true),
            ("zh-CN", "Europe/Berlin", true),
            ("zh-CN", "America/Los_Angeles", true),
            ("en-US", "America/New_York", false),
            ("zh-CN", "Asia/Shanghai", false),
        ];
        for (lang, tz, expected) in cases {
            let mut v = clean();
            v["language"] = json!(lang);
            v["timezone"] = json!(tz);
            assert_eq!(
                is_timezone_language_mismatch(&fp(v)),
                expected,
                "{} / {}",
                lang,
                tz
            );
        }
    }

    #[test]
    fn test_timezone_mismatch_requires_both_fields() {
        let mut v = clean();
        v["timezone"] = json!("America/New_York");
        v.as_object_mut().unwrap().remove("language");
        assert!(!is_timezone_language_mismatch(&fp(v)));
    }

    #[test]
    fn test_vpn_keywords() {
        let f = with("userAgent", json!("Mozilla/5.0 TunnelBear/3.0"));
        let outcome = evaluate(&f);
        assert_eq!(outcome.score, 10);
        assert_eq!(outcome.hits[0].reason, "VPN/Proxy detected");
    }

    #[test]
    fn test_screen_anomalies() {
        let mut v = clean();
        v["screenWidth"] = json!(640);
        v["screenHeight"] = json!(480);
        assert!(is_screen_anomaly(&fp(v)));

        let mut v = clean();
        v["screenWidth"] = json!("1080");
        v["screenHeight"] = json!("1920");
        assert!(is_screen_anomaly(&fp(v)), "portrait ratio < 1");

        let mut v = clean();
        v["screenWidth"] = json!(3840);
        v["screenHeight"] = json!(1080);
        assert!(is_screen_anomaly(&fp(v)), "ratio > 3");

        let mut v = clean();
        v.as_object_mut().unwrap().remove("screenHeight");
        assert!(!is_screen_anomaly(&fp(v)));
    }

    #[test]
    fn test_touch_mismatch() {
        let mut v = clean();
        v["userAgent"] = json!("Mozilla/5.0 (Linux; Android 14) Mobile Safari");
        v["touchSupport"] = json!(false);
        assert_eq!(evaluate(&fp(v.clone())).score, 5);

        v["touchSupport"] = json!("true");
        assert_eq!(evaluate(&fp(v)).score, 0);
    }

    #[test]
    fn test_hardware_concurrency() {
        assert_eq!(evaluate(&with("hardwareConcurrency", json!(0))).score, 10);
        assert_eq!(evaluate(&with("hardwareConcurrency", json!(128))).score, 10);
        assert_eq!(evaluate(&with("hardwareConcurrency", json!(64))).score, 0);
        assert_eq!(evaluate(&with("hardwareConcurrency", Value::Null)).score, 0);
    }

    #[test]
    fn test_checks_are_additive() {
        let f = fp(json!({
            "userAgent": "proxy-bot",
            "webdriver": true,
            "plugins": "none",
            "hardwareConcurrency": 0
        }));
        // webdriver + webgl + plugins + vpn + cores
        assert_eq!(evaluate(&f).score, 25 + 10 + 5 + 10 + 10);
    }
}
