use std::str::FromStr;

use tracing::warn;

use crate::detection::{BehaviorMetrics, Verdict};
use crate::storage::models::{BlockedIpRecord, ClickEventRecord, NewClickEvent, SiteRecord, UtmParams};
use migration::entities::{blocked_ip, click_event, site};

/// 将站点 Model 转换为 SiteRecord
pub fn model_to_site(model: site::Model) -> SiteRecord {
    SiteRecord {
        id: model.id,
        name: model.name,
        domain: model.domain,
        api_key: model.api_key,
        is_active: model.is_active,
        max_clicks_per_hour: model.max_clicks_per_hour,
        min_time_on_site: model.min_time_on_site,
        fraud_score_threshold: model.fraud_score_threshold,
        auto_block_enabled: model.auto_block_enabled,
        created_at: model.created_at,
    }
}

/// 将事件 Model 转换为 ClickEventRecord
pub fn model_to_event(model: click_event::Model) -> ClickEventRecord {
    let verdict = Verdict::from_str(&model.verdict).unwrap_or_else(|_| {
        warn!(
            "Unknown verdict '{}' on event {}, treating as legitimate",
            model.verdict, model.id
        );
        Verdict::Legitimate
    });

    ClickEventRecord {
        id: model.id,
        site_id: model.site_id,
        ip_address: model.ip_address,
        fingerprint_hash: model.fingerprint_hash,
        user_agent: model.user_agent,
        url: model.url,
        referrer: model.referrer,
        behavior: BehaviorMetrics {
            mouse_movements: model.mouse_movements,
            clicks: model.clicks,
            key_presses: model.key_presses,
            scrolls: model.scrolls,
            time_on_page: model.time_on_page,
            time_to_first_interaction: model.time_to_first_interaction,
            scroll_depth: model.scroll_depth,
        },
        utm: UtmParams {
            utm_source: model.utm_source,
            utm_medium: model.utm_medium,
            utm_campaign: model.utm_campaign,
            utm_term: model.utm_term,
            utm_content: model.utm_content,
            yclid: model.yclid,
        },
        fraud_score: model.fraud_score.clamp(0, 100) as u8,
        verdict,
        fraud_reason: model.fraud_reason,
        low_confidence: model.low_confidence,
        fingerprint_data: model.fingerprint_data,
        created_at: model.created_at,
    }
}

/// 将 NewClickEvent 转换为 ActiveModel（id 由数据库分配）
pub fn event_to_active_model(event: &NewClickEvent) -> click_event::ActiveModel {
    use sea_orm::ActiveValue::*;

    click_event::ActiveModel {
        id: NotSet,
        site_id: Set(event.site_id),
        ip_address: Set(event.ip_address.clone()),
        fingerprint_hash: Set(event.fingerprint_hash.clone()),
        user_agent: Set(event.user_agent.clone()),
        url: Set(event.url.clone()),
        referrer: Set(event.referrer.clone()),
        mouse_movements: Set(event.behavior.mouse_movements),
        clicks: Set(event.behavior.clicks),
        key_presses: Set(event.behavior.key_presses),
        scrolls: Set(event.behavior.scrolls),
        time_on_page: Set(event.behavior.time_on_page),
        time_to_first_interaction: Set(event.behavior.time_to_first_interaction),
        scroll_depth: Set(event.behavior.scroll_depth),
        utm_source: Set(event.utm.utm_source.clone()),
        utm_medium: Set(event.utm.utm_medium.clone()),
        utm_campaign: Set(event.utm.utm_campaign.clone()),
        utm_term: Set(event.utm.utm_term.clone()),
        utm_content: Set(event.utm.utm_content.clone()),
        yclid: Set(event.utm.yclid.clone()),
        fraud_score: Set(event.fraud_score as i32),
        verdict: Set(event.verdict.as_ref().to_string()),
        fraud_reason: Set(event.fraud_reason.clone()),
        low_confidence: Set(event.low_confidence),
        fingerprint_data: Set(event.fingerprint_data.clone()),
        created_at: Set(event.created_at),
    }
}

/// 将封禁 Model 转换为 BlockedIpRecord
pub fn model_to_block(model: blocked_ip::Model) -> BlockedIpRecord {
    BlockedIpRecord {
        id: model.id,
        site_id: model.site_id,
        ip_address: model.ip_address,
        reason: model.reason,
        auto_blocked: model.auto_blocked,
        auto_unblock_at: model.auto_unblock_at,
        is_active: model.is_active,
        blocked_at: model.blocked_at,
        unblocked_at: model.unblocked_at,
    }
}
