//! Scored click event entity
//!
//! Rows are written once after scoring and never updated.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "click_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub site_id: i64,
    pub ip_address: String,
    pub fingerprint_hash: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub user_agent: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    pub mouse_movements: Option<i32>,
    pub clicks: Option<i32>,
    pub key_presses: Option<i32>,
    pub scrolls: Option<i32>,
    pub time_on_page: Option<f64>,
    pub time_to_first_interaction: Option<f64>,
    pub scroll_depth: Option<i32>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_term: Option<String>,
    pub utm_content: Option<String>,
    pub yclid: Option<String>,
    pub fraud_score: i32,
    /// legitimate / suspicious / fraud
    pub verdict: String,
    #[sea_orm(column_type = "Text")]
    pub fraud_reason: String,
    pub low_confidence: bool,
    /// Raw fingerprint payload (JSON)
    #[sea_orm(column_type = "Text", nullable)]
    pub fingerprint_data: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
