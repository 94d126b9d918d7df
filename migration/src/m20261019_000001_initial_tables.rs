//! 初始表结构
//!
//! - sites: 接入的站点及其阈值覆盖
//! - click_events: 已评分的点击事件（只插入，不更新）
//! - blocked_ips: IP 封禁记录，(site_id, ip_address) 唯一

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sites::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Sites::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Sites::Domain).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Sites::ApiKey)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Sites::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Sites::MaxClicksPerHour).big_integer().null())
                    .col(ColumnDef::new(Sites::MinTimeOnSite).double().null())
                    .col(ColumnDef::new(Sites::FraudScoreThreshold).integer().null())
                    .col(ColumnDef::new(Sites::AutoBlockEnabled).boolean().null())
                    .col(
                        ColumnDef::new(Sites::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ClickEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClickEvents::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ClickEvents::SiteId).big_integer().not_null())
                    .col(
                        ColumnDef::new(ClickEvents::IpAddress)
                            .string_len(45)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::FingerprintHash)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::UserAgent).text().null())
                    .col(ColumnDef::new(ClickEvents::Url).text().null())
                    .col(ColumnDef::new(ClickEvents::Referrer).text().null())
                    .col(ColumnDef::new(ClickEvents::MouseMovements).integer().null())
                    .col(ColumnDef::new(ClickEvents::Clicks).integer().null())
                    .col(ColumnDef::new(ClickEvents::KeyPresses).integer().null())
                    .col(ColumnDef::new(ClickEvents::Scrolls).integer().null())
                    .col(ColumnDef::new(ClickEvents::TimeOnPage).double().null())
                    .col(
                        ColumnDef::new(ClickEvents::TimeToFirstInteraction)
                            .double()
                            .null(),
                    )
                    .col(ColumnDef::new(ClickEvents::ScrollDepth).integer().null())
                    .col(ColumnDef::new(ClickEvents::UtmSource).string_len(255).null())
                    .col(ColumnDef::new(ClickEvents::UtmMedium).string_len(255).null())
                    .col(
                        ColumnDef::new(ClickEvents::UtmCampaign)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(ClickEvents::UtmTerm).string_len(255).null())
                    .col(
                        ColumnDef::new(ClickEvents::UtmContent)
                            .string_len(255)
                            .null(),
                    )
                    .col(ColumnDef::new(ClickEvents::Yclid).string_len(255).null())
                    .col(
                        ColumnDef::new(ClickEvents::FraudScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ClickEvents::Verdict)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ClickEvents::FraudReason).text().not_null())
                    .col(
                        ColumnDef::new(ClickEvents::LowConfidence)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ClickEvents::FingerprintData).text().null())
                    .col(
                        ColumnDef::new(ClickEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BlockedIps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BlockedIps::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BlockedIps::SiteId).big_integer().not_null())
                    .col(
                        ColumnDef::new(BlockedIps::IpAddress)
                            .string_len(45)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BlockedIps::Reason).text().null())
                    .col(
                        ColumnDef::new(BlockedIps::AutoBlocked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(BlockedIps::AutoUnblockAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(BlockedIps::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(BlockedIps::BlockedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BlockedIps::UnblockedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 唯一约束：同一站点同一 IP 只有一行，重复封禁走 upsert
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_blocked_ips_site_ip")
                    .table(BlockedIps::Table)
                    .col(BlockedIps::SiteId)
                    .col(BlockedIps::IpAddress)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("uq_blocked_ips_site_ip").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BlockedIps::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(ClickEvents::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Sites::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
    Name,
    Domain,
    ApiKey,
    IsActive,
    MaxClicksPerHour,
    MinTimeOnSite,
    FraudScoreThreshold,
    AutoBlockEnabled,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ClickEvents {
    Table,
    Id,
    SiteId,
    IpAddress,
    FingerprintHash,
    UserAgent,
    Url,
    Referrer,
    MouseMovements,
    Clicks,
    KeyPresses,
    Scrolls,
    TimeOnPage,
    TimeToFirstInteraction,
    ScrollDepth,
    UtmSource,
    UtmMedium,
    UtmCampaign,
    UtmTerm,
    UtmContent,
    Yclid,
    FraudScore,
    Verdict,
    FraudReason,
    LowConfidence,
    FingerprintData,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BlockedIps {
    Table,
    Id,
    SiteId,
    IpAddress,
    Reason,
    AutoBlocked,
    AutoUnblockAt,
    IsActive,
    BlockedAt,
    UnblockedAt,
}
