//! 评分与封禁查询使用的索引
//!
//! - (site_id, ip_address, created_at): 指纹/IP 历史窗口、自动封禁候选
//! - (site_id, fingerprint_hash, created_at): 指纹复用计数
//! - created_at: 数据保留清理
//! - (is_active, auto_unblock_at): 过期扫描

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const INDEXES: &[&str] = &[
    "idx_click_events_site_ip_time",
    "idx_click_events_site_fp_time",
    "idx_click_events_created_at",
    "idx_blocked_ips_active_expiry",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(INDEXES[0])
                    .table(ClickEvents::Table)
                    .col(ClickEvents::SiteId)
                    .col(ClickEvents::IpAddress)
                    .col(ClickEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(INDEXES[1])
                    .table(ClickEvents::Table)
                    .col(ClickEvents::SiteId)
                    .col(ClickEvents::FingerprintHash)
                    .col(ClickEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(INDEXES[2])
                    .table(ClickEvents::Table)
                    .col(ClickEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name(INDEXES[3])
                    .table(BlockedIps::Table)
                    .col(BlockedIps::IsActive)
                    .col(BlockedIps::AutoUnblockAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for name in INDEXES.iter().rev() {
            manager
                .drop_index(Index::drop().name(*name).to_owned())
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum ClickEvents {
    Table,
    SiteId,
    IpAddress,
    FingerprintHash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum BlockedIps {
    Table,
    IsActive,
    AutoUnblockAt,
}
