// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::{EnrichmentKind, EnrichmentState, Page};
use crate::domain::repositories::frontier_repository::RepositoryError;
use async_trait::async_trait;
use uuid::Uuid;

/// 单次富化写入的载荷
///
/// 富化分发器附加到页面上的结果，按类型携带不同字段
#[derive(Debug, Clone)]
pub enum EnrichmentResult {
    /// 视觉捕获结果
    Capture { capture_ref: String },
    /// 分类结果
    Classify {
        language: Option<String>,
        subject: String,
        confidence: f64,
    },
}

/// 页面仓库特质
///
/// Page持久化的唯一所有者。富化写入以版本号为守卫，
/// 不同类型的并发完成不会相互覆盖
#[async_trait]
pub trait PageRepository: Send + Sync {
    /// 保存新页面
    async fn save(&self, page: &Page) -> Result<(), RepositoryError>;

    /// 按ID查找页面
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Page>, RepositoryError>;

    /// 按目标标识符查找页面
    async fn find_by_target_url(&self, url: &str) -> Result<Option<Page>, RepositoryError>;

    /// 版本守卫地附加一次富化结果
    ///
    /// 仅当页面当前版本等于expected_version时写入生效并递增版本；
    /// 否则返回Conflict，调用方重读后重试
    async fn attach_enrichment(
        &self,
        id: Uuid,
        kind: EnrichmentKind,
        state: EnrichmentState,
        result: Option<EnrichmentResult>,
        expected_version: i32,
    ) -> Result<(), RepositoryError>;
}
