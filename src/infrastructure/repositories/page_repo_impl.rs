// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::{EnrichmentKind, EnrichmentState, Page};
use crate::domain::repositories::frontier_repository::RepositoryError;
use crate::domain::repositories::page_repository::{EnrichmentResult, PageRepository};
use crate::infrastructure::database::entities::page as page_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;
use uuid::Uuid;

/// 页面仓库实现
///
/// 基于SeaORM实现的页面数据访问层。富化写入以version列
/// 为守卫做条件更新：不同富化类型的并发完成竞争同一行时，
/// 落后者观察到Conflict并由调用方重读重试
#[derive(Clone)]
pub struct PageRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl PageRepositoryImpl {
    /// 创建新的页面仓库实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<page_entity::Model> for Page {
    fn from(model: page_entity::Model) -> Self {
        Self {
            id: model.id,
            target_url: model.target_url,
            netloc: model.netloc,
            status_code: model.status_code,
            fetch_outcome: model.fetch_outcome.parse().unwrap_or_default(),
            title: model.title,
            body: model.body,
            content_ref: model.content_ref,
            artifacts: serde_json::from_value(model.artifacts).unwrap_or_default(),
            capture_ref: model.capture_ref,
            language: model.language,
            subject: model.subject,
            subject_confidence: model.subject_confidence,
            capture_state: model.capture_state.parse().unwrap_or_default(),
            classify_state: model.classify_state.parse().unwrap_or_default(),
            version: model.version,
            fetched_at: model.fetched_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<Page> for page_entity::ActiveModel {
    fn from(page: Page) -> Self {
        Self {
            id: Set(page.id),
            target_url: Set(page.target_url),
            netloc: Set(page.netloc),
            status_code: Set(page.status_code),
            fetch_outcome: Set(page.fetch_outcome.to_string()),
            title: Set(page.title),
            body: Set(page.body),
            content_ref: Set(page.content_ref),
            artifacts: Set(serde_json::to_value(&page.artifacts)
                .unwrap_or(serde_json::Value::Null)),
            capture_ref: Set(page.capture_ref),
            language: Set(page.language),
            subject: Set(page.subject),
            subject_confidence: Set(page.subject_confidence),
            capture_state: Set(page.capture_state.to_string()),
            classify_state: Set(page.classify_state.to_string()),
            version: Set(page.version),
            fetched_at: Set(page.fetched_at),
            created_at: Set(page.created_at),
            updated_at: Set(page.updated_at),
        }
    }
}

#[async_trait]
impl PageRepository for PageRepositoryImpl {
    async fn save(&self, page: &Page) -> Result<(), RepositoryError> {
        let model: page_entity::ActiveModel = page.clone().into();
        page_entity::Entity::insert(model)
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Page>, RepositoryError> {
        let model = page_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn find_by_target_url(&self, url: &str) -> Result<Option<Page>, RepositoryError> {
        let model = page_entity::Entity::find()
            .filter(page_entity::Column::TargetUrl.eq(url))
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn attach_enrichment(
        &self,
        id: Uuid,
        kind: EnrichmentKind,
        state: EnrichmentState,
        result: Option<EnrichmentResult>,
        expected_version: i32,
    ) -> Result<(), RepositoryError> {
        let mut update = page_entity::Entity::update_many()
            .col_expr(
                page_entity::Column::Version,
                Expr::col(page_entity::Column::Version).add(1),
            )
            .col_expr(
                page_entity::Column::UpdatedAt,
                Expr::value(chrono::DateTime::<chrono::FixedOffset>::from(Utc::now())),
            );

        let state_column = match kind {
            EnrichmentKind::Capture => page_entity::Column::CaptureState,
            EnrichmentKind::Classify => page_entity::Column::ClassifyState,
        };
        update = update.col_expr(state_column, Expr::value(state.to_string()));

        match result {
            Some(EnrichmentResult::Capture { capture_ref }) => {
                update = update.col_expr(
                    page_entity::Column::CaptureRef,
                    Expr::value(Some(capture_ref)),
                );
            }
            Some(EnrichmentResult::Classify {
                language,
                subject,
                confidence,
            }) => {
                update = update
                    .col_expr(page_entity::Column::Language, Expr::value(language))
                    .col_expr(page_entity::Column::Subject, Expr::value(Some(subject)))
                    .col_expr(
                        page_entity::Column::SubjectConfidence,
                        Expr::value(Some(confidence)),
                    );
            }
            None => {}
        }

        let result = update
            .filter(page_entity::Column::Id.eq(id))
            .filter(page_entity::Column::Version.eq(expected_version))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            // 区分行不存在与版本竞争
            let exists = page_entity::Entity::find_by_id(id)
                .one(self.db.as_ref())
                .await?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict
            } else {
                RepositoryError::NotFound
            });
        }

        Ok(())
    }
}
