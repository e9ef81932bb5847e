// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::target::{RegisterOutcome, Target, TargetState};
use crate::domain::repositories::frontier_repository::{FrontierRepository, RepositoryError};
use crate::infrastructure::database::entities::target as target_entity;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use std::sync::Arc;

/// 前沿存储实现
///
/// 基于SeaORM实现的前沿数据访问层。register的原子性由
/// url列的唯一索引保证：并发注册同一标识符时恰好一次
/// 插入成功，其余观察到冲突并返回Duplicate
#[derive(Clone)]
pub struct FrontierRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl FrontierRepositoryImpl {
    /// 创建新的前沿存储实例
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<target_entity::Model> for Target {
    fn from(model: target_entity::Model) -> Self {
        Self {
            id: model.id,
            url: model.url,
            netloc: model.netloc,
            parent: model.parent,
            depth: model.depth,
            state: model.state.parse().unwrap_or_default(),
            attempt_count: model.attempt_count,
            is_onion: model.is_onion,
            first_seen: model.first_seen,
            updated_at: model.updated_at,
        }
    }
}

impl From<Target> for target_entity::ActiveModel {
    fn from(target: Target) -> Self {
        Self {
            id: Set(target.id),
            url: Set(target.url),
            netloc: Set(target.netloc),
            parent: Set(target.parent),
            depth: Set(target.depth),
            state: Set(target.state.to_string()),
            attempt_count: Set(target.attempt_count),
            is_onion: Set(target.is_onion),
            first_seen: Set(target.first_seen),
            updated_at: Set(target.updated_at),
        }
    }
}

#[async_trait]
impl FrontierRepository for FrontierRepositoryImpl {
    async fn register(&self, target: &Target) -> Result<RegisterOutcome, RepositoryError> {
        let model: target_entity::ActiveModel = target.clone().into();

        let result = target_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(target_entity::Column::Url)
                    .do_nothing()
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await;

        match result {
            Ok(_) => Ok(RegisterOutcome::New),
            Err(DbErr::RecordNotInserted) => Ok(RegisterOutcome::Duplicate),
            Err(e) => Err(e.into()),
        }
    }

    async fn mark(
        &self,
        url: &str,
        state: TargetState,
        attempt_count: i32,
    ) -> Result<(), RepositoryError> {
        let model = target_entity::Entity::find()
            .filter(target_entity::Column::Url.eq(url))
            .one(self.db.as_ref())
            .await?
            .ok_or(RepositoryError::NotFound)?;

        let current: TargetState = model.state.parse().unwrap_or_default();
        // 同状态重放是幂等的：重投递的任务会重复标记
        if current != state && !Target::can_transition(current, state) {
            return Err(RepositoryError::InvalidTransition(format!(
                "{} -> {}",
                current, state
            )));
        }

        let mut active: target_entity::ActiveModel = model.into();
        active.state = Set(state.to_string());
        active.attempt_count = Set(attempt_count);
        active.updated_at = Set(Utc::now().into());
        active.update(self.db.as_ref()).await?;

        Ok(())
    }

    async fn query(&self, url: &str) -> Result<Option<Target>, RepositoryError> {
        let model = target_entity::Entity::find()
            .filter(target_entity::Column::Url.eq(url))
            .one(self.db.as_ref())
            .await?;

        Ok(model.map(Into::into))
    }
}
