// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::target::{RegisterOutcome, Target, TargetState};
use async_trait::async_trait;
use sea_orm::DbErr;
use thiserror::Error;

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    /// 记录未找到
    #[error("Record not found")]
    NotFound,
    /// 版本守卫冲突（并发写竞争）
    #[error("Version conflict")]
    Conflict,
    /// 非法状态转换
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),
}

/// 前沿存储特质
///
/// Target生命周期的唯一所有者。register对并发调用者原子：
/// 同一标识符恰好一个调用者观察到New，保证每个标识符
/// 至多入队一次，与发现的并发度无关
#[async_trait]
pub trait FrontierRepository: Send + Sync {
    /// 注册一个发现的目标
    ///
    /// 标识符已存在时返回Duplicate且不做任何修改
    async fn register(&self, target: &Target) -> Result<RegisterOutcome, RepositoryError>;

    /// 更新目标状态与尝试计数
    ///
    /// 违反单调转换规则的调用返回InvalidTransition
    async fn mark(
        &self,
        url: &str,
        state: TargetState,
        attempt_count: i32,
    ) -> Result<(), RepositoryError>;

    /// 按标识符查询目标
    async fn query(&self, url: &str) -> Result<Option<Target>, RepositoryError>;
}
