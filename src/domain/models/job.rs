// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 任务实体
///
/// 队列中一个待处理的工作单元。幂等键为(kind, payload_ref)：
/// 同一键在pending或leased期间至多存在一行，重复入队被合并。
/// ack与预算耗尽都会删除行，因此数据库唯一索引即幂等不变量。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 任务类型，决定由哪个工作器池消费
    pub kind: JobKind,
    /// 负载引用：fetch为目标规范化标识符，其余为页面ID
    pub payload_ref: String,
    /// 任务状态
    pub status: JobStatus,
    /// 已投递次数
    pub attempt_count: i32,
    /// 最大投递次数
    pub max_attempts: i32,
    /// 不早于此时间投递（退避用）
    pub scheduled_at: Option<DateTime<FixedOffset>>,
    /// 租约持有者（工作器ID）
    pub lock_token: Option<Uuid>,
    /// 租约到期时间（可见性超时）
    pub lock_expires_at: Option<DateTime<FixedOffset>>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 任务类型枚举
///
/// 每种类型对应一个独立的工作器池，工作器对kind做模式匹配分发
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// 抓取目标页面
    #[default]
    Fetch,
    /// 语言/主题分类
    Detect,
    /// 视觉捕获
    Enrich,
    /// 投递索引投影
    Index,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobKind::Fetch => write!(f, "fetch"),
            JobKind::Detect => write!(f, "detect"),
            JobKind::Enrich => write!(f, "enrich"),
            JobKind::Index => write!(f, "index"),
        }
    }
}

impl FromStr for JobKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fetch" => Ok(JobKind::Fetch),
            "detect" => Ok(JobKind::Detect),
            "enrich" => Ok(JobKind::Enrich),
            "index" => Ok(JobKind::Index),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 等待投递
    #[default]
    Pending,
    /// 已被某个工作器租约持有
    Leased,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Leased => write!(f, "leased"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "leased" => Ok(JobStatus::Leased),
            _ => Err(()),
        }
    }
}

impl Job {
    /// 创建一个新任务
    pub fn new(kind: JobKind, payload_ref: String, max_attempts: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            payload_ref,
            status: JobStatus::Pending,
            attempt_count: 0,
            max_attempts,
            scheduled_at: None,
            lock_token: None,
            lock_expires_at: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 判断任务投递预算是否已耗尽
    pub fn exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}
