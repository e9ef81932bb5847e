// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 爬取目标实体
///
/// 表示前沿存储中一个已发现的隐藏服务地址。规范化标识符
/// 在前沿存储中全局唯一，状态转换除failed→queued（有界重试）
/// 外单调推进，fetched是抓取阶段的终态。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// 目标唯一标识符
    pub id: Uuid,
    /// 规范化标识符 (scheme://host/path)，前沿去重键
    pub url: String,
    /// 网络位置（主机名）
    pub netloc: String,
    /// 发现来源的父标识符（种子目标为空）
    pub parent: Option<String>,
    /// 距种子的跳数
    pub depth: i32,
    /// 目标状态
    pub state: TargetState,
    /// 已尝试抓取次数
    pub attempt_count: i32,
    /// 是否为onion隐藏服务地址
    pub is_onion: bool,
    /// 首次发现时间
    pub first_seen: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 目标状态枚举
///
/// 状态转换流程：
/// Discovered → Queued → Fetching → Fetched/Failed
/// Failed → Queued（未超出重试预算）或 Dead（预算耗尽）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetState {
    /// 已发现，尚未进入抓取队列（超出深度上限的目标停留于此）
    #[default]
    Discovered,
    /// 已入队等待抓取
    Queued,
    /// 抓取进行中
    Fetching,
    /// 抓取完成，抓取阶段终态
    Fetched,
    /// 抓取失败，等待退避重试
    Failed,
    /// 重试预算耗尽，永不自动重试
    Dead,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TargetState::Discovered => write!(f, "discovered"),
            TargetState::Queued => write!(f, "queued"),
            TargetState::Fetching => write!(f, "fetching"),
            TargetState::Fetched => write!(f, "fetched"),
            TargetState::Failed => write!(f, "failed"),
            TargetState::Dead => write!(f, "dead"),
        }
    }
}

impl FromStr for TargetState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discovered" => Ok(TargetState::Discovered),
            "queued" => Ok(TargetState::Queued),
            "fetching" => Ok(TargetState::Fetching),
            "fetched" => Ok(TargetState::Fetched),
            "failed" => Ok(TargetState::Failed),
            "dead" => Ok(TargetState::Dead),
            _ => Err(()),
        }
    }
}

/// 前沿注册结果
///
/// register对并发调用者原子：同一标识符恰好一个调用者
/// 观察到New，其余观察到Duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// 首次注册
    New,
    /// 标识符已存在
    Duplicate,
}

impl Target {
    /// 创建一个新发现的目标
    pub fn discovered(
        url: String,
        netloc: String,
        parent: Option<String>,
        depth: i32,
        is_onion: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            netloc,
            parent,
            depth,
            state: TargetState::Discovered,
            attempt_count: 0,
            is_onion,
            first_seen: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 校验一次状态转换是否合法
    ///
    /// 除failed→queued外转换单调；dead与fetched为终态
    pub fn can_transition(from: TargetState, to: TargetState) -> bool {
        use TargetState::*;
        matches!(
            (from, to),
            (Discovered, Queued)
                | (Queued, Fetching)
                | (Fetching, Fetched)
                | (Fetching, Failed)
                | (Failed, Queued)
                | (Failed, Dead)
                // 重投递的任务可能在上个租约标记failed前再次进入fetching
                | (Queued, Failed)
        )
    }

    /// 判断目标是否还可以重试抓取
    pub fn can_retry(&self, max_attempts: i32) -> bool {
        self.state == TargetState::Failed && self.attempt_count < max_attempts
    }
}
