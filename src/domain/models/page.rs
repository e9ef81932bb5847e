// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// 页面实体
///
/// 一次成功抓取的结果及其提取/富化产物。由抓取工作器创建，
/// 之后仅由富化分发器通过版本守卫的读-改-写追加富化结果，
/// 所有必需的富化类型到达终态后页面不再变更。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// 页面唯一标识符
    pub id: Uuid,
    /// 所属目标的规范化标识符
    pub target_url: String,
    /// 网络位置（主机名）
    pub netloc: String,
    /// HTTP状态码（传输层失败时为空）
    pub status_code: Option<i32>,
    /// 抓取结局
    pub fetch_outcome: FetchOutcome,
    /// 页面标题
    pub title: Option<String>,
    /// 提取的正文文本
    pub body: Option<String>,
    /// 原始内容在对象存储中的引用（sha-256内容寻址）
    pub content_ref: Option<String>,
    /// 提取的结构化产物
    pub artifacts: Artifacts,
    /// 截图在对象存储中的引用
    pub capture_ref: Option<String>,
    /// 检测到的语言
    pub language: Option<String>,
    /// 检测到的主题标签
    pub subject: Option<String>,
    /// 主题置信度
    pub subject_confidence: Option<f64>,
    /// 视觉捕获富化状态
    pub capture_state: EnrichmentState,
    /// 分类富化状态
    pub classify_state: EnrichmentState,
    /// 乐观锁版本号，并发富化写入的守卫
    pub version: i32,
    /// 抓取完成时间
    pub fetched_at: DateTime<FixedOffset>,
    /// 创建时间
    pub created_at: DateTime<FixedOffset>,
    /// 更新时间
    pub updated_at: DateTime<FixedOffset>,
}

/// 抓取结局枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FetchOutcome {
    /// 收到HTTP响应
    #[default]
    Success,
    /// 请求超时
    Timeout,
    /// 代理/传输层故障
    ProxyError,
    /// 内容无法处理（解码失败等）
    ContentError,
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FetchOutcome::Success => write!(f, "success"),
            FetchOutcome::Timeout => write!(f, "timeout"),
            FetchOutcome::ProxyError => write!(f, "proxy_error"),
            FetchOutcome::ContentError => write!(f, "content_error"),
        }
    }
}

impl FromStr for FetchOutcome {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(FetchOutcome::Success),
            "timeout" => Ok(FetchOutcome::Timeout),
            "proxy_error" => Ok(FetchOutcome::ProxyError),
            "content_error" => Ok(FetchOutcome::ContentError),
            _ => Err(()),
        }
    }
}

/// 富化类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    /// 视觉捕获（截图）
    Capture,
    /// 语言/主题分类
    Classify,
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnrichmentKind::Capture => write!(f, "capture"),
            EnrichmentKind::Classify => write!(f, "classify"),
        }
    }
}

/// 单个富化类型的状态
///
/// 部分失败是一等公民：某一类型Failed不会阻塞其他类型，
/// 也不会把页面整体标记为失败
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentState {
    /// 等待富化
    #[default]
    Pending,
    /// 富化成功
    Done,
    /// 重试预算耗尽，永久失败
    Failed,
}

impl fmt::Display for EnrichmentState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EnrichmentState::Pending => write!(f, "pending"),
            EnrichmentState::Done => write!(f, "done"),
            EnrichmentState::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for EnrichmentState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrichmentState::Pending),
            "done" => Ok(EnrichmentState::Done),
            "failed" => Ok(EnrichmentState::Failed),
            _ => Err(()),
        }
    }
}

/// 提取的链接产物
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkArtifact {
    /// 规范化后的链接标识符
    pub url: String,
    /// 是否为onion地址
    pub is_onion: bool,
    /// 是否与来源页面同域
    pub in_scope: bool,
}

/// 按币种标记的加密货币地址
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CryptoAddress {
    /// 币种标签 (btc, eth, xmr)
    pub currency: String,
    /// 规范化后的地址
    pub address: String,
}

/// 提取引擎的输出
///
/// 各产物类别互不影响：某一类别的识别失败只计入
/// rejected_candidates，不会中止其他类别的提取
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    /// 有序的链接序列
    pub links: Vec<LinkArtifact>,
    /// 邮箱地址集合
    pub emails: BTreeSet<String>,
    /// 加密货币地址集合
    pub crypto_addresses: BTreeSet<CryptoAddress>,
    /// 密钥指纹集合
    pub key_fingerprints: BTreeSet<String>,
    /// 页面元数据键值对
    pub metadata: BTreeMap<String, String>,
    /// 被丢弃的畸形候选数量（可观测性用）
    pub rejected_candidates: u32,
}

impl Page {
    /// 创建一个新的页面记录
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target_url: String,
        netloc: String,
        status_code: Option<i32>,
        fetch_outcome: FetchOutcome,
        title: Option<String>,
        body: Option<String>,
        content_ref: Option<String>,
        artifacts: Artifacts,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url,
            netloc,
            status_code,
            fetch_outcome,
            title,
            body,
            content_ref,
            artifacts,
            capture_ref: None,
            language: None,
            subject: None,
            subject_confidence: None,
            capture_state: EnrichmentState::Pending,
            classify_state: EnrichmentState::Pending,
            version: 0,
            fetched_at: Utc::now().into(),
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    /// 查询某一富化类型的状态
    pub fn enrichment_state(&self, kind: EnrichmentKind) -> EnrichmentState {
        match kind {
            EnrichmentKind::Capture => self.capture_state,
            EnrichmentKind::Classify => self.classify_state,
        }
    }

    /// 判断页面是否已到达富化终态
    ///
    /// 所有必需的富化类型都为Done或Failed时页面可用
    pub fn enrichment_terminal(&self) -> bool {
        self.capture_state != EnrichmentState::Pending
            && self.classify_state != EnrichmentState::Pending
    }
}
