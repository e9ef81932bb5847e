// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::FetchOutcome;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// 抓取引擎错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    /// 传输层失败（代理不可达、连接重置等）
    #[error("Transport error: {0}")]
    Transport(String),
    /// 请求超时
    #[error("Timeout")]
    Timeout,
    /// 内容无法处理
    #[error("Content error: {0}")]
    Content(String),
}

impl FetchError {
    /// 判断错误是否可重试
    ///
    /// 传输层错误与超时通过重投递退避重试；内容错误不可重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Timeout)
    }

    /// 映射为页面抓取结局
    pub fn outcome(&self) -> FetchOutcome {
        match self {
            FetchError::Transport(_) => FetchOutcome::ProxyError,
            FetchError::Timeout => FetchOutcome::Timeout,
            FetchError::Content(_) => FetchOutcome::ContentError,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else if e.is_body() || e.is_decode() {
            FetchError::Content(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

/// 抓取请求
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// 目标URL
    pub url: String,
    /// SOCKS5代理地址 (host:port)，为空时直连
    pub proxy: Option<String>,
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 请求总超时时间
    pub request_timeout: Duration,
}

/// 抓取响应
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP状态码
    pub status_code: u16,
    /// 响应原始字节
    pub body: Vec<u8>,
    /// 内容类型头
    pub content_type: Option<String>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

impl FetchResponse {
    /// 判断响应是否为HTML内容
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("text/html"))
            // 隐藏服务经常不带Content-Type，按HTML处理
            .unwrap_or(true)
    }
}

/// 抓取引擎特质
#[async_trait]
pub trait FetchEngine: Send + Sync {
    /// 执行抓取
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;

    /// 引擎名称
    fn name(&self) -> &'static str;
}
