// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

/// 富化模块
///
/// 外部富化服务（视觉捕获、语言/主题分类）的客户端。
/// 服务本身是不透明协作者，核心只在接口边界消费它们
pub mod capture_client;
pub mod classifier_client;

pub use capture_client::CaptureClient;
pub use classifier_client::{Classification, ClassifierClient};

/// 富化服务错误类型
#[derive(Error, Debug)]
pub enum EnrichError {
    /// 服务调用超时
    #[error("Enrichment timeout")]
    Timeout,
    /// 服务返回失败
    #[error("Enrichment service error: {0}")]
    Service(String),
}

impl From<reqwest::Error> for EnrichError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EnrichError::Timeout
        } else {
            EnrichError::Service(e.to_string())
        }
    }
}
