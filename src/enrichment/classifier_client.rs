// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::enrichment::EnrichError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// 分类请求载荷
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

/// 分类服务响应
///
/// 请求 = {文本}，响应 = {标签, 置信度}，可选语言区域
#[derive(Debug, Clone, Deserialize)]
pub struct Classification {
    /// 主题标签
    pub label: String,
    /// 置信度 (0.0-1.0)
    pub confidence: f64,
    /// 检测到的语言区域
    pub locale: Option<String>,
}

/// 语言/主题分类服务客户端
pub struct ClassifierClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl ClassifierClient {
    /// 创建新的分类客户端实例
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url,
            timeout,
            client: Client::new(),
        }
    }

    /// 对文本进行语言与主题分类
    pub async fn classify(&self, text: &str) -> Result<Classification, EnrichError> {
        let response = self
            .client
            .post(&self.base_url)
            .json(&ClassifyRequest { text })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(EnrichError::from)?;

        if !response.status().is_success() {
            return Err(EnrichError::Service(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let classification: Classification =
            response.json().await.map_err(EnrichError::from)?;

        debug!(
            label = %classification.label,
            confidence = classification.confidence,
            "classification completed"
        );
        Ok(classification)
    }
}
