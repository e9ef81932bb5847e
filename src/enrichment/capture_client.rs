// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::enrichment::EnrichError;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// 视觉捕获服务客户端
///
/// 外部渲染服务的薄封装：请求 = {目标URL, 超时}，
/// 响应 = PNG图像字节或失败。服务本身是不透明的协作者
pub struct CaptureClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl CaptureClient {
    /// 创建新的视觉捕获客户端实例
    ///
    /// # 参数
    ///
    /// * `base_url` - 渲染服务基址
    /// * `timeout` - 单次捕获的独立超时
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client: Client::new(),
        }
    }

    /// 捕获目标页面的截图
    ///
    /// # 返回值
    ///
    /// * `Ok(Vec<u8>)` - PNG图像字节
    /// * `Err(EnrichError)` - 捕获失败
    pub async fn capture(&self, target_url: &str) -> Result<Vec<u8>, EnrichError> {
        let endpoint = format!("{}/render.png", self.base_url);
        let timeout_secs = self.timeout.as_secs().to_string();

        let response = self
            .client
            .get(&endpoint)
            .query(&[("url", target_url), ("timeout", timeout_secs.as_str())])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(EnrichError::from)?;

        if !response.status().is_success() {
            return Err(EnrichError::Service(format!(
                "capture service returned {}",
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(EnrichError::from)?;
        if bytes.is_empty() {
            return Err(EnrichError::Service("empty capture response".to_string()));
        }

        debug!(url = %target_url, bytes = bytes.len(), "capture completed");
        Ok(bytes.to_vec())
    }
}
