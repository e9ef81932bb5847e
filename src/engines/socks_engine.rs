// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::engines::traits::{FetchEngine, FetchError, FetchRequest, FetchResponse};
use async_trait::async_trait;
use reqwest::header;
use std::time::Instant;
use tracing::debug;

/// 响应体大小上限（16MB），超出即内容错误
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// SOCKS5抓取引擎
///
/// 通过socks5h代理抓取隐藏服务页面。DNS解析发生在代理侧
/// （socks5h），onion主机名不会泄漏到本地解析器。
/// 每次请求独立构建客户端：代理端点逐请求分配，
/// 不在引擎内维护任何连接池状态。
pub struct SocksFetchEngine {
    user_agent: String,
}

impl SocksFetchEngine {
    /// 创建新的SOCKS5抓取引擎实例
    pub fn new(user_agent: String) -> Self {
        Self { user_agent }
    }
}

#[async_trait]
impl FetchEngine for SocksFetchEngine {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .connect_timeout(request.connect_timeout)
            .timeout(request.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(5));

        if let Some(proxy_addr) = &request.proxy {
            let proxy = reqwest::Proxy::all(format!("socks5h://{}", proxy_addr))
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let start = Instant::now();
        let response = client.get(&request.url).send().await?;

        let status_code = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response.bytes().await?;
        if body.len() > MAX_BODY_BYTES {
            return Err(FetchError::Content(format!(
                "response body too large: {} bytes",
                body.len()
            )));
        }

        let response_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            url = %request.url,
            status = status_code,
            ms = response_time_ms,
            "fetch completed"
        );

        Ok(FetchResponse {
            status_code,
            body: body.to_vec(),
            content_type,
            response_time_ms,
        })
    }

    fn name(&self) -> &'static str {
        "socks5"
    }
}
