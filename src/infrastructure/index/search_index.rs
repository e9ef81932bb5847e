// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::{CryptoAddress, Page};
use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// 索引错误类型
#[derive(Error, Debug)]
pub enum IndexError {
    /// 投递超时
    #[error("Index delivery timeout")]
    Timeout,
    /// 协作方返回失败
    #[error("Index collaborator error: {0}")]
    Collaborator(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            IndexError::Timeout
        } else {
            IndexError::Collaborator(e.to_string())
        }
    }
}

/// 面向搜索的页面投影
///
/// 协作方按标识符做幂等upsert：同一标识符重复投递
/// 相同投影是无操作，不会产生重复搜索条目
#[derive(Debug, Clone, Serialize)]
pub struct PageProjection {
    pub url: String,
    pub netloc: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub status: Option<i32>,
    pub is_onion: bool,
    pub emails: BTreeSet<String>,
    pub addresses: BTreeSet<CryptoAddress>,
    pub language: Option<String>,
    pub subject: Option<String>,
    pub capture_ref: Option<String>,
    pub seen_time: DateTime<FixedOffset>,
}

impl PageProjection {
    /// 从页面记录构建索引投影
    pub fn from_page(page: &Page, is_onion: bool) -> Self {
        Self {
            url: page.target_url.clone(),
            netloc: page.netloc.clone(),
            title: page.title.clone(),
            body: page.body.clone(),
            status: page.status_code,
            is_onion,
            emails: page.artifacts.emails.clone(),
            addresses: page.artifacts.crypto_addresses.clone(),
            language: page.language.clone(),
            subject: page.subject.clone(),
            capture_ref: page.capture_ref.clone(),
            seen_time: page.fetched_at,
        }
    }
}

/// 搜索索引协作方客户端
///
/// 文档以页面ID为键PUT到索引端点，投递语义为至少一次，
/// 幂等性由协作方的按键upsert保证
pub struct SearchIndexClient {
    base_url: String,
    index_name: String,
    timeout: Duration,
    client: Client,
}

impl SearchIndexClient {
    /// 创建新的索引客户端实例
    ///
    /// # 参数
    ///
    /// * `base_url` - 索引服务基址
    /// * `index_name` - 索引名称
    /// * `timeout` - 单次投递超时
    pub fn new(base_url: String, index_name: String, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            index_name,
            timeout,
            client: Client::new(),
        }
    }

    /// 按标识符upsert一份投影文档
    pub async fn upsert(&self, id: Uuid, projection: &PageProjection) -> Result<(), IndexError> {
        let endpoint = format!("{}/{}/_doc/{}", self.base_url, self.index_name, id);

        let response = self
            .client
            .put(&endpoint)
            .json(projection)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IndexError::Collaborator(format!(
                "index upsert returned {}",
                response.status()
            )));
        }

        debug!(id = %id, url = %projection.url, "projection delivered to index");
        Ok(())
    }
}
