// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use thiserror::Error;

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// 其他错误
    #[error("Storage error: {0}")]
    Other(String),
}

/// 对象存储仓库特质
///
/// 原始页面内容与截图的二进制存储抽象
#[async_trait]
pub trait StorageRepository: Send + Sync {
    /// 保存对象
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;
    /// 读取对象
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;
    /// 删除对象
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
    /// 判断对象是否存在
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;
}
