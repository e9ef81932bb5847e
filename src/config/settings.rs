// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::retry_policy::RetryPolicy;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// 应用程序配置设置
///
/// 包含数据库、服务器、爬取、代理池、队列、富化与索引等
/// 所有配置项。全部为进程级设置，运行期不可变更，
/// 修改后需要重启进程
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 爬取配置
    pub crawler: CrawlerSettings,
    /// 代理池配置
    pub proxy: ProxySettings,
    /// 队列配置
    pub queue: QueueSettings,
    /// 工作器池配置
    pub workers: WorkerSettings,
    /// 富化服务配置
    pub enrichment: EnrichmentSettings,
    /// 搜索索引配置
    pub index: IndexSettings,
    /// 存储配置
    pub storage: StorageSettings,
}

/// 数据库配置设置
#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 爬取配置设置
///
/// 代理故障与内容故障的退避曲线分开暴露
#[derive(Debug, Deserialize)]
pub struct CrawlerSettings {
    /// 最大爬取深度
    pub max_depth: i32,
    /// 单个目标的最大抓取尝试次数
    pub max_fetch_attempts: i32,
    /// 连接超时时间（秒）
    pub connect_timeout_secs: u64,
    /// 请求总超时时间（秒）
    pub request_timeout_secs: u64,
    /// 请求User-Agent
    pub user_agent: String,
    /// 代理故障退避初始值（秒）
    pub proxy_backoff_initial_secs: u64,
    /// 代理故障退避上限（秒）
    pub proxy_backoff_max_secs: u64,
    /// 代理故障退避乘数
    pub proxy_backoff_multiplier: f64,
    /// 内容故障退避初始值（秒）
    pub content_backoff_initial_secs: u64,
    /// 内容故障退避上限（秒）
    pub content_backoff_max_secs: u64,
    /// 内容故障退避乘数
    pub content_backoff_multiplier: f64,
}

impl CrawlerSettings {
    /// 代理故障重试策略
    pub fn proxy_backoff(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_fetch_attempts as u32,
            Duration::from_secs(self.proxy_backoff_initial_secs),
            Duration::from_secs(self.proxy_backoff_max_secs),
            self.proxy_backoff_multiplier,
        )
    }

    /// 内容故障重试策略
    pub fn content_backoff(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_fetch_attempts as u32,
            Duration::from_secs(self.content_backoff_initial_secs),
            Duration::from_secs(self.content_backoff_max_secs),
            self.content_backoff_multiplier,
        )
    }
}

/// 代理池配置设置
#[derive(Debug, Deserialize)]
pub struct ProxySettings {
    /// SOCKS5端点地址列表 (host:port)
    pub endpoints: Vec<String>,
    /// 连续失败多少次后隔离
    pub failure_threshold: u32,
    /// 隔离冷却时间（秒）
    pub quarantine_cooldown_secs: u64,
}

/// 队列配置设置
#[derive(Debug, Deserialize)]
pub struct QueueSettings {
    /// 可见性超时（秒）
    pub visibility_timeout_secs: u64,
    /// 租约巡检间隔（秒）
    pub sweep_interval_secs: u64,
    /// 队列空闲时工作器的轮询间隔（秒）
    pub idle_poll_secs: u64,
}

/// 工作器池配置设置
#[derive(Debug, Deserialize)]
pub struct WorkerSettings {
    /// 抓取工作器数量
    pub fetch: usize,
    /// 分类工作器数量
    pub detect: usize,
    /// 捕获工作器数量
    pub enrich: usize,
    /// 索引工作器数量
    pub index: usize,
}

/// 富化服务配置设置
#[derive(Debug, Deserialize)]
pub struct EnrichmentSettings {
    /// 视觉捕获服务基址
    pub capture_url: String,
    /// 捕获超时（秒）
    pub capture_timeout_secs: u64,
    /// 分类服务地址
    pub classify_url: String,
    /// 分类超时（秒）
    pub classify_timeout_secs: u64,
    /// 每种富化类型的重试预算
    pub max_attempts: i32,
    /// 线性退避基数（秒）
    pub retry_delay_secs: u64,
}

/// 搜索索引配置设置
#[derive(Debug, Deserialize)]
pub struct IndexSettings {
    /// 索引服务基址
    pub url: String,
    /// 索引名称
    pub index_name: String,
    /// 投递超时（秒）
    pub timeout_secs: u64,
}

/// 存储配置设置
#[derive(Debug, Deserialize)]
pub struct StorageSettings {
    /// 本地存储路径
    pub local_path: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default DB pool settings
            .set_default("database.max_connections", 50)?
            .set_default("database.min_connections", 5)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default crawler settings
            .set_default("crawler.max_depth", 3)?
            .set_default("crawler.max_fetch_attempts", 3)?
            .set_default("crawler.connect_timeout_secs", 25)?
            .set_default("crawler.request_timeout_secs", 60)?
            .set_default(
                "crawler.user_agent",
                "Mozilla/5.0 (Windows NT 6.1; rv:45.0) Gecko/20100101 Firefox/45.0",
            )?
            .set_default("crawler.proxy_backoff_initial_secs", 30)?
            .set_default("crawler.proxy_backoff_max_secs", 900)?
            .set_default("crawler.proxy_backoff_multiplier", 2.0)?
            .set_default("crawler.content_backoff_initial_secs", 5)?
            .set_default("crawler.content_backoff_max_secs", 120)?
            .set_default("crawler.content_backoff_multiplier", 2.0)?
            // Default proxy pool settings
            .set_default("proxy.endpoints", vec!["127.0.0.1:9050".to_string()])?
            .set_default("proxy.failure_threshold", 3)?
            .set_default("proxy.quarantine_cooldown_secs", 300)?
            // Default queue settings
            .set_default("queue.visibility_timeout_secs", 300)?
            .set_default("queue.sweep_interval_secs", 60)?
            .set_default("queue.idle_poll_secs", 1)?
            // Default worker pool settings
            .set_default("workers.fetch", 5)?
            .set_default("workers.detect", 2)?
            .set_default("workers.enrich", 2)?
            .set_default("workers.index", 1)?
            // Default enrichment settings
            .set_default("enrichment.capture_url", "http://splash:8050")?
            .set_default("enrichment.capture_timeout_secs", 60)?
            .set_default("enrichment.classify_url", "http://classifier:8060/classify")?
            .set_default("enrichment.classify_timeout_secs", 15)?
            .set_default("enrichment.max_attempts", 3)?
            .set_default("enrichment.retry_delay_secs", 10)?
            // Default index settings
            .set_default("index.url", "http://elasticsearch:9200")?
            .set_default("index.index_name", "pages")?
            .set_default("index.timeout_secs", 30)?
            // Default storage settings
            .set_default("storage.local_path", "./storage")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("ONIONCRAWL").separator("__"));

        builder.build()?.try_deserialize()
    }
}
