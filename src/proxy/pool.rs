// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{counter, gauge};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// 代理池配置
#[derive(Clone, Debug)]
pub struct ProxyPoolConfig {
    /// 连续失败多少次后隔离
    pub failure_threshold: u32,
    /// 隔离冷却时间
    pub quarantine_cooldown: Duration,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            quarantine_cooldown: Duration::from_secs(300),
        }
    }
}

/// 代理端点健康状态枚举
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyHealth {
    /// 健康
    Healthy,
    /// 降级（近期有失败，仅在无健康端点时选用）
    Degraded,
    /// 隔离中（冷却期内不参与选择）
    Quarantined,
}

/// 交给调用方的代理端点句柄
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyEndpoint {
    /// SOCKS5代理地址 (host:port)
    pub address: String,
}

/// 上报的请求结局
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyOutcome {
    /// 请求成功（收到HTTP响应）
    Success,
    /// 传输层失败或超时
    Failure,
}

/// 单个端点的内部状态
#[derive(Debug)]
struct EndpointState {
    address: String,
    health: ProxyHealth,
    consecutive_failures: u32,
    #[allow(dead_code)]
    last_used: Option<Instant>,
    quarantined_at: Option<Instant>,
}

/// 代理池管理器
///
/// 匿名出口端点的有界集合。健康端点间轮询，降级端点
/// 仅在无健康端点时选用，隔离端点在冷却期满前不可选。
/// 健康表是工作器池实例内唯一的共享可变状态，由单个
/// 互斥锁保护，进程本地，从不持久化。
pub struct ProxyPoolManager {
    inner: Mutex<PoolInner>,
    config: ProxyPoolConfig,
}

struct PoolInner {
    endpoints: Vec<EndpointState>,
    cursor: usize,
}

impl ProxyPoolManager {
    /// 创建新的代理池管理器实例
    ///
    /// # 参数
    ///
    /// * `addresses` - 代理端点地址列表
    /// * `config` - 隔离策略配置
    pub fn new(addresses: Vec<String>, config: ProxyPoolConfig) -> Self {
        let endpoints = addresses
            .into_iter()
            .map(|address| EndpointState {
                address,
                health: ProxyHealth::Healthy,
                consecutive_failures: 0,
                last_used: None,
                quarantined_at: None,
            })
            .collect();

        Self {
            inner: Mutex::new(PoolInner {
                endpoints,
                cursor: 0,
            }),
            config,
        }
    }

    /// 获取一个可用端点
    ///
    /// # 返回值
    ///
    /// * `Some(ProxyEndpoint)` - 选中的端点
    /// * `None` - 池暂时耗尽，调用方应推迟任务而非报错
    pub fn acquire(&self) -> Option<ProxyEndpoint> {
        let mut inner = self.inner.lock();

        // 冷却期满的隔离端点重新参与选择，先以降级身份回归
        for ep in inner.endpoints.iter_mut() {
            if ep.health == ProxyHealth::Quarantined {
                if let Some(at) = ep.quarantined_at {
                    if at.elapsed() >= self.config.quarantine_cooldown {
                        ep.health = ProxyHealth::Degraded;
                        ep.consecutive_failures = 0;
                        ep.quarantined_at = None;
                    }
                }
            }
        }

        let index = Self::pick(&inner, ProxyHealth::Healthy)
            .or_else(|| Self::pick(&inner, ProxyHealth::Degraded))?;

        inner.cursor = index + 1;
        let ep = &mut inner.endpoints[index];
        ep.last_used = Some(Instant::now());
        Some(ProxyEndpoint {
            address: ep.address.clone(),
        })
    }

    /// 从cursor起轮询查找处于指定健康状态的端点
    fn pick(inner: &PoolInner, health: ProxyHealth) -> Option<usize> {
        let len = inner.endpoints.len();
        if len == 0 {
            return None;
        }
        (0..len)
            .map(|offset| (inner.cursor + offset) % len)
            .find(|&i| inner.endpoints[i].health == health)
    }

    /// 上报一次请求结局
    ///
    /// 成功将失败计数清零并恢复健康；连续失败达到阈值后
    /// 端点进入隔离状态
    pub fn report(&self, endpoint: &ProxyEndpoint, outcome: ProxyOutcome) {
        let mut inner = self.inner.lock();
        let Some(ep) = inner
            .endpoints
            .iter_mut()
            .find(|e| e.address == endpoint.address)
        else {
            return;
        };

        match outcome {
            ProxyOutcome::Success => {
                ep.consecutive_failures = 0;
                ep.health = ProxyHealth::Healthy;
                ep.quarantined_at = None;
            }
            ProxyOutcome::Failure => {
                ep.consecutive_failures += 1;
                if ep.consecutive_failures >= self.config.failure_threshold {
                    if ep.health != ProxyHealth::Quarantined {
                        counter!("proxy_pool_quarantined_total").increment(1);
                    }
                    ep.health = ProxyHealth::Quarantined;
                    ep.quarantined_at = Some(Instant::now());
                } else {
                    ep.health = ProxyHealth::Degraded;
                }
            }
        }

        let healthy = inner
            .endpoints
            .iter()
            .filter(|e| e.health == ProxyHealth::Healthy)
            .count();
        gauge!("proxy_pool_healthy_endpoints").set(healthy as f64);
    }

    /// 端点总数
    pub fn len(&self) -> usize {
        self.inner.lock().endpoints.len()
    }

    /// 池是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(cooldown: Duration) -> ProxyPoolManager {
        ProxyPoolManager::new(
            vec!["127.0.0.1:9050".to_string(), "127.0.0.1:9052".to_string()],
            ProxyPoolConfig {
                failure_threshold: 3,
                quarantine_cooldown: cooldown,
            },
        )
    }

    #[test]
    fn test_round_robin_among_healthy() {
        let pool = pool(Duration::from_secs(300));
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        let c = pool.acquire().unwrap();
        assert_ne!(a.address, b.address);
        assert_eq!(a.address, c.address);
    }

    #[test]
    fn test_three_failures_quarantine() {
        let pool = pool(Duration::from_secs(300));
        let victim = ProxyEndpoint {
            address: "127.0.0.1:9050".to_string(),
        };

        for _ in 0..3 {
            pool.report(&victim, ProxyOutcome::Failure);
        }

        // 隔离端点不再被选中
        for _ in 0..4 {
            let ep = pool.acquire().unwrap();
            assert_eq!(ep.address, "127.0.0.1:9052");
        }
    }

    #[test]
    fn test_quarantine_cooldown_restores_eligibility() {
        let pool = pool(Duration::from_millis(20));
        let victim = ProxyEndpoint {
            address: "127.0.0.1:9050".to_string(),
        };
        let other = ProxyEndpoint {
            address: "127.0.0.1:9052".to_string(),
        };

        for _ in 0..3 {
            pool.report(&victim, ProxyOutcome::Failure);
        }
        // 另一个端点也全部失败，池耗尽
        for _ in 0..3 {
            pool.report(&other, ProxyOutcome::Failure);
        }
        assert!(pool.acquire().is_none());

        std::thread::sleep(Duration::from_millis(30));

        // 冷却期满后重新可选
        assert!(pool.acquire().is_some());
    }

    #[test]
    fn test_success_resets_failure_counter() {
        let pool = pool(Duration::from_secs(300));
        let ep = ProxyEndpoint {
            address: "127.0.0.1:9050".to_string(),
        };

        pool.report(&ep, ProxyOutcome::Failure);
        pool.report(&ep, ProxyOutcome::Failure);
        pool.report(&ep, ProxyOutcome::Success);
        pool.report(&ep, ProxyOutcome::Failure);
        pool.report(&ep, ProxyOutcome::Failure);

        // 成功清零过计数，累计4次失败也未触发隔离；
        // 隔离另一端点后该端点仍可兜底选中
        let other = ProxyEndpoint {
            address: "127.0.0.1:9052".to_string(),
        };
        for _ in 0..3 {
            pool.report(&other, ProxyOutcome::Failure);
        }
        assert_eq!(pool.acquire().unwrap().address, "127.0.0.1:9050");
    }

    #[test]
    fn test_degraded_preferred_last() {
        let pool = pool(Duration::from_secs(300));
        let degraded = ProxyEndpoint {
            address: "127.0.0.1:9050".to_string(),
        };
        pool.report(&degraded, ProxyOutcome::Failure);

        // 仍有健康端点时降级端点不被选中
        for _ in 0..4 {
            assert_eq!(pool.acquire().unwrap().address, "127.0.0.1:9052");
        }

        // 健康端点全部隔离后，降级端点兜底
        let other = ProxyEndpoint {
            address: "127.0.0.1:9052".to_string(),
        };
        for _ in 0..3 {
            pool.report(&other, ProxyOutcome::Failure);
        }
        assert_eq!(pool.acquire().unwrap().address, "127.0.0.1:9050");
    }

    #[test]
    fn test_empty_pool() {
        let pool = ProxyPoolManager::new(Vec::new(), ProxyPoolConfig::default());
        assert!(pool.acquire().is_none());
        assert!(pool.is_empty());
    }
}
