// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

/// 规范化后的爬取目标标识符
///
/// 标识符由 scheme + 规范化主机名 + 路径组成，
/// 是前沿存储去重比较的唯一键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalTarget {
    /// 规范化标识符 (scheme://host/path)
    pub url: String,
    /// 网络位置（主机名，含非默认端口）
    pub netloc: String,
    /// 是否为onion隐藏服务地址
    pub is_onion: bool,
}

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 规范化一个发现的地址为稳定标识符
///
/// 相对引用先基于`base`解析为绝对地址；主机名小写，
/// 丢弃query与fragment，去掉默认端口，空路径归一为`/`。
/// 无法解析或非http(s)协议的候选返回None，由调用方计入rejected
pub fn normalize_target(base: &Url, href: &str) -> Option<CanonicalTarget> {
    let resolved = resolve_url(base, href).ok()?;
    canonicalize(&resolved)
}

/// 规范化一个绝对URL为稳定标识符
pub fn canonicalize(url: &Url) -> Option<CanonicalTarget> {
    match url.scheme() {
        "http" | "https" => {}
        _ => return None,
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let is_onion = host.ends_with(".onion");
    if is_onion && !is_valid_onion_host(&host) {
        return None;
    }

    let netloc = match url.port() {
        // url crate已经剥离了默认端口，这里剩下的都是非默认端口
        Some(port) => format!("{}:{}", host, port),
        None => host,
    };

    let path = if url.path().is_empty() {
        "/"
    } else {
        url.path()
    };

    Some(CanonicalTarget {
        url: format!("{}://{}{}", url.scheme(), netloc, path),
        netloc,
        is_onion,
    })
}

/// 校验onion主机名格式
///
/// v2地址为16位base32标签，v3地址为56位base32标签
pub fn is_valid_onion_host(host: &str) -> bool {
    let Some(label) = host.strip_suffix(".onion") else {
        return false;
    };
    // 取最后一级子域标签
    let label = label.rsplit('.').next().unwrap_or(label);

    (label.len() == 16 || label.len() == 56)
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || ('2'..='7').contains(&c))
}
