// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::domain::models::page::{Artifacts, CryptoAddress, LinkArtifact};
use crate::utils::url_utils;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// 宽松的邮箱候选模式，命中后再做严格校验
static EMAIL_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w.-]+").unwrap());

/// 严格的邮箱校验模式
static EMAIL_STRICT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$").unwrap()
});

/// 宽松的比特币legacy地址候选模式（1/3开头），命中后做base58字符集校验
static BTC_CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[13][a-zA-Z0-9]{24,40}\b").unwrap());

/// base58字符集（不含0、O、I、l）
static BTC_STRICT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[13][a-km-zA-HJ-NP-Z1-9]{25,34}$").unwrap());

/// 以太坊地址模式
static ETH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0x[a-fA-F0-9]{40}\b").unwrap());

/// 门罗币地址模式
static XMR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b4[0-9AB][1-9A-HJ-NP-Za-km-z]{93}\b").unwrap());

/// 密钥指纹模式：40位十六进制，允许4位分组间有空格；
/// 可选捕获0x前缀以便排除以太坊地址
static FINGERPRINT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(0x)?((?:[0-9A-Fa-f]{4}[ ]?){9}[0-9A-Fa-f]{4})\b").unwrap());

/// 提取引擎的完整输出
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// 页面标题
    pub title: Option<String>,
    /// 正文文本（空白归一化）
    pub body: Option<String>,
    /// 结构化产物
    pub artifacts: Artifacts,
}

/// 提取服务
///
/// 纯转换：原始HTML → 结构化产物。无共享状态，可并发调用。
/// 畸形候选被丢弃并计数，任何产物类别的失败都不会中止
/// 其他类别的提取，也永不panic。
pub struct ExtractionService;

impl ExtractionService {
    /// 从HTML内容中提取全部产物
    pub fn extract(base: &Url, html: &str) -> Extraction {
        let document = Html::parse_document(html);
        let mut artifacts = Artifacts::default();

        let title = Self::extract_title(&document);
        let body = Self::extract_body(&document);

        Self::extract_links(&document, base, &mut artifacts);
        Self::extract_metadata(&document, &mut artifacts);
        Self::extract_emails(html, &mut artifacts);

        // 原始实现从正文文本中识别加密货币地址和指纹
        if let Some(text) = &body {
            Self::extract_crypto_addresses(text, &mut artifacts);
            Self::extract_fingerprints(text, &mut artifacts);
        }

        Extraction {
            title,
            body,
            artifacts,
        }
    }

    fn extract_title(document: &Html) -> Option<String> {
        let selector = Selector::parse("title").unwrap();
        document.select(&selector).next().and_then(|e| {
            let text = e.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(text)
        })
    }

    fn extract_body(document: &Html) -> Option<String> {
        let selector = Selector::parse("body").unwrap();
        document.select(&selector).next().and_then(|e| {
            let text = e
                .text()
                .collect::<Vec<_>>()
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            (!text.is_empty()).then_some(text)
        })
    }

    fn extract_links(document: &Html, base: &Url, artifacts: &mut Artifacts) {
        let selector = Selector::parse("a").unwrap();
        let base_netloc = url_utils::canonicalize(base).map(|c| c.netloc);

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            // 页内锚点不是导航目标
            if href.starts_with('#') || href.is_empty() {
                continue;
            }
            match url_utils::normalize_target(base, href) {
                Some(target) => {
                    let in_scope = base_netloc.as_deref() == Some(target.netloc.as_str());
                    let link = LinkArtifact {
                        url: target.url,
                        is_onion: target.is_onion,
                        in_scope,
                    };
                    if !artifacts.links.contains(&link) {
                        artifacts.links.push(link);
                    }
                }
                None => artifacts.rejected_candidates += 1,
            }
        }
    }

    fn extract_metadata(document: &Html, artifacts: &mut Artifacts) {
        let selector = Selector::parse("meta").unwrap();
        for element in document.select(&selector) {
            let value = element.value();
            if let (Some(name), Some(content)) = (value.attr("name"), value.attr("content")) {
                let name = name.trim().to_ascii_lowercase();
                let content = content.trim();
                if !name.is_empty() && !content.is_empty() {
                    artifacts.metadata.insert(name, content.to_string());
                }
            }
        }
    }

    fn extract_emails(html: &str, artifacts: &mut Artifacts) {
        for candidate in EMAIL_CANDIDATE.find_iter(html) {
            let candidate = candidate.as_str().trim_matches('.');
            if EMAIL_STRICT.is_match(candidate) {
                artifacts.emails.insert(candidate.to_ascii_lowercase());
            } else {
                artifacts.rejected_candidates += 1;
            }
        }
    }

    fn extract_crypto_addresses(text: &str, artifacts: &mut Artifacts) {
        for candidate in BTC_CANDIDATE.find_iter(text) {
            let candidate = candidate.as_str();
            if BTC_STRICT.is_match(candidate) {
                // legacy地址大小写敏感，保持原样
                artifacts.crypto_addresses.insert(CryptoAddress {
                    currency: "btc".to_string(),
                    address: candidate.to_string(),
                });
            } else {
                artifacts.rejected_candidates += 1;
            }
        }

        for m in ETH_PATTERN.find_iter(text) {
            // 以太坊地址不区分大小写，规范化为小写
            artifacts.crypto_addresses.insert(CryptoAddress {
                currency: "eth".to_string(),
                address: m.as_str().to_ascii_lowercase(),
            });
        }

        for m in XMR_PATTERN.find_iter(text) {
            artifacts.crypto_addresses.insert(CryptoAddress {
                currency: "xmr".to_string(),
                address: m.as_str().to_string(),
            });
        }
    }

    fn extract_fingerprints(text: &str, artifacts: &mut Artifacts) {
        for caps in FINGERPRINT_PATTERN.captures_iter(text) {
            // 带0x前缀的是以太坊地址，不是指纹
            if caps.get(1).is_some() {
                continue;
            }
            let raw = &caps[2];
            let normalized: String = raw
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_uppercase();
            if normalized.len() == 40 {
                artifacts.key_fingerprints.insert(normalized);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://expyuzz4wqqyqhjn.onion/index").unwrap()
    }

    #[test]
    fn test_extract_title_body_and_links() {
        let html = r#"
            <html>
                <head><title> Hidden Wiki </title></head>
                <body>
                    <h1>Directory</h1>
                    <a href="/market">Market</a>
                    <a href="http://vww6ybal4bd7szmgncyruucpgfkqahzddi37ktceo3ah7ngmcopnpyyd.onion/">Other</a>
                    <a href="https://example.com/clearnet?utm=1">Clearnet</a>
                </body>
            </html>
        "#;

        let result = ExtractionService::extract(&base(), html);

        assert_eq!(result.title.as_deref(), Some("Hidden Wiki"));
        assert!(result.body.as_deref().unwrap().contains("Directory"));

        let links = &result.artifacts.links;
        assert_eq!(links.len(), 3);
        assert_eq!(links[0].url, "http://expyuzz4wqqyqhjn.onion/market");
        assert!(links[0].in_scope);
        assert!(links[0].is_onion);
        assert!(links[1].is_onion);
        assert!(!links[1].in_scope);
        // query被规范化丢弃
        assert_eq!(links[2].url, "https://example.com/clearnet");
        assert!(!links[2].is_onion);
    }

    #[test]
    fn test_malformed_candidates_counted_not_raised() {
        // 合法邮箱 + 合法比特币地址 + 畸形链接：两项产物提取成功，
        // 畸形候选计数非零，过程不会panic
        let html = r#"
            <html><body>
                <a href="http://[malformed/">broken</a>
                <p>contact: Admin@Example.COM</p>
                <p>pay to 1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa</p>
            </body></html>
        "#;

        let result = ExtractionService::extract(&base(), html);

        assert!(result.artifacts.emails.contains("admin@example.com"));
        assert!(result
            .artifacts
            .crypto_addresses
            .contains(&CryptoAddress {
                currency: "btc".to_string(),
                address: "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa".to_string(),
            }));
        assert!(result.artifacts.rejected_candidates > 0);
    }

    #[test]
    fn test_invalid_base58_rejected() {
        // 含有0和O的候选不是合法base58
        let html = "<html><body><p>1A1zP0eP5QGefi2DMOTfTL5SLmv7DivfNa</p></body></html>";
        let result = ExtractionService::extract(&base(), html);
        assert!(result.artifacts.crypto_addresses.is_empty());
        assert!(result.artifacts.rejected_candidates > 0);
    }

    #[test]
    fn test_eth_normalized_lowercase() {
        let html =
            "<html><body><p>0xDE0B295669a9FD93d5F28D9Ec85E40f4cb697BAe</p></body></html>";
        let result = ExtractionService::extract(&base(), html);
        let addrs: Vec<_> = result.artifacts.crypto_addresses.iter().collect();
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].currency, "eth");
        assert_eq!(addrs[0].address, "0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae");
    }

    #[test]
    fn test_fingerprint_normalized_and_eth_excluded() {
        let html = r#"<html><body>
            <p>key: EB77 4491 D9FF 06E2 B1B5 41C0 3FB9 A4F4 3A76 5D9C</p>
            <p>wallet: 0xde0b295669a9fd93d5f28d9ec85e40f4cb697bae</p>
        </body></html>"#;
        let result = ExtractionService::extract(&base(), html);

        assert!(result
            .artifacts
            .key_fingerprints
            .contains("EB774491D9FF06E2B1B541C03FB9A4F43A765D9C"));
        // 以太坊地址不会被重复计为指纹
        assert_eq!(result.artifacts.key_fingerprints.len(), 1);
    }

    #[test]
    fn test_metadata_pairs() {
        let html = r#"<html><head>
            <meta name="Description" content="onion link list">
            <meta name="generator" content="hugo">
            <meta charset="utf-8">
        </head><body></body></html>"#;
        let result = ExtractionService::extract(&base(), html);

        assert_eq!(
            result.artifacts.metadata.get("description").map(String::as_str),
            Some("onion link list")
        );
        assert_eq!(
            result.artifacts.metadata.get("generator").map(String::as_str),
            Some("hugo")
        );
        assert_eq!(result.artifacts.metadata.len(), 2);
    }

    #[test]
    fn test_monero_address() {
        let addr = "44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A";
        let html = format!("<html><body><p>{}</p></body></html>", addr);
        let result = ExtractionService::extract(&base(), &html);
        assert!(result.artifacts.crypto_addresses.contains(&CryptoAddress {
            currency: "xmr".to_string(),
            address: addr.to_string(),
        }));
    }
}
