// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// 从Content-Type头中提取charset标签
fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    let lower = content_type.to_ascii_lowercase();
    let label = lower.split("charset=").nth(1)?;
    let label = label.split(';').next()?.trim().trim_matches('"');
    Encoding::for_label(label.as_bytes())
}

/// 将抓取到的字节解码为字符串
///
/// 优先使用响应头声明的charset；未声明或无法识别时
/// 使用chardetng嗅探。解码永不失败，非法序列以替换字符兜底
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_from_content_type)
        .unwrap_or_else(|| {
            let mut detector = EncodingDetector::new();
            detector.feed(bytes, true);
            detector.guess(None, true)
        });

    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}
