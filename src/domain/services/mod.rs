// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 提取服务（extraction_service）：从原始内容中识别并规范化
///   链接、邮箱、加密货币地址、密钥指纹与页面元数据
pub mod extraction_service;
