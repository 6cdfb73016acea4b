// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 领域服务模块
///
/// 包含的服务：
/// - 规范化（normalizer）：名称与地址的规范形式和相似度
/// - 记录清洗（record_cleaner）：清洗原始记录并按搜索规格过滤
/// - 合并去重（merge_engine）：将多平台记录合并为规范商家集合
pub mod merge_engine;
pub mod normalizer;
pub mod record_cleaner;

pub use merge_engine::{MergeConfig, MergeEngine, ReviewCountStrategy};
