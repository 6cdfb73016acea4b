// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 平台适配器模块
///
/// 每个外部商家目录实现一个 `PlatformAdapter`，
/// 采集协调器以统一方式对待所有平台。
pub mod adapter;

pub use adapter::{AdapterError, PlatformAdapter, RecordStream};
