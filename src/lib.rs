// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 配置模块
///
/// 处理应用程序的配置设置和环境变量
pub mod config;

/// 领域模块
///
/// 包含核心业务实体、服务和仓库接口
pub mod domain;

/// 引擎模块
///
/// 身份池、弹性抓取和多平台采集
pub mod engines;

/// 基础设施模块
///
/// 提供数据库、指标导出和结果接收端
pub mod infrastructure;

/// 表示层模块
///
/// 管理接口的路由和处理器
pub mod presentation;

/// 调度模块
///
/// 定时任务的驱动循环
pub mod scheduler;

/// 工具模块
///
/// 提供通用的工具函数和辅助功能
pub mod utils;
