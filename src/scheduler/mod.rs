// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 调度器模块
///
/// 定时任务的驱动循环、管理句柄和可注入的时钟。
pub mod clock;
pub mod job_scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use job_scheduler::{JobScheduler, SchedulerHandle, SchedulerStatus};
