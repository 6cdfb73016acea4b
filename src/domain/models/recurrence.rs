// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 重复规则解析错误
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RecurrenceError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),
    #[error("day of month must be within 1..=31, got {0}")]
    InvalidDayOfMonth(u32),
    #[error("one-time rule requires run_at")]
    MissingRunAt,
}

/// 一天中的时刻（UTC，精确到分钟）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(NaiveTime);

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self, RecurrenceError> {
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(|| RecurrenceError::InvalidTime(format!("{:02}:{:02}", hour, minute)))
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn minute(&self) -> u32 {
        self.0.minute()
    }

    pub fn as_naive(&self) -> NaiveTime {
        self.0
    }
}

impl FromStr for TimeOfDay {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RecurrenceError::InvalidTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = RecurrenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// 重复频率
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    /// 每小时，在 `time` 的分钟数执行
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// 只在 `run_at` 执行一次
    Once,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Frequency::Hourly => write!(f, "hourly"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
            Frequency::Once => write!(f, "once"),
        }
    }
}

/// 重复规则
///
/// 描述任务多久执行一次以及在一天中的哪个时刻执行。所有时刻按 UTC 解释。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub time: TimeOfDay,
    /// 每周任务的星期几，默认周一
    #[serde(default)]
    pub weekday: Option<Weekday>,
    /// 每月任务的日期，默认 1 号；超过当月天数时取当月最后一天
    #[serde(default)]
    pub day_of_month: Option<u32>,
    /// 一次性任务的执行时刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    pub fn hourly(minute: u32) -> Result<Self, RecurrenceError> {
        Ok(Self::with_frequency(Frequency::Hourly, TimeOfDay::new(0, minute)?))
    }

    pub fn daily(time: TimeOfDay) -> Self {
        Self::with_frequency(Frequency::Daily, time)
    }

    pub fn weekly(weekday: Weekday, time: TimeOfDay) -> Self {
        Self {
            weekday: Some(weekday),
            ..Self::with_frequency(Frequency::Weekly, time)
        }
    }

    pub fn monthly(day_of_month: u32, time: TimeOfDay) -> Result<Self, RecurrenceError> {
        let rule = Self {
            day_of_month: Some(day_of_month),
            ..Self::with_frequency(Frequency::Monthly, time)
        };
        rule.validate()?;
        Ok(rule)
    }

    /// 在 `run_at` 执行一次，执行后任务不再进入等待
    pub fn once(run_at: DateTime<Utc>) -> Self {
        let time = TimeOfDay(
            NaiveTime::from_hms_opt(run_at.hour(), run_at.minute(), 0).unwrap_or_default(),
        );
        Self {
            run_at: Some(run_at),
            ..Self::with_frequency(Frequency::Once, time)
        }
    }

    fn with_frequency(frequency: Frequency, time: TimeOfDay) -> Self {
        Self {
            frequency,
            time,
            weekday: None,
            day_of_month: None,
            run_at: None,
        }
    }

    pub fn is_one_time(&self) -> bool {
        self.frequency == Frequency::Once
    }

    pub fn validate(&self) -> Result<(), RecurrenceError> {
        if self.is_one_time() && self.run_at.is_none() {
            return Err(RecurrenceError::MissingRunAt);
        }
        match self.day_of_month {
            Some(day) if !(1..=31).contains(&day) => Err(RecurrenceError::InvalidDayOfMonth(day)),
            _ => Ok(()),
        }
    }

    /// 计算严格晚于 `now` 的下一次执行时间
    ///
    /// 错过的执行不会补跑，只返回下一个未来时刻。
    /// 一次性规则总是返回 `run_at`，即使它已经过去。
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.frequency {
            Frequency::Once => self.run_at.unwrap_or(now),
            Frequency::Hourly => {
                let candidate = now
                    .date_naive()
                    .and_hms_opt(now.hour(), self.time.minute(), 0)
                    .map(|dt| dt.and_utc())
                    .unwrap_or(now);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::hours(1)
                }
            }
            Frequency::Daily => {
                let candidate = self.at(now.date_naive());
                if candidate > now {
                    candidate
                } else {
                    self.at(now.date_naive() + Duration::days(1))
                }
            }
            Frequency::Weekly => {
                let target = self.weekday.unwrap_or(Weekday::Mon);
                let today = now.date_naive();
                let days_ahead = (7 + target.num_days_from_monday() as i64
                    - today.weekday().num_days_from_monday() as i64)
                    % 7;
                let candidate = self.at(today + Duration::days(days_ahead));
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
            Frequency::Monthly => {
                let day = self.day_of_month.unwrap_or(1).clamp(1, 31);
                let mut year = now.year();
                let mut month = now.month();
                // 最多向后看 13 个月即可覆盖所有情况
                for _ in 0..13 {
                    if let Some(date) = clamped_date(year, month, day) {
                        let candidate = self.at(date);
                        if candidate > now {
                            return candidate;
                        }
                    }
                    if month == 12 {
                        year += 1;
                        month = 1;
                    } else {
                        month += 1;
                    }
                }
                now + Duration::days(31)
            }
        }
    }

    fn at(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.time.as_naive()).and_utc()
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.frequency {
            Frequency::Hourly => write!(f, "hourly at :{:02}", self.time.minute()),
            Frequency::Daily => write!(f, "daily at {}", self.time),
            Frequency::Weekly => write!(
                f,
                "weekly on {} at {}",
                self.weekday.unwrap_or(Weekday::Mon),
                self.time
            ),
            Frequency::Monthly => write!(
                f,
                "monthly on day {} at {}",
                self.day_of_month.unwrap_or(1),
                self.time
            ),
            Frequency::Once => match self.run_at {
                Some(run_at) => write!(f, "once at {}", run_at.to_rfc3339()),
                None => write!(f, "once"),
            },
        }
    }
}

/// 构造日期，日期超过当月天数时取当月最后一天
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    let last_day = (first_of_next - Duration::days(1)).day();
    NaiveDate::from_ymd_opt(year, month, day.min(last_day))
}
