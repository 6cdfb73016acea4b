// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::search_spec::PlatformId;
use crate::domain::services::merge_engine::{MergeConfig, ReviewCountStrategy};
use crate::engines::identity_pool::PoolConfig;
use crate::utils::retry_policy::RetryPolicy;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use validator::{Validate, ValidationError};

/// 应用程序配置设置
///
/// 启动时加载并校验一次，之后只读。
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Settings {
    /// 采集并发与节奏
    #[validate(nested)]
    pub collection: CollectionSettings,
    /// 重试退避
    #[validate(nested)]
    pub retry: RetrySettings,
    /// 身份池
    #[validate(nested)]
    pub identity: IdentitySettings,
    /// 合并去重
    #[validate(nested)]
    pub dedup: DedupSettings,
    /// 调度器
    #[validate(nested)]
    pub scheduler: SchedulerSettings,
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 指标导出
    pub metrics: MetricsSettings,
    /// 日志
    pub logging: LoggingSettings,
    /// 平台接入点
    #[serde(default)]
    #[validate(nested)]
    pub platforms: Vec<PlatformSettings>,
}

/// 采集配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CollectionSettings {
    /// 同时抓取的平台数上限
    #[validate(range(min = 1, max = 64))]
    pub max_concurrent_platforms: usize,
    /// 同一平台相邻请求的最小间隔（毫秒）
    pub request_interval_ms: u64,
    /// 单次适配器调用的超时时间（秒）
    #[validate(range(min = 1))]
    pub fetch_timeout_secs: u64,
}

/// 重试配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_retry_bounds"))]
pub struct RetrySettings {
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: u32,
    #[validate(range(min = 1))]
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub jitter_factor: f64,
}

fn validate_retry_bounds(retry: &RetrySettings) -> Result<(), ValidationError> {
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ValidationError::new("max_delay_below_base_delay"));
    }
    Ok(())
}

/// 身份池配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
#[validate(schema(function = "validate_cooldown_bounds"))]
pub struct IdentitySettings {
    /// 进入冷却前允许的连续失败次数
    #[validate(range(min = 1))]
    pub failure_threshold: u32,
    /// 首次冷却时长（秒）
    #[validate(range(min = 1))]
    pub cooldown_secs: u64,
    /// 冷却时长上限（秒）
    pub max_cooldown_secs: u64,
    /// 代理列表文件
    #[serde(default)]
    pub proxy_list_path: Option<PathBuf>,
    /// 内联代理列表
    #[serde(default)]
    pub proxies: Vec<String>,
    /// User-Agent 列表，为空时使用内置列表
    #[serde(default)]
    pub user_agents: Vec<String>,
    /// 启动时检查代理可用性的地址，为空时不检查
    #[serde(default)]
    pub proxy_test_url: Option<String>,
    /// 单个代理检查的超时（秒）
    #[validate(range(min = 1))]
    pub proxy_test_timeout_secs: u64,
}

fn validate_cooldown_bounds(identity: &IdentitySettings) -> Result<(), ValidationError> {
    if identity.max_cooldown_secs < identity.cooldown_secs {
        return Err(ValidationError::new("max_cooldown_below_cooldown"));
    }
    Ok(())
}

/// 去重配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DedupSettings {
    /// 坐标距离容差（米）
    #[validate(range(min = 0.0))]
    pub distance_tolerance_m: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub name_similarity_cutoff: f64,
    #[validate(range(min = 0.0, max = 1.0))]
    pub address_similarity_cutoff: f64,
    /// 平台优先级，靠前的优先
    #[serde(default)]
    pub platform_priority: Vec<String>,
    #[serde(default)]
    pub review_count_strategy: ReviewCountStrategy,
}

/// 调度器配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SchedulerSettings {
    /// 是否启动后台调度
    pub enabled: bool,
    /// 检查到期任务的间隔（秒）
    #[validate(range(min = 1))]
    pub tick_interval_secs: u64,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub format: LogFormat,
}

/// 平台接入点配置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PlatformSettings {
    /// 平台标识
    #[validate(length(min = 1))]
    pub id: String,
    /// 列表接口地址
    #[validate(url)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 请求超时（秒）
    #[serde(default = "default_platform_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_platform_timeout() -> u64 {
    30
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次叠加内置默认值、`config/default`、`config/{APP_ENVIRONMENT}`
    /// 和 `LISTINGRS__` 前缀的环境变量，然后统一校验。
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Self::defaults()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(
                Environment::with_prefix("LISTINGRS")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("dedup.platform_priority")
                    .with_list_parse_key("identity.proxies")
                    .with_list_parse_key("identity.user_agents"),
            );

        Self::finish(builder)
    }

    /// 从 TOML 文本加载（叠加在内置默认值之上）
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        Self::finish(Self::defaults()?.add_source(File::from_str(toml, FileFormat::Toml)))
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            // Collection and resilience defaults
            .set_default("collection.max_concurrent_platforms", 2)?
            .set_default("collection.request_interval_ms", 2000)?
            .set_default("collection.fetch_timeout_secs", 300)?
            .set_default("retry.max_attempts", 3)?
            .set_default("retry.base_delay_ms", 1000)?
            .set_default("retry.max_delay_ms", 30000)?
            .set_default("retry.jitter_factor", 0.1)?
            .set_default("identity.failure_threshold", 3)?
            .set_default("identity.cooldown_secs", 60)?
            .set_default("identity.max_cooldown_secs", 900)?
            .set_default("identity.proxy_test_timeout_secs", 10)?
            // Deduplication defaults
            .set_default("dedup.distance_tolerance_m", 150.0)?
            .set_default("dedup.name_similarity_cutoff", 0.85)?
            .set_default("dedup.address_similarity_cutoff", 0.9)?
            .set_default("dedup.platform_priority", vec!["google_maps", "yelp"])?
            .set_default("dedup.review_count_strategy", "max")?
            .set_default("scheduler.enabled", true)?
            .set_default("scheduler.tick_interval_secs", 30)?
            // Default DB pool settings
            .set_default("database.url", "sqlite://listingrs.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9090")?
            .set_default("logging.format", "text")
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings
            .validate()
            .map_err(|e| ConfigError::Message(format!("invalid configuration: {}", e)))?;
        Ok(settings)
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.jitter_factor,
        )
    }
}

impl IdentitySettings {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            failure_threshold: self.failure_threshold,
            cooldown: Duration::from_secs(self.cooldown_secs),
            max_cooldown: Duration::from_secs(self.max_cooldown_secs),
        }
    }
}

impl DedupSettings {
    pub fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            distance_tolerance_m: self.distance_tolerance_m,
            name_similarity_cutoff: self.name_similarity_cutoff,
            address_similarity_cutoff: self.address_similarity_cutoff,
            platform_priority: self.platform_priority.iter().map(PlatformId::new).collect(),
            review_count_strategy: self.review_count_strategy,
        }
    }
}

impl CollectionSettings {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl SchedulerSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }
}

#[cfg(test)]
#[path = "settings_test.rs"]
mod tests;
