//! 库存同步配置

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InventorySyncError, Result};
use crate::inventory::IdentifierStrategy;
use crate::sync::SyncKind;
use crate::utils::{TimeFormatter, TimezoneConfig};

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: u32 = 500;
/// 看门狗窗口：running 状态超过该时长视为已放弃
pub const DEFAULT_WATCHDOG_SECS: u64 = 7200;
/// 增量同步回看窗口（80 分钟）
pub const DEFAULT_PARTIAL_WINDOW_SECS: u64 = 4800;
/// 看门狗与回看窗口的上限（30 天）
pub const MAX_WINDOW_SECS: u64 = 30 * 24 * 3600;

/// 远端库存接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// 例如：https://api.partner.example.com
    pub base_url: String,
    pub graphql_path: String,
    pub api_token: Option<String>,
    /// 透传给远端的 dryRun 标记
    pub dry_run: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            graphql_path: "/v1/graphql".to_string(),
            api_token: None,
            dry_run: false,
        }
    }
}

impl RemoteConfig {
    /// 完整接口地址
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if self.graphql_path.starts_with('/') {
            format!("{}{}", base, self.graphql_path)
        } else {
            format!("{}/{}", base, self.graphql_path)
        }
    }
}

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）
    pub request_timeout_secs: Option<u64>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(30),
            // 整页 500 条提交，远端处理较慢
            request_timeout_secs: Some(120),
        }
    }
}

/// 定时调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub full_interval_secs: u64,
    pub partial_interval_secs: u64,
    /// 启动后立即各执行一次
    pub run_on_start: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            full_interval_secs: 24 * 3600,
            partial_interval_secs: 3600,
            run_on_start: false,
        }
    }
}

impl ScheduleConfig {
    /// 指定类型的触发间隔（至少 1 秒）
    pub fn interval(&self, kind: SyncKind) -> Duration {
        let secs = match kind {
            SyncKind::Full => self.full_interval_secs,
            SyncKind::Partial => self.partial_interval_secs,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 事件缓冲区大小
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// 库存同步配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventorySyncConfig {
    /// 数据存储目录（sled 状态库位于 `{data_dir}/kv`）
    pub data_dir: PathBuf,
    /// 行级未指定供应商时使用
    pub supplier_id: Option<String>,
    /// 渠道范围；`sync_all_items` 为 true 时忽略
    pub referrer_id: Option<u32>,
    pub sync_all_items: bool,
    pub identifier_strategy: IdentifierStrategy,
    pub page_size: u32,
    pub watchdog_secs: u64,
    pub partial_window_secs: u64,
    /// 时区偏移秒数，None 表示系统本地时区
    pub timezone_offset_seconds: Option<i32>,
    pub remote: RemoteConfig,
    pub http_client_config: HttpClientConfig,
    pub schedule: ScheduleConfig,
    pub event_config: EventConfig,
}

impl Default for InventorySyncConfig {
    fn default() -> Self {
        Self {
            data_dir: get_default_data_dir(),
            supplier_id: None,
            referrer_id: None,
            sync_all_items: false,
            identifier_strategy: IdentifierStrategy::default(),
            page_size: DEFAULT_PAGE_SIZE,
            watchdog_secs: DEFAULT_WATCHDOG_SECS,
            partial_window_secs: DEFAULT_PARTIAL_WINDOW_SECS,
            timezone_offset_seconds: None,
            remote: RemoteConfig::default(),
            http_client_config: HttpClientConfig::default(),
            schedule: ScheduleConfig::default(),
            event_config: EventConfig::default(),
        }
    }
}

fn window_duration(secs: u64, fallback: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or_else(|| chrono::Duration::seconds(fallback as i64))
}

/// 默认数据目录 ~/.stocksync/
fn get_default_data_dir() -> PathBuf {
    if let Some(home_dir) = std::env::var("HOME").ok().map(PathBuf::from) {
        home_dir.join(".stocksync")
    } else if let Some(home_dir) = std::env::var("USERPROFILE").ok().map(PathBuf::from) {
        home_dir.join(".stocksync")
    } else {
        PathBuf::from("./stocksync_data")
    }
}

impl InventorySyncConfig {
    pub fn builder() -> InventorySyncConfigBuilder {
        InventorySyncConfigBuilder::new()
    }

    /// 看门狗窗口；超出表示范围时回落为默认值
    pub fn watchdog(&self) -> chrono::Duration {
        window_duration(self.watchdog_secs, DEFAULT_WATCHDOG_SECS)
    }

    pub fn partial_window(&self) -> chrono::Duration {
        window_duration(self.partial_window_secs, DEFAULT_PARTIAL_WINDOW_SECS)
    }

    pub fn time_formatter(&self) -> TimeFormatter {
        TimeFormatter::new(self.timezone_offset_seconds.map(|offset_seconds| TimezoneConfig {
            offset_seconds,
        }))
    }

    /// 实际生效的渠道范围
    pub fn scope(&self) -> Option<u32> {
        if self.sync_all_items {
            None
        } else {
            self.referrer_id
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(InventorySyncError::Config("page_size 必须大于 0".to_string()));
        }
        if self.watchdog_secs == 0 || self.watchdog_secs > MAX_WINDOW_SECS {
            return Err(InventorySyncError::Config(format!(
                "watchdog_secs 必须在 1..={} 之间: {}",
                MAX_WINDOW_SECS, self.watchdog_secs
            )));
        }
        if self.partial_window_secs == 0 || self.partial_window_secs > MAX_WINDOW_SECS {
            return Err(InventorySyncError::Config(format!(
                "partial_window_secs 必须在 1..={} 之间: {}",
                MAX_WINDOW_SECS, self.partial_window_secs
            )));
        }
        if self.schedule.full_interval_secs == 0 || self.schedule.partial_interval_secs == 0 {
            return Err(InventorySyncError::Config("调度间隔必须大于 0".to_string()));
        }
        if let Some(offset) = self.timezone_offset_seconds {
            let timezone = TimezoneConfig {
                offset_seconds: offset,
            };
            if timezone.to_fixed_offset().is_none() {
                return Err(InventorySyncError::Config(format!("无效的时区偏移: {}", offset)));
            }
        }
        if self.supplier_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
            return Err(InventorySyncError::Config("supplier_id 不能为空字符串".to_string()));
        }
        if self.remote.base_url.trim().is_empty() {
            return Err(InventorySyncError::Config("远端 base_url 不能为空".to_string()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(InventorySyncError::Config("数据目录不能为空".to_string()));
        }
        Ok(())
    }
}

/// 配置构建器
pub struct InventorySyncConfigBuilder {
    config: InventorySyncConfig,
}

impl Default for InventorySyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InventorySyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: InventorySyncConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn supplier_id<S: Into<String>>(mut self, supplier_id: S) -> Self {
        self.config.supplier_id = Some(supplier_id.into());
        self
    }

    pub fn referrer_id(mut self, referrer_id: u32) -> Self {
        self.config.referrer_id = Some(referrer_id);
        self
    }

    pub fn sync_all_items(mut self, enabled: bool) -> Self {
        self.config.sync_all_items = enabled;
        self
    }

    pub fn identifier_strategy(mut self, strategy: IdentifierStrategy) -> Self {
        self.config.identifier_strategy = strategy;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.page_size = page_size;
        self
    }

    pub fn watchdog_secs(mut self, secs: u64) -> Self {
        self.config.watchdog_secs = secs;
        self
    }

    pub fn partial_window_secs(mut self, secs: u64) -> Self {
        self.config.partial_window_secs = secs;
        self
    }

    pub fn timezone_offset_seconds(mut self, offset: i32) -> Self {
        self.config.timezone_offset_seconds = Some(offset);
        self
    }

    pub fn remote_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.remote.base_url = url.into();
        self
    }

    pub fn graphql_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.remote.graphql_path = path.into();
        self
    }

    pub fn api_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.remote.api_token = Some(token.into());
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.remote.dry_run = dry_run;
        self
    }

    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http_client_config = config;
        self
    }

    pub fn schedule(mut self, schedule: ScheduleConfig) -> Self {
        self.config.schedule = schedule;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_config.buffer_size = size;
        self
    }

    pub fn build(self) -> InventorySyncConfig {
        self.config
    }
}
