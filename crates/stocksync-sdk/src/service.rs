//! 库存同步服务门面
//!
//! 控制器层直接调用的操作：
//! - GET：[`InventorySyncService::status`]
//! - POST：[`InventorySyncService::trigger_full_sync`]
//! - DELETE：[`InventorySyncService::clear_all`]

use std::sync::Arc;

use tracing::info;

use crate::catalog::CatalogSource;
use crate::config::InventorySyncConfig;
use crate::error::Result;
use crate::events::{now_millis, EventManager, SyncEvent};
use crate::inventory::{CatalogInventoryUpdater, UpdaterOptions};
use crate::remote::{HttpInventoryClient, InventoryClient, InventoryQuery};
use crate::scheduler::{SchedulerHandle, SyncScheduler};
use crate::status::{SyncStatusSnapshot, SyncStatusStore};
use crate::storage::{KeyValueStore, KvStore};
use crate::sync::{SyncKind, SyncOrchestrator, SyncReport};
use crate::utils::{Clock, SystemClock};

pub struct InventorySyncService {
    config: InventorySyncConfig,
    store: Arc<SyncStatusStore>,
    orchestrator: Arc<SyncOrchestrator>,
    client: Arc<dyn InventoryClient>,
    events: Arc<EventManager>,
}

impl InventorySyncService {
    /// 按配置组装完整服务：sled 状态库 + HTTP 客户端 + 系统时钟
    pub async fn open(config: InventorySyncConfig, catalog: Arc<dyn CatalogSource>) -> Result<Self> {
        config.validate()?;

        let kv = KvStore::open(&config.data_dir).await?;
        let client = HttpInventoryClient::new(&config.remote, &config.http_client_config)?;

        Self::from_parts(
            config,
            Arc::new(kv),
            catalog,
            Arc::new(client),
            Arc::new(SystemClock),
        )
    }

    /// 使用自定义组件组装（测试 / 嵌入）
    pub fn from_parts(
        config: InventorySyncConfig,
        kv: Arc<dyn KeyValueStore>,
        catalog: Arc<dyn CatalogSource>,
        client: Arc<dyn InventoryClient>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventManager::new(config.event_config.buffer_size));
        let store = Arc::new(SyncStatusStore::new(kv, clock.clone(), config.time_formatter()));
        let updater = Arc::new(
            CatalogInventoryUpdater::new(
                catalog,
                client.clone(),
                clock,
                UpdaterOptions::from(&config),
            )
            .with_events(events.clone()),
        );
        let orchestrator = Arc::new(SyncOrchestrator::new(
            store.clone(),
            updater,
            events.clone(),
            config.watchdog(),
        ));

        info!(
            "✅ 库存同步服务已就绪 (page_size={}, watchdog={}s, scope={:?})",
            config.page_size,
            config.watchdog_secs,
            config.scope()
        );

        Ok(Self {
            config,
            store,
            orchestrator,
            client,
            events,
        })
    }

    pub fn config(&self) -> &InventorySyncConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<EventManager> {
        self.events.clone()
    }

    pub fn orchestrator(&self) -> Arc<SyncOrchestrator> {
        self.orchestrator.clone()
    }

    /// 全量同步的状态快照
    pub async fn status(&self) -> SyncStatusSnapshot {
        self.status_of(SyncKind::Full).await
    }

    pub async fn status_of(&self, kind: SyncKind) -> SyncStatusSnapshot {
        self.store.get_service_state(kind).await
    }

    /// 手动触发全量同步，返回结束后的快照
    pub async fn trigger_full_sync(&self) -> SyncStatusSnapshot {
        self.orchestrator.sync(SyncKind::Full, true).await
    }

    pub async fn trigger(&self, kind: SyncKind, manual: bool) -> SyncReport {
        self.orchestrator.sync_with_report(kind, manual).await
    }

    /// 清除两种类型的全部状态
    pub async fn clear_all(&self) {
        for kind in SyncKind::ALL {
            self.store.clear_state(kind).await;
            self.events
                .emit(SyncEvent::StateCleared {
                    kind,
                    timestamp: now_millis(),
                })
                .await;
        }
    }

    pub async fn reset_to_idle(&self, kind: SyncKind) {
        self.store.reset_to_idle(kind).await;
    }

    /// 只读查询远端库存
    pub async fn fetch_remote_inventory(&self, query: &InventoryQuery) -> Result<serde_json::Value> {
        self.client.fetch(query).await
    }

    /// 按配置启动定时调度
    pub fn start_scheduler(&self) -> SchedulerHandle {
        SyncScheduler::new(self.orchestrator.clone(), self.config.schedule.clone()).start()
    }
}
