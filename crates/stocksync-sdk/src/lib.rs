//! StockSync SDK - 库存对账同步引擎
//!
//! 定期将本地商品目录的库存与远端履约伙伴的库存记录对齐：
//! - ⏱️ 定时或手动触发，全量（true-up）与增量（differential）互不干扰
//! - 📄 分页读取目录，每页一次批量提交，内存占用与目录规模无关
//! - 🔒 运行守卫：持久化状态 + 看门狗 + CAS 租约与逐页心跳
//! - 💾 sled 持久化状态快照：是否运行中、最近成功时间、最近一次是否失败
//! - ⚙️ 事件系统：运行开始 / 跳过 / 汇总 / 结束
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stocksync_sdk::{InMemoryCatalog, InventorySyncConfig, InventorySyncService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = InventorySyncConfig::builder()
//!         .data_dir("/path/to/data")
//!         .supplier_id("SUPPLIER-1")
//!         .remote_base_url("https://partner.example.com")
//!         .api_token("token")
//!         .build();
//!
//!     let catalog = Arc::new(InMemoryCatalog::new(Vec::new()));
//!     let service = InventorySyncService::open(config, catalog).await?;
//!
//!     // 手动全量同步
//!     let snapshot = service.trigger_full_sync().await;
//!     println!("{}", serde_json::to_string(&snapshot)?);
//!
//!     // 定时调度
//!     let scheduler = service.start_scheduler();
//!     scheduler.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod events;
pub mod inventory;
pub mod remote;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;

pub use catalog::{CatalogFilter, CatalogPage, CatalogRow, CatalogSource, InMemoryCatalog, PageRequest, TimeWindow};
pub use config::{EventConfig, HttpClientConfig, InventorySyncConfig, RemoteConfig, ScheduleConfig};
pub use error::{InventorySyncError, Result};
pub use events::{EventFilter, EventManager, EventStats, SyncEvent};
pub use inventory::{
    AbortedRun, CatalogInventoryUpdater, IdentifierStrategy, LineItem, RunAggregate, UpdaterOptions,
};
pub use remote::{BatchResult, HttpInventoryClient, InventoryClient, InventoryQuery, ItemError, MockInventoryClient};
pub use scheduler::{SchedulerHandle, SyncScheduler};
pub use service::InventorySyncService;
pub use status::{RunHeartbeat, RunLease, SyncState, SyncStatusSnapshot, SyncStatusStore};
pub use storage::{KeyValueStore, KvStore, MemoryKvStore};
pub use sync::{RunDisposition, SkipReason, SyncKind, SyncOrchestrator, SyncReport};
pub use utils::{Clock, ManualClock, SystemClock, TimeFormatter, TimezoneConfig};
pub use version::SDK_VERSION;
