//! 目录分页 + 批量提交
//!
//! ## NOTE: Updater 不做重试
//!
//! 读取页或提交批次的任何错误都会立即中止循环，已累计的计数随 [`AbortedRun`] 返回。
//! 重试与状态记录由上层 SyncOrchestrator / SyncScheduler 负责。

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::mapper::{IdentifierStrategy, LineItemMapper};
use crate::catalog::{CatalogFilter, CatalogSource, PageRequest, TimeWindow};
use crate::config::InventorySyncConfig;
use crate::error::{InventorySyncError, Result};
use crate::events::{now_millis, EventManager, SyncEvent};
use crate::remote::InventoryClient;
use crate::status::RunHeartbeat;
use crate::sync::SyncKind;
use crate::utils::Clock;

/// 单次运行的汇总计数（不落盘）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunAggregate {
    pub full_inventory: bool,
    /// 已提交的行数
    pub attempted: usize,
    pub saved: usize,
    /// 远端逐行拒绝数
    pub failed: usize,
    /// 未通过校验的行数
    pub skipped: usize,
    pub pages: u32,
    pub batches: usize,
    pub elapsed: Duration,
    /// 最后处理的页序号
    pub last_page: Option<u32>,
}

impl RunAggregate {
    pub fn new(full_inventory: bool) -> Self {
        Self {
            full_inventory,
            ..Default::default()
        }
    }

    /// 没有任何逐行失败
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// 循环中止：携带中止前的部分计数
#[derive(Debug, Error)]
#[error("inventory run aborted after {} page(s): {}", .partial.pages, .error)]
pub struct AbortedRun {
    pub partial: RunAggregate,
    pub error: InventorySyncError,
}

/// 分页器参数
#[derive(Debug, Clone)]
pub struct UpdaterOptions {
    pub page_size: u32,
    pub partial_window: chrono::Duration,
    pub scope: Option<u32>,
    pub identifier_strategy: IdentifierStrategy,
    pub supplier_id: Option<String>,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self::from(&InventorySyncConfig::default())
    }
}

impl From<&InventorySyncConfig> for UpdaterOptions {
    fn from(config: &InventorySyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            partial_window: config.partial_window(),
            scope: config.scope(),
            identifier_strategy: config.identifier_strategy,
            supplier_id: config.supplier_id.clone(),
        }
    }
}

/// 目录库存同步器
pub struct CatalogInventoryUpdater {
    catalog: Arc<dyn CatalogSource>,
    client: Arc<dyn InventoryClient>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventManager>>,
    options: UpdaterOptions,
}

impl CatalogInventoryUpdater {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        client: Arc<dyn InventoryClient>,
        clock: Arc<dyn Clock>,
        options: UpdaterOptions,
    ) -> Self {
        Self {
            catalog,
            client,
            clock,
            events: None,
            options,
        }
    }

    pub fn with_events(mut self, events: Arc<EventManager>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn options(&self) -> &UpdaterOptions {
        &self.options
    }

    /// 本次运行的过滤条件
    pub fn filter_for(&self, full_inventory: bool) -> CatalogFilter {
        let updated_between = if full_inventory {
            None
        } else {
            let now = self.clock.now();
            Some(TimeWindow {
                from: now - self.options.partial_window,
                to: now,
            })
        };

        CatalogFilter {
            is_active: true,
            scope: self.options.scope,
            updated_between,
        }
    }

    /// 执行一次完整的分页同步
    pub async fn sync(
        &self,
        full_inventory: bool,
        heartbeat: Option<&dyn RunHeartbeat>,
    ) -> std::result::Result<RunAggregate, AbortedRun> {
        let kind = SyncKind::from_full_flag(full_inventory);
        let started = Instant::now();
        let mut aggregate = RunAggregate::new(full_inventory);

        let outcome = self.run_pages(kind, heartbeat, &mut aggregate).await;
        aggregate.elapsed = started.elapsed();

        let aborted = outcome.as_ref().err().map(|e| e.to_string());
        match &aborted {
            None => info!(
                "📊 [{}] 库存同步汇总: attempted={}, saved={}, failed={}, skipped={}, pages={}, elapsed={:?}",
                kind,
                aggregate.attempted,
                aggregate.saved,
                aggregate.failed,
                aggregate.skipped,
                aggregate.pages,
                aggregate.elapsed
            ),
            Some(reason) => warn!(
                "📊 [{}] 库存同步中止: attempted={}, saved={}, failed={}, skipped={}, pages={}, elapsed={:?}, error={}",
                kind,
                aggregate.attempted,
                aggregate.saved,
                aggregate.failed,
                aggregate.skipped,
                aggregate.pages,
                aggregate.elapsed,
                reason
            ),
        }

        if let Some(events) = &self.events {
            events
                .emit(SyncEvent::RunSummary {
                    kind,
                    aggregate: aggregate.clone(),
                    aborted,
                    timestamp: now_millis(),
                })
                .await;
        }

        match outcome {
            Ok(()) => Ok(aggregate),
            Err(error) => Err(AbortedRun {
                partial: aggregate,
                error,
            }),
        }
    }

    async fn run_pages(
        &self,
        kind: SyncKind,
        heartbeat: Option<&dyn RunHeartbeat>,
        aggregate: &mut RunAggregate,
    ) -> Result<()> {
        let full_inventory = kind.is_full();
        let filter = self.filter_for(full_inventory);
        let mapper = LineItemMapper::new(
            self.options.identifier_strategy,
            self.options.supplier_id.clone(),
        );
        let mut page_index = 0u32;

        loop {
            let page = self
                .catalog
                .fetch_page(
                    &filter,
                    PageRequest {
                        page_size: self.options.page_size,
                        page_index,
                    },
                )
                .await?;
            aggregate.pages += 1;
            aggregate.last_page = Some(page_index);

            let discovered = page.rows.len();
            let mut batch = Vec::with_capacity(discovered);
            for row in &page.rows {
                let item = mapper.map(row);
                if item.is_eligible() {
                    batch.push(item);
                } else {
                    aggregate.skipped += 1;
                    debug!(
                        "[{}] 跳过缺少标识的变体: variation_id={}",
                        kind, row.variation_id
                    );
                }
            }

            if !batch.is_empty() {
                let result = self.client.update_bulk(&batch, full_inventory).await?;
                aggregate.batches += 1;
                aggregate.attempted += batch.len();
                aggregate.failed += result.rejected();
                aggregate.saved += result.accepted();

                if result.excess_errors() > 0 {
                    warn!(
                        "⚠️ [{}] 第 {} 页远端返回 {} 条错误，但只提交了 {} 条，failed 按提交数计",
                        kind,
                        page_index,
                        result.errors.len(),
                        result.submitted
                    );
                }

                if !result.errors.is_empty() {
                    let keys: Vec<&str> = result.errors.iter().map(|e| e.key.as_str()).collect();
                    warn!(
                        "⚠️ [{}] 第 {} 页有 {} 条被远端拒绝: {:?}",
                        kind,
                        page_index,
                        result.errors.len(),
                        keys
                    );
                }
            }

            if let Some(heartbeat) = heartbeat {
                heartbeat.beat(page_index).await;
            }

            debug!(
                "[{}] 第 {} 页完成: 发现 {} 条，提交 {} 条，累计提交 {}",
                kind,
                page_index,
                discovered,
                batch.len(),
                aggregate.attempted
            );

            if page.is_last_page {
                break;
            }
            page_index += 1;
        }

        Ok(())
    }
}
