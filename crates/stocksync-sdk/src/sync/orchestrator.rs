//! 同步编排层
//!
//! **职责边界**（与 CatalogInventoryUpdater 分离）：
//! - **Updater**：只做「给定全量/增量，分页读目录 → 映射 → 批量提交 → 汇总」，不读写状态、不重试。
//! - **本模块**：运行守卫（状态 + 看门狗 + 租约）、状态迁移、事件，调用方永远拿到状态快照而不是错误。

use std::sync::Arc;

use chrono::Duration;
use tracing::{error, info, warn};

use crate::events::{now_millis, EventManager, SyncEvent};
use crate::inventory::{CatalogInventoryUpdater, RunAggregate};
use crate::status::{LeaseOutcome, RunHeartbeat, SyncStatusSnapshot, SyncStatusStore};
use crate::sync::SyncKind;

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 状态为 running 且仍在看门狗窗口内
    StillRunning,
    /// 另一个运行持有未过期的租约
    LeaseHeld,
}

/// 一次调用的处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    Skipped(SkipReason),
    Succeeded,
    Failed,
}

impl RunDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped(_) => "skipped",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// 带处置结果与汇总的运行报告
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub status: SyncStatusSnapshot,
    pub disposition: RunDisposition,
    /// 跳过时为 None
    pub aggregate: Option<RunAggregate>,
    /// 循环中止时的错误描述
    pub error: Option<String>,
}

/// 同步编排器（调度器与手动触发的统一入口）
pub struct SyncOrchestrator {
    store: Arc<SyncStatusStore>,
    updater: Arc<CatalogInventoryUpdater>,
    events: Arc<EventManager>,
    watchdog: Duration,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<SyncStatusStore>,
        updater: Arc<CatalogInventoryUpdater>,
        events: Arc<EventManager>,
        watchdog: Duration,
    ) -> Self {
        Self {
            store,
            updater,
            events,
            watchdog,
        }
    }

    pub fn store(&self) -> &Arc<SyncStatusStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<EventManager> {
        &self.events
    }

    /// 执行一次同步，返回结束后的状态快照
    pub async fn sync(&self, kind: SyncKind, manual: bool) -> SyncStatusSnapshot {
        self.sync_with_report(kind, manual).await.status
    }

    pub async fn sync_with_report(&self, kind: SyncKind, manual: bool) -> SyncReport {
        let state = self.store.get_state(kind).await;
        let before = self.store.get_service_state(kind).await;

        // running 且未被跳过，即视为已放弃
        let abandoned = state.is_running();
        if abandoned {
            let now = self.store.clock().now();
            match self.store.state_changed_at(kind).await {
                Some(changed_at) if now - changed_at <= self.watchdog => {
                    info!(
                        "⏭️ [{}] 上一次同步仍在进行（状态变更于 {}），跳过本次 (manual={})",
                        kind, changed_at, manual
                    );
                    return self.skip(kind, manual, SkipReason::StillRunning, before).await;
                }
                Some(changed_at) => {
                    warn!(
                        "⏰ [{}] running 状态已超过看门狗窗口（状态变更于 {}），视为已放弃，继续执行",
                        kind, changed_at
                    );
                }
                None => {
                    warn!("⏰ [{}] running 状态缺少有效时间戳，视为已放弃，继续执行", kind);
                }
            }
        }

        let outcome = if abandoned {
            self.store.take_over_lease(kind).await
        } else {
            self.store.acquire_lease(kind, self.watchdog).await
        };
        let lease = match outcome {
            LeaseOutcome::Acquired(lease) => Some(lease),
            LeaseOutcome::Held { owner } => {
                info!("⏭️ [{}] 租约被其他运行持有 (owner={:?})，跳过本次", kind, owner);
                return self.skip(kind, manual, SkipReason::LeaseHeld, before).await;
            }
            LeaseOutcome::Unavailable => {
                warn!("⚠️ [{}] 无法获取运行租约，按无租约继续", kind);
                None
            }
        };

        let started_at = self.store.mark_started(kind).await;
        self.events
            .emit(SyncEvent::RunStarted {
                kind,
                manual,
                started_at: self.store.formatter().format_iso8601(started_at),
                timestamp: now_millis(),
            })
            .await;

        let heartbeat = lease.as_ref().map(|lease| lease as &dyn RunHeartbeat);
        let (disposition, aggregate, error) = match self.updater.sync(kind.is_full(), heartbeat).await {
            Ok(aggregate) if aggregate.is_clean() => {
                self.store.mark_complete(kind, started_at).await;
                (RunDisposition::Succeeded, aggregate, None)
            }
            Ok(aggregate) => {
                warn!("⚠️ [{}] 远端拒绝了 {} 条库存行，标记为失败", kind, aggregate.failed);
                self.store.mark_failed(kind).await;
                (RunDisposition::Failed, aggregate, None)
            }
            Err(aborted) => {
                error!("❌ [{}] 库存同步中止: {}", kind, aborted.error);
                self.store.mark_failed(kind).await;
                (
                    RunDisposition::Failed,
                    aborted.partial,
                    Some(aborted.error.to_string()),
                )
            }
        };

        if let Some(lease) = lease {
            lease.release().await;
        }

        let status = self.store.get_service_state(kind).await;
        self.events
            .emit(SyncEvent::RunFinished {
                kind,
                manual,
                disposition,
                snapshot: status.clone(),
                timestamp: now_millis(),
            })
            .await;

        SyncReport {
            status,
            disposition,
            aggregate: Some(aggregate),
            error,
        }
    }

    async fn skip(
        &self,
        kind: SyncKind,
        manual: bool,
        reason: SkipReason,
        before: SyncStatusSnapshot,
    ) -> SyncReport {
        self.events
            .emit(SyncEvent::RunSkipped {
                kind,
                manual,
                reason,
                timestamp: now_millis(),
            })
            .await;

        SyncReport {
            status: before,
            disposition: RunDisposition::Skipped(reason),
            aggregate: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogRow, InMemoryCatalog};
    use crate::inventory::UpdaterOptions;
    use crate::remote::MockInventoryClient;
    use crate::status::SyncState;
    use crate::error::{InventorySyncError, Result};
    use crate::storage::{KeyValueStore, MemoryKvStore};
    use crate::utils::{ManualClock, TimeFormatter, TimezoneConfig};
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    struct Harness {
        orchestrator: SyncOrchestrator,
        store: Arc<SyncStatusStore>,
        clock: Arc<ManualClock>,
        catalog: Arc<InMemoryCatalog>,
        kv: MemoryKvStore,
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    /// 前 N 次删除型 CAS 失败，其余操作转发到内存存储
    struct FailingReleaseStore {
        inner: MemoryKvStore,
        failures_left: Mutex<u32>,
    }

    #[async_trait]
    impl KeyValueStore for FailingReleaseStore {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }
        async fn delete(&self, key: &str) -> Result<bool> {
            self.inner.delete(key).await
        }
        async fn compare_and_swap(
            &self,
            key: &str,
            expected: Option<&str>,
            new: Option<&str>,
        ) -> Result<bool> {
            if new.is_none() {
                let mut left = self.failures_left.lock();
                if *left > 0 {
                    *left -= 1;
                    return Err(InventorySyncError::KvStore("cas timeout".into()));
                }
            }
            self.inner.compare_and_swap(key, expected, new).await
        }
        async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
            self.inner.scan_prefix(prefix).await
        }
    }

    fn harness(rows: u64, client: MockInventoryClient) -> Harness {
        let kv = MemoryKvStore::new();
        harness_on(rows, client, kv.clone(), Arc::new(kv))
    }

    fn harness_on(
        rows: u64,
        client: MockInventoryClient,
        kv: MemoryKvStore,
        backend: Arc<dyn KeyValueStore>,
    ) -> Harness {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(SyncStatusStore::new(
            backend,
            clock.clone(),
            TimeFormatter::new(Some(TimezoneConfig::utc())),
        ));
        let catalog = Arc::new(InMemoryCatalog::new(
            (0..rows)
                .map(|i| CatalogRow {
                    variation_id: i,
                    variation_number: Some(format!("VN-{}", i)),
                    is_active: true,
                    updated_at: start(),
                    ..Default::default()
                })
                .collect(),
        ));
        let updater = Arc::new(CatalogInventoryUpdater::new(
            catalog.clone(),
            Arc::new(client),
            clock.clone(),
            UpdaterOptions {
                supplier_id: Some("SUP".to_string()),
                ..Default::default()
            },
        ));
        let orchestrator = SyncOrchestrator::new(
            store.clone(),
            updater,
            Arc::new(EventManager::new(16)),
            Duration::seconds(7200),
        );
        Harness {
            orchestrator,
            store,
            clock,
            catalog,
            kv,
        }
    }

    #[tokio::test]
    async fn successful_run_marks_complete_and_releases_lease() {
        let h = harness(3, MockInventoryClient::new());
        let report = h.orchestrator.sync_with_report(SyncKind::Full, true).await;

        assert_eq!(report.disposition, RunDisposition::Succeeded);
        assert_eq!(report.status.status, SyncState::Idle);
        assert!(report.status.last_attempt_succeeded);
        assert_eq!(report.aggregate.unwrap().attempted, 3);
        assert!(h.kv.get("full_inventory_run_lease").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn running_within_window_is_skipped() {
        let h = harness(3, MockInventoryClient::new());
        h.store.mark_started(SyncKind::Full).await;
        h.clock.advance(Duration::minutes(30));
        let before = h.store.get_service_state(SyncKind::Full).await;

        let report = h.orchestrator.sync_with_report(SyncKind::Full, false).await;

        assert_eq!(
            report.disposition,
            RunDisposition::Skipped(SkipReason::StillRunning)
        );
        assert_eq!(report.status, before);
        assert_eq!(h.catalog.fetch_count(), 0);
    }

    #[tokio::test]
    async fn running_past_window_is_taken_over() {
        let h = harness(3, MockInventoryClient::new());
        h.store.mark_started(SyncKind::Full).await;
        h.clock.advance(Duration::seconds(7201));

        let report = h.orchestrator.sync_with_report(SyncKind::Full, false).await;

        assert_eq!(report.disposition, RunDisposition::Succeeded);
        assert_eq!(h.catalog.fetch_count(), 1);
    }

    #[tokio::test]
    async fn running_past_window_overrides_fresh_heartbeat() {
        let h = harness(3, MockInventoryClient::new());
        h.store.mark_started(SyncKind::Full).await;
        let other = match h.store.acquire_lease(SyncKind::Full, Duration::hours(2)).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected lease, got {:?}", other),
        };

        // 09:59 的心跳仍然新鲜，但状态变更时间是 08:00
        h.clock.advance(Duration::minutes(119));
        assert!(other.refresh().await);
        h.clock.advance(Duration::minutes(2));

        let report = h.orchestrator.sync_with_report(SyncKind::Full, false).await;

        assert_eq!(report.disposition, RunDisposition::Succeeded);
        assert_eq!(h.catalog.fetch_count(), 1);
        assert!(!other.refresh().await);
        assert!(h.kv.get("full_inventory_run_lease").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_lease_release_does_not_block_next_run() {
        let kv = MemoryKvStore::new();
        let backend = Arc::new(FailingReleaseStore {
            inner: kv.clone(),
            failures_left: Mutex::new(1),
        });
        let h = harness_on(3, MockInventoryClient::new(), kv, backend);

        let first = h.orchestrator.sync_with_report(SyncKind::Full, false).await;
        assert_eq!(first.disposition, RunDisposition::Succeeded);
        assert_eq!(first.status.status, SyncState::Idle);
        assert!(h.kv.get("full_inventory_run_lease").await.unwrap().is_none());

        h.clock.advance(Duration::minutes(60));
        let second = h.orchestrator.sync_with_report(SyncKind::Full, false).await;
        assert_eq!(second.disposition, RunDisposition::Succeeded);
        assert_eq!(h.catalog.fetch_count(), 2);
    }

    #[tokio::test]
    async fn running_without_timestamp_is_taken_over() {
        let h = harness(1, MockInventoryClient::new());
        h.kv.set("partial_inventory_cron_status", "running").await.unwrap();

        let report = h.orchestrator.sync_with_report(SyncKind::Partial, false).await;
        assert_ne!(
            report.disposition,
            RunDisposition::Skipped(SkipReason::StillRunning)
        );
        assert_eq!(h.catalog.fetch_count(), 1);
    }

    #[tokio::test]
    async fn held_lease_skips_even_when_idle() {
        let h = harness(3, MockInventoryClient::new());
        let _other = h.store.acquire_lease(SyncKind::Full, Duration::hours(2)).await;

        let report = h.orchestrator.sync_with_report(SyncKind::Full, true).await;

        assert_eq!(report.disposition, RunDisposition::Skipped(SkipReason::LeaseHeld));
        assert_eq!(h.catalog.fetch_count(), 0);
        assert_eq!(report.status, crate::status::SyncStatusSnapshot::default());
    }

    #[tokio::test]
    async fn aborted_run_marks_failed() {
        let h = harness(3, MockInventoryClient::new().fail_on_call(0, "boom"));
        let report = h.orchestrator.sync_with_report(SyncKind::Partial, false).await;

        assert_eq!(report.disposition, RunDisposition::Failed);
        assert!(report.error.unwrap().contains("boom"));
        assert_eq!(report.status.status, SyncState::Idle);
        assert!(!report.status.last_attempt_succeeded);
        assert!(report.status.last_completion.is_empty());
    }
}
