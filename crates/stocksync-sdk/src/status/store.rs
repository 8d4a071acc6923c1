//! 同步状态存储
//!
//! 每个操作都是「读当前值 + 若干独立写入」，不使用事务。
//! 持久化错误一律 warn 级别记录后吞掉，读取失败回落为默认值。

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, info, warn};

use super::keys::{self, key};
use super::lease::{LeaseOutcome, LeaseRecord, RunLease};
use super::{SyncState, SyncStatusSnapshot};
use crate::storage::KeyValueStore;
use crate::sync::SyncKind;
use crate::utils::{Clock, TimeFormatter};

/// 同步状态存储
#[derive(Clone)]
pub struct SyncStatusStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    formatter: TimeFormatter,
}

impl SyncStatusStore {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, formatter: TimeFormatter) -> Self {
        Self {
            kv,
            clock,
            formatter,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn formatter(&self) -> TimeFormatter {
        self.formatter
    }

    async fn read(&self, kind: SyncKind, suffix: &str) -> Option<String> {
        let key = key(kind, suffix);
        match self.kv.get(&key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ 读取同步状态失败，按默认值处理: key={}, error={}", key, e);
                None
            }
        }
    }

    async fn write(&self, kind: SyncKind, suffix: &str, value: &str) {
        let key = key(kind, suffix);
        if let Err(e) = self.kv.set(&key, value).await {
            warn!("⚠️ 写入同步状态失败: key={}, error={}", key, e);
        }
    }

    /// 写入状态并同步更新 `status_updated_at`
    async fn write_state(&self, kind: SyncKind, state: SyncState, now: &str) {
        self.write(kind, keys::CRON_STATUS, state.as_str()).await;
        self.write(kind, keys::STATUS_UPDATED_AT, now).await;
    }

    /// 当前状态，缺失或无法识别时为 Idle
    pub async fn get_state(&self, kind: SyncKind) -> SyncState {
        self.read(kind, keys::CRON_STATUS)
            .await
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// 标记开始运行，返回开始时间
    pub async fn mark_started(&self, kind: SyncKind) -> DateTime<Utc> {
        let now = self.clock.now();
        let stamp = self.formatter.format_iso8601(now);

        self.write_state(kind, SyncState::Running, &stamp).await;
        self.write(kind, keys::LAST_ATTEMPT, &stamp).await;

        info!("🚀 [{}] 同步开始: {}", kind, stamp);
        now
    }

    /// 标记成功完成
    pub async fn mark_complete(&self, kind: SyncKind, started_at: DateTime<Utc>) {
        let stamp = self.formatter.format_iso8601(self.clock.now());

        self.write_state(kind, SyncState::Idle, &stamp).await;
        self.write(kind, keys::LAST_COMPLETION, &stamp).await;
        self.write(kind, keys::SUCCESS, "true").await;
        self.write(
            kind,
            keys::LAST_SUCCESS_START,
            &self.formatter.format_iso8601(started_at),
        )
        .await;

        info!("✅ [{}] 同步完成: {}", kind, stamp);
    }

    /// 标记失败；不改动 last_completion
    pub async fn mark_failed(&self, kind: SyncKind) {
        let stamp = self.formatter.format_iso8601(self.clock.now());

        self.write_state(kind, SyncState::Idle, &stamp).await;
        self.write(kind, keys::SUCCESS, "false").await;

        warn!("❌ [{}] 同步失败: {}", kind, stamp);
    }

    /// 强制回到 idle（运维操作），同时丢弃运行租约
    pub async fn reset_to_idle(&self, kind: SyncKind) {
        let stamp = self.formatter.format_iso8601(self.clock.now());
        self.write_state(kind, SyncState::Idle, &stamp).await;

        let lease_key = key(kind, keys::RUN_LEASE);
        if let Err(e) = self.kv.delete(&lease_key).await {
            warn!("⚠️ 删除运行租约失败: key={}, error={}", lease_key, e);
        }

        info!("🔄 [{}] 状态已重置为 idle", kind);
    }

    /// 删除该类型的全部状态键（包括租约）
    pub async fn clear_state(&self, kind: SyncKind) {
        for suffix in keys::ALL_SUFFIXES {
            let key = key(kind, suffix);
            if let Err(e) = self.kv.delete(&key).await {
                warn!("⚠️ 清除同步状态失败: key={}, error={}", key, e);
            }
        }
        info!("🧹 [{}] 同步状态已清除", kind);
    }

    /// 对外状态快照
    pub async fn get_service_state(&self, kind: SyncKind) -> SyncStatusSnapshot {
        SyncStatusSnapshot {
            status: self.get_state(kind).await,
            state_change_timestamp: self
                .read(kind, keys::STATUS_UPDATED_AT)
                .await
                .unwrap_or_default(),
            last_completion: self
                .read(kind, keys::LAST_COMPLETION)
                .await
                .unwrap_or_default(),
            last_attempt_timestamp: self
                .read(kind, keys::LAST_ATTEMPT)
                .await
                .unwrap_or_default(),
            last_attempt_succeeded: self
                .read(kind, keys::SUCCESS)
                .await
                .map(|v| v == "true")
                .unwrap_or(false),
        }
    }

    /// 最近一次成功运行的开始时间
    pub async fn last_success_start(&self, kind: SyncKind) -> Option<DateTime<FixedOffset>> {
        self.read(kind, keys::LAST_SUCCESS_START)
            .await
            .and_then(|v| TimeFormatter::parse_iso8601(&v))
    }

    async fn read_lease(&self, kind: SyncKind) -> Option<LeaseRecord> {
        let raw = self.read(kind, keys::RUN_LEASE).await?;
        serde_json::from_str(&raw).ok()
    }

    /// 最近一次状态变更时间（看门狗据此判断）
    ///
    /// 缺失或无法解析时返回 None。
    pub async fn state_changed_at(&self, kind: SyncKind) -> Option<DateTime<Utc>> {
        self.read(kind, keys::STATUS_UPDATED_AT)
            .await
            .and_then(|v| TimeFormatter::parse_iso8601(&v))
            .map(|at| at.with_timezone(&Utc))
    }

    /// 尝试获取运行租约
    ///
    /// 键不存在或心跳超过 `stale_after` 时通过 CAS 写入新租约。
    pub async fn acquire_lease(&self, kind: SyncKind, stale_after: Duration) -> LeaseOutcome {
        self.claim_lease(kind, Some(stale_after)).await
    }

    /// 强制接管租约，不理会现有心跳
    ///
    /// 看门狗已判定上一次运行被放弃时使用。
    pub async fn take_over_lease(&self, kind: SyncKind) -> LeaseOutcome {
        self.claim_lease(kind, None).await
    }

    async fn claim_lease(&self, kind: SyncKind, stale_after: Option<Duration>) -> LeaseOutcome {
        let lease_key = key(kind, keys::RUN_LEASE);
        let now = self.clock.now();

        let current = match self.kv.get(&lease_key).await {
            Ok(current) => current,
            Err(e) => {
                warn!("⚠️ 读取运行租约失败: key={}, error={}", lease_key, e);
                return LeaseOutcome::Unavailable;
            }
        };

        if let Some(raw) = current.as_deref() {
            match serde_json::from_str::<LeaseRecord>(raw) {
                Ok(record) if stale_after.is_some_and(|window| !record.is_stale(now, window)) => {
                    debug!("🔒 [{}] 租约被占用: owner={}", kind, record.owner);
                    return LeaseOutcome::Held {
                        owner: Some(record.owner),
                    };
                }
                Ok(record) => {
                    warn!(
                        "⏰ [{}] 接管过期租约: owner={}, heartbeat={}",
                        kind, record.owner, record.heartbeat_at
                    );
                }
                Err(e) => {
                    warn!("⚠️ [{}] 租约记录损坏，直接覆盖: {}", kind, e);
                }
            }
        }

        let stamp = self.formatter.format_iso8601(now);
        let record = LeaseRecord {
            owner: uuid::Uuid::new_v4().to_string(),
            acquired_at: stamp.clone(),
            heartbeat_at: stamp,
        };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ 序列化租约失败: {}", e);
                return LeaseOutcome::Unavailable;
            }
        };

        match self
            .kv
            .compare_and_swap(&lease_key, current.as_deref(), Some(raw.as_str()))
            .await
        {
            Ok(true) => {
                debug!("🔐 [{}] 已获取租约: owner={}", kind, record.owner);
                LeaseOutcome::Acquired(RunLease::new(
                    self.kv.clone(),
                    self.clock.clone(),
                    self.formatter,
                    lease_key,
                    record,
                    raw,
                ))
            }
            Ok(false) => {
                // 读与 CAS 之间被其他运行抢先
                let owner = self.read_lease(kind).await.map(|r| r.owner);
                debug!("🔒 [{}] 租约竞争失败: owner={:?}", kind, owner);
                LeaseOutcome::Held { owner }
            }
            Err(e) => {
                warn!("⚠️ 写入运行租约失败: key={}, error={}", lease_key, e);
                LeaseOutcome::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InventorySyncError, Result};
    use crate::storage::MemoryKvStore;
    use crate::utils::{ManualClock, TimezoneConfig};
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap()
    }

    fn store_with(kv: Arc<dyn KeyValueStore>) -> (SyncStatusStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = SyncStatusStore::new(
            kv,
            clock.clone(),
            TimeFormatter::new(Some(TimezoneConfig::utc())),
        );
        (store, clock)
    }

    fn memory_store() -> (SyncStatusStore, Arc<ManualClock>, MemoryKvStore) {
        let kv = MemoryKvStore::new();
        let (store, clock) = store_with(Arc::new(kv.clone()));
        (store, clock, kv)
    }

    /// 所有操作都失败的存储
    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(InventorySyncError::KvStore("disk gone".into()))
        }
        async fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(InventorySyncError::KvStore("disk gone".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool> {
            Err(InventorySyncError::KvStore("disk gone".into()))
        }
        async fn compare_and_swap(
            &self,
            _key: &str,
            _expected: Option<&str>,
            _new: Option<&str>,
        ) -> Result<bool> {
            Err(InventorySyncError::KvStore("disk gone".into()))
        }
        async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, String)>> {
            Err(InventorySyncError::KvStore("disk gone".into()))
        }
    }

    #[tokio::test]
    async fn missing_record_reads_as_idle_defaults() {
        let (store, _, _) = memory_store();
        assert_eq!(store.get_state(SyncKind::Full).await, SyncState::Idle);
        assert_eq!(
            store.get_service_state(SyncKind::Full).await,
            SyncStatusSnapshot::default()
        );
    }

    #[tokio::test]
    async fn started_then_complete() {
        let (store, clock, kv) = memory_store();

        let started = store.mark_started(SyncKind::Full).await;
        let snapshot = store.get_service_state(SyncKind::Full).await;
        assert_eq!(snapshot.status, SyncState::Running);
        assert_eq!(snapshot.last_attempt_timestamp, "2026-10-19T08:00:00+00:00");
        assert_eq!(snapshot.state_change_timestamp, "2026-10-19T08:00:00+00:00");
        assert!(snapshot.last_completion.is_empty());

        clock.advance(Duration::minutes(5));
        store.mark_complete(SyncKind::Full, started).await;

        let snapshot = store.get_service_state(SyncKind::Full).await;
        assert_eq!(snapshot.status, SyncState::Idle);
        assert!(snapshot.last_attempt_succeeded);
        assert_eq!(snapshot.last_completion, "2026-10-19T08:05:00+00:00");
        assert_eq!(snapshot.state_change_timestamp, "2026-10-19T08:05:00+00:00");
        assert_eq!(
            kv.snapshot().get("full_inventory_last_success_start").map(String::as_str),
            Some("2026-10-19T08:00:00+00:00")
        );
        assert_eq!(
            store.last_success_start(SyncKind::Full).await.map(|t| t.with_timezone(&Utc)),
            Some(started)
        );

        // 另一类型不受影响
        assert_eq!(store.get_state(SyncKind::Partial).await, SyncState::Idle);
    }

    #[tokio::test]
    async fn failure_keeps_previous_completion() {
        let (store, clock, _) = memory_store();

        let started = store.mark_started(SyncKind::Partial).await;
        store.mark_complete(SyncKind::Partial, started).await;
        let before = store.get_service_state(SyncKind::Partial).await;

        clock.advance(Duration::hours(1));
        store.mark_started(SyncKind::Partial).await;
        store.mark_failed(SyncKind::Partial).await;

        let after = store.get_service_state(SyncKind::Partial).await;
        assert_eq!(after.status, SyncState::Idle);
        assert!(!after.last_attempt_succeeded);
        assert_eq!(after.last_completion, before.last_completion);
        assert_eq!(after.last_attempt_timestamp, "2026-10-19T09:00:00+00:00");
    }

    #[tokio::test]
    async fn reset_keeps_attempt_timestamps() {
        let (store, clock, _) = memory_store();
        store.mark_started(SyncKind::Full).await;
        clock.advance(Duration::minutes(1));
        store.reset_to_idle(SyncKind::Full).await;

        let snapshot = store.get_service_state(SyncKind::Full).await;
        assert_eq!(snapshot.status, SyncState::Idle);
        assert_eq!(snapshot.last_attempt_timestamp, "2026-10-19T08:00:00+00:00");
        assert_eq!(snapshot.state_change_timestamp, "2026-10-19T08:01:00+00:00");
    }

    #[tokio::test]
    async fn clear_state_removes_only_that_kind() {
        let (store, _, kv) = memory_store();
        let started = store.mark_started(SyncKind::Full).await;
        store.mark_complete(SyncKind::Full, started).await;
        store.mark_started(SyncKind::Partial).await;

        store.clear_state(SyncKind::Full).await;

        assert_eq!(
            store.get_service_state(SyncKind::Full).await,
            SyncStatusSnapshot::default()
        );
        assert!(kv.snapshot().keys().all(|k| !k.starts_with("full_")));
        assert_eq!(store.get_state(SyncKind::Partial).await, SyncState::Running);
    }

    #[tokio::test]
    async fn persistence_errors_are_swallowed() {
        let (store, _) = store_with(Arc::new(BrokenStore));

        store.mark_started(SyncKind::Full).await;
        assert_eq!(store.get_state(SyncKind::Full).await, SyncState::Idle);
        assert_eq!(
            store.get_service_state(SyncKind::Full).await,
            SyncStatusSnapshot::default()
        );
        assert!(matches!(
            store.acquire_lease(SyncKind::Full, Duration::hours(2)).await,
            LeaseOutcome::Unavailable
        ));
    }

    #[tokio::test]
    async fn second_lease_is_refused_while_fresh() {
        let (store, clock, _) = memory_store();
        let window = Duration::hours(2);

        let first = match store.acquire_lease(SyncKind::Full, window).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected lease, got {:?}", other),
        };

        clock.advance(Duration::minutes(30));
        match store.acquire_lease(SyncKind::Full, window).await {
            LeaseOutcome::Held { owner } => assert_eq!(owner.as_deref(), Some(first.owner())),
            other => panic!("expected held, got {:?}", other),
        }

        // 另一类型互不影响
        assert!(matches!(
            store.acquire_lease(SyncKind::Partial, window).await,
            LeaseOutcome::Acquired(_)
        ));

        first.release().await;
        assert!(matches!(
            store.acquire_lease(SyncKind::Full, window).await,
            LeaseOutcome::Acquired(_)
        ));
    }

    #[tokio::test]
    async fn stale_lease_is_taken_over() {
        let (store, clock, _) = memory_store();
        let window = Duration::hours(2);

        let first = match store.acquire_lease(SyncKind::Full, window).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected lease, got {:?}", other),
        };

        clock.advance(Duration::hours(3));
        let second = match store.acquire_lease(SyncKind::Full, window).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected takeover, got {:?}", other),
        };
        assert_ne!(first.owner(), second.owner());

        // 旧持有者刷新心跳时发现被接管，释放不会删掉新租约
        assert!(!first.refresh().await);
        assert!(first.is_lost());
        first.release().await;
        assert!(matches!(
            store.acquire_lease(SyncKind::Full, window).await,
            LeaseOutcome::Held { .. }
        ));
    }

    #[tokio::test]
    async fn heartbeat_does_not_move_state_change_time() {
        let (store, clock, _) = memory_store();
        store.mark_started(SyncKind::Full).await;
        let lease = match store.acquire_lease(SyncKind::Full, Duration::hours(2)).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected lease, got {:?}", other),
        };

        clock.advance(Duration::minutes(90));
        assert!(lease.refresh().await);

        assert_eq!(store.state_changed_at(SyncKind::Full).await, Some(start()));
    }

    #[tokio::test]
    async fn take_over_ignores_fresh_heartbeat() {
        let (store, clock, _) = memory_store();
        let window = Duration::hours(2);
        let first = match store.acquire_lease(SyncKind::Full, window).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected lease, got {:?}", other),
        };
        clock.advance(Duration::minutes(1));
        assert!(first.refresh().await);

        let second = match store.take_over_lease(SyncKind::Full).await {
            LeaseOutcome::Acquired(lease) => lease,
            other => panic!("expected forced takeover, got {:?}", other),
        };
        assert_ne!(first.owner(), second.owner());
        assert!(!first.refresh().await);
        assert!(second.refresh().await);
    }
}
