//! 运行租约
//!
//! 状态记录本身是「先读后写」的非原子协议，两个进程可能同时读到 idle。
//! 租约在其之上补一层 compare-and-swap：
//! - 键不存在，或心跳早于看门狗窗口，才可获取
//! - 每处理完一页刷新一次 `heartbeatAt`
//! - 释放时仅当租约仍归本次运行所有才删除

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::KeyValueStore;
use crate::utils::{Clock, TimeFormatter};

/// 运行心跳（分页循环每处理完一页调用一次）
#[async_trait]
pub trait RunHeartbeat: Send + Sync {
    async fn beat(&self, page_index: u32);
}

/// 持久化的租约记录（JSON）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub owner: String,
    pub acquired_at: String,
    pub heartbeat_at: String,
}

impl LeaseRecord {
    pub fn heartbeat(&self) -> Option<DateTime<Utc>> {
        TimeFormatter::parse_iso8601(&self.heartbeat_at).map(|at| at.with_timezone(&Utc))
    }

    /// 心跳无法解析，或早于 `now - window`，视为过期
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.heartbeat() {
            Some(at) => now - at > window,
            None => true,
        }
    }
}

/// 获取租约的结果
pub enum LeaseOutcome {
    Acquired(RunLease),
    /// 另一个运行持有未过期的租约
    Held { owner: Option<String> },
    /// 存储不可用，无法判断（调用方按无租约继续）
    Unavailable,
}

impl std::fmt::Debug for LeaseOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Acquired(lease) => f.debug_tuple("Acquired").field(&lease.owner).finish(),
            Self::Held { owner } => f.debug_struct("Held").field("owner", owner).finish(),
            Self::Unavailable => f.write_str("Unavailable"),
        }
    }
}

/// 本次运行持有的租约
pub struct RunLease {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    formatter: TimeFormatter,
    key: String,
    owner: String,
    acquired_at: String,
    /// 最近一次成功写入的原始值，作为下一次 CAS 的期望值
    current: Mutex<String>,
    lost: Mutex<bool>,
}

impl RunLease {
    pub(crate) fn new(
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        formatter: TimeFormatter,
        key: String,
        record: LeaseRecord,
        raw: String,
    ) -> Self {
        Self {
            kv,
            clock,
            formatter,
            key,
            owner: record.owner,
            acquired_at: record.acquired_at,
            current: Mutex::new(raw),
            lost: Mutex::new(false),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// 是否已被其他运行接管
    pub fn is_lost(&self) -> bool {
        *self.lost.lock()
    }

    /// 刷新心跳；租约已被接管时返回 false
    pub async fn refresh(&self) -> bool {
        if self.is_lost() {
            return false;
        }

        let record = LeaseRecord {
            owner: self.owner.clone(),
            acquired_at: self.acquired_at.clone(),
            heartbeat_at: self.formatter.format_iso8601(self.clock.now()),
        };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("⚠️ 序列化租约失败: {}", e);
                return true;
            }
        };
        let expected = self.current.lock().clone();

        match self
            .kv
            .compare_and_swap(&self.key, Some(expected.as_str()), Some(raw.as_str()))
            .await
        {
            Ok(true) => {
                *self.current.lock() = raw;
                true
            }
            Ok(false) => {
                warn!("⚠️ 租约已被其他运行接管: key={}, owner={}", self.key, self.owner);
                *self.lost.lock() = true;
                false
            }
            Err(e) => {
                // 存储暂时不可用不代表失去租约，下一页再试
                warn!("⚠️ 刷新租约心跳失败: key={}, error={}", self.key, e);
                true
            }
        }
    }

    /// 释放租约（仅当仍归本次运行所有）
    pub async fn release(&self) {
        if self.is_lost() {
            debug!("租约已失去，跳过释放: key={}", self.key);
            return;
        }
        let expected = self.current.lock().clone();
        match self.kv.compare_and_swap(&self.key, Some(expected.as_str()), None).await {
            Ok(true) => debug!("🔓 租约已释放: key={}, owner={}", self.key, self.owner),
            Ok(false) => warn!("⚠️ 释放租约时发现已被接管: key={}", self.key),
            Err(e) => {
                // 租约残留会让后续运行一直被跳过，退回无条件删除
                warn!("⚠️ 释放租约失败，改为直接删除: key={}, error={}", self.key, e);
                if let Err(e) = self.kv.delete(&self.key).await {
                    warn!("⚠️ 删除租约失败: key={}, error={}", self.key, e);
                }
            }
        }
    }
}

#[async_trait]
impl RunHeartbeat for RunLease {
    async fn beat(&self, page_index: u32) {
        if self.refresh().await {
            debug!("💓 心跳: key={}, page={}", self.key, page_index);
        }
    }
}
