//! 同步状态模块
//!
//! 每个 [`SyncKind`](crate::sync::SyncKind) 一份持久化状态记录：
//! - 当前状态（idle / running）与状态变更时间
//! - 最近一次尝试时间、最近一次成功完成时间、最近一次尝试是否成功
//! - 最近一次成功运行的开始时间
//!
//! 记录缺失的字段一律回落为默认值（idle / 空字符串 / false），从不报错。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod keys;
pub mod lease;
pub mod store;

pub use lease::{LeaseOutcome, LeaseRecord, RunHeartbeat, RunLease};
pub use store::SyncStatusStore;

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl FromStr for SyncState {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "running" => Ok(Self::Running),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 状态快照（对外只读视图，HTTP 状态接口直接序列化此结构）
///
/// 时间戳字段保留持久化的原始字符串，缺失时为空字符串。
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusSnapshot {
    pub status: SyncState,
    pub state_change_timestamp: String,
    pub last_completion: String,
    pub last_attempt_timestamp: String,
    pub last_attempt_succeeded: bool,
}

impl SyncStatusSnapshot {
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}
