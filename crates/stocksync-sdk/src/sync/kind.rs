//! 同步类型枚举
//!
//! SyncKind 决定三件事：过滤条件集合、持久化键前缀、远端 feed kind 标记。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 同步类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// 全量对账（true-up）
    Full,
    /// 增量对账（differential），仅最近窗口内变更的行
    Partial,
}

impl SyncKind {
    pub const ALL: [SyncKind; 2] = [SyncKind::Full, SyncKind::Partial];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Partial => "partial",
        }
    }

    /// 持久化键前缀：`full_` / `partial_`
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::Full => "full_",
            Self::Partial => "partial_",
        }
    }

    pub fn is_full(self) -> bool {
        matches!(self, Self::Full)
    }

    pub fn from_full_flag(full_inventory: bool) -> Self {
        if full_inventory {
            Self::Full
        } else {
            Self::Partial
        }
    }
}

impl FromStr for SyncKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "partial" => Ok(Self::Partial),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for SyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
