//! 状态记录 Key 规范
//!
//! 格式：`{full_|partial_}{suffix}`，值均为字符串

use crate::sync::SyncKind;

/// `idle` | `running`
pub const CRON_STATUS: &str = "inventory_cron_status";
/// 最近一次状态变更时间
pub const STATUS_UPDATED_AT: &str = "inventory_status_updated_at";
/// 最近一次成功完成时间
pub const LAST_COMPLETION: &str = "inventory_last_completion";
/// 最近一次尝试的开始时间
pub const LAST_ATTEMPT: &str = "inventory_last_attempt";
/// 最近一次尝试是否成功（`true` / `false`）
pub const SUCCESS: &str = "inventory_success";
/// 最近一次成功运行的开始时间
pub const LAST_SUCCESS_START: &str = "inventory_last_success_start";
/// 运行租约（JSON）
pub const RUN_LEASE: &str = "inventory_run_lease";

/// 一条状态记录包含的全部后缀（clear 时逐个删除）
pub const ALL_SUFFIXES: &[&str] = &[
    CRON_STATUS,
    STATUS_UPDATED_AT,
    LAST_COMPLETION,
    LAST_ATTEMPT,
    SUCCESS,
    LAST_SUCCESS_START,
    RUN_LEASE,
];

pub fn key(kind: SyncKind, suffix: &str) -> String {
    format!("{}{}", kind.key_prefix(), suffix)
}
