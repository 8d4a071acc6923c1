//! 同步编排
//!
//! - [`SyncKind`]：全量 / 增量
//! - [`SyncOrchestrator`]：运行守卫与状态迁移

pub mod kind;
pub mod orchestrator;

pub use kind::SyncKind;
pub use orchestrator::{RunDisposition, SkipReason, SyncOrchestrator, SyncReport};
