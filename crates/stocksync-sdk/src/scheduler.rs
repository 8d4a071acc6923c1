//! 同步调度器
//!
//! 每个 SyncKind 一个 tokio 任务：
//! - 按间隔触发 `sync(kind, manual = false)`，错过的 tick 直接跳过
//! - 通过 mpsc 接收手动触发，`sync(kind, manual = true)`
//! - 关闭只阻止后续 tick，正在执行的运行会完整结束后任务才退出

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScheduleConfig;
use crate::error::{InventorySyncError, Result};
use crate::sync::{SyncKind, SyncOrchestrator};

pub struct SyncScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    schedule: ScheduleConfig,
}

impl SyncScheduler {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, schedule: ScheduleConfig) -> Self {
        Self {
            orchestrator,
            schedule,
        }
    }

    /// 启动所有类型的调度任务
    pub fn start(self) -> SchedulerHandle {
        let cancel = CancellationToken::new();
        let mut triggers = HashMap::new();
        let mut tasks = Vec::new();

        for kind in SyncKind::ALL {
            let (tx, rx) = mpsc::channel(1);
            triggers.insert(kind, tx);

            let period = self.schedule.interval(kind);
            let first_tick = if self.schedule.run_on_start {
                Instant::now()
            } else {
                Instant::now() + period
            };

            tasks.push(tokio::spawn(run_kind(
                kind,
                self.orchestrator.clone(),
                first_tick,
                period,
                rx,
                cancel.clone(),
            )));
            info!("⏱️ [{}] 调度已启动，间隔 {:?}", kind, period);
        }

        SchedulerHandle {
            triggers,
            cancel,
            tasks,
        }
    }
}

async fn run_kind(
    kind: SyncKind,
    orchestrator: Arc<SyncOrchestrator>,
    first_tick: Instant,
    period: Duration,
    mut manual: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("⏱️ [{}] 定时触发", kind);
                orchestrator.sync(kind, false).await;
            }
            message = manual.recv() => match message {
                Some(()) => {
                    debug!("👆 [{}] 手动触发", kind);
                    orchestrator.sync(kind, true).await;
                }
                None => break,
            },
        }
    }

    info!("🛑 [{}] 调度任务已退出", kind);
}

/// 调度器句柄
pub struct SchedulerHandle {
    triggers: HashMap<SyncKind, mpsc::Sender<()>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// 请求一次手动运行；已有待处理的请求时合并
    pub fn trigger(&self, kind: SyncKind) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(InventorySyncError::ShuttingDown("调度器已关闭".to_string()));
        }
        let sender = self
            .triggers
            .get(&kind)
            .ok_or_else(|| InventorySyncError::ShuttingDown(format!("{} 调度任务不存在", kind)))?;

        match sender.try_send(()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("[{}] 已有待处理的手动触发，合并", kind);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(())) => Err(InventorySyncError::ShuttingDown(
                format!("{} 调度任务已退出", kind),
            )),
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 停止后续触发并等待正在执行的运行结束
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("⚠️ 调度任务异常退出: {}", e);
            }
        }
        info!("🛑 调度器已关闭");
    }
}
