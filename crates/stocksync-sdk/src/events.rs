//! 事件系统模块 - 库存同步运行过程中的事件广播
//!
//! 功能包括：
//! - 运行开始 / 跳过 / 结束事件
//! - 分页循环的汇总事件（每次运行恰好一次，无论成功或中止）
//! - 状态清除事件
//! - 事件广播、按类型监听与统计

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::inventory::RunAggregate;
use crate::status::SyncStatusSnapshot;
use crate::sync::{RunDisposition, SkipReason, SyncKind};

/// 同步事件
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// 守卫通过，已写入 running
    RunStarted {
        kind: SyncKind,
        manual: bool,
        started_at: String,
        timestamp: u64,
    },
    /// 另一个运行仍存活，本次未执行
    RunSkipped {
        kind: SyncKind,
        manual: bool,
        reason: SkipReason,
        timestamp: u64,
    },
    /// 分页循环汇总
    RunSummary {
        kind: SyncKind,
        aggregate: RunAggregate,
        /// 中止原因，正常结束为 None
        aborted: Option<String>,
        timestamp: u64,
    },
    /// 状态已落盘
    RunFinished {
        kind: SyncKind,
        manual: bool,
        disposition: RunDisposition,
        snapshot: SyncStatusSnapshot,
        timestamp: u64,
    },
    StateCleared {
        kind: SyncKind,
        timestamp: u64,
    },
}

impl SyncEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::RunStarted { .. } => "run_started",
            SyncEvent::RunSkipped { .. } => "run_skipped",
            SyncEvent::RunSummary { .. } => "run_summary",
            SyncEvent::RunFinished { .. } => "run_finished",
            SyncEvent::StateCleared { .. } => "state_cleared",
        }
    }

    pub fn kind(&self) -> SyncKind {
        match self {
            SyncEvent::RunStarted { kind, .. }
            | SyncEvent::RunSkipped { kind, .. }
            | SyncEvent::RunSummary { kind, .. }
            | SyncEvent::RunFinished { kind, .. }
            | SyncEvent::StateCleared { kind, .. } => *kind,
        }
    }

    /// 事件时间戳（毫秒）
    pub fn timestamp(&self) -> u64 {
        match self {
            SyncEvent::RunStarted { timestamp, .. }
            | SyncEvent::RunSkipped { timestamp, .. }
            | SyncEvent::RunSummary { timestamp, .. }
            | SyncEvent::RunFinished { timestamp, .. }
            | SyncEvent::StateCleared { timestamp, .. } => *timestamp,
        }
    }
}

/// 当前毫秒时间戳
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// 事件过滤器
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<Vec<String>>,
    pub kinds: Option<Vec<SyncKind>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<SyncKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &SyncEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }
        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }
        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&SyncEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    /// 按类型分组的事件数
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<u64>,
}

/// 事件管理器
pub struct EventManager {
    sender: broadcast::Sender<SyncEvent>,
    listeners: Arc<tokio::sync::RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<tokio::sync::RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(tokio::sync::RwLock::new(HashMap::new())),
            stats: Arc::new(tokio::sync::RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub async fn emit(&self, event: SyncEvent) {
        debug!("📣 发布事件: {} ({})", event.event_type(), event.kind());

        {
            let mut stats = self.stats.write().await;
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("广播事件失败（无活跃订阅者）: {}", e);
        }

        let listeners = self.listeners.read().await;
        if let Some(event_listeners) = listeners.get(event.event_type()) {
            for listener in event_listeners {
                listener(&event);
            }
        }
        if let Some(general_listeners) = listeners.get("*") {
            for listener in general_listeners {
                listener(&event);
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器，`"*"` 监听全部类型
    pub async fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&SyncEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write().await;
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));

        let mut stats = self.stats.write().await;
        stats.listener_count = listeners.values().map(|v| v.len()).sum();

        info!("👂 已添加事件监听器: {}", event_type);
    }

    pub async fn get_stats(&self) -> EventStats {
        self.stats.read().await.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<SyncEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<SyncEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<SyncEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 非阻塞接收
    pub fn try_recv(&mut self) -> Result<SyncEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}
