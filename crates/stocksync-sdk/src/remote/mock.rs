//! 内存库存客户端（测试 / 演示用）
//!
//! 按调用序号编排结果：逐行拒绝若干条，或整批失败。

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BatchResult, InventoryClient, InventoryQuery, ItemError};
use crate::error::{InventorySyncError, Result};
use crate::inventory::LineItem;

/// 一次 update_bulk 调用的记录
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub items: Vec<LineItem>,
    pub full_inventory: bool,
}

#[derive(Debug, Clone)]
enum Reply {
    RejectItems(usize),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MockInventoryClient {
    calls: Mutex<Vec<RecordedBatch>>,
    replies: Mutex<HashMap<usize, Reply>>,
    fetch_response: Mutex<Option<serde_json::Value>>,
}

impl MockInventoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 第 `call_index` 次提交（从 0 开始）返回 `count` 条逐行错误
    pub fn reject_items_on_call(self, call_index: usize, count: usize) -> Self {
        self.replies.lock().insert(call_index, Reply::RejectItems(count));
        self
    }

    /// 第 `call_index` 次提交整批失败（传输错误）
    pub fn fail_on_call<S: Into<String>>(self, call_index: usize, message: S) -> Self {
        self.replies
            .lock()
            .insert(call_index, Reply::Fail(message.into()));
        self
    }

    pub fn with_fetch_response(self, response: serde_json::Value) -> Self {
        *self.fetch_response.lock() = Some(response);
        self
    }

    pub fn calls(&self) -> Vec<RecordedBatch> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// 所有批次提交的总行数
    pub fn submitted_items(&self) -> usize {
        self.calls.lock().iter().map(|c| c.items.len()).sum()
    }
}

#[async_trait]
impl InventoryClient for MockInventoryClient {
    async fn update_bulk(&self, items: &[LineItem], full_inventory: bool) -> Result<BatchResult> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(RecordedBatch {
                items: items.to_vec(),
                full_inventory,
            });
            calls.len() - 1
        };

        let reply = self.replies.lock().get(&call_index).cloned();
        let errors = match reply {
            Some(Reply::Fail(message)) => return Err(InventorySyncError::Transport(message)),
            Some(Reply::RejectItems(count)) => (0..count)
                .map(|i| ItemError {
                    key: format!("mock-{}-{}", call_index, i),
                    message: Some("rejected".to_string()),
                })
                .collect(),
            None => Vec::new(),
        };

        Ok(BatchResult {
            id: format!("mock-submission-{}", call_index),
            handle: None,
            status: Some("ACCEPTED".to_string()),
            submitted_at: None,
            completed_at: None,
            submitted: items.len(),
            errors,
        })
    }

    async fn fetch(&self, _query: &InventoryQuery) -> Result<serde_json::Value> {
        Ok(self
            .fetch_response
            .lock()
            .clone()
            .unwrap_or_else(|| serde_json::json!({ "data": { "inventory": [] } })))
    }
}
