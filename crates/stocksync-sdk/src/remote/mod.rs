//! 远端库存客户端
//!
//! - [`InventoryClient`]: 批量提交与只读查询的抽象
//! - [`HttpInventoryClient`]: 基于 reqwest 的实现
//! - [`mock::MockInventoryClient`]: 可编排结果的内存实现（测试 / 演示）

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::inventory::LineItem;

pub mod http_client;
pub mod mock;
pub mod protocol;

pub use http_client::HttpInventoryClient;
pub use mock::MockInventoryClient;
pub use protocol::FeedKind;

/// 逐行错误标记
///
/// key 为远端不透明标识，与提交顺序无对应关系。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub key: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// 一次批量提交的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub id: String,
    pub handle: Option<String>,
    pub status: Option<String>,
    pub submitted_at: Option<String>,
    pub completed_at: Option<String>,
    /// 本批提交的行数
    pub submitted: usize,
    pub errors: Vec<ItemError>,
}

impl BatchResult {
    /// 被拒绝的行数（不超过提交数）
    pub fn rejected(&self) -> usize {
        self.errors.len().min(self.submitted)
    }

    pub fn accepted(&self) -> usize {
        self.submitted - self.rejected()
    }

    /// 远端返回的错误数超出提交数的部分
    pub fn excess_errors(&self) -> usize {
        self.errors.len().saturating_sub(self.submitted)
    }
}

/// 只读查询条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryQuery {
    pub supplier_id: Option<String>,
    pub supplier_part_numbers: Vec<String>,
    pub first: Option<u32>,
}

/// 远端库存客户端
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// 提交一批库存行
    ///
    /// 传输失败、非 2xx、顶层 errors、缺少 `data.inventory.save` 均返回 Err；
    /// 逐行错误放在 [`BatchResult::errors`] 中。
    async fn update_bulk(&self, items: &[LineItem], full_inventory: bool) -> Result<BatchResult>;

    /// 只读查询远端库存，返回原始响应
    async fn fetch(&self, query: &InventoryQuery) -> Result<serde_json::Value>;
}
