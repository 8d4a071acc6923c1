//! 商品目录数据源
//!
//! 分页器只通过 [`CatalogSource`] 读取目录行；查询语言由具体实现决定。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod memory;

pub use memory::InMemoryCatalog;

/// 更新时间窗口（闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at <= self.to
    }
}

/// 目录过滤条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogFilter {
    pub is_active: bool,
    /// 渠道（referrer）范围，None 表示不限
    pub scope: Option<u32>,
    /// 仅增量同步时设置
    pub updated_between: Option<TimeWindow>,
}

/// 分页参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page_size: u32,
    /// 从 0 开始
    pub page_index: u32,
}

/// 一页目录数据
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub rows: Vec<CatalogRow>,
    pub is_last_page: bool,
    pub page_index: u32,
    pub total_count: Option<u64>,
}

/// 目录行（一个商品变体及其库存）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub variation_id: u64,
    pub item_id: u64,
    pub variation_number: Option<String>,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub name: String,
    /// 规格属性值，如 ["Red", "XL"]
    pub options: Vec<String>,
    pub is_active: bool,
    pub referrers: Vec<u32>,
    /// 可用净库存，可能为负
    pub stock_net: i64,
    pub backordered: i64,
    pub on_order: i64,
    pub next_available: Option<String>,
    pub discontinued: bool,
    pub updated_at: DateTime<Utc>,
    /// 行级供应商覆盖，缺省使用配置中的 supplier_id
    pub supplier_id: Option<String>,
}

impl CatalogRow {
    pub fn matches(&self, filter: &CatalogFilter) -> bool {
        if self.is_active != filter.is_active {
            return false;
        }
        if let Some(scope) = filter.scope {
            if !self.referrers.contains(&scope) {
                return false;
            }
        }
        match filter.updated_between {
            Some(window) => window.contains(self.updated_at),
            None => true,
        }
    }
}

/// 目录数据源
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// 按过滤条件读取一页
    async fn fetch_page(&self, filter: &CatalogFilter, page: PageRequest) -> Result<CatalogPage>;
}
