//! 进程内目录数据源（测试 / 演示用）

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CatalogFilter, CatalogPage, CatalogRow, CatalogSource, PageRequest};
use crate::error::{InventorySyncError, Result};

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    rows: Vec<CatalogRow>,
    /// 每次 fetch_page 的请求记录
    requests: Mutex<Vec<(CatalogFilter, PageRequest)>>,
    fail_on_page: Option<u32>,
}

impl InMemoryCatalog {
    pub fn new(rows: Vec<CatalogRow>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    /// 读取指定页时返回 Catalog 错误
    pub fn with_failure_on_page(mut self, page_index: u32) -> Self {
        self.fail_on_page = Some(page_index);
        self
    }

    pub fn requests(&self) -> Vec<(CatalogFilter, PageRequest)> {
        self.requests.lock().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn fetch_page(&self, filter: &CatalogFilter, page: PageRequest) -> Result<CatalogPage> {
        self.requests.lock().push((filter.clone(), page));

        if page.page_size == 0 {
            return Err(InventorySyncError::Catalog("page_size 必须大于 0".to_string()));
        }
        if self.fail_on_page == Some(page.page_index) {
            return Err(InventorySyncError::Catalog(format!(
                "读取第 {} 页失败",
                page.page_index
            )));
        }

        let rows = &self.rows;
        let matching: Vec<&CatalogRow> = rows.iter().filter(|row| row.matches(filter)).collect();

        let size = page.page_size as usize;
        let offset = page.page_index as usize * size;
        let page_rows: Vec<CatalogRow> = matching
            .iter()
            .skip(offset)
            .take(size)
            .map(|row| (*row).clone())
            .collect();

        Ok(CatalogPage {
            rows: page_rows,
            is_last_page: offset + size >= matching.len(),
            page_index: page.page_index,
            total_count: Some(matching.len() as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_rows(n: u64) -> Vec<CatalogRow> {
        (0..n)
            .map(|i| CatalogRow {
                variation_id: i,
                is_active: true,
                ..Default::default()
            })
            .collect()
    }

    fn all_active() -> CatalogFilter {
        CatalogFilter {
            is_active: true,
            scope: None,
            updated_between: None,
        }
    }

    #[tokio::test]
    async fn pages_through_matching_rows() {
        let catalog = InMemoryCatalog::new(active_rows(7));
        let filter = all_active();

        let first = catalog
            .fetch_page(&filter, PageRequest { page_size: 3, page_index: 0 })
            .await
            .unwrap();
        assert_eq!(first.rows.len(), 3);
        assert!(!first.is_last_page);
        assert_eq!(first.total_count, Some(7));

        let last = catalog
            .fetch_page(&filter, PageRequest { page_size: 3, page_index: 2 })
            .await
            .unwrap();
        assert_eq!(last.rows.len(), 1);
        assert!(last.is_last_page);
        assert_eq!(last.rows[0].variation_id, 6);
        assert_eq!(catalog.fetch_count(), 2);
    }

    #[tokio::test]
    async fn empty_catalog_first_page_is_last() {
        let catalog = InMemoryCatalog::new(Vec::new());
        let page = catalog
            .fetch_page(&all_active(), PageRequest { page_size: 500, page_index: 0 })
            .await
            .unwrap();
        assert!(page.rows.is_empty());
        assert!(page.is_last_page);
    }

    #[tokio::test]
    async fn injected_failure() {
        let catalog = InMemoryCatalog::new(active_rows(10)).with_failure_on_page(1);
        let filter = all_active();
        assert!(catalog
            .fetch_page(&filter, PageRequest { page_size: 5, page_index: 0 })
            .await
            .is_ok());
        let err = catalog
            .fetch_page(&filter, PageRequest { page_size: 5, page_index: 1 })
            .await
            .unwrap_err();
        assert!(matches!(err, InventorySyncError::Catalog(_)));
    }
}
