//! KV 存储模块 - 基于 sled 的持久化键值存储
//!
//! 本模块提供：
//! - 命名空间隔离（每个命名空间一个 sled Tree）
//! - 字符串键值的读写与前缀扫描
//! - 基于 sled compare_and_swap 的原子写入

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sled::{Db, Tree};
use tracing::{debug, info};

use super::KeyValueStore;
use crate::error::{InventorySyncError, Result};

/// 默认命名空间
pub const DEFAULT_NAMESPACE: &str = "inventory_sync";

/// KV 存储组件
#[derive(Debug, Clone)]
pub struct KvStore {
    base_path: PathBuf,
    /// 主数据库实例（sled::Db 内部为 Arc，可廉价克隆）
    db: Db,
    /// 当前命名空间的 Tree
    tree: Tree,
}

impl KvStore {
    /// 打开（或创建）KV 存储，使用默认命名空间
    pub async fn open(base_path: &Path) -> Result<Self> {
        Self::open_namespace(base_path, DEFAULT_NAMESPACE).await
    }

    /// 打开（或创建）KV 存储并切换到指定命名空间
    pub async fn open_namespace(base_path: &Path, namespace: &str) -> Result<Self> {
        let base_path = base_path.to_path_buf();
        let kv_path = base_path.join("kv");

        tokio::fs::create_dir_all(&kv_path)
            .await
            .map_err(|e| InventorySyncError::IO(format!("创建 KV 存储目录失败: {}", e)))?;

        // 上一个进程可能刚释放文件锁，重试多次带退避
        const MAX_OPEN_RETRIES: u32 = 8;
        const RETRY_DELAY_MS: u64 = 300;
        let mut db_opt: Option<Db> = None;
        let mut last_err: Option<sled::Error> = None;
        for attempt in 0..MAX_OPEN_RETRIES {
            match sled::open(&kv_path) {
                Ok(d) => {
                    db_opt = Some(d);
                    break;
                }
                Err(e) => {
                    let msg = format!("{}", e);
                    last_err = Some(e);
                    let is_lock = msg.contains("could not acquire lock")
                        || msg.contains("Resource temporarily unavailable")
                        || msg.contains("WouldBlock");
                    if is_lock && attempt + 1 < MAX_OPEN_RETRIES {
                        let delay_ms = RETRY_DELAY_MS * (1 << attempt);
                        debug!("sled 文件锁被占用，{}ms 后重试 (第 {} 次)", delay_ms, attempt + 1);
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    } else {
                        break;
                    }
                }
            }
        }
        let db = db_opt.ok_or_else(|| {
            InventorySyncError::KvStore(
                last_err
                    .map(|e| format!("打开 sled 数据库失败: {}", e))
                    .unwrap_or_else(|| "打开 sled 数据库失败".to_string()),
            )
        })?;

        let tree = db
            .open_tree(namespace)
            .map_err(|e| InventorySyncError::KvStore(format!("打开命名空间 Tree 失败: {}", e)))?;

        info!("✅ KV 存储已打开: {} (namespace={})", kv_path.display(), namespace);

        Ok(Self {
            base_path,
            db,
            tree,
        })
    }

    /// 切换到另一个命名空间（共享同一个 sled 实例）
    pub fn namespace(&self, namespace: &str) -> Result<Self> {
        let tree = self
            .db
            .open_tree(namespace)
            .map_err(|e| InventorySyncError::KvStore(format!("打开命名空间 Tree 失败: {}", e)))?;
        Ok(Self {
            base_path: self.base_path.clone(),
            db: self.db.clone(),
            tree,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 刷盘
    pub async fn flush(&self) -> Result<()> {
        self.tree
            .flush_async()
            .await
            .map_err(|e| InventorySyncError::KvStore(format!("刷盘失败: {}", e)))?;
        Ok(())
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<String> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| InventorySyncError::Serialization(format!("键 {} 的值不是 UTF-8: {}", key, e)))
    }
}

#[async_trait]
impl KeyValueStore for KvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result = self
            .tree
            .get(key)
            .map_err(|e| InventorySyncError::KvStore(format!("获取键值对失败: {}", e)))?;

        match result {
            Some(bytes) => Ok(Some(Self::decode(key, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.tree
            .insert(key, value.as_bytes())
            .map_err(|e| InventorySyncError::KvStore(format!("设置键值对失败: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .tree
            .remove(key)
            .map_err(|e| InventorySyncError::KvStore(format!("删除键值对失败: {}", e)))?;
        Ok(removed.is_some())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool> {
        let result = self
            .tree
            .compare_and_swap(key, expected.map(str::as_bytes), new.map(str::as_bytes))
            .map_err(|e| InventorySyncError::KvStore(format!("原子交换失败: {}", e)))?;
        Ok(result.is_ok())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>> {
        let mut results = Vec::new();

        for entry in self.tree.scan_prefix(prefix) {
            let (key, value) = entry
                .map_err(|e| InventorySyncError::KvStore(format!("扫描前缀失败: {}", e)))?;
            let key = String::from_utf8(key.to_vec())
                .map_err(|e| InventorySyncError::Serialization(format!("键不是 UTF-8: {}", e)))?;
            let value = Self::decode(&key, &value)?;
            results.push((key, value));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_kv_store_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path()).await.unwrap();

        store.set("full_inventory_cron_status", "running").await.unwrap();
        assert_eq!(
            store.get("full_inventory_cron_status").await.unwrap().as_deref(),
            Some("running")
        );

        // 覆盖写
        store.set("full_inventory_cron_status", "idle").await.unwrap();
        assert_eq!(
            store.get("full_inventory_cron_status").await.unwrap().as_deref(),
            Some("idle")
        );

        assert!(store.delete("full_inventory_cron_status").await.unwrap());
        assert!(!store.delete("full_inventory_cron_status").await.unwrap());
        assert!(store.get("full_inventory_cron_status").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kv_store_compare_and_swap() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path()).await.unwrap();

        // 仅当键不存在时写入
        assert!(store.compare_and_swap("lease", None, Some("a")).await.unwrap());
        assert!(!store.compare_and_swap("lease", None, Some("b")).await.unwrap());
        assert_eq!(store.get("lease").await.unwrap().as_deref(), Some("a"));

        // 期望值不符时不写入
        assert!(!store.compare_and_swap("lease", Some("x"), Some("c")).await.unwrap());
        assert!(store.compare_and_swap("lease", Some("a"), None).await.unwrap());
        assert!(store.get("lease").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kv_store_namespaces_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let store = KvStore::open(temp_dir.path()).await.unwrap();
        let other = store.namespace("other").unwrap();

        store.set("full_inventory_success", "true").await.unwrap();
        other.set("partial_inventory_success", "false").await.unwrap();

        assert!(other.get("full_inventory_success").await.unwrap().is_none());
        let scanned = store.scan_prefix("full_").await.unwrap();
        assert_eq!(
            scanned,
            vec![("full_inventory_success".to_string(), "true".to_string())]
        );
    }

    #[tokio::test]
    async fn test_kv_store_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = KvStore::open(temp_dir.path()).await.unwrap();
            store.set("partial_inventory_last_attempt", "2026-10-19T00:00:00+00:00").await.unwrap();
            store.flush().await.unwrap();
        }
        let reopened = KvStore::open(temp_dir.path()).await.unwrap();
        assert_eq!(
            reopened.get("partial_inventory_last_attempt").await.unwrap().as_deref(),
            Some("2026-10-19T00:00:00+00:00")
        );
    }
}
