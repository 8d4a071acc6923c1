//! 存储模块 - 同步状态的持久化层
//!
//! - [`KeyValueStore`]: 字符串键值存储抽象（get / upsert / delete），状态存储只依赖此 trait
//! - [`KvStore`]: 基于 sled 的持久化实现
//! - [`MemoryKvStore`]: 进程内实现，用于测试与演示
//!
//! 状态协议本身不依赖事务；`compare_and_swap` 仅供运行租约使用。

use async_trait::async_trait;

use crate::error::Result;

pub mod kv;
pub mod memory;

pub use kv::KvStore;
pub use memory::MemoryKvStore;

/// 字符串键值存储
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 读取键值，不存在返回 None
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入（存在则覆盖）
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 删除键，返回是否存在过
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 原子比较并交换
    ///
    /// `expected` 为 None 表示要求键不存在；`new` 为 None 表示删除。
    /// 当前值与 `expected` 不一致时返回 `Ok(false)`，不做任何写入。
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
    ) -> Result<bool>;

    /// 获取指定前缀的所有键值对（按键排序）
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;
}
