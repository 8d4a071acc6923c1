use thiserror::Error;

/// SDK 统一错误类型
#[derive(Debug, Error)]
pub enum InventorySyncError {
    #[error("KV store error: {0}")]
    KvStore(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    IO(String),

    /// 传输层失败（网络不可达、超时、非 2xx 状态码）
    #[error("Transport error: {0}")]
    Transport(String),

    /// 远端返回顶层 errors 数组，整批失败
    #[error("Remote rejected request: {}", .0.join("; "))]
    RemoteRejected(Vec<String>),

    /// 远端响应缺少预期结构
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// 商品目录数据源错误
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Shutting down: {0}")]
    ShuttingDown(String),
}

impl From<sled::Error> for InventorySyncError {
    fn from(error: sled::Error) -> Self {
        InventorySyncError::KvStore(error.to_string())
    }
}

impl From<serde_json::Error> for InventorySyncError {
    fn from(error: serde_json::Error) -> Self {
        InventorySyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for InventorySyncError {
    fn from(error: std::io::Error) -> Self {
        InventorySyncError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for InventorySyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            InventorySyncError::MalformedResponse(error.to_string())
        } else {
            InventorySyncError::Transport(error.to_string())
        }
    }
}

impl InventorySyncError {
    /// 是否为整批失败（调用方无法区分「网络断开」与「响应畸形」，均中止分页循环）
    pub fn is_whole_batch_failure(&self) -> bool {
        matches!(
            self,
            InventorySyncError::Transport(_)
                | InventorySyncError::RemoteRejected(_)
                | InventorySyncError::MalformedResponse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, InventorySyncError>;
