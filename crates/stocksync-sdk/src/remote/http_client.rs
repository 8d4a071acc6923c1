//! HTTP 库存客户端 - 基于 reqwest 调用远端 GraphQL 端点

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use tracing::{debug, error, info};

use super::protocol::{self, FeedKind};
use super::{BatchResult, InventoryClient, InventoryQuery};
use crate::config::{HttpClientConfig, RemoteConfig};
use crate::error::{InventorySyncError, Result};
use crate::inventory::LineItem;
use crate::version;

pub struct HttpInventoryClient {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
    dry_run: bool,
}

impl HttpInventoryClient {
    pub fn new(remote: &RemoteConfig, config: &HttpClientConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| InventorySyncError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let endpoint = remote.endpoint();
        info!("✅ 库存 HTTP 客户端已创建 (endpoint: {}, dry_run: {})", endpoint, remote.dry_run);

        Ok(Self {
            client,
            endpoint,
            api_token: remote.api_token.clone(),
            dry_run: remote.dry_run,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 发送请求，返回 2xx 响应体
    async fn post(&self, body: &serde_json::Value) -> Result<String> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, version::user_agent())
            .json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| InventorySyncError::Transport(format!("请求库存接口失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("❌ 库存接口返回错误状态: {} - {}", status, error_text);
            return Err(InventorySyncError::Transport(format!(
                "库存接口返回 {}: {}",
                status, error_text
            )));
        }

        response
            .text()
            .await
            .map_err(|e| InventorySyncError::Transport(format!("读取响应失败: {}", e)))
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    async fn update_bulk(&self, items: &[LineItem], full_inventory: bool) -> Result<BatchResult> {
        let feed_kind = FeedKind::from_full_flag(full_inventory);
        let body = protocol::encode_bulk_request(items, feed_kind, self.dry_run)?;

        debug!("📤 提交库存批次: {} 条, feedKind={:?}", items.len(), feed_kind);
        let text = self.post(&body).await?;
        let result = protocol::decode_bulk_response(&text, items.len())?;

        debug!(
            "📥 批次已受理: id={}, status={:?}, errors={}",
            result.id,
            result.status,
            result.errors.len()
        );
        Ok(result)
    }

    async fn fetch(&self, query: &InventoryQuery) -> Result<serde_json::Value> {
        let body = protocol::encode_fetch_request(query)?;
        let text = self.post(&body).await?;
        protocol::decode_fetch_response(&text)
    }
}
