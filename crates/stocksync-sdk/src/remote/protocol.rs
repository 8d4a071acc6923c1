//! 远端库存接口的报文结构
//!
//! 单一 GraphQL 端点：
//! - 批量写入：`variables.inventory` + `variables.feedKind` + `variables.dryRun`，
//!   响应 `data.inventory.save`
//! - 只读查询：响应 `data.inventory`
//!
//! 任一方向出现顶层 `errors` 数组都视为整批失败。

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{BatchResult, InventoryQuery, ItemError};
use crate::error::{InventorySyncError, Result};
use crate::inventory::LineItem;

pub const SAVE_INVENTORY_MUTATION: &str = "mutation SaveInventory($inventory: [InventoryInput!]!, $feedKind: InventoryFeedKind!, $dryRun: Boolean) { inventory { save(inventory: $inventory, feedKind: $feedKind, dryRun: $dryRun) { id handle status submittedAt completedAt errors { key message } } } }";

pub const FETCH_INVENTORY_QUERY: &str = "query Inventory($supplierId: String, $supplierPartNumbers: [String!], $first: Int) { inventory(supplierId: $supplierId, supplierPartNumbers: $supplierPartNumbers, first: $first) { supplierId supplierPartNumber quantityOnHand quantityBackordered quantityOnOrder nextAvailabilityDate discontinued } }";

/// 远端 feed 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedKind {
    /// 全量：远端以本批为准覆盖
    TrueUp,
    Differential,
}

impl FeedKind {
    pub fn from_full_flag(full_inventory: bool) -> Self {
        if full_inventory {
            Self::TrueUp
        } else {
            Self::Differential
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a, V> {
    pub query: &'a str,
    pub variables: V,
}

/// 一条库存输入（只接受已通过校验的行）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryInput<'a> {
    pub supplier_id: &'a str,
    pub supplier_part_number: &'a str,
    pub quantity_on_hand: i64,
    pub quantity_backordered: i64,
    pub quantity_on_order: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_availability_date: Option<&'a str>,
    pub discontinued: bool,
    pub product_name_and_options: &'a str,
}

impl<'a> TryFrom<&'a LineItem> for InventoryInput<'a> {
    type Error = InventorySyncError;

    fn try_from(item: &'a LineItem) -> Result<Self> {
        let supplier_id = item
            .supplier_id
            .as_deref()
            .ok_or_else(|| InventorySyncError::InvalidData("库存行缺少 supplierId".to_string()))?;
        let supplier_part_number = item.supplier_part_number.as_deref().ok_or_else(|| {
            InventorySyncError::InvalidData("库存行缺少 supplierPartNumber".to_string())
        })?;
        Ok(Self {
            supplier_id,
            supplier_part_number,
            quantity_on_hand: item.quantity_on_hand,
            quantity_backordered: item.quantity_backordered,
            quantity_on_order: item.quantity_on_order,
            next_availability_date: item.next_availability_date.as_deref(),
            discontinued: item.discontinued,
            product_name_and_options: &item.product_name_and_options,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInventoryVariables<'a> {
    pub inventory: Vec<InventoryInput<'a>>,
    pub feed_kind: FeedKind,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchInventoryVariables<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_part_numbers: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<u32>,
}

/// 顶层错误
#[derive(Debug, Clone, Deserialize)]
pub struct GraphqlError {
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlResponse<D> {
    pub data: Option<D>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
pub struct SaveInventoryData {
    pub inventory: Option<SaveInventoryMutation>,
}

#[derive(Debug, Deserialize)]
pub struct SaveInventoryMutation {
    pub save: Option<SaveInventoryResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInventoryResult {
    pub id: String,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub errors: Vec<ItemError>,
}

/// 编码批量写入请求
pub fn encode_bulk_request(
    items: &[LineItem],
    feed_kind: FeedKind,
    dry_run: bool,
) -> Result<serde_json::Value> {
    let inventory = items
        .iter()
        .map(InventoryInput::try_from)
        .collect::<Result<Vec<_>>>()?;

    let request = GraphqlRequest {
        query: SAVE_INVENTORY_MUTATION,
        variables: SaveInventoryVariables {
            inventory,
            feed_kind,
            dry_run,
        },
    };
    Ok(serde_json::to_value(&request)?)
}

fn malformed(e: serde_json::Error) -> InventorySyncError {
    InventorySyncError::MalformedResponse(format!("无法解析响应: {}", e))
}

fn reject_top_level_errors(errors: Vec<GraphqlError>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(InventorySyncError::RemoteRejected(
        errors.into_iter().map(|e| e.message).collect(),
    ))
}

fn parse_body<D: DeserializeOwned>(body: &str) -> Result<GraphqlResponse<D>> {
    let mut response: GraphqlResponse<D> = serde_json::from_str(body).map_err(malformed)?;
    reject_top_level_errors(std::mem::take(&mut response.errors))?;
    Ok(response)
}

/// 解码批量写入响应
///
/// 逐行错误不视为失败，原样放入 [`BatchResult::errors`]。
pub fn decode_bulk_response(body: &str, submitted: usize) -> Result<BatchResult> {
    let response = parse_body::<SaveInventoryData>(body)?;
    let save = response
        .data
        .and_then(|d| d.inventory)
        .and_then(|i| i.save)
        .ok_or_else(|| {
            InventorySyncError::MalformedResponse("响应缺少 data.inventory.save".to_string())
        })?;

    Ok(BatchResult {
        id: save.id,
        handle: save.handle,
        status: save.status,
        submitted_at: save.submitted_at,
        completed_at: save.completed_at,
        submitted,
        errors: save.errors,
    })
}

/// 编码只读查询请求
pub fn encode_fetch_request(query: &InventoryQuery) -> Result<serde_json::Value> {
    let request = GraphqlRequest {
        query: FETCH_INVENTORY_QUERY,
        variables: FetchInventoryVariables {
            supplier_id: query.supplier_id.as_deref(),
            supplier_part_numbers: (!query.supplier_part_numbers.is_empty())
                .then_some(query.supplier_part_numbers.as_slice()),
            first: query.first,
        },
    };
    Ok(serde_json::to_value(&request)?)
}

/// 解码只读查询响应，校验后原样返回（包括 `extensions` 等其他顶层字段）
pub fn decode_fetch_response(body: &str) -> Result<serde_json::Value> {
    let raw: serde_json::Value = serde_json::from_str(body).map_err(malformed)?;

    if let Some(errors) = raw.get("errors").filter(|e| !e.is_null()) {
        reject_top_level_errors(Vec::<GraphqlError>::deserialize(errors).map_err(malformed)?)?;
    }
    if raw.pointer("/data/inventory").is_none() {
        return Err(InventorySyncError::MalformedResponse(
            "响应缺少 data.inventory".to_string(),
        ));
    }
    Ok(raw)
}
