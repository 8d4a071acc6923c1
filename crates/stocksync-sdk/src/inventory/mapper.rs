//! 目录行 -> 库存行映射
//!
//! 标识策略在每次运行开始时解析一次为函数指针，循环内不再分支。

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::line_item::{product_name_and_options, LineItem};
use crate::catalog::CatalogRow;

/// supplierPartNumber 取自目录行的哪个字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierStrategy {
    #[default]
    VariationNumber,
    Sku,
    Barcode,
}

/// 已解析的标识提取函数
pub type IdentifierFn = fn(&CatalogRow) -> Option<String>;

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn by_variation_number(row: &CatalogRow) -> Option<String> {
    non_empty(&row.variation_number)
}

fn by_sku(row: &CatalogRow) -> Option<String> {
    non_empty(&row.sku)
}

fn by_barcode(row: &CatalogRow) -> Option<String> {
    non_empty(&row.barcode)
}

impl IdentifierStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::VariationNumber => "variation_number",
            Self::Sku => "sku",
            Self::Barcode => "barcode",
        }
    }

    pub fn resolve(self) -> IdentifierFn {
        match self {
            Self::VariationNumber => by_variation_number,
            Self::Sku => by_sku,
            Self::Barcode => by_barcode,
        }
    }
}

impl FromStr for IdentifierStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "variation_number" => Ok(Self::VariationNumber),
            "sku" => Ok(Self::Sku),
            "barcode" => Ok(Self::Barcode),
            _ => Err(()),
        }
    }
}

/// 单次运行使用的映射器
#[derive(Clone)]
pub struct LineItemMapper {
    identifier: IdentifierFn,
    default_supplier_id: Option<String>,
}

impl LineItemMapper {
    pub fn new(strategy: IdentifierStrategy, default_supplier_id: Option<String>) -> Self {
        Self {
            identifier: strategy.resolve(),
            default_supplier_id,
        }
    }

    /// 映射并截断数量；是否可提交由 [`LineItem::is_eligible`] 判断
    pub fn map(&self, row: &CatalogRow) -> LineItem {
        let mut item = LineItem {
            supplier_id: non_empty(&row.supplier_id).or_else(|| self.default_supplier_id.clone()),
            supplier_part_number: (self.identifier)(row),
            quantity_on_hand: row.stock_net,
            quantity_backordered: row.backordered,
            quantity_on_order: row.on_order,
            next_availability_date: non_empty(&row.next_available),
            discontinued: row.discontinued,
            product_name_and_options: product_name_and_options(&row.name, &row.options),
        };
        item.clamp_quantities();
        item
    }
}
