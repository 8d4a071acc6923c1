//! 库存行
//!
//! 由目录行映射而来，仅在一次运行内存活，不落盘。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub supplier_id: Option<String>,
    pub supplier_part_number: Option<String>,
    pub quantity_on_hand: i64,
    pub quantity_backordered: i64,
    pub quantity_on_order: i64,
    pub next_availability_date: Option<String>,
    pub discontinued: bool,
    pub product_name_and_options: String,
}

impl LineItem {
    /// 在库数量下限截断为 0；其余数量原样保留
    pub fn clamp_quantities(&mut self) {
        if self.quantity_on_hand < 0 {
            self.quantity_on_hand = 0;
        }
    }

    /// supplier_id 与 supplier_part_number 均非空才可提交
    pub fn is_eligible(&self) -> bool {
        fn present(value: &Option<String>) -> bool {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        }
        present(&self.supplier_id) && present(&self.supplier_part_number)
    }
}

/// 商品名与规格拼接：`name (opt1, opt2)`，无规格时仅商品名
pub fn product_name_and_options(name: &str, options: &[String]) -> String {
    let options: Vec<&str> = options
        .iter()
        .map(|o| o.trim())
        .filter(|o| !o.is_empty())
        .collect();
    if options.is_empty() {
        name.trim().to_string()
    } else {
        format!("{} ({})", name.trim(), options.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_on_hand_is_clamped() {
        let mut item = LineItem {
            quantity_on_hand: -4,
            quantity_backordered: -1,
            ..Default::default()
        };
        item.clamp_quantities();
        assert_eq!(item.quantity_on_hand, 0);
        assert_eq!(item.quantity_backordered, -1);
    }

    #[test]
    fn eligibility_requires_both_identifiers() {
        let mut item = LineItem {
            supplier_id: Some("SUP".into()),
            supplier_part_number: Some("A-1".into()),
            ..Default::default()
        };
        assert!(item.is_eligible());

        item.supplier_part_number = Some("  ".into());
        assert!(!item.is_eligible());

        item.supplier_part_number = Some("A-1".into());
        item.supplier_id = None;
        assert!(!item.is_eligible());
    }

    #[test]
    fn name_with_options() {
        assert_eq!(product_name_and_options("Shirt", &[]), "Shirt");
        assert_eq!(
            product_name_and_options("Shirt", &["Red".into(), "".into(), "XL".into()]),
            "Shirt (Red, XL)"
        );
    }
}
