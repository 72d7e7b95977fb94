// src/po.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::extractor::ExtractedDocument;
use crate::items::LineItem;

/// The buyer-issued canonical record of what was ordered. Created exactly
/// once per approved request, from the proforma document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub vendor: String,
    pub items: Vec<LineItem>,
    pub terms: String,
    pub total: Decimal,
}

/// Build a purchase order from an extracted proforma. The total is the
/// exact decimal sum of `quantity * unit_price` over the items — not the
/// extractor's reported document total, which may include tax or fees not
/// reflected in line items. Always succeeds; no items means a zero total.
pub fn synthesize(proforma: &ExtractedDocument) -> PurchaseOrder {
    let total: Decimal = proforma
        .items
        .iter()
        .map(|item| {
            let price: Decimal = item.unit_price.parse().unwrap_or(Decimal::ZERO);
            Decimal::from(item.quantity) * price
        })
        .sum();

    info!(vendor = %proforma.vendor, items = proforma.items.len(), total = %total, "PO synthesized");

    PurchaseOrder {
        vendor: proforma.vendor.clone(),
        items: proforma.items.clone(),
        terms: proforma.terms.clone(),
        total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::ExtractionMethod;

    fn proforma(items: Vec<LineItem>) -> ExtractedDocument {
        ExtractedDocument {
            vendor: "Kigali Office Supplies Ltd".to_string(),
            total_amount: "407100".to_string(),
            items,
            terms: "Net 30".to_string(),
            confidence: 0.7,
            method: ExtractionMethod::Basic,
        }
    }

    fn item(name: &str, quantity: u32, unit_price: &str) -> LineItem {
        LineItem {
            name: name.to_string(),
            quantity,
            unit_price: unit_price.to_string(),
        }
    }

    #[test]
    fn total_is_item_sum_not_document_total() {
        let doc = proforma(vec![
            item("Office Chair", 2, "75000"),
            item("Desk Lamp", 5, "15000"),
        ]);
        let po = synthesize(&doc);
        // 2*75000 + 5*15000, intentionally divergent from total_amount.
        assert_eq!(po.total, Decimal::from(225_000));
        assert_eq!(po.vendor, "Kigali Office Supplies Ltd");
        assert_eq!(po.terms, "Net 30");
        assert_eq!(po.items.len(), 2);
    }

    #[test]
    fn synthesis_is_deterministic() {
        let doc = proforma(vec![item("Office Chair", 2, "75000")]);
        assert_eq!(synthesize(&doc), synthesize(&doc));
    }

    #[test]
    fn empty_items_yield_zero_total() {
        let po = synthesize(&proforma(Vec::new()));
        assert_eq!(po.total, Decimal::ZERO);
        assert!(po.items.is_empty());
    }

    #[test]
    fn unparseable_price_contributes_zero() {
        let doc = proforma(vec![
            item("Office Chair", 2, "not a price"),
            item("Desk Lamp", 5, "15000"),
        ]);
        assert_eq!(synthesize(&doc).total, Decimal::from(75_000));
    }

    #[test]
    fn fractional_prices_are_exact() {
        let doc = proforma(vec![item("Cable Tie", 3, "0.10")]);
        assert_eq!(synthesize(&doc).total, "0.30".parse::<Decimal>().unwrap());
    }
}
