// src/discrepancy.rs

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::extractor::ExtractedDocument;
use crate::po::PurchaseOrder;

/// Absolute tolerance for quantity and unit price comparisons.
const TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyReason {
    NotFoundInPo,
    QuantityMismatch,
    PriceMismatch,
}

/// One detected mismatch between a receipt item and the purchase order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub item_name: String,
    pub reason: DiscrepancyReason,
    pub detail: String,
}

/// Compare an extracted receipt against a purchase order. The returned
/// list is the canonical validation result: empty means the receipt
/// matches the PO. A single receipt item can produce both a quantity and
/// a price discrepancy.
///
/// Receipt items are matched to PO items by case-insensitive substring in
/// either direction, so "Laptop" finds "Laptop Computer". Short generic
/// names can therefore match unrelated items; known fuzziness, kept as-is.
pub fn validate(receipt: &ExtractedDocument, po: &PurchaseOrder) -> Vec<Discrepancy> {
    let mut discrepancies = Vec::new();

    for receipt_item in &receipt.items {
        let name = receipt_item.name.trim().to_lowercase();

        let po_item = po.items.iter().find(|po_item| {
            let po_name = po_item.name.trim().to_lowercase();
            po_name.contains(&name) || name.contains(&po_name)
        });

        let Some(po_item) = po_item else {
            discrepancies.push(Discrepancy {
                item_name: receipt_item.name.clone(),
                reason: DiscrepancyReason::NotFoundInPo,
                detail: "Item not found in PO".to_string(),
            });
            continue;
        };

        let qty = receipt_item.quantity as f64;
        let po_qty = po_item.quantity as f64;
        if (qty - po_qty).abs() > TOLERANCE {
            discrepancies.push(Discrepancy {
                item_name: receipt_item.name.clone(),
                reason: DiscrepancyReason::QuantityMismatch,
                detail: format!(
                    "Quantity mismatch: PO={}, Receipt={}",
                    po_item.quantity, receipt_item.quantity
                ),
            });
        }

        let price = parse_price(&receipt_item.unit_price);
        let po_price = parse_price(&po_item.unit_price);
        if (price - po_price).abs() > TOLERANCE {
            discrepancies.push(Discrepancy {
                item_name: receipt_item.name.clone(),
                reason: DiscrepancyReason::PriceMismatch,
                detail: format!(
                    "Price mismatch: PO={}, Receipt={}",
                    po_item.unit_price, receipt_item.unit_price
                ),
            });
        }
    }

    info!(
        receipt_items = receipt.items.len(),
        po_items = po.items.len(),
        discrepancies = discrepancies.len(),
        "Receipt validated against PO"
    );

    discrepancies
}

/// Convenience wrapper: a receipt is valid when validation reports nothing.
pub fn is_valid(discrepancies: &[Discrepancy]) -> bool {
    discrepancies.is_empty()
}

fn parse_price(raw: &str) -> f64 {
    raw.replace([',', ' '], "").parse().unwrap_or(0.0)
}
