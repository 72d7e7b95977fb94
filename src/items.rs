// src/items.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single validated purchase line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: String,
}

/// Maximum number of line items kept from a single document.
pub const MAX_ITEMS: usize = 10;

/// Words that mark a "row" as a total, tax, or header rather than a real
/// item. Applied to both heuristic rows and oracle-returned items.
pub const EXCLUDE_KEYWORDS: &[&str] = &[
    "subtotal", "total", "tax", "vat", "discount", "shipping", "handling", "fee", "charge", "due",
    "balance", "amount", "grand", "final", "sum", "bill", "invoice", "pro-", "pro ", "receipt",
    "number", "#", "ref", "reference", "id", "code",
];

/// The structural row shapes the parser recognizes, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowPattern {
    /// `"1 Office Chair 2 75,000 150,000"` — numbered table row.
    Table,
    /// `"1Office Chair275,000150,000"` — the same fields with the column
    /// whitespace lost (common in garbled PDF text).
    Concatenated,
    /// `"Office Chair 2 75,000"` — name, quantity, unit price.
    Simple,
    /// `"2 Office Chair 75,000"` — quantity-first triple.
    QuantityFirst,
}

impl RowPattern {
    pub const ALL: [RowPattern; 4] = [
        RowPattern::Table,
        RowPattern::Concatenated,
        RowPattern::Simple,
        RowPattern::QuantityFirst,
    ];

    /// Scan the text for rows matching this pattern and return the ones
    /// that pass validation.
    fn scan(self, text: &str) -> Vec<LineItem> {
        match self {
            RowPattern::Table => {
                let re = Regex::new(
                    r"(?m)^\s*\d+\s+([A-Za-z][^\d\n]*?)\s+(\d+)\s+([0-9][0-9,]*)\s+([0-9][0-9,]*)\s*$",
                )
                .unwrap();
                re.captures_iter(text)
                    .filter_map(|cap| {
                        let qty: u32 = cap[2].parse().ok()?;
                        let price = parse_magnitude(&cap[3])?;
                        let total = parse_magnitude(&cap[4])?;
                        // Arithmetic cross-check, 5% tolerance.
                        if (qty as f64 * price - total).abs() > total * 0.05 {
                            return None;
                        }
                        build_item(&cap[1], qty, price)
                    })
                    .collect()
            }
            RowPattern::Concatenated => {
                // Quantity is matched lazily and the money columns must
                // carry thousands separators; without whitespace those
                // commas are the only reliable column anchors.
                let re = Regex::new(
                    r"(?m)^\d+([A-Za-z][A-Za-z ]+?)(\d{1,3}?)(\d{1,3}(?:,\d{3})+)(\d{1,3}(?:,\d{3})+)$",
                )
                .unwrap();
                re.captures_iter(text)
                    .filter_map(|cap| {
                        let qty: u32 = cap[2].parse().ok()?;
                        let price = parse_magnitude(&cap[3])?;
                        let total = parse_magnitude(&cap[4])?;
                        // No whitespace to anchor on, so only an exact
                        // arithmetic match is trusted.
                        if qty as f64 * price != total {
                            return None;
                        }
                        build_item(&cap[1], qty, price)
                    })
                    .collect()
            }
            RowPattern::Simple => {
                let re =
                    Regex::new(r"(?m)^([A-Za-z][^\d\n]*?)\s+(\d+)\s+([0-9][0-9,]*)\s*$").unwrap();
                re.captures_iter(text)
                    .filter_map(|cap| {
                        let qty: u32 = cap[2].parse().ok()?;
                        let price = parse_magnitude(&cap[3])?;
                        build_item(&cap[1], qty, price)
                    })
                    .collect()
            }
            RowPattern::QuantityFirst => {
                let re =
                    Regex::new(r"(?m)^\s*(\d+)\s+([A-Za-z][^\d\n]*?)\s+([0-9][0-9,]*)\s*$").unwrap();
                re.captures_iter(text)
                    .filter_map(|cap| {
                        let qty: u32 = cap[1].parse().ok()?;
                        let price = parse_magnitude(&cap[3])?;
                        build_item(&cap[2], qty, price)
                    })
                    .collect()
            }
        }
    }
}

/// Parse a currency magnitude like `"75,000"` into a float.
fn parse_magnitude(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse().ok()
}

/// Range checks for rows produced by the structural patterns. These are
/// tighter than the oracle-item ranges: a pattern match is weaker evidence
/// than a schema-constrained oracle answer.
fn build_item(name: &str, qty: u32, price: f64) -> Option<LineItem> {
    if !(1..=1000).contains(&qty) {
        return None;
    }
    if price <= 0.0 || price > 10_000_000.0 {
        return None;
    }
    if !is_valid_item(name, qty as i64, price) {
        return None;
    }
    Some(LineItem {
        name: name.trim().to_string(),
        quantity: qty,
        unit_price: format_price(price),
    })
}

/// Render a price float back to a decimal string without a trailing `.0`
/// for whole values.
fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{}", price as i64)
    } else {
        format!("{price}")
    }
}

/// Shared item validation: applied to pattern-matched rows and to items
/// returned by the extraction oracle.
pub fn is_valid_item(name: &str, quantity: i64, unit_price: f64) -> bool {
    let name = name.trim();
    if name.len() < 2 || !name.chars().any(|c| c.is_ascii_alphabetic()) {
        return false;
    }
    let lower = name.to_lowercase();
    if EXCLUDE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return false;
    }
    if !(1..=10_000).contains(&quantity) {
        return false;
    }
    unit_price > 0.0 && unit_price <= 100_000_000.0
}

/// Strip separators from a price string as reported by the oracle.
pub fn clean_price(raw: &str) -> String {
    raw.replace([',', ' '], "")
}

/// Parse line items out of raw document text: every row pattern is tried in
/// priority order, results are deduplicated by case-insensitive name (first
/// occurrence wins) and capped at [`MAX_ITEMS`].
pub fn parse_items(text: &str) -> Vec<LineItem> {
    let mut items = Vec::new();
    for pattern in RowPattern::ALL {
        let found = pattern.scan(text);
        if !found.is_empty() {
            debug!(pattern = ?pattern, count = found.len(), "Row pattern matched");
        }
        items.extend(found);
    }
    dedup_items(items)
}

fn dedup_items(items: Vec<LineItem>) -> Vec<LineItem> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for item in items {
        let key = item.name.trim().to_lowercase();
        if seen.insert(key) {
            unique.push(item);
            if unique.len() == MAX_ITEMS {
                break;
            }
        }
    }
    unique
}
