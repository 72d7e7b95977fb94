// src/extractor.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::amount;
use crate::config::EngineConfig;
use crate::error::ExtractionError;
use crate::items::{self, LineItem};
use crate::oracle::{extract_json_object, ChatOracle, ExtractionOracle};

/// Prompt for proforma invoices. The schema here is the exact shape the
/// engine deserializes; anything else falls back to pattern extraction.
const PROFORMA_PROMPT: &str = r#"You are a procurement document extraction assistant.
Given raw text from a proforma invoice, extract structured data and return ONLY valid JSON.

The JSON must match this schema exactly:
{
  "vendor": "string",
  "total_amount": "decimal string",
  "items": [
    {
      "name": "string",
      "quantity": integer,
      "unit_price": "decimal string"
    }
  ],
  "terms": "string",
  "confidence": number between 0 and 1
}

Rules:
- total_amount is the FINAL TOTAL including all taxes and fees, NOT the subtotal.
- Never list totals, subtotals, taxes, discounts or fees as items.
- Strip currency symbols and thousands separators from all amounts.
- The text may be garbled or truncated. Do your best to reconstruct the data.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Prompt for receipts. Same schema, different framing.
const RECEIPT_PROMPT: &str = r#"You are a procurement document extraction assistant.
Given raw text from a purchase receipt, extract structured data and return ONLY valid JSON.

The JSON must match this schema exactly:
{
  "vendor": "string",
  "total_amount": "decimal string",
  "items": [
    {
      "name": "string",
      "quantity": integer,
      "unit_price": "decimal string"
    }
  ],
  "terms": "string",
  "confidence": number between 0 and 1
}

Rules:
- total_amount is the FINAL amount actually billed, NOT a subtotal.
- Never list totals, subtotals, taxes, discounts or fees as items.
- Strip currency symbols and thousands separators from all amounts.
- Return ONLY the JSON object, no markdown fences, no commentary."#;

/// Texts shorter than this (trimmed) produce the schema-default document.
const MIN_TEXT_CHARS: usize = 5;
/// Texts shorter than this (trimmed) are not worth an oracle round-trip.
const MIN_ORACLE_CHARS: usize = 10;

/// How a document was extracted, in decreasing order of trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Ai,
    Basic,
    ErrorFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Proforma,
    Receipt,
}

impl DocumentKind {
    fn noun(self) -> &'static str {
        match self {
            DocumentKind::Proforma => "proforma",
            DocumentKind::Receipt => "receipt",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            DocumentKind::Proforma => PROFORMA_PROMPT,
            DocumentKind::Receipt => RECEIPT_PROMPT,
        }
    }
}

/// The normalized output of extraction. Immutable once produced; consumed
/// by the PO synthesizer and the discrepancy validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub vendor: String,
    pub total_amount: String,
    pub items: Vec<LineItem>,
    pub terms: String,
    pub confidence: f64,
    pub method: ExtractionMethod,
}

/// Oracle response schema with every field optional. Unknown or missing
/// fields map to explicit defaults rather than failing the whole payload.
#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    total_amount: Option<Value>,
    #[serde(default)]
    items: Vec<RawItem>,
    #[serde(default)]
    terms: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(default)]
    name: String,
    #[serde(default)]
    quantity: Option<Value>,
    #[serde(default)]
    unit_price: Option<Value>,
}

/// Multi-strategy structured extractor: oracle-primary with a deterministic
/// pattern fallback. Never fails and never returns missing fields — a bad
/// oracle day shows up as low confidence, not as an error.
pub struct StructuredExtractor {
    oracle: Option<Box<dyn ExtractionOracle>>,
    max_prompt_chars: usize,
}

impl StructuredExtractor {
    pub fn new(oracle: Option<Box<dyn ExtractionOracle>>) -> Self {
        Self {
            oracle,
            max_prompt_chars: 2000,
        }
    }

    /// Build an extractor from config: the chat oracle is attached only when
    /// enabled and its API key env var is set, otherwise the deterministic
    /// path handles everything.
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let oracle: Option<Box<dyn ExtractionOracle>> = if cfg.oracle.enabled {
            match std::env::var(&cfg.oracle.api_key_env) {
                Ok(key) => Some(Box::new(ChatOracle::new(&cfg.oracle, key))),
                Err(_) => {
                    warn!(
                        env = %cfg.oracle.api_key_env,
                        "Oracle enabled but API key env var not set — using basic extraction"
                    );
                    None
                }
            }
        } else {
            None
        };
        Self {
            oracle,
            max_prompt_chars: cfg.oracle.max_prompt_chars,
        }
    }

    pub fn with_max_prompt_chars(mut self, max_prompt_chars: usize) -> Self {
        self.max_prompt_chars = max_prompt_chars;
        self
    }

    /// Extract a structured document from raw text. Infallible: the worst
    /// possible input yields the schema-default document with confidence 0.
    pub async fn extract(&self, text: &str, kind: DocumentKind) -> ExtractedDocument {
        let trimmed = text.trim();
        if trimmed.len() < MIN_TEXT_CHARS {
            info!(kind = kind.noun(), "Text below minimum length — returning default document");
            return ExtractedDocument {
                vendor: "Unknown Vendor".to_string(),
                total_amount: "0.00".to_string(),
                items: Vec::new(),
                terms: "Net 30".to_string(),
                confidence: 0.0,
                method: ExtractionMethod::Basic,
            };
        }

        if let Some(oracle) = &self.oracle {
            match self.oracle_extract(oracle.as_ref(), text, kind).await {
                Ok(doc) => {
                    info!(
                        kind = kind.noun(),
                        vendor = %doc.vendor,
                        items = doc.items.len(),
                        total = %doc.total_amount,
                        "Oracle extraction succeeded"
                    );
                    return doc;
                }
                Err(e) => {
                    warn!(kind = kind.noun(), error = %e, "Oracle extraction failed — falling back");
                    let mut doc = self.basic_extract(text);
                    doc.confidence = 0.4;
                    doc.method = ExtractionMethod::ErrorFallback;
                    return doc;
                }
            }
        }

        self.basic_extract(text)
    }

    /// One oracle round-trip: schema prompt, bounded text prefix, defensive
    /// unfencing, strict-but-defaulting deserialization, then the same item
    /// and amount validators the pattern path uses.
    async fn oracle_extract(
        &self,
        oracle: &dyn ExtractionOracle,
        text: &str,
        kind: DocumentKind,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let trimmed = text.trim();
        if trimmed.len() < MIN_ORACLE_CHARS {
            return Err(ExtractionError::TextTooShort(trimmed.len()));
        }

        let prefix = char_prefix(text, self.max_prompt_chars);
        let user = format!("Extract data from this {}:\n\n{}", kind.noun(), prefix);
        let content = oracle.complete(kind.prompt(), &user).await?;

        let json_str = extract_json_object(&content)?;
        let raw: RawDocument = serde_json::from_str(json_str)?;

        let items: Vec<LineItem> = raw
            .items
            .into_iter()
            .filter_map(|item| clean_oracle_item(&item))
            .take(items::MAX_ITEMS)
            .collect();

        let total_amount = raw
            .total_amount
            .as_ref()
            .map(|v| amount::clean_amount(&value_to_string(v)))
            .unwrap_or_else(|| "0.00".to_string());

        Ok(ExtractedDocument {
            vendor: raw
                .vendor
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "Unknown Vendor".to_string()),
            total_amount,
            items,
            terms: raw
                .terms
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Net 30".to_string()),
            confidence: raw.confidence.unwrap_or(0.9).clamp(0.0, 1.0),
            method: ExtractionMethod::Ai,
        })
    }

    /// Deterministic extraction path: labeled-field patterns for vendor and
    /// terms, the tiered amount scan, the row-pattern item parser.
    fn basic_extract(&self, text: &str) -> ExtractedDocument {
        ExtractedDocument {
            vendor: extract_vendor(text),
            total_amount: amount::best_total(text),
            items: items::parse_items(text),
            terms: extract_terms(text),
            confidence: 0.7,
            method: ExtractionMethod::Basic,
        }
    }
}

/// Validate and normalize a single oracle-returned item. Quantities and
/// prices may arrive as JSON numbers or strings.
fn clean_oracle_item(item: &RawItem) -> Option<LineItem> {
    let quantity = item.quantity.as_ref().and_then(value_to_i64).unwrap_or(1);
    let price_str = item
        .unit_price
        .as_ref()
        .map(|v| items::clean_price(&value_to_string(v)))
        .unwrap_or_default();
    let price: f64 = price_str.parse().ok()?;
    if !items::is_valid_item(&item.name, quantity, price) {
        return None;
    }
    Some(LineItem {
        name: item.name.trim().to_string(),
        quantity: quantity as u32,
        unit_price: price_str,
    })
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

fn value_to_i64(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .or_else(|| v.as_str()?.trim().parse().ok())
}

/// Char-safe prefix: byte slicing can panic mid-codepoint on garbled input.
fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn extract_vendor(text: &str) -> String {
    let patterns = [
        r"(?i)vendor[:\s]+([^\n]+)",
        r"(?i)supplier[:\s]+([^\n]+)",
        r"(?i)from[:\s]+([^\n]+)",
        r"(?i)seller[:\s]+([^\n]+)",
        r"(?i)company[:\s]+([^\n]+)",
        r"(?m)^([A-Z][A-Za-z &]+(?:Ltd|Inc|Corp|LLC))",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(cap) = re.captures(text) {
            let vendor = cap[1].trim();
            if vendor.len() > 2 {
                return vendor.to_string();
            }
        }
    }
    "Unknown Vendor".to_string()
}

fn extract_terms(text: &str) -> String {
    let patterns = [r"(?i)terms[:\s]+([^\n]+)", r"(?i)payment[:\s]+([^\n]+)"];
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(cap) = re.captures(text) {
            let terms = cap[1].trim();
            if !terms.is_empty() {
                return terms.to_string();
            }
        }
    }
    "Net 30".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use async_trait::async_trait;

    const PROFORMA_TEXT: &str = "PROFORMA INVOICE\n\
        Vendor: Kigali Office Supplies Ltd\n\
        Terms: Net 30\n\
        \n\
        1 Office Chair 2 75,000 150,000\n\
        2 Desk Lamp 5 15,000 75,000\n\
        \n\
        Subtotal: RWF 345000\n\
        Total: RWF 407100\n";

    struct FakeOracle {
        reply: Result<String, ()>,
    }

    impl FakeOracle {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
            }
        }

        fn failing() -> Self {
            Self { reply: Err(()) }
        }
    }

    #[async_trait]
    impl ExtractionOracle for FakeOracle {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, OracleError> {
            self.reply.clone().map_err(|_| OracleError::EmptyResponse)
        }
    }

    #[tokio::test]
    async fn empty_input_yields_default_document() {
        let extractor = StructuredExtractor::new(None);
        let doc = extractor.extract("", DocumentKind::Proforma).await;
        assert_eq!(doc.vendor, "Unknown Vendor");
        assert_eq!(doc.total_amount, "0.00");
        assert!(doc.items.is_empty());
        assert_eq!(doc.confidence, 0.0);
    }

    #[tokio::test]
    async fn basic_extraction_without_oracle() {
        let extractor = StructuredExtractor::new(None);
        let doc = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;
        assert_eq!(doc.method, ExtractionMethod::Basic);
        assert_eq!(doc.confidence, 0.7);
        assert_eq!(doc.vendor, "Kigali Office Supplies Ltd");
        assert_eq!(doc.terms, "Net 30");
        assert_eq!(doc.total_amount, "407100");
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].name, "Office Chair");
        assert_eq!(doc.items[1].name, "Desk Lamp");
    }

    #[tokio::test]
    async fn oracle_response_is_unfenced_and_validated() {
        let reply = r#"```json
{
  "vendor": "Kigali Office Supplies Ltd",
  "total_amount": "407,100",
  "items": [
    {"name": "Office Chair", "quantity": 2, "unit_price": 75000},
    {"name": "Subtotal", "quantity": 1, "unit_price": 345000},
    {"name": "Desk Lamp", "quantity": "5", "unit_price": "15,000"}
  ],
  "terms": "Net 30",
  "confidence": 0.95
}
```"#;
        let extractor = StructuredExtractor::new(Some(Box::new(FakeOracle::replying(reply))));
        let doc = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;
        assert_eq!(doc.method, ExtractionMethod::Ai);
        assert_eq!(doc.total_amount, "407100");
        // The "Subtotal" row is stripped by the shared item validator.
        assert_eq!(doc.items.len(), 2);
        assert_eq!(doc.items[0].unit_price, "75000");
        assert_eq!(doc.items[1].quantity, 5);
        assert_eq!(doc.items[1].unit_price, "15000");
        assert_eq!(doc.confidence, 0.95);
    }

    #[tokio::test]
    async fn oracle_omissions_fill_schema_defaults() {
        let reply = r#"{"items": []}"#;
        let extractor = StructuredExtractor::new(Some(Box::new(FakeOracle::replying(reply))));
        let doc = extractor.extract(PROFORMA_TEXT, DocumentKind::Receipt).await;
        assert_eq!(doc.method, ExtractionMethod::Ai);
        assert_eq!(doc.vendor, "Unknown Vendor");
        assert_eq!(doc.total_amount, "0.00");
        assert_eq!(doc.terms, "Net 30");
        assert_eq!(doc.confidence, 0.9);
    }

    #[tokio::test]
    async fn garbage_oracle_response_falls_back() {
        let extractor =
            StructuredExtractor::new(Some(Box::new(FakeOracle::replying("sorry, no can do"))));
        let doc = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;
        assert_eq!(doc.method, ExtractionMethod::ErrorFallback);
        assert_eq!(doc.confidence, 0.4);
        // The deterministic path still recovers the real data.
        assert_eq!(doc.total_amount, "407100");
        assert_eq!(doc.items.len(), 2);
    }

    #[tokio::test]
    async fn oracle_outage_falls_back() {
        let extractor = StructuredExtractor::new(Some(Box::new(FakeOracle::failing())));
        let doc = extractor.extract(PROFORMA_TEXT, DocumentKind::Proforma).await;
        assert_eq!(doc.method, ExtractionMethod::ErrorFallback);
        assert_eq!(doc.confidence, 0.4);
        assert_eq!(doc.vendor, "Kigali Office Supplies Ltd");
    }

    #[test]
    fn char_prefix_respects_boundaries() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("hi", 10), "hi");
    }
}
