//! Document extraction and procurement validation engine.
//!
//! Turns unstructured proforma/receipt text into structured purchase data,
//! synthesizes a canonical purchase order once a request is fully approved,
//! and validates a later receipt against that order. Extraction is
//! oracle-primary with a deterministic pattern fallback: an oracle outage
//! degrades confidence, it never becomes a user-visible failure.

pub mod amount;
pub mod approval;
pub mod config;
pub mod discrepancy;
pub mod error;
pub mod extractor;
pub mod intake;
pub mod items;
pub mod oracle;
pub mod po;

pub use approval::{ApprovalRecord, ApprovalStore, RequestState};
pub use config::EngineConfig;
pub use discrepancy::{Discrepancy, DiscrepancyReason};
pub use error::{ApprovalError, ExtractionError, OracleError, UploadError};
pub use extractor::{DocumentKind, ExtractedDocument, ExtractionMethod, StructuredExtractor};
pub use items::LineItem;
pub use oracle::{ChatOracle, ExtractionOracle};
pub use po::PurchaseOrder;
