// src/error.rs

use thiserror::Error;

use crate::approval::RequestState;

/// Failures talking to the external extraction oracle. All of these are
/// absorbed by the extractor's fallback path; none reach the caller.
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("oracle response contained no choices")]
    EmptyResponse,
    #[error("no JSON object found in oracle response")]
    NoJsonObject,
}

/// Why a single extraction attempt could not produce a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("text too short for oracle extraction ({0} chars)")]
    TextTooShort(usize),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("oracle payload did not match the document schema: {0}")]
    Schema(#[from] serde_json::Error),
}

/// An uploaded file failed type or size checks. Surfaced to the caller,
/// never degraded into a fallback document.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("file too large: {size} bytes (maximum {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("file type not allowed: {0}")]
    DisallowedType(String),
}

/// Approval state machine violations and storage errors.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("request is not pending (state: {0})")]
    NotPending(RequestState),
    #[error("approver {0} has already reviewed this request")]
    AlreadyReviewed(String),
    #[error("no request with uid {0}")]
    UnknownRequest(String),
    #[error("invalid state value in storage: {0}")]
    InvalidState(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("stored document is not valid JSON: {0}")]
    BadDocument(#[from] serde_json::Error),
}
