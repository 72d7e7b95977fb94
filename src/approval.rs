// src/approval.rs

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::error::ApprovalError;
use crate::extractor::ExtractedDocument;
use crate::po::{self, PurchaseOrder};

/// Lifecycle of a purchase request. `Approved` and `Rejected` are terminal:
/// no transition ever leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Pending,
    Approved,
    Rejected,
}

impl RequestState {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Approved => "approved",
            RequestState::Rejected => "rejected",
        }
    }

    fn parse(s: &str) -> Result<Self, ApprovalError> {
        match s {
            "pending" => Ok(RequestState::Pending),
            "approved" => Ok(RequestState::Approved),
            "rejected" => Ok(RequestState::Rejected),
            other => Err(ApprovalError::InvalidState(other.to_string())),
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One approver's recorded decision on a request.
#[derive(Debug)]
pub struct ApprovalRecord {
    pub approver: String,
    pub role: String,
    pub approved: bool,
    pub comments: String,
    pub created_at: String,
}

/// SQLite-backed approval state machine. Decisions are applied inside a
/// single IMMEDIATE transaction so two racing "final" approvals cannot both
/// believe they triggered PO synthesis, and a racing rejection/approval pair
/// resolves to whichever commits first.
pub struct ApprovalStore {
    conn: Connection,
    required_roles: Vec<String>,
}

impl ApprovalStore {
    /// Open (or create) the approval store at `db_path`. Pass `":memory:"`
    /// for an ephemeral store.
    pub fn new<P: AsRef<Path>>(
        db_path: P,
        required_roles: Vec<String>,
    ) -> Result<Self, ApprovalError> {
        let conn = Connection::open(db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS requests (
                uid TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                requester TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                proforma_json TEXT,
                po_json TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS approvals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_uid TEXT NOT NULL,
                approver TEXT NOT NULL,
                role TEXT NOT NULL,
                approved INTEGER NOT NULL,
                comments TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (request_uid, approver),
                FOREIGN KEY (request_uid) REFERENCES requests(uid) ON DELETE CASCADE
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_requests_status ON requests(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_approvals_request_uid ON approvals(request_uid)",
            [],
        )?;

        info!("Approval store initialized");
        Ok(Self {
            conn,
            required_roles,
        })
    }

    /// Generate a request UID from its title, requester, and creation time.
    fn generate_uid(title: &str, requester: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(title.as_bytes());
        hasher.update(requester.as_bytes());
        hasher.update(nanos.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Create a new pending request and return its UID.
    pub fn create_request(&self, title: &str, requester: &str) -> Result<String, ApprovalError> {
        let uid = Self::generate_uid(title, requester);
        self.conn.execute(
            "INSERT INTO requests (uid, title, requester, status) VALUES (?1, ?2, ?3, 'pending')",
            params![uid, title, requester],
        )?;
        info!(uid = %uid, title = title, "Request created");
        Ok(uid)
    }

    /// Attach the latest extracted proforma to a pending request. This is
    /// the document PO synthesis reads at approval time.
    pub fn attach_proforma(
        &self,
        uid: &str,
        proforma: &ExtractedDocument,
    ) -> Result<(), ApprovalError> {
        let state = self.request_state(uid)?;
        if state != RequestState::Pending {
            return Err(ApprovalError::NotPending(state));
        }
        let json = serde_json::to_string(proforma)?;
        self.conn.execute(
            "UPDATE requests SET proforma_json = ?1 WHERE uid = ?2",
            params![json, uid],
        )?;
        info!(uid = %uid, method = ?proforma.method, "Proforma attached");
        Ok(())
    }

    /// Record one approver's decision inside a serializable unit of work.
    ///
    /// Rules:
    /// - decisions are only accepted while the request is pending;
    /// - a second decision from the same approver is rejected, never
    ///   overwritten;
    /// - any negative decision transitions the request to `rejected`;
    /// - a positive decision transitions to `approved` only once every
    ///   required role has approved, at which point the PO is synthesized
    ///   exactly once from the stored proforma. Synthesis problems are
    ///   logged and do not revert the approval.
    pub fn record_decision(
        &mut self,
        uid: &str,
        approver: &str,
        role: &str,
        approved: bool,
        comments: &str,
    ) -> Result<RequestState, ApprovalError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let row: Option<(String, Option<String>)> = tx
            .query_row(
                "SELECT status, proforma_json FROM requests WHERE uid = ?1",
                params![uid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((status, proforma_json)) = row else {
            return Err(ApprovalError::UnknownRequest(uid.to_string()));
        };
        let state = RequestState::parse(&status)?;
        if state != RequestState::Pending {
            return Err(ApprovalError::NotPending(state));
        }

        let already: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM approvals WHERE request_uid = ?1 AND approver = ?2)",
            params![uid, approver],
            |row| row.get(0),
        )?;
        if already {
            return Err(ApprovalError::AlreadyReviewed(approver.to_string()));
        }

        tx.execute(
            "INSERT INTO approvals (request_uid, approver, role, approved, comments)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![uid, approver, role, approved, comments],
        )?;

        let final_state = if !approved {
            tx.execute(
                "UPDATE requests SET status = 'rejected' WHERE uid = ?1",
                params![uid],
            )?;
            RequestState::Rejected
        } else {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT role FROM approvals WHERE request_uid = ?1 AND approved = 1",
            )?;
            let approved_roles: HashSet<String> = stmt
                .query_map(params![uid], |row| row.get(0))?
                .collect::<Result<_, _>>()?;
            drop(stmt);

            if self.required_roles.iter().all(|r| approved_roles.contains(r)) {
                tx.execute(
                    "UPDATE requests SET status = 'approved' WHERE uid = ?1",
                    params![uid],
                )?;
                match &proforma_json {
                    Some(json) => match serde_json::from_str::<ExtractedDocument>(json) {
                        Ok(doc) => {
                            let purchase_order = po::synthesize(&doc);
                            let po_json = serde_json::to_string(&purchase_order)?;
                            tx.execute(
                                "UPDATE requests SET po_json = ?1 WHERE uid = ?2",
                                params![po_json, uid],
                            )?;
                        }
                        Err(e) => {
                            // Approval stands; the PO can be re-derived later.
                            error!(uid = %uid, error = %e, "Stored proforma unreadable — PO not generated");
                        }
                    },
                    None => {
                        error!(uid = %uid, "No proforma on request — PO not generated");
                    }
                }
                RequestState::Approved
            } else {
                RequestState::Pending
            }
        };

        tx.commit()?;
        info!(
            uid = %uid,
            approver = approver,
            approved = approved,
            state = %final_state,
            "Decision recorded"
        );
        Ok(final_state)
    }

    /// Current state of a request.
    pub fn request_state(&self, uid: &str) -> Result<RequestState, ApprovalError> {
        let status: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM requests WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?;
        match status {
            Some(s) => RequestState::parse(&s),
            None => Err(ApprovalError::UnknownRequest(uid.to_string())),
        }
    }

    /// The synthesized purchase order, if the request is approved. When a
    /// request was approved but the PO was never persisted (e.g. the
    /// proforma arrived afterwards), it is re-derived and stored here.
    pub fn purchase_order(&self, uid: &str) -> Result<Option<PurchaseOrder>, ApprovalError> {
        let row: Option<(String, Option<String>, Option<String>)> = self
            .conn
            .query_row(
                "SELECT status, proforma_json, po_json FROM requests WHERE uid = ?1",
                params![uid],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let Some((status, proforma_json, po_json)) = row else {
            return Err(ApprovalError::UnknownRequest(uid.to_string()));
        };

        if let Some(json) = po_json {
            return Ok(Some(serde_json::from_str(&json)?));
        }

        // Approved but never persisted: re-derive from the proforma.
        if RequestState::parse(&status)? == RequestState::Approved {
            if let Some(json) = proforma_json {
                let doc: ExtractedDocument = serde_json::from_str(&json)?;
                let purchase_order = po::synthesize(&doc);
                self.conn.execute(
                    "UPDATE requests SET po_json = ?1 WHERE uid = ?2",
                    params![serde_json::to_string(&purchase_order)?, uid],
                )?;
                return Ok(Some(purchase_order));
            }
        }
        Ok(None)
    }

    /// All recorded decisions for a request, in decision order.
    pub fn approvals_for(&self, uid: &str) -> Result<Vec<ApprovalRecord>, ApprovalError> {
        let mut stmt = self.conn.prepare(
            "SELECT approver, role, approved, comments, created_at
             FROM approvals
             WHERE request_uid = ?1
             ORDER BY id",
        )?;
        let records = stmt
            .query_map(params![uid], |row| {
                Ok(ApprovalRecord {
                    approver: row.get(0)?,
                    role: row.get(1)?,
                    approved: row.get(2)?,
                    comments: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<_, _>>()?;
        Ok(records)
    }
}
