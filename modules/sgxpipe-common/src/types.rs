use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Queue ---

/// Lifecycle of a company in the crawl queue.
///
/// `pending → running → {success, error, cancelled}`. A recovery sweep may
/// reset `error`/`cancelled` back to `pending`. `unmatched` is terminal and
/// only set by entity resolution when no canonical name could be linked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Running,
    Success,
    Error,
    Cancelled,
    Unmatched,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Pending => write!(f, "pending"),
            QueueStatus::Running => write!(f, "running"),
            QueueStatus::Success => write!(f, "success"),
            QueueStatus::Error => write!(f, "error"),
            QueueStatus::Cancelled => write!(f, "cancelled"),
            QueueStatus::Unmatched => write!(f, "unmatched"),
        }
    }
}

/// One company's entry in the crawl queue. Unique by `company_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub company_id: String,
    pub name: String,
    pub status: QueueStatus,
    pub processed: bool,
    pub processed_metadata: bool,
    pub num_filings: i64,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Fresh pending entry, as seeded from the canonical catalog.
    pub fn pending(company_id: &str, name: &str, now: DateTime<Utc>) -> Self {
        Self {
            company_id: company_id.to_string(),
            name: name.to_string(),
            status: QueueStatus::Pending,
            processed: false,
            processed_metadata: false,
            num_filings: 0,
            updated_at: now,
        }
    }
}

// --- Canonical companies ---

/// Authoritative company record sourced from the reference catalog.
/// Unique by `company_id`; `name` is immutable once sourced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalCompany {
    pub company_id: String,
    pub name: String,
}

/// Derived fields rolled up onto a canonical company record after a
/// successful crawl.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRollup {
    pub num_filings: i64,
    pub last_filing_date: Option<DateTime<Utc>>,
    pub file_path: String,
    pub processed: bool,
    pub updated_at: DateTime<Utc>,
}

// --- Filings ---

/// A persisted filing. `document_id` and `file_name` are each globally
/// unique in the filing collection; collisions are reconciled by the
/// ingestion store, never surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilingRecord {
    pub document_id: String,
    pub file_name: String,
    pub company_id: String,
    pub company_name: String,
    pub file_type: String,
    pub category_name: String,
    pub title: String,
    pub filing_date: Option<DateTime<Utc>>,
    pub url: String,
    pub platform: String,
    pub file_path: String,
    /// Relative paths of stored attachments, in submission order.
    /// `None` when the filing page listed no attachments.
    pub supporting_file_paths: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

impl FilingRecord {
    /// Number of supporting files — the "completeness" measure used by
    /// duplicate reconciliation ("more complete wins").
    pub fn supporting_len(&self) -> usize {
        self.supporting_file_paths
            .as_ref()
            .map(|p| p.len())
            .unwrap_or(0)
    }
}

// --- Entity resolution ---

/// Outcome of resolving one scraped name against the canonical catalog.
/// Ephemeral — produced and consumed within a single resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub original_name: String,
    pub matched_name: Option<String>,
    /// Match certainty in [0, 100].
    pub confidence: f32,
    pub source_id: String,
}

impl MatchResult {
    pub fn unmatched(original_name: &str, confidence: f32, source_id: &str) -> Self {
        Self {
            original_name: original_name.to_string(),
            matched_name: None,
            confidence,
            source_id: source_id.to_string(),
        }
    }
}
