use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use sgxpipe_common::types::{
    CanonicalCompany, CompanyRollup, FilingRecord, QueueEntry, QueueStatus,
};

/// Transport-level store failure.
///
/// `DuplicateKey` names the unique index that rejected the write so the
/// ingestion layer can branch on it instead of parsing error strings.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Duplicate key on unique index {index}")]
    DuplicateKey { index: &'static str },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store failure: {0}")]
    Other(String),
}

impl StoreError {
    pub fn duplicate_index(&self) -> Option<&'static str> {
        match self {
            StoreError::DuplicateKey { index } => Some(index),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Unique-index names, matching the field each index covers.
pub const IDX_DOCUMENT_ID: &str = "document_id";
pub const IDX_FILE_NAME: &str = "file_name";
pub const IDX_COMPANY_ID: &str = "company_id";

/// Persistence seam for filings, the crawl queue and the canonical
/// company catalog.
///
/// Implementations enforce three unique indexes: `document_id` and
/// `file_name` on filings, `company_id` on queue entries and companies.
/// Inserts that violate one return [`StoreError::DuplicateKey`] naming
/// the index; reconciliation policy lives above this trait.
#[async_trait]
pub trait DisclosureStore: Send + Sync {
    // --- Filings ---

    async fn insert_filing(&self, filing: &FilingRecord) -> Result<()>;

    /// Overwrite the filing with this `document_id`. Errors if absent.
    async fn replace_filing(&self, document_id: &str, filing: &FilingRecord) -> Result<()>;

    async fn filing_by_document_id(&self, document_id: &str) -> Result<Option<FilingRecord>>;

    async fn filings_for_company(&self, company_id: &str) -> Result<Vec<FilingRecord>>;

    async fn file_name_exists(&self, file_name: &str) -> Result<bool>;

    // --- Queue ---

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()>;

    /// Bump `updated_at` on an existing entry without touching status.
    async fn touch_queue_entry(&self, company_id: &str, now: DateTime<Utc>) -> Result<()>;

    async fn set_queue_status(
        &self,
        company_id: &str,
        status: QueueStatus,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// Full overwrite of an existing queue entry, keyed by `company_id`.
    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()>;

    /// Queue entries, optionally filtered by status, in insertion order.
    async fn queue_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>>;

    // --- Canonical companies ---

    async fn insert_company(&self, company: &CanonicalCompany) -> Result<()>;

    async fn companies(&self) -> Result<Vec<CanonicalCompany>>;

    async fn set_company_rollup(&self, company_id: &str, rollup: &CompanyRollup) -> Result<()>;
}
