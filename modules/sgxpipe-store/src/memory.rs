use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use sgxpipe_common::types::{
    CanonicalCompany, CompanyRollup, FilingRecord, QueueEntry, QueueStatus,
};

use crate::traits::{
    DisclosureStore, Result, StoreError, IDX_COMPANY_ID, IDX_DOCUMENT_ID, IDX_FILE_NAME,
};

#[derive(Default)]
struct Inner {
    filings: Vec<FilingRecord>,
    queue: Vec<QueueEntry>,
    companies: Vec<CanonicalCompany>,
    rollups: HashMap<String, CompanyRollup>,
}

/// In-memory [`DisclosureStore`] with the same unique-index behavior as
/// the production backend. Used by the pipeline tests and by dry runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rollup written for a company, if any. Test observability only.
    pub async fn rollup(&self, company_id: &str) -> Option<CompanyRollup> {
        self.inner.read().await.rollups.get(company_id).cloned()
    }

    pub async fn filing_count(&self) -> usize {
        self.inner.read().await.filings.len()
    }
}

#[async_trait]
impl DisclosureStore for MemoryStore {
    async fn insert_filing(&self, filing: &FilingRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        // document_id is checked before file_name, matching the index
        // order of the production backend.
        if inner.filings.iter().any(|f| f.document_id == filing.document_id) {
            return Err(StoreError::DuplicateKey {
                index: IDX_DOCUMENT_ID,
            });
        }
        if inner.filings.iter().any(|f| f.file_name == filing.file_name) {
            return Err(StoreError::DuplicateKey {
                index: IDX_FILE_NAME,
            });
        }
        inner.filings.push(filing.clone());
        Ok(())
    }

    async fn replace_filing(&self, document_id: &str, filing: &FilingRecord) -> Result<()> {
        let mut inner = self.inner.write().await;
        let pos = inner
            .filings
            .iter()
            .position(|f| f.document_id == document_id)
            .ok_or_else(|| StoreError::NotFound(format!("filing {document_id}")))?;
        if inner
            .filings
            .iter()
            .enumerate()
            .any(|(i, f)| i != pos && f.file_name == filing.file_name)
        {
            return Err(StoreError::DuplicateKey {
                index: IDX_FILE_NAME,
            });
        }
        inner.filings[pos] = filing.clone();
        Ok(())
    }

    async fn filing_by_document_id(&self, document_id: &str) -> Result<Option<FilingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .filings
            .iter()
            .find(|f| f.document_id == document_id)
            .cloned())
    }

    async fn filings_for_company(&self, company_id: &str) -> Result<Vec<FilingRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .filings
            .iter()
            .filter(|f| f.company_id == company_id)
            .cloned()
            .collect())
    }

    async fn file_name_exists(&self, file_name: &str) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.filings.iter().any(|f| f.file_name == file_name))
    }

    async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.queue.iter().any(|e| e.company_id == entry.company_id) {
            return Err(StoreError::DuplicateKey {
                index: IDX_COMPANY_ID,
            });
        }
        inner.queue.push(entry.clone());
        Ok(())
    }

    async fn touch_queue_entry(&self, company_id: &str, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .queue
            .iter_mut()
            .find(|e| e.company_id == company_id)
            .ok_or_else(|| StoreError::NotFound(format!("queue entry {company_id}")))?;
        entry.updated_at = now;
        Ok(())
    }

    async fn set_queue_status(
        &self,
        company_id: &str,
        status: QueueStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let entry = inner
            .queue
            .iter_mut()
            .find(|e| e.company_id == company_id)
            .ok_or_else(|| StoreError::NotFound(format!("queue entry {company_id}")))?;
        entry.status = status;
        entry.updated_at = now;
        Ok(())
    }

    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
        let mut inner = self.inner.write().await;
        let pos = inner
            .queue
            .iter()
            .position(|e| e.company_id == entry.company_id)
            .ok_or_else(|| StoreError::NotFound(format!("queue entry {}", entry.company_id)))?;
        inner.queue[pos] = entry.clone();
        Ok(())
    }

    async fn queue_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .queue
            .iter()
            .filter(|e| status.is_none_or(|s| e.status == s))
            .cloned()
            .collect())
    }

    async fn insert_company(&self, company: &CanonicalCompany) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner
            .companies
            .iter()
            .any(|c| c.company_id == company.company_id)
        {
            return Err(StoreError::DuplicateKey {
                index: IDX_COMPANY_ID,
            });
        }
        inner.companies.push(company.clone());
        Ok(())
    }

    async fn companies(&self) -> Result<Vec<CanonicalCompany>> {
        let inner = self.inner.read().await;
        Ok(inner.companies.clone())
    }

    async fn set_company_rollup(&self, company_id: &str, rollup: &CompanyRollup) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.companies.iter().any(|c| c.company_id == company_id) {
            return Err(StoreError::NotFound(format!("company {company_id}")));
        }
        inner.rollups.insert(company_id.to_string(), rollup.clone());
        Ok(())
    }
}
