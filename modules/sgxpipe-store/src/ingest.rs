use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use sgxpipe_common::types::{
    CanonicalCompany, CompanyRollup, FilingRecord, QueueEntry, QueueStatus,
};

use crate::traits::{DisclosureStore, Result, StoreError, IDX_DOCUMENT_ID, IDX_FILE_NAME};

/// Per-batch outcome counts from [`IngestionStore::upsert_filings`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub inserted: usize,
    pub replaced: usize,
    pub renamed: usize,
    pub skipped: usize,
}

enum FilingOutcome {
    Inserted,
    Replaced,
    Renamed,
    Dropped,
}

/// Write-side policy over a [`DisclosureStore`].
///
/// The store only enforces uniqueness; this layer decides what a
/// conflict means. Filing inserts reconcile duplicates record by record,
/// so one bad document never fails its batch.
pub struct IngestionStore<S> {
    store: S,
}

impl<S: DisclosureStore> IngestionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Seed the canonical catalog and crawl queue from sourced companies.
    /// Already-known companies keep their existing queue state.
    pub async fn seed_companies(
        &self,
        companies: &[CanonicalCompany],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut seeded = 0;
        for company in companies {
            match self.store.insert_company(company).await {
                Ok(()) => seeded += 1,
                Err(StoreError::DuplicateKey { .. }) => {}
                Err(e) => return Err(e),
            }
            let entry = QueueEntry::pending(&company.company_id, &company.name, now);
            match self.store.insert_queue_entry(&entry).await {
                Ok(()) => {}
                Err(StoreError::DuplicateKey { .. }) => {
                    self.store.touch_queue_entry(&company.company_id, now).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(seeded)
    }

    /// Insert a batch of filings, reconciling unique-index conflicts:
    ///
    /// - `document_id` conflict: the record with more supporting files
    ///   wins; on replacement the stored `file_name` is kept so the
    ///   on-disk layout stays stable.
    /// - `file_name` conflict (distinct documents sharing a derived
    ///   name): probe `"<stem> [n]<suffix>"` until a free name is found.
    /// - any other conflict, and any unclassified store error, is logged
    ///   and the record dropped; the rest of the batch continues.
    pub async fn upsert_filings(&self, filings: &[FilingRecord]) -> IngestStats {
        let mut stats = IngestStats::default();
        for filing in filings {
            match self.upsert_filing(filing).await {
                Ok(FilingOutcome::Inserted) => stats.inserted += 1,
                Ok(FilingOutcome::Replaced) => stats.replaced += 1,
                Ok(FilingOutcome::Renamed) => stats.renamed += 1,
                Ok(FilingOutcome::Dropped) => stats.skipped += 1,
                Err(e) => {
                    warn!(
                        document_id = filing.document_id.as_str(),
                        error = %e,
                        "Unclassified store error, dropping filing"
                    );
                    stats.skipped += 1;
                }
            }
        }
        debug!(?stats, "Filing batch ingested");
        stats
    }

    async fn upsert_filing(&self, filing: &FilingRecord) -> Result<FilingOutcome> {
        match self.store.insert_filing(filing).await {
            Ok(()) => Ok(FilingOutcome::Inserted),
            Err(StoreError::DuplicateKey {
                index: IDX_DOCUMENT_ID,
            }) => Ok(if self.reconcile_duplicate_document(filing).await? {
                FilingOutcome::Replaced
            } else {
                FilingOutcome::Dropped
            }),
            Err(StoreError::DuplicateKey {
                index: IDX_FILE_NAME,
            }) => Ok(if self.insert_with_renamed_file(filing).await? {
                FilingOutcome::Renamed
            } else {
                FilingOutcome::Dropped
            }),
            Err(StoreError::DuplicateKey { index }) => {
                warn!(
                    document_id = filing.document_id.as_str(),
                    index, "Unhandled unique-index conflict, dropping filing"
                );
                Ok(FilingOutcome::Dropped)
            }
            Err(e) => Err(e),
        }
    }

    /// More-complete-wins: replace the stored filing only when the
    /// incoming one carries more supporting files. Returns true on
    /// replacement.
    async fn reconcile_duplicate_document(&self, incoming: &FilingRecord) -> Result<bool> {
        let Some(existing) = self
            .store
            .filing_by_document_id(&incoming.document_id)
            .await?
        else {
            // Raced with a delete; treat as a drop.
            return Ok(false);
        };

        if incoming.supporting_len() <= existing.supporting_len() {
            debug!(
                document_id = incoming.document_id.as_str(),
                "Duplicate document no more complete than stored copy, dropping"
            );
            return Ok(false);
        }

        let mut replacement = incoming.clone();
        replacement.file_name = existing.file_name.clone();
        self.store
            .replace_filing(&incoming.document_id, &replacement)
            .await?;
        info!(
            document_id = incoming.document_id.as_str(),
            "Replaced filing with more complete copy"
        );
        Ok(true)
    }

    /// Distinct documents can derive identical display names. Probe
    /// numbered variants until one is free, then insert under it.
    async fn insert_with_renamed_file(&self, filing: &FilingRecord) -> Result<bool> {
        let mut n = 1;
        let renamed = loop {
            let candidate = numbered_file_name(&filing.file_name, n);
            if !self.store.file_name_exists(&candidate).await? {
                break candidate;
            }
            n += 1;
        };

        let mut record = filing.clone();
        record.file_name = renamed.clone();
        match self.store.insert_filing(&record).await {
            Ok(()) => {
                info!(
                    document_id = filing.document_id.as_str(),
                    file_name = renamed.as_str(),
                    "Inserted filing under numbered name"
                );
                Ok(true)
            }
            Err(StoreError::DuplicateKey {
                index: IDX_DOCUMENT_ID,
            }) => self.reconcile_duplicate_document(&record).await,
            Err(StoreError::DuplicateKey { index }) => {
                warn!(
                    document_id = filing.document_id.as_str(),
                    index, "Conflict after rename, dropping filing"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Mark a company's crawl outcome. A `success` additionally rolls up
    /// filing counts and the latest filing date onto the canonical
    /// company record; every other status only updates the queue.
    pub async fn update_company_status(
        &self,
        company_id: &str,
        status: QueueStatus,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if status != QueueStatus::Success {
            return self.store.set_queue_status(company_id, status, now).await;
        }

        let filings = self.store.filings_for_company(company_id).await?;
        let num_filings = filings.len() as i64;
        let last_filing_date = filings.iter().filter_map(|f| f.filing_date).max();
        let file_path = filings
            .first()
            .map(|f| company_path_prefix(&f.file_path))
            .unwrap_or_default();

        let entries = self.store.queue_entries(None).await?;
        let Some(mut entry) = entries.into_iter().find(|e| e.company_id == company_id) else {
            return Err(StoreError::NotFound(format!("queue entry {company_id}")));
        };
        entry.status = QueueStatus::Success;
        entry.processed = true;
        entry.processed_metadata = true;
        entry.num_filings = num_filings;
        entry.updated_at = now;
        self.store.update_queue_entry(&entry).await?;

        self.store
            .set_company_rollup(
                company_id,
                &CompanyRollup {
                    num_filings,
                    last_filing_date,
                    file_path,
                    processed: true,
                    updated_at: now,
                },
            )
            .await
    }

    /// Recovery sweep: reset entries stuck in `running` or finished in
    /// `error`/`cancelled` back to `pending` so the next run retries them.
    pub async fn reset_stalled_entries(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut reset = 0;
        for status in [
            QueueStatus::Running,
            QueueStatus::Error,
            QueueStatus::Cancelled,
        ] {
            for entry in self.store.queue_entries(Some(status)).await? {
                self.store
                    .set_queue_status(&entry.company_id, QueueStatus::Pending, now)
                    .await?;
                reset += 1;
            }
        }
        if reset > 0 {
            info!(reset, "Reset stalled queue entries to pending");
        }
        Ok(reset)
    }
}

/// `"report.pdf"` → `"report [2].pdf"`; extension-less names append.
fn numbered_file_name(file_name: &str, n: u32) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem} [{n}].{ext}"),
        None => format!("{file_name} [{n}]"),
    }
}

/// First two path segments of a stored filing path, i.e. the
/// platform/company directory that holds all of a company's filings.
fn company_path_prefix(file_path: &str) -> String {
    let mut parts = file_path.split('/').filter(|p| !p.is_empty());
    match (parts.next(), parts.next()) {
        (Some(platform), Some(company)) => format!("/{platform}/{company}"),
        _ => file_path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn filing(document_id: &str, file_name: &str, supporting: Option<usize>) -> FilingRecord {
        FilingRecord {
            document_id: document_id.to_string(),
            file_name: file_name.to_string(),
            company_id: "1".to_string(),
            company_name: "DBS GROUP HOLDINGS LTD".to_string(),
            file_type: "CACT06".to_string(),
            category_name: "Financial Statements".to_string(),
            title: "Full Year Results".to_string(),
            filing_date: Some(Utc::now()),
            url: "https://links.sgx.com/1.htm".to_string(),
            platform: "SGX".to_string(),
            file_path: "/SGX/1_DBS_GROUP/CACT06/20240101_doc/wp.html".to_string(),
            supporting_file_paths: supporting
                .map(|n| (0..n).map(|i| format!("/SGX/att{i}.pdf")).collect()),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reingesting_same_batch_is_idempotent() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let batch = vec![filing("a", "name-a", Some(1)), filing("b", "name-b", None)];

        let first = ingest.upsert_filings(&batch).await;
        assert_eq!(first.inserted, 2);

        let second = ingest.upsert_filings(&batch).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(ingest.store().filing_count().await, 2);
    }

    #[tokio::test]
    async fn more_complete_duplicate_replaces_stored_copy() {
        let ingest = IngestionStore::new(MemoryStore::new());
        ingest.upsert_filings(&[filing("a", "name-a", Some(1))]).await;

        let stats = ingest
            .upsert_filings(&[filing("a", "name-a-later", Some(3))])
            .await;
        assert_eq!(stats.replaced, 1);

        let stored = ingest
            .store()
            .filing_by_document_id("a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.supporting_len(), 3);
        // Storage identity is stable: the original file_name survives.
        assert_eq!(stored.file_name, "name-a");
    }

    #[tokio::test]
    async fn less_complete_duplicate_is_dropped() {
        let ingest = IngestionStore::new(MemoryStore::new());
        ingest.upsert_filings(&[filing("a", "name-a", Some(3))]).await;

        let stats = ingest
            .upsert_filings(&[filing("a", "name-a", Some(1))])
            .await;
        assert_eq!(stats.skipped, 1);

        let stored = ingest
            .store()
            .filing_by_document_id("a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.supporting_len(), 3);
    }

    #[tokio::test]
    async fn colliding_file_names_get_numbered_variants() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let batch = vec![
            filing("a", "CACT06 - DBS - [2024-01-01]", None),
            filing("b", "CACT06 - DBS - [2024-01-01]", None),
            filing("c", "CACT06 - DBS - [2024-01-01]", None),
        ];
        let stats = ingest.upsert_filings(&batch).await;
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.renamed, 2);

        let store = ingest.store();
        assert!(store
            .file_name_exists("CACT06 - DBS - [2024-01-01] [1]")
            .await
            .unwrap());
        assert!(store
            .file_name_exists("CACT06 - DBS - [2024-01-01] [2]")
            .await
            .unwrap());
    }

    /// Delegates to a [`MemoryStore`] but fails `insert_filing` for one
    /// document id with an unclassified error.
    struct FailingStore {
        inner: MemoryStore,
        fail_document_id: &'static str,
    }

    #[async_trait::async_trait]
    impl DisclosureStore for FailingStore {
        async fn insert_filing(&self, filing: &FilingRecord) -> Result<()> {
            if filing.document_id == self.fail_document_id {
                return Err(StoreError::Other("connection reset by peer".to_string()));
            }
            self.inner.insert_filing(filing).await
        }

        async fn replace_filing(&self, document_id: &str, filing: &FilingRecord) -> Result<()> {
            self.inner.replace_filing(document_id, filing).await
        }

        async fn filing_by_document_id(&self, document_id: &str) -> Result<Option<FilingRecord>> {
            self.inner.filing_by_document_id(document_id).await
        }

        async fn filings_for_company(&self, company_id: &str) -> Result<Vec<FilingRecord>> {
            self.inner.filings_for_company(company_id).await
        }

        async fn file_name_exists(&self, file_name: &str) -> Result<bool> {
            self.inner.file_name_exists(file_name).await
        }

        async fn insert_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
            self.inner.insert_queue_entry(entry).await
        }

        async fn touch_queue_entry(&self, company_id: &str, now: DateTime<Utc>) -> Result<()> {
            self.inner.touch_queue_entry(company_id, now).await
        }

        async fn set_queue_status(
            &self,
            company_id: &str,
            status: QueueStatus,
            now: DateTime<Utc>,
        ) -> Result<()> {
            self.inner.set_queue_status(company_id, status, now).await
        }

        async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<()> {
            self.inner.update_queue_entry(entry).await
        }

        async fn queue_entries(&self, status: Option<QueueStatus>) -> Result<Vec<QueueEntry>> {
            self.inner.queue_entries(status).await
        }

        async fn insert_company(&self, company: &CanonicalCompany) -> Result<()> {
            self.inner.insert_company(company).await
        }

        async fn companies(&self) -> Result<Vec<CanonicalCompany>> {
            self.inner.companies().await
        }

        async fn set_company_rollup(&self, company_id: &str, rollup: &CompanyRollup) -> Result<()> {
            self.inner.set_company_rollup(company_id, rollup).await
        }
    }

    #[tokio::test]
    async fn unclassified_store_error_drops_only_its_record() {
        let ingest = IngestionStore::new(FailingStore {
            inner: MemoryStore::new(),
            fail_document_id: "flaky",
        });
        let batch = vec![
            filing("a", "name-a", None),
            filing("flaky", "name-f", None),
            filing("b", "name-b", None),
        ];

        let stats = ingest.upsert_filings(&batch).await;
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.skipped, 1);

        // The records after the failing one still landed.
        let store = ingest.store();
        assert!(store.filing_by_document_id("a").await.unwrap().is_some());
        assert!(store.filing_by_document_id("b").await.unwrap().is_some());
        assert!(store.filing_by_document_id("flaky").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn numbered_name_preserves_extension() {
        assert_eq!(numbered_file_name("report.pdf", 1), "report [1].pdf");
        assert_eq!(numbered_file_name("report", 2), "report [2]");
    }

    #[tokio::test]
    async fn success_status_rolls_up_company_record() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let now = Utc::now();
        let companies = vec![CanonicalCompany {
            company_id: "1".to_string(),
            name: "DBS GROUP HOLDINGS LTD".to_string(),
        }];
        ingest.seed_companies(&companies, now).await.unwrap();
        ingest
            .upsert_filings(&[filing("a", "name-a", None), filing("b", "name-b", None)])
            .await;

        ingest
            .update_company_status("1", QueueStatus::Success, now)
            .await
            .unwrap();

        let entries = ingest.store().queue_entries(None).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Success);
        assert_eq!(entries[0].num_filings, 2);
        assert!(entries[0].processed);

        let rollup = ingest.store().rollup("1").await.unwrap();
        assert_eq!(rollup.num_filings, 2);
        assert_eq!(rollup.file_path, "/SGX/1_DBS_GROUP");
        assert!(rollup.last_filing_date.is_some());
    }

    #[tokio::test]
    async fn non_success_status_only_touches_queue() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let now = Utc::now();
        let companies = vec![CanonicalCompany {
            company_id: "1".to_string(),
            name: "DBS GROUP HOLDINGS LTD".to_string(),
        }];
        ingest.seed_companies(&companies, now).await.unwrap();

        ingest
            .update_company_status("1", QueueStatus::Error, now)
            .await
            .unwrap();

        let entries = ingest.store().queue_entries(None).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Error);
        assert!(ingest.store().rollup("1").await.is_none());
    }

    #[tokio::test]
    async fn recovery_sweep_resets_stalled_entries() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let now = Utc::now();
        let companies: Vec<CanonicalCompany> = (1..=3)
            .map(|i| CanonicalCompany {
                company_id: i.to_string(),
                name: format!("COMPANY {i}"),
            })
            .collect();
        ingest.seed_companies(&companies, now).await.unwrap();

        let store = ingest.store();
        store
            .set_queue_status("1", QueueStatus::Running, now)
            .await
            .unwrap();
        store
            .set_queue_status("2", QueueStatus::Error, now)
            .await
            .unwrap();

        let reset = ingest.reset_stalled_entries(now).await.unwrap();
        assert_eq!(reset, 2);
        let pending = store.queue_entries(Some(QueueStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 3);
    }

    #[tokio::test]
    async fn seeding_twice_keeps_existing_queue_state() {
        let ingest = IngestionStore::new(MemoryStore::new());
        let now = Utc::now();
        let companies = vec![CanonicalCompany {
            company_id: "1".to_string(),
            name: "DBS GROUP HOLDINGS LTD".to_string(),
        }];
        ingest.seed_companies(&companies, now).await.unwrap();
        ingest
            .update_company_status("1", QueueStatus::Success, now)
            .await
            .unwrap();

        let seeded = ingest.seed_companies(&companies, now).await.unwrap();
        assert_eq!(seeded, 0);
        let entries = ingest.store().queue_entries(None).await.unwrap();
        assert_eq!(entries[0].status, QueueStatus::Success);
    }
}
