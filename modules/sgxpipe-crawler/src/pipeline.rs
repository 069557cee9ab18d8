use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures::{stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sgxpipe_common::error::PipelineError;
use sgxpipe_common::types::{QueueEntry, QueueStatus};
use sgxpipe_common::Config;
use sgxpipe_match::EntityResolver;
use sgxpipe_store::traits::StoreError;
use sgxpipe_store::{DisclosureStore, IngestStats, IngestionStore};

use crate::catalog::source_companies;
use crate::crawl::{CrawlLimits, CrawlOrchestrator};
use crate::processor::DocumentProcessor;
use crate::ticker::{link_tickers, TickerLink};
use crate::traits::{ArtifactStorage, FilingFetcher};

/// End-of-run summary, logged by the binary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub companies: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Documents that failed processing and never reached the store.
    pub documents_dropped: usize,
    pub filings: IngestStats,
}

struct CompanyBatch {
    filings: IngestStats,
    documents_dropped: usize,
}

enum CompanyOutcome {
    Succeeded(CompanyBatch),
    Failed,
    Cancelled,
}

/// Queue-driven crawl-and-ingest runner.
///
/// Companies are taken from the pending queue and crawled concurrently;
/// each one moves `pending → running → success/error/cancelled` on its
/// own, so one company's failure never touches its siblings.
pub struct Pipeline<F, A, S> {
    fetcher: Arc<F>,
    storage: Arc<A>,
    ingest: IngestionStore<S>,
    config: Config,
    cancel: CancellationToken,
}

impl<F, A, S> Pipeline<F, A, S>
where
    F: FilingFetcher,
    A: ArtifactStorage,
    S: DisclosureStore,
{
    pub fn new(
        fetcher: Arc<F>,
        storage: Arc<A>,
        ingest: IngestionStore<S>,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            storage,
            ingest,
            config,
            cancel,
        }
    }

    pub fn ingest(&self) -> &IngestionStore<S> {
        &self.ingest
    }

    /// Source the canonical catalog and seed the crawl queue from it.
    /// Returns the number of newly sourced companies.
    pub async fn seed(&self) -> Result<usize, PipelineError> {
        let companies = source_companies(
            self.fetcher.as_ref(),
            self.config.page_size,
            self.config.max_companies,
        )
        .await?;
        self.ingest
            .seed_companies(&companies, Utc::now())
            .await
            .map_err(store_err)
    }

    /// Crawl every pending company and ingest its filings.
    pub async fn run(&self) -> Result<RunStats, PipelineError> {
        let pending = self
            .ingest
            .store()
            .queue_entries(Some(QueueStatus::Pending))
            .await
            .map_err(store_err)?;
        info!(companies = pending.len(), workers = self.config.max_workers, "Starting crawl run");

        let crawler = CrawlOrchestrator::new(
            Arc::clone(&self.fetcher),
            CrawlLimits {
                page_size: self.config.page_size,
                max_pages: self.config.max_pages,
                max_files: self.config.max_files_per_company,
            },
        );
        let processor = DocumentProcessor::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.storage),
            &self.config.platform,
            &self.config.attachments_base_url,
            self.config.attachment_workers,
        );

        let mut stats = RunStats {
            companies: pending.len(),
            ..RunStats::default()
        };
        let outcomes: Vec<CompanyOutcome> = stream::iter(
            pending
                .into_iter()
                .map(|entry| self.run_company(&crawler, &processor, entry)),
        )
        .buffer_unordered(self.config.max_workers.max(1))
        .collect()
        .await;

        for outcome in outcomes {
            match outcome {
                CompanyOutcome::Succeeded(batch) => {
                    stats.succeeded += 1;
                    stats.documents_dropped += batch.documents_dropped;
                    stats.filings.inserted += batch.filings.inserted;
                    stats.filings.replaced += batch.filings.replaced;
                    stats.filings.renamed += batch.filings.renamed;
                    stats.filings.skipped += batch.filings.skipped;
                }
                CompanyOutcome::Failed => stats.failed += 1,
                CompanyOutcome::Cancelled => stats.cancelled += 1,
            }
        }

        info!(
            companies = stats.companies,
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            documents_dropped = stats.documents_dropped,
            inserted = stats.filings.inserted,
            replaced = stats.filings.replaced,
            renamed = stats.filings.renamed,
            skipped = stats.filings.skipped,
            "Crawl run finished"
        );
        Ok(stats)
    }

    async fn run_company(
        &self,
        crawler: &CrawlOrchestrator<F>,
        processor: &DocumentProcessor<F, A>,
        entry: QueueEntry,
    ) -> CompanyOutcome {
        let company = entry.name.as_str();
        if let Err(e) = self
            .ingest
            .store()
            .set_queue_status(&entry.company_id, QueueStatus::Running, Utc::now())
            .await
        {
            warn!(company, error = %e, "Failed to mark company running");
            return CompanyOutcome::Failed;
        }

        match self.crawl_company(crawler, processor, &entry).await {
            Ok(batch) => {
                if let Err(e) = self
                    .ingest
                    .update_company_status(&entry.company_id, QueueStatus::Success, Utc::now())
                    .await
                {
                    warn!(company, error = %e, "Failed to finalize company");
                    return CompanyOutcome::Failed;
                }
                info!(
                    company,
                    inserted = batch.filings.inserted,
                    dropped = batch.documents_dropped,
                    "Company crawled"
                );
                CompanyOutcome::Succeeded(batch)
            }
            Err(e) if e.is_cancelled() => {
                self.set_status_logged(&entry.company_id, company, QueueStatus::Cancelled)
                    .await;
                CompanyOutcome::Cancelled
            }
            Err(e) => {
                warn!(company, error = %e, "Company crawl failed");
                self.set_status_logged(&entry.company_id, company, QueueStatus::Error)
                    .await;
                CompanyOutcome::Failed
            }
        }
    }

    async fn crawl_company(
        &self,
        crawler: &CrawlOrchestrator<F>,
        processor: &DocumentProcessor<F, A>,
        entry: &QueueEntry,
    ) -> Result<CompanyBatch, PipelineError> {
        let announcements = crawler.fetch_announcements(&entry.name, &self.cancel).await?;

        // Documents fan out over a bounded pool; all store writes happen
        // afterwards through this single aggregation point.
        let processed: Vec<Option<_>> = stream::iter(announcements.iter().map(|announcement| {
            let company_id = entry.company_id.as_str();
            async move {
                if self.cancel.is_cancelled() {
                    return None;
                }
                // One broken document never fails its company.
                match processor.process(announcement, company_id).await {
                    Ok(filing) => Some(filing),
                    Err(e) => {
                        warn!(
                            company = entry.name.as_str(),
                            document_id = announcement.document_id().unwrap_or("unknown"),
                            error = %e,
                            "Document dropped"
                        );
                        None
                    }
                }
            }
        }))
        .buffer_unordered(self.config.document_workers.max(1))
        .collect()
        .await;
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let filings: Vec<_> = processed.into_iter().flatten().collect();
        Ok(CompanyBatch {
            documents_dropped: announcements.len() - filings.len(),
            filings: self.ingest.upsert_filings(&filings).await,
        })
    }

    async fn set_status_logged(&self, company_id: &str, company: &str, status: QueueStatus) {
        if let Err(e) = self
            .ingest
            .store()
            .set_queue_status(company_id, status, Utc::now())
            .await
        {
            warn!(company, %status, error = %e, "Failed to update queue status");
        }
    }

    /// Reset stalled queue entries back to pending.
    pub async fn recover(&self) -> Result<usize, PipelineError> {
        self.ingest
            .reset_stalled_entries(Utc::now())
            .await
            .map_err(store_err)
    }

    /// Link the securities ticker list against the canonical catalog.
    /// Pending companies no ticker could claim are marked `unmatched`.
    pub async fn link_tickers(&self) -> Result<Vec<TickerLink>, PipelineError> {
        let companies = self.ingest.store().companies().await.map_err(store_err)?;
        let resolver = EntityResolver::new(self.config.rarity_threshold);
        let links = link_tickers(self.fetcher.as_ref(), &resolver, &companies)
            .await
            .map_err(PipelineError::Anyhow)?;

        let claimed: HashSet<&str> = links
            .iter()
            .filter_map(|l| l.company_id.as_deref())
            .collect();
        for entry in self
            .ingest
            .store()
            .queue_entries(Some(QueueStatus::Pending))
            .await
            .map_err(store_err)?
        {
            if !claimed.contains(entry.company_id.as_str()) {
                self.set_status_logged(&entry.company_id, &entry.name, QueueStatus::Unmatched)
                    .await;
            }
        }
        Ok(links)
    }
}

fn store_err(e: StoreError) -> PipelineError {
    PipelineError::Store(e.to_string())
}
