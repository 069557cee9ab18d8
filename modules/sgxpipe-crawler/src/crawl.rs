use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sgx_client::Announcement;
use sgxpipe_common::error::PipelineError;

use crate::traits::FilingFetcher;

/// Paging and cap policy for one company's announcement crawl.
#[derive(Debug, Clone, Copy)]
pub struct CrawlLimits {
    pub page_size: u32,
    /// 0 = unbounded.
    pub max_pages: u32,
    /// 0 = unbounded.
    pub max_files: usize,
}

/// Pages through a company's announcement search results.
///
/// The page count comes from the count endpoint up front; a count failure
/// aborts the company rather than being read as zero announcements. Every
/// page's envelope code is checked, and cancellation is observed between
/// page requests.
pub struct CrawlOrchestrator<F> {
    fetcher: Arc<F>,
    limits: CrawlLimits,
}

impl<F: FilingFetcher> CrawlOrchestrator<F> {
    pub fn new(fetcher: Arc<F>, limits: CrawlLimits) -> Self {
        Self { fetcher, limits }
    }

    pub async fn fetch_announcements(
        &self,
        company_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Announcement>, PipelineError> {
        let total = self
            .fetcher
            .announcement_count(company_name, false)
            .await
            .map_err(|e| PipelineError::Client(format!("count for {company_name}: {e}")))?;
        if total == 0 {
            info!(company = company_name, "No announcements in period");
            return Ok(Vec::new());
        }

        let page_size = self.limits.page_size.max(1);
        let mut pages = total.div_ceil(page_size as u64) as u32;
        if self.limits.max_pages > 0 {
            pages = pages.min(self.limits.max_pages);
        }
        debug!(company = company_name, total, pages, "Starting announcement crawl");

        let mut announcements = Vec::new();
        for page in 0..pages {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let response = self
                .fetcher
                .announcements_page(company_name, false, page, page_size)
                .await
                .map_err(|e| {
                    PipelineError::Client(format!("page {page} for {company_name}: {e}"))
                })?;

            // A non-"200" envelope is a hard error, never an empty page.
            match response.code() {
                Some("200") => {}
                code => {
                    return Err(PipelineError::InvalidResponse(format!(
                        "search page {page} for {company_name} returned code {code:?}"
                    )))
                }
            }

            let batch = response.data.unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            announcements.extend(batch);

            if self.limits.max_files > 0 && announcements.len() >= self.limits.max_files {
                announcements.truncate(self.limits.max_files);
                debug!(
                    company = company_name,
                    cap = self.limits.max_files,
                    "Announcement cap reached"
                );
                break;
            }
        }

        Ok(announcements)
    }
}
