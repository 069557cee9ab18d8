use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::{stream, StreamExt};
use tracing::{debug, warn};

use sgx_client::Announcement;
use sgxpipe_common::types::FilingRecord;

use crate::attachments::{attachment_file_name, extract_attachment_urls};
use crate::traits::{ArtifactStorage, FilingFetcher};

/// Turns one announcement into a stored [`FilingRecord`]: fetches the
/// detail page, stores it, downloads every attachment the page lists, and
/// derives the record's metadata and storage paths.
///
/// A failed attachment is skipped; a failed detail-page fetch or store
/// fails the whole document so the caller can drop it.
pub struct DocumentProcessor<F, A> {
    fetcher: Arc<F>,
    storage: Arc<A>,
    platform: String,
    attachments_base_url: String,
    attachment_workers: usize,
}

impl<F: FilingFetcher, A: ArtifactStorage> DocumentProcessor<F, A> {
    pub fn new(
        fetcher: Arc<F>,
        storage: Arc<A>,
        platform: &str,
        attachments_base_url: &str,
        attachment_workers: usize,
    ) -> Self {
        Self {
            fetcher,
            storage,
            platform: platform.to_string(),
            attachments_base_url: attachments_base_url.to_string(),
            attachment_workers: attachment_workers.max(1),
        }
    }

    pub async fn process(
        &self,
        announcement: &Announcement,
        company_id: &str,
    ) -> Result<FilingRecord> {
        let document_id = announcement
            .document_id()
            .ok_or_else(|| anyhow!("announcement has no document id"))?;
        let url = announcement
            .url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("announcement {document_id} has no detail URL"))?;

        let company_name = announcement.issuer().unwrap_or_default().to_string();
        let file_type = announcement.sub.clone().unwrap_or_default();
        let date_compact = announcement.submission_date.clone().unwrap_or_default();

        let html = self
            .fetcher
            .page_html(url)
            .await
            .with_context(|| format!("fetching detail page for {document_id}"))?;

        let folder = format!(
            "{}/{}_{}/{}/{}_{}",
            self.platform,
            company_id,
            sanitize_component(&company_name),
            file_type,
            date_compact,
            document_id,
        );
        let page_path = format!("{folder}/wp.html");
        self.storage
            .put(&page_path, html.as_bytes())
            .await
            .with_context(|| format!("storing detail page for {document_id}"))?;

        let filing_date = parse_compact_date(&date_compact);
        let file_name = format!(
            "{file_type} - {} - [{}]",
            sanitize_component(&company_name),
            filing_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        );

        let urls = extract_attachment_urls(&html, &self.attachments_base_url);
        let supporting_file_paths = if urls.is_empty() {
            None
        } else {
            let stored: Vec<Option<String>> = stream::iter(
                urls.into_iter()
                    .map(|att| self.fetch_attachment(folder.clone(), att)),
            )
            .buffered(self.attachment_workers)
            .collect()
            .await;
            Some(stored.into_iter().flatten().collect::<Vec<String>>())
        };

        debug!(
            document_id,
            attachments = supporting_file_paths.as_ref().map(|p| p.len()).unwrap_or(0),
            "Document processed"
        );

        Ok(FilingRecord {
            document_id: document_id.to_string(),
            file_name,
            company_id: company_id.to_string(),
            company_name,
            file_type,
            category_name: announcement.category_name.clone().unwrap_or_default(),
            title: announcement.title.clone().unwrap_or_default(),
            filing_date,
            url: url.to_string(),
            platform: self.platform.clone(),
            file_path: format!("/{page_path}"),
            supporting_file_paths,
            updated_at: Utc::now(),
        })
    }

    /// Download and store one attachment; failures are logged and skipped
    /// so a broken link never drops its document.
    async fn fetch_attachment(&self, folder: String, url: String) -> Option<String> {
        let rel_path = format!("{folder}/{}", attachment_file_name(&url));
        let bytes = match self.fetcher.download(&url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(url = url.as_str(), error = %e, "Attachment download failed, skipping");
                return None;
            }
        };
        match self.storage.put(&rel_path, &bytes).await {
            Ok(()) => Some(format!("/{rel_path}")),
            Err(e) => {
                warn!(path = rel_path.as_str(), error = %e, "Attachment store failed, skipping");
                None
            }
        }
    }
}

/// Path-safe single component: alphanumerics, `_` and `-` survive, runs of
/// anything else collapse into underscores.
fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Parse the compact `YYYYMMDD` wire date into a UTC midnight timestamp.
fn parse_compact_date(s: &str) -> Option<DateTime<Utc>> {
    let compact = s.get(..8).unwrap_or(s);
    let date = NaiveDate::parse_from_str(compact, "%Y%m%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}
