use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use sgx_client::{Announcement, ApiPage, CompanyListing, SgxClient, TickerEntry};

/// Read seam over the upstream APIs. The pipeline only ever talks to this
/// trait so tests can drive it with canned responses.
#[async_trait]
pub trait FilingFetcher: Send + Sync {
    async fn announcement_count(&self, company_name: &str, exact: bool) -> Result<u64>;

    async fn announcements_page(
        &self,
        company_name: &str,
        exact: bool,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<Announcement>>>;

    async fn company_listings_page(
        &self,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<CompanyListing>>>;

    async fn page_html(&self, url: &str) -> Result<String>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;

    async fn ticker_list(&self) -> Result<Vec<TickerEntry>>;
}

#[async_trait]
impl FilingFetcher for SgxClient {
    async fn announcement_count(&self, company_name: &str, exact: bool) -> Result<u64> {
        Ok(SgxClient::announcement_count(self, company_name, exact).await?)
    }

    async fn announcements_page(
        &self,
        company_name: &str,
        exact: bool,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<Announcement>>> {
        Ok(SgxClient::announcements_page(self, company_name, exact, pagestart, pagesize).await?)
    }

    async fn company_listings_page(
        &self,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<CompanyListing>>> {
        Ok(SgxClient::company_listings_page(self, pagestart, pagesize).await?)
    }

    async fn page_html(&self, url: &str) -> Result<String> {
        Ok(SgxClient::page_html(self, url).await?)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        Ok(SgxClient::download(self, url).await?)
    }

    async fn ticker_list(&self) -> Result<Vec<TickerEntry>> {
        Ok(SgxClient::ticker_list(self).await?)
    }
}

/// Raw artifact sink, addressed by storage-root-relative paths.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn put(&self, rel_path: &str, bytes: &[u8]) -> Result<()>;
}

/// Filesystem-backed [`ArtifactStorage`] rooted at the raw data dir.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStorage for LocalStorage {
    async fn put(&self, rel_path: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(rel_path.trim_start_matches('/'));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}
