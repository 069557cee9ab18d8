pub mod error;
pub mod retry;
pub mod token;
pub mod types;

pub use error::{Result, SgxClientError};
pub use retry::RetryPolicy;
pub use token::TokenCache;
pub use types::{Announcement, ApiPage, CompanyListing, TickerEntry};

use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use types::SecuritiesResponse;

/// Browser User-Agent pool rotated across requests.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:102.0) Gecko/20100101 Firefox/102.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:102.0) Gecko/20100101 Firefox/102.0",
];

/// Endpoint and policy configuration for [`SgxClient`].
#[derive(Debug, Clone)]
pub struct SgxClientConfig {
    pub company_api_url: String,
    pub count_api_url: String,
    pub corporate_info_url: String,
    pub securities_url: String,
    pub cms_url: String,
    pub origin: String,
    pub period_start: String,
    pub period_end: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for SgxClientConfig {
    fn default() -> Self {
        Self {
            company_api_url: "https://api.sgx.com/announcements/v1.1/company".into(),
            count_api_url: "https://api.sgx.com/announcements/v1.1/company/count".into(),
            corporate_info_url: "https://api.sgx.com/corporate-information/v1.1".into(),
            securities_url: "https://api.sgx.com/securities/v1.1".into(),
            cms_url: "https://api2.sgx.com/content-api/?queryId=17d94f69435775a0d673d1b5328b0403ce4ad025:we_chat_qr_validator".into(),
            origin: "https://www.sgx.com".into(),
            period_start: "20051030_160000".into(),
            period_end: "20251231_155959".into(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

/// Client for the announcements, corporate-information and securities APIs.
///
/// Every request goes through the same retry loop: exponential backoff on
/// any non-success response or transport error, with the cached
/// authorization token invalidated and re-fetched after a 401/403.
pub struct SgxClient {
    client: reqwest::Client,
    token: TokenCache,
    config: SgxClientConfig,
}

impl SgxClient {
    pub fn new(config: SgxClientConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to build HTTP client");

        let token = TokenCache::new(&config.cms_url, client.clone());
        Self {
            client,
            token,
            config,
        }
    }

    /// The process-wide token cache. Exposed so operators can force a
    /// refresh out of band.
    pub fn token_cache(&self) -> &TokenCache {
        &self.token
    }

    // --- Announcements ---

    /// Total announcement count for a company over the configured period.
    pub async fn announcement_count(&self, company_name: &str, exact: bool) -> Result<u64> {
        let params = self.search_params(company_name, exact, None);
        let resp = self.get_with_retry(&self.config.count_api_url, &params).await?;

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SgxClientError::Malformed(format!("count response not JSON: {e}")))?;

        body.get("data")
            .and_then(|d| d.as_u64())
            .ok_or_else(|| SgxClientError::Malformed(format!("count payload missing: {body}")))
    }

    /// One page of announcement search results for a company.
    pub async fn announcements_page(
        &self,
        company_name: &str,
        exact: bool,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<Announcement>>> {
        let params = self.search_params(company_name, exact, Some((pagestart, pagesize)));
        let resp = self.get_with_retry(&self.config.company_api_url, &params).await?;

        resp.json()
            .await
            .map_err(|e| SgxClientError::Malformed(format!("search response not JSON: {e}")))
    }

    /// One page of the corporate-information company listing.
    pub async fn company_listings_page(
        &self,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<CompanyListing>>> {
        let params = self.search_params("", false, Some((pagestart, pagesize)));
        let resp = self
            .get_with_retry(&self.config.corporate_info_url, &params)
            .await?;

        resp.json()
            .await
            .map_err(|e| SgxClientError::Malformed(format!("listing response not JSON: {e}")))
    }

    // --- Detail pages and attachments ---

    /// Fetch a filing detail page as HTML.
    pub async fn page_html(&self, url: &str) -> Result<String> {
        let resp = self.get_with_retry(url, &[]).await?;
        Ok(resp.text().await?)
    }

    /// Download an attachment body.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self.get_with_retry(url, &[]).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    // --- Securities ---

    /// The (ticker, display name) pairs from the securities price list.
    pub async fn ticker_list(&self) -> Result<Vec<TickerEntry>> {
        let resp = self.get_with_retry(&self.config.securities_url, &[]).await?;

        let body: SecuritiesResponse = resp
            .json()
            .await
            .map_err(|e| SgxClientError::Malformed(format!("securities response not JSON: {e}")))?;

        Ok(body
            .data
            .unwrap_or_default()
            .prices
            .into_iter()
            .filter_map(|p| {
                Some(TickerEntry {
                    ticker: p.cur?,
                    name: p.n?,
                })
            })
            .collect())
    }

    // --- Internals ---

    fn search_params(
        &self,
        company_name: &str,
        exact: bool,
        page: Option<(u32, u32)>,
    ) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("periodstart", self.config.period_start.clone()),
            ("periodend", self.config.period_end.clone()),
            ("value", company_name.to_string()),
            ("exactsearch", exact.to_string()),
        ];
        if let Some((pagestart, pagesize)) = page {
            params.push(("pagestart", pagestart.to_string()));
            params.push(("pagesize", pagesize.to_string()));
        }
        params
    }

    /// GET with the full retry policy. Non-success responses and transport
    /// errors are retried with backoff; a 401/403 invalidates the token
    /// cache first so the next attempt carries a fresh token.
    async fn get_with_retry(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> Result<reqwest::Response> {
        let mut last_err = SgxClientError::Malformed("retry loop never ran".into());

        for attempt in 0..self.config.retry.max_attempts {
            if attempt > 0 {
                let backoff = self.config.retry.delay_for(attempt - 1);
                let jitter = Duration::from_millis(rand::rng().random_range(0..500));
                debug!(url, attempt, backoff_secs = backoff.as_secs(), "Retrying after backoff");
                tokio::time::sleep(backoff + jitter).await;
            }

            let headers = self.headers().await;
            let result = self
                .client
                .get(url)
                .query(params)
                .headers(headers)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let message = resp.text().await.unwrap_or_default();
                    let err = SgxClientError::Api { status, message };
                    if err.is_auth() {
                        warn!(url, status, "Authentication failure, refreshing token");
                        self.token.invalidate().await;
                    } else {
                        warn!(url, status, attempt, "Request failed");
                    }
                    last_err = err;
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Transport error");
                    last_err = SgxClientError::Http(e);
                }
            }
        }

        Err(last_err)
    }

    async fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Accept", HeaderValue::from_static("*/*"));
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        if let Ok(origin) = HeaderValue::from_str(&self.config.origin) {
            headers.insert("origin", origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&format!("{}/", self.config.origin)) {
            headers.insert("referer", referer);
        }

        // A failed token fetch falls back to an empty token; the request
        // will get a 401 and the retry loop handles the refresh.
        let token = match self.token.get().await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Token fetch failed, sending empty token");
                String::new()
            }
        };
        if let Ok(value) = HeaderValue::from_str(&token) {
            headers.insert(
                HeaderName::from_static("authorizationtoken"),
                value,
            );
        }

        let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
        headers.insert("User-Agent", HeaderValue::from_static(ua));

        headers
    }
}
