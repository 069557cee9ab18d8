use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sgx_client::{Announcement, ApiPage, CompanyListing, TickerEntry};
use sgx_client::types::ResponseMeta;
use sgxpipe_common::types::QueueStatus;
use sgxpipe_common::Config;
use sgxpipe_crawler::traits::{ArtifactStorage, FilingFetcher};
use sgxpipe_crawler::Pipeline;
use sgxpipe_store::{DisclosureStore, IngestionStore, MemoryStore};

const DETAIL_PAGE: &str = r#"<html><body>
<dl class="announcement-attachment-list">
  <dd><a href="/FileOpen/results.pdf?App=Announcement&FileID=12345">Results</a></dd>
</dl>
</body></html>"#;

struct MockFetcher {
    announcements: HashMap<String, Vec<Announcement>>,
    listing_pages: Vec<serde_json::Value>,
    page_code: String,
    tickers: Vec<TickerEntry>,
    fail_page_for: Option<String>,
    page_requests: Mutex<Vec<(String, u32)>>,
}

impl MockFetcher {
    fn new(listing_pages: Vec<serde_json::Value>) -> Self {
        Self {
            announcements: HashMap::new(),
            listing_pages,
            page_code: "200".to_string(),
            tickers: Vec::new(),
            fail_page_for: None,
            page_requests: Mutex::new(Vec::new()),
        }
    }

    fn with_announcements(mut self, company: &str, announcements: Vec<Announcement>) -> Self {
        self.announcements.insert(company.to_string(), announcements);
        self
    }

    fn page_request_count(&self, company: &str) -> usize {
        self.page_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == company)
            .count()
    }
}

#[async_trait]
impl FilingFetcher for MockFetcher {
    async fn announcement_count(&self, company_name: &str, _exact: bool) -> Result<u64> {
        Ok(self
            .announcements
            .get(company_name)
            .map(|a| a.len() as u64)
            .unwrap_or(0))
    }

    async fn announcements_page(
        &self,
        company_name: &str,
        _exact: bool,
        pagestart: u32,
        pagesize: u32,
    ) -> Result<ApiPage<Vec<Announcement>>> {
        self.page_requests
            .lock()
            .unwrap()
            .push((company_name.to_string(), pagestart));

        let all = self.announcements.get(company_name).cloned().unwrap_or_default();
        let start = (pagestart * pagesize) as usize;
        let end = (start + pagesize as usize).min(all.len());
        let data = if start < all.len() {
            all[start..end].to_vec()
        } else {
            Vec::new()
        };
        Ok(ApiPage {
            meta: Some(ResponseMeta {
                code: self.page_code.clone(),
                total_pages: None,
            }),
            data: Some(data),
        })
    }

    async fn company_listings_page(
        &self,
        pagestart: u32,
        _pagesize: u32,
    ) -> Result<ApiPage<Vec<CompanyListing>>> {
        let page = self
            .listing_pages
            .get(pagestart as usize)
            .ok_or_else(|| anyhow!("no listing page {pagestart}"))?;
        Ok(serde_json::from_value(page.clone())?)
    }

    async fn page_html(&self, url: &str) -> Result<String> {
        if let Some(marker) = &self.fail_page_for {
            if url.contains(marker.as_str()) {
                return Err(anyhow!("detail page unavailable"));
            }
        }
        Ok(DETAIL_PAGE.to_string())
    }

    async fn download(&self, _url: &str) -> Result<Vec<u8>> {
        Ok(b"%PDF-1.4".to_vec())
    }

    async fn ticker_list(&self) -> Result<Vec<TickerEntry>> {
        Ok(self.tickers.clone())
    }
}

#[derive(Default)]
struct MemStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemStorage {
    fn contains(&self, rel_path: &str) -> bool {
        self.files.lock().unwrap().contains_key(rel_path)
    }
}

#[async_trait]
impl ArtifactStorage for MemStorage {
    async fn put(&self, rel_path: &str, bytes: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(rel_path.to_string(), bytes.to_vec());
        Ok(())
    }
}

fn announcement(doc: &str, issuer: &str, date: &str) -> Announcement {
    Announcement {
        ref_id: Some(doc.to_string()),
        id: None,
        sub: Some("CACT06".to_string()),
        category_name: Some("Cash Dividend/ Distribution".to_string()),
        title: Some("Cash Dividend/ Distribution::Mandatory".to_string()),
        issuer_name: Some(issuer.to_string()),
        security_name: None,
        submission_date: Some(date.to_string()),
        url: Some(format!("https://links.sgx.com/page/{doc}")),
    }
}

fn listing_page(companies: &[(u64, &str)], total_pages: u32) -> serde_json::Value {
    json!({
        "meta": { "code": "200", "totalPages": total_pages },
        "data": companies
            .iter()
            .map(|(id, name)| json!({ "id": id, "companyName": name }))
            .collect::<Vec<_>>(),
    })
}

fn test_config() -> Config {
    Config {
        platform: "SGX".to_string(),
        company_api_url: String::new(),
        count_api_url: String::new(),
        corporate_info_url: String::new(),
        securities_url: String::new(),
        cms_url: String::new(),
        attachments_base_url: "https://links.sgx.com".to_string(),
        period_start: "20051030_160000".to_string(),
        period_end: "20251231_155959".to_string(),
        raw_data_dir: "raw_data_storage".to_string(),
        page_size: 2,
        max_pages: 0,
        max_files_per_company: 0,
        max_companies: 0,
        max_workers: 2,
        document_workers: 2,
        attachment_workers: 2,
        max_retries: 1,
        backoff_factor: 1,
        request_timeout: Duration::from_secs(1),
        rarity_threshold: 50,
    }
}

fn pipeline(
    fetcher: MockFetcher,
    config: Config,
    cancel: CancellationToken,
) -> (
    Pipeline<MockFetcher, MemStorage, MemoryStore>,
    Arc<MockFetcher>,
    Arc<MemStorage>,
) {
    let fetcher = Arc::new(fetcher);
    let storage = Arc::new(MemStorage::default());
    let p = Pipeline::new(
        Arc::clone(&fetcher),
        Arc::clone(&storage),
        IngestionStore::new(MemoryStore::new()),
        config,
        cancel,
    );
    (p, fetcher, storage)
}

#[tokio::test]
async fn run_crawls_pending_companies_end_to_end() {
    let fetcher = MockFetcher::new(vec![listing_page(
        &[(1, "DBS GROUP HOLDINGS LTD"), (2, "ABR HOLDINGS LIMITED")],
        1,
    )])
    .with_announcements(
        "DBS GROUP HOLDINGS LTD",
        vec![
            announcement("DOC1", "DBS GROUP HOLDINGS LTD", "20250807"),
            announcement("DOC2", "DBS GROUP HOLDINGS LTD", "20250806"),
            announcement("DOC3", "DBS GROUP HOLDINGS LTD", "20250805"),
        ],
    )
    .with_announcements(
        "ABR HOLDINGS LIMITED",
        vec![announcement("DOC4", "ABR HOLDINGS LIMITED", "20250601")],
    );

    let (pipeline, fetcher, storage) = pipeline(fetcher, test_config(), CancellationToken::new());
    pipeline.seed().await.unwrap();
    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.companies, 2);
    assert_eq!(stats.succeeded, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.filings.inserted, 4);

    // 3 announcements at page size 2 means two page requests.
    assert_eq!(fetcher.page_request_count("DBS GROUP HOLDINGS LTD"), 2);
    assert_eq!(fetcher.page_request_count("ABR HOLDINGS LIMITED"), 1);

    let store = pipeline.ingest().store();
    for entry in store.queue_entries(None).await.unwrap() {
        assert_eq!(entry.status, QueueStatus::Success);
        assert!(entry.processed);
    }

    let filing = store.filing_by_document_id("DOC1").await.unwrap().unwrap();
    assert_eq!(
        filing.file_path,
        "/SGX/1_DBS_GROUP_HOLDINGS_LTD/CACT06/20250807_DOC1/wp.html"
    );
    assert_eq!(
        filing.file_name,
        "CACT06 - DBS_GROUP_HOLDINGS_LTD - [2025-08-07]"
    );
    assert_eq!(
        filing.supporting_file_paths,
        Some(vec![
            "/SGX/1_DBS_GROUP_HOLDINGS_LTD/CACT06/20250807_DOC1/12345".to_string()
        ])
    );
    assert!(storage.contains("SGX/1_DBS_GROUP_HOLDINGS_LTD/CACT06/20250807_DOC1/wp.html"));
    assert!(storage.contains("SGX/1_DBS_GROUP_HOLDINGS_LTD/CACT06/20250807_DOC1/12345"));

    let rollup = store.rollup("1").await.unwrap();
    assert_eq!(rollup.num_filings, 3);
    assert_eq!(rollup.file_path, "/SGX/1_DBS_GROUP_HOLDINGS_LTD");
}

#[tokio::test]
async fn max_pages_caps_page_requests() {
    let fetcher = MockFetcher::new(vec![listing_page(&[(1, "DBS GROUP HOLDINGS LTD")], 1)])
        .with_announcements(
            "DBS GROUP HOLDINGS LTD",
            (1..=5)
                .map(|i| announcement(&format!("DOC{i}"), "DBS GROUP HOLDINGS LTD", "20250807"))
                .collect(),
        );

    let mut config = test_config();
    config.max_pages = 1;
    let (pipeline, fetcher, _storage) = pipeline(fetcher, config, CancellationToken::new());
    pipeline.seed().await.unwrap();
    let stats = pipeline.run().await.unwrap();

    assert_eq!(fetcher.page_request_count("DBS GROUP HOLDINGS LTD"), 1);
    // Two filings crawled; identical derived names reconcile by renaming.
    assert_eq!(stats.filings.inserted + stats.filings.renamed, 2);
}

#[tokio::test]
async fn pagination_concatenates_pages_in_order() {
    use sgxpipe_crawler::{CrawlLimits, CrawlOrchestrator};

    let fetcher = Arc::new(
        MockFetcher::new(Vec::new()).with_announcements(
            "DBS GROUP HOLDINGS LTD",
            (1..=45)
                .map(|i| announcement(&format!("DOC{i:02}"), "DBS GROUP HOLDINGS LTD", "20250807"))
                .collect(),
        ),
    );

    let crawler = CrawlOrchestrator::new(
        Arc::clone(&fetcher),
        CrawlLimits {
            page_size: 20,
            max_pages: 0,
            max_files: 0,
        },
    );
    let announcements = crawler
        .fetch_announcements("DBS GROUP HOLDINGS LTD", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fetcher.page_request_count("DBS GROUP HOLDINGS LTD"), 3);
    assert_eq!(announcements.len(), 45);
    let ids: Vec<&str> = announcements
        .iter()
        .map(|a| a.document_id().unwrap())
        .collect();
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted, "records keep page order");

    // max_pages truncates regardless of the reported total.
    let capped = CrawlOrchestrator::new(
        Arc::clone(&fetcher),
        CrawlLimits {
            page_size: 20,
            max_pages: 2,
            max_files: 0,
        },
    );
    let announcements = capped
        .fetch_announcements("DBS GROUP HOLDINGS LTD", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(announcements.len(), 40);
}

#[tokio::test]
async fn cancelled_run_marks_companies_cancelled() {
    let fetcher = MockFetcher::new(vec![listing_page(
        &[(1, "DBS GROUP HOLDINGS LTD"), (2, "ABR HOLDINGS LIMITED")],
        1,
    )])
    .with_announcements(
        "DBS GROUP HOLDINGS LTD",
        vec![announcement("DOC1", "DBS GROUP HOLDINGS LTD", "20250807")],
    )
    .with_announcements(
        "ABR HOLDINGS LIMITED",
        vec![announcement("DOC4", "ABR HOLDINGS LIMITED", "20250601")],
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let (pipeline, _fetcher, _storage) = pipeline(fetcher, test_config(), cancel);
    pipeline.seed().await.unwrap();
    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.cancelled, 2);
    assert_eq!(stats.succeeded, 0);
    let cancelled = pipeline
        .ingest()
        .store()
        .queue_entries(Some(QueueStatus::Cancelled))
        .await
        .unwrap();
    assert_eq!(cancelled.len(), 2);
}

#[tokio::test]
async fn error_envelope_marks_company_error() {
    let mut fetcher = MockFetcher::new(vec![listing_page(&[(1, "DBS GROUP HOLDINGS LTD")], 1)])
        .with_announcements(
            "DBS GROUP HOLDINGS LTD",
            vec![announcement("DOC1", "DBS GROUP HOLDINGS LTD", "20250807")],
        );
    fetcher.page_code = "550".to_string();

    let (pipeline, _fetcher, _storage) = pipeline(fetcher, test_config(), CancellationToken::new());
    pipeline.seed().await.unwrap();
    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.failed, 1);
    let errored = pipeline
        .ingest()
        .store()
        .queue_entries(Some(QueueStatus::Error))
        .await
        .unwrap();
    assert_eq!(errored.len(), 1);
}

#[tokio::test]
async fn failed_detail_page_drops_document_but_not_company() {
    let mut fetcher = MockFetcher::new(vec![listing_page(&[(1, "DBS GROUP HOLDINGS LTD")], 1)])
        .with_announcements(
            "DBS GROUP HOLDINGS LTD",
            vec![
                announcement("DOC1", "DBS GROUP HOLDINGS LTD", "20250807"),
                announcement("DOC2", "DBS GROUP HOLDINGS LTD", "20250806"),
            ],
        );
    fetcher.fail_page_for = Some("DOC2".to_string());

    let (pipeline, _fetcher, _storage) = pipeline(fetcher, test_config(), CancellationToken::new());
    pipeline.seed().await.unwrap();
    let stats = pipeline.run().await.unwrap();

    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.documents_dropped, 1);
    assert_eq!(stats.filings.inserted, 1);

    let store = pipeline.ingest().store();
    assert!(store.filing_by_document_id("DOC1").await.unwrap().is_some());
    assert!(store.filing_by_document_id("DOC2").await.unwrap().is_none());
    let entries = store.queue_entries(Some(QueueStatus::Success)).await.unwrap();
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
async fn ticker_linking_consumes_companies_and_marks_unmatched() {
    let mut fetcher = MockFetcher::new(vec![listing_page(
        &[(1, "DBS GROUP HOLDINGS LTD"), (2, "ABR HOLDINGS LIMITED")],
        1,
    )]);
    fetcher.tickers = vec![TickerEntry {
        ticker: "D05".to_string(),
        name: "DBS Group".to_string(),
    }];

    let (pipeline, _fetcher, _storage) = pipeline(fetcher, test_config(), CancellationToken::new());
    pipeline.seed().await.unwrap();
    let links = pipeline.link_tickers().await.unwrap();

    assert_eq!(links.len(), 1);
    assert_eq!(links[0].company_id.as_deref(), Some("1"));
    assert_eq!(
        links[0].matched_name.as_deref(),
        Some("DBS GROUP HOLDINGS LTD")
    );

    let unmatched = pipeline
        .ingest()
        .store()
        .queue_entries(Some(QueueStatus::Unmatched))
        .await
        .unwrap();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].company_id, "2");
}
