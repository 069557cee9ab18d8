use std::env;
use std::time::Duration;

/// Pipeline configuration loaded from environment variables.
///
/// Every knob has a documented default so the pipeline runs against the
/// public endpoints out of the box; only the storage root is commonly
/// overridden in deployments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Platform tag embedded in storage paths and filing records.
    pub platform: String,

    // Endpoints
    pub company_api_url: String,
    pub count_api_url: String,
    pub corporate_info_url: String,
    pub securities_url: String,
    pub cms_url: String,
    pub attachments_base_url: String,

    // Search window
    pub period_start: String,
    pub period_end: String,

    // Storage
    pub raw_data_dir: String,

    // Crawl caps
    pub page_size: u32,
    /// 0 = unbounded.
    pub max_pages: u32,
    /// 0 = unbounded.
    pub max_files_per_company: usize,
    /// 0 = unbounded.
    pub max_companies: usize,

    // Worker pools
    pub max_workers: usize,
    pub document_workers: usize,
    pub attachment_workers: usize,

    // Retry / HTTP
    pub max_retries: u32,
    pub backoff_factor: u64,
    pub request_timeout: Duration,

    // Entity resolution
    pub rarity_threshold: u32,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            platform: env_or("PLATFORM", "SGX"),
            company_api_url: env_or(
                "SGX_COMPANY_API_URL",
                "https://api.sgx.com/announcements/v1.1/company",
            ),
            count_api_url: env_or(
                "SGX_RESULTS_COUNT_API_URL",
                "https://api.sgx.com/announcements/v1.1/company/count",
            ),
            corporate_info_url: env_or(
                "SGX_CORPORATE_INFO_URL",
                "https://api.sgx.com/corporate-information/v1.1",
            ),
            securities_url: env_or("SGX_SECURITIES_URL", "https://api.sgx.com/securities/v1.1"),
            cms_url: env_or(
                "CMS_URL",
                "https://api2.sgx.com/content-api/?queryId=17d94f69435775a0d673d1b5328b0403ce4ad025:we_chat_qr_validator",
            ),
            attachments_base_url: env_or("ATTACHMENTS_BASE_URL", "https://links.sgx.com"),
            period_start: env_or("PERIOD_START", "20051030_160000"),
            period_end: env_or("PERIOD_END", "20251231_155959"),
            raw_data_dir: env_or("RAW_DATA_DIR", "raw_data_storage"),
            page_size: parse_env("PAGE_SIZE", 20),
            max_pages: parse_env("MAX_PAGES", 0),
            max_files_per_company: parse_env("MAX_FILES_PER_COMPANY", 20),
            max_companies: parse_env("MAX_COMPANIES", 0),
            max_workers: parse_env("MAX_WORKERS", 5),
            document_workers: parse_env("DOCUMENT_WORKERS", 5),
            attachment_workers: parse_env("ATTACHMENT_WORKERS", 4),
            max_retries: parse_env("MAX_RETRIES", 5),
            backoff_factor: parse_env("BACKOFF_FACTOR", 2),
            request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT", 10)),
            rarity_threshold: parse_env("RARITY_THRESHOLD", 50),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
