use std::collections::HashSet;

use tracing::{debug, info, warn};

use sgxpipe_common::error::PipelineError;
use sgxpipe_common::types::CanonicalCompany;

use crate::traits::FilingFetcher;

/// Source the canonical company catalog from the corporate-information
/// listing, paging by the envelope's `totalPages`.
///
/// Listings without both an id and a name are dropped; duplicate ids keep
/// their first occurrence. `max_companies` of 0 means unbounded.
pub async fn source_companies<F: FilingFetcher>(
    fetcher: &F,
    page_size: u32,
    max_companies: usize,
) -> Result<Vec<CanonicalCompany>, PipelineError> {
    let page_size = page_size.max(1);
    let mut companies: Vec<CanonicalCompany> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut total_pages = 1;
    let mut page = 0;

    while page < total_pages {
        let response = fetcher
            .company_listings_page(page, page_size)
            .await
            .map_err(|e| PipelineError::Client(format!("company listing page {page}: {e}")))?;

        match response.code() {
            Some("200") => {}
            code => {
                return Err(PipelineError::InvalidResponse(format!(
                    "company listing page {page} returned code {code:?}"
                )))
            }
        }

        if page == 0 {
            total_pages = response.total_pages().unwrap_or(1).max(1);
            debug!(total_pages, "Company listing paged");
        }

        for listing in response.data.unwrap_or_default() {
            let (Some(company_id), Some(name)) = (listing.company_id(), listing.company_name.clone())
            else {
                warn!("Dropping company listing without id or name");
                continue;
            };
            if seen.insert(company_id.clone()) {
                companies.push(CanonicalCompany { company_id, name });
            }
            if max_companies > 0 && companies.len() >= max_companies {
                info!(cap = max_companies, "Company cap reached");
                return Ok(companies);
            }
        }
        page += 1;
    }

    info!(companies = companies.len(), "Canonical catalog sourced");
    Ok(companies)
}
