use anyhow::Result;
use tracing::{debug, info};

use sgxpipe_common::types::CanonicalCompany;
use sgxpipe_match::{EntityResolver, TokenFrequencyIndex};

use crate::traits::FilingFetcher;

/// One ticker from the securities list, linked (or not) to a canonical
/// company.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerLink {
    pub ticker: String,
    pub display_name: String,
    pub company_id: Option<String>,
    pub matched_name: Option<String>,
    pub confidence: f32,
}

/// Link the securities ticker list 1:1 against the canonical catalog.
///
/// Each resolved company is consumed from the pool, so two tickers can
/// never claim the same canonical name and shared tokens lose weight as
/// their companies are claimed.
pub async fn link_tickers<F: FilingFetcher>(
    fetcher: &F,
    resolver: &EntityResolver,
    companies: &[CanonicalCompany],
) -> Result<Vec<TickerLink>> {
    let tickers = fetcher.ticker_list().await?;

    let mut pool = companies.to_vec();
    let mut index = TokenFrequencyIndex::from_names(companies.iter().map(|c| c.name.as_str()));

    let mut links = Vec::with_capacity(tickers.len());
    for entry in tickers {
        let result = resolver.resolve_consuming(&entry.name, &mut pool, &mut index);
        if result.matched_name.is_none() {
            debug!(
                ticker = entry.ticker.as_str(),
                name = entry.name.as_str(),
                confidence = result.confidence,
                "Ticker left unlinked"
            );
        }
        links.push(TickerLink {
            ticker: entry.ticker,
            display_name: entry.name,
            company_id: result
                .matched_name
                .is_some()
                .then(|| result.source_id.clone()),
            matched_name: result.matched_name,
            confidence: result.confidence,
        });
    }

    let linked = links.iter().filter(|l| l.company_id.is_some()).count();
    info!(
        tickers = links.len(),
        linked,
        unclaimed_companies = pool.len(),
        "Ticker linking finished"
    );
    Ok(links)
}
