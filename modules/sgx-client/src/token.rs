use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Result, SgxClientError};

/// Process-lifetime cache for the API authorization token.
///
/// The token is published by the CMS endpoint as a ROT13-obfuscated
/// `qrValidator` field. It is fetched lazily on first use and kept until
/// `invalidate()` is called after a demonstrated authentication failure.
pub struct TokenCache {
    cms_url: String,
    client: reqwest::Client,
    token: RwLock<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct CmsResponse {
    #[serde(default)]
    data: CmsData,
}

#[derive(Debug, Default, Deserialize)]
struct CmsData {
    #[serde(default, alias = "qrvalidator")]
    #[serde(rename = "qrValidator")]
    qr_validator: Option<String>,
}

impl TokenCache {
    pub fn new(cms_url: &str, client: reqwest::Client) -> Self {
        Self {
            cms_url: cms_url.to_string(),
            client,
            token: RwLock::new(None),
        }
    }

    /// Return the cached token, fetching it from the CMS endpoint if absent.
    pub async fn get(&self) -> Result<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(token.clone());
        }

        let mut guard = self.token.write().await;
        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }

        let token = self.fetch().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call re-fetches it.
    pub async fn invalidate(&self) {
        warn!("Invalidating cached authorization token");
        *self.token.write().await = None;
    }

    async fn fetch(&self) -> Result<String> {
        let resp = self.client.get(&self.cms_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SgxClientError::Token(format!(
                "CMS endpoint returned status {status}"
            )));
        }

        let body: CmsResponse = resp
            .json()
            .await
            .map_err(|e| SgxClientError::Token(format!("CMS response not JSON: {e}")))?;

        let encoded = body
            .data
            .qr_validator
            .ok_or_else(|| SgxClientError::Token("qrValidator missing from CMS response".into()))?;

        info!("Fetched fresh authorization token");
        Ok(rot13(&encoded))
    }
}

/// ROT13-decode the obfuscated token.
fn rot13(input: &str) -> String {
    input
        .chars()
        .map(|c| match c {
            'a'..='z' => (((c as u8 - b'a' + 13) % 26) + b'a') as char,
            'A'..='Z' => (((c as u8 - b'A' + 13) % 26) + b'A') as char,
            other => other,
        })
        .collect()
}
