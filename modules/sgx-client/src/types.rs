use serde::Deserialize;

/// Envelope shared by the search-style endpoints:
/// `{ "meta": { "code": "200", "totalPages": n }, "data": [...] }`.
///
/// A non-"200" `meta.code` is a hard failure even when the HTTP status is
/// 200 — it must never be read as an empty result.
#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
    #[serde(default)]
    pub meta: Option<ResponseMeta>,
    #[serde(default)]
    pub data: Option<T>,
}

impl<T> ApiPage<T> {
    pub fn code(&self) -> Option<&str> {
        self.meta.as_ref().map(|m| m.code.as_str())
    }

    pub fn total_pages(&self) -> Option<u32> {
        self.meta.as_ref().and_then(|m| m.total_pages)
    }
}

#[derive(Debug, Deserialize)]
pub struct ResponseMeta {
    #[serde(default)]
    pub code: String,
    #[serde(default, rename = "totalPages")]
    pub total_pages: Option<u32>,
}

/// One raw announcement record from the company search endpoint.
/// Field names follow the wire format.
#[derive(Debug, Clone, Deserialize)]
pub struct Announcement {
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    /// File-type code, e.g. "CACT06".
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub category_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub issuer_name: Option<String>,
    #[serde(default)]
    pub security_name: Option<String>,
    /// Compact `YYYYMMDD` date string.
    #[serde(default)]
    pub submission_date: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Announcement {
    /// Stable document identifier: `ref_id`, falling back to the raw `id`.
    pub fn document_id(&self) -> Option<&str> {
        self.ref_id.as_deref().or(self.id.as_deref())
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer_name.as_deref().or(self.security_name.as_deref())
    }
}

/// One entry from the corporate-information listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyListing {
    #[serde(default, rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
}

impl CompanyListing {
    /// The listing `id` is numeric on the wire; expose it as the opaque
    /// string used as `company_id` everywhere downstream.
    pub fn company_id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// Securities price list envelope: `{ "data": { "prices": [...] } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct SecuritiesResponse {
    #[serde(default)]
    pub data: Option<SecuritiesData>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SecuritiesData {
    #[serde(default)]
    pub prices: Vec<SecurityPrice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SecurityPrice {
    /// Ticker symbol.
    #[serde(default)]
    pub cur: Option<String>,
    /// Display name.
    #[serde(default)]
    pub n: Option<String>,
}

/// A (ticker, display name) pair from the securities list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerEntry {
    pub ticker: String,
    pub name: String,
}
