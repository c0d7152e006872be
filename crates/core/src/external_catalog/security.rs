//! Request guards for the catalog client.
//!
//! Every outgoing URL must point at the single allow-listed host over HTTPS,
//! and every response must be a JSON:API document.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Url;

use super::ExternalCatalogError;

/// Media type of JSON:API requests and responses.
pub const JSON_API_MEDIA_TYPE: &str = "application/vnd.api+json";

/// Search queries must be shorter than this many characters.
pub const MAX_QUERY_LENGTH: usize = 100;

/// Reject empty (after trimming) or overlong search queries.
pub fn validate_search_query(query: &str) -> Result<(), ExternalCatalogError> {
    if query.trim().is_empty() {
        return Err(ExternalCatalogError::InvalidQuery(
            "search query is empty".to_string(),
        ));
    }
    if query.chars().count() >= MAX_QUERY_LENGTH {
        return Err(ExternalCatalogError::InvalidQuery(format!(
            "search query must be shorter than {} characters",
            MAX_QUERY_LENGTH
        )));
    }
    Ok(())
}

/// Allows requests only to one host.
#[derive(Debug, Clone)]
pub struct HostGuard {
    allowed_host: String,
}

impl HostGuard {
    pub fn new(allowed_host: impl Into<String>) -> Self {
        Self {
            allowed_host: allowed_host.into().to_ascii_lowercase(),
        }
    }

    pub fn allowed_host(&self) -> &str {
        &self.allowed_host
    }

    /// Parse `url` and check its scheme and host.
    pub fn check_url(&self, url: &str) -> Result<Url, ExternalCatalogError> {
        let parsed = Url::parse(url)
            .map_err(|e| ExternalCatalogError::Security(format!("invalid URL '{}': {}", url, e)))?;

        if parsed.scheme() != "https" {
            return Err(ExternalCatalogError::Security(format!(
                "refusing non-https URL '{}'",
                url
            )));
        }

        match parsed.host_str() {
            Some(host) if host.eq_ignore_ascii_case(&self.allowed_host) => Ok(parsed),
            Some(host) => Err(ExternalCatalogError::Security(format!(
                "host '{}' is not allowed",
                host
            ))),
            None => Err(ExternalCatalogError::Security(format!(
                "URL '{}' has no host",
                url
            ))),
        }
    }
}

/// Check that a response declares the JSON:API media type.
pub fn check_content_type(headers: &HeaderMap) -> Result<(), ExternalCatalogError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.contains(JSON_API_MEDIA_TYPE) {
        Ok(())
    } else {
        Err(ExternalCatalogError::Security(format!(
            "unexpected content type '{}'",
            content_type
        )))
    }
}
