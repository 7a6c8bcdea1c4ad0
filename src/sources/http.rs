//! Shared HTTP plumbing for the request-based adapters.
//!
//! Marketplaces serve stale or bot-walled pages to clients that look like
//! scripts, so every request carries browser headers and no-cache directives.

use super::FetchError;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, PRAGMA, USER_AGENT,
};
use std::time::Duration;
use tracing::debug;

const ACCEPT_HTML: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";

pub fn browser_headers(user_agent: &str) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| FetchError::Client(format!("invalid user agent: {}", e)))?,
    );
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers.insert("DNT", HeaderValue::from_static("1"));
    headers.insert("Upgrade-Insecure-Requests", HeaderValue::from_static("1"));
    Ok(headers)
}

pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client, FetchError> {
    reqwest::Client::builder()
        .default_headers(browser_headers(user_agent)?)
        .timeout(timeout)
        .build()
        .map_err(|e| FetchError::Client(e.to_string()))
}

/// GET `url` and return the body, treating any non-2xx status as an error.
pub async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    let resp = client.get(url).send().await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = resp.text().await?;
    debug!(url = url, bytes = body.len(), "fetched source payload");
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_headers_disable_caching() {
        let headers = browser_headers("Mozilla/5.0 test").unwrap();
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-cache");
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "Mozilla/5.0 test");
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        assert!(matches!(
            browser_headers("bad\nagent"),
            Err(FetchError::Client(_))
        ));
    }
}
