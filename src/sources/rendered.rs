//! Headless-browser adapter for pages that only build their listings client-side.
//!
//! Each fetch launches a fresh Chromium on its own throwaway profile
//! directory, so overlapping cycles never contend for a profile lock. The
//! page is loaded with caching disabled, and the fetch waits for the ready
//! marker to become visible and returns the text of every listing block.
//! The text is parsed by the normalizer.
//!
//! There is no network-idle detection. After the marker shows up the fetch
//! sleeps for `settle_ms` so late XHR-driven rows can land; a page that
//! keeps loading past that window is read as it stands.

use super::{FetchError, RawListing, SourceAdapter};
use crate::config::{MarkPolicy, SourceConfig};
use crate::ticket::Ticket;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::Instant;
use tracing::{debug, info};

const MARKER_POLL: Duration = Duration::from_millis(250);

const IS_VISIBLE_JS: &str = "function() { \
    const r = this.getBoundingClientRect(); \
    const s = window.getComputedStyle(this); \
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; \
}";

fn browser_error(e: CdpError) -> FetchError {
    FetchError::Browser(e.to_string())
}

/// Fresh profile directory for one browser launch. Removed on drop.
fn profile_dir() -> Result<TempDir, FetchError> {
    tempfile::Builder::new()
        .prefix("ticketwatch-chromium-")
        .tempdir()
        .map_err(|e| FetchError::Browser(format!("profile dir: {}", e)))
}

pub struct RenderedDomSource {
    url: String,
    user_agent: String,
    listing_selector: String,
    ready_selector: String,
    ready_timeout: Duration,
    settle: Duration,
    mark: MarkPolicy,
}

impl RenderedDomSource {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            url: config.url.clone(),
            user_agent: config.user_agent.clone(),
            listing_selector: config.listing_selector.clone(),
            ready_selector: config.ready_selector.clone(),
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
            settle: Duration::from_millis(config.settle_ms),
            mark: config.mark_policy(),
        }
    }

    fn browser_config(&self, profile: &TempDir) -> Result<BrowserConfig, FetchError> {
        BrowserConfig::builder()
            .user_data_dir(profile.path())
            .request_timeout(self.ready_timeout)
            .build()
            .map_err(FetchError::Browser)
    }

    async fn read_listings(&self, browser: &Browser) -> Result<Vec<String>, FetchError> {
        let page = browser.new_page("about:blank").await.map_err(browser_error)?;

        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(browser_error)?;
        page.execute(SetExtraHttpHeadersParams::new(Headers::new(
            serde_json::json!({ "Cache-Control": "no-store" }),
        )))
        .await
        .map_err(browser_error)?;

        page.goto(self.url.as_str()).await.map_err(browser_error)?;
        page.wait_for_navigation().await.map_err(browser_error)?;

        self.wait_until_visible(&page).await?;
        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        let elements = page
            .find_elements(self.listing_selector.as_str())
            .await
            .map_err(browser_error)?;

        let mut texts = Vec::with_capacity(elements.len());
        for element in elements {
            match element.inner_text().await {
                Ok(Some(text)) => texts.push(text),
                Ok(None) => {}
                Err(e) => debug!(error = %e, "could not read listing text"),
            }
        }

        info!(url = %self.url, listings = texts.len(), "read rendered listings");
        Ok(texts)
    }

    async fn wait_until_visible(&self, page: &Page) -> Result<(), FetchError> {
        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if let Ok(marker) = page.find_element(self.ready_selector.as_str()).await {
                let visible = marker
                    .call_js_fn(IS_VISIBLE_JS, false)
                    .await
                    .ok()
                    .and_then(|r| r.result.value)
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if visible {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(FetchError::MissingElement(format!(
                    "{} not visible after {:?}",
                    self.ready_selector, self.ready_timeout
                )));
            }
            tokio::time::sleep(MARKER_POLL).await;
        }
    }
}

#[async_trait]
impl SourceAdapter for RenderedDomSource {
    fn name(&self) -> &'static str {
        "rendered_dom"
    }

    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let profile = profile_dir()?;
        let config = self.browser_config(&profile)?;

        let (mut browser, mut handler) = Browser::launch(config).await.map_err(browser_error)?;
        let pump = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let texts = self.read_listings(&browser).await;

        // Always tear the browser down, even when reading failed.
        if let Err(e) = browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        let _ = browser.wait().await;
        pump.abort();
        if let Err(e) = profile.close() {
            debug!(error = %e, "could not remove browser profile");
        }

        Ok(texts?.into_iter().map(RawListing::Text).collect())
    }

    fn listing_link(&self, _ticket: &Ticket) -> String {
        self.url.clone()
    }

    fn mark_policy(&self) -> MarkPolicy {
        self.mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use rust_decimal::Decimal;

    #[test]
    fn test_link_is_page_url() {
        let mut config = SourceConfig::new(
            SourceKind::RenderedDom,
            "https://example.test/en/event/1#sort=FirstListed",
        );
        config.ready_timeout_secs = 5;
        let source = RenderedDomSource::from_config(&config);
        let ticket = Ticket::hashed(Decimal::from(80), "3", "9");
        assert_eq!(
            source.listing_link(&ticket),
            "https://example.test/en/event/1#sort=FirstListed"
        );
        assert_eq!(source.ready_timeout, Duration::from_secs(5));
        assert_eq!(source.required_split(), None);
    }

    #[test]
    fn test_each_launch_gets_its_own_profile() {
        let first = profile_dir().unwrap();
        let second = profile_dir().unwrap();
        assert_ne!(first.path(), second.path());
        assert!(first.path().is_dir() && second.path().is_dir());
        assert!(first
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("ticketwatch-chromium-"))
            .unwrap_or(false));

        let path = first.path().to_path_buf();
        first.close().unwrap();
        assert!(!path.exists());
        assert!(second.path().is_dir());
    }
}
