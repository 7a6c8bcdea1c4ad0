//! Embedded-JSON page adapter.
//!
//! The event page ships its listing grid as JSON inside
//! `<script id="index-data" type="application/json">`. We fetch the page,
//! pull that payload out and drop listings flagged as already sold.

use super::http::{build_client, fetch_body};
use super::{decode_records, nullable, FetchError, RawListing, SourceAdapter};
use crate::config::{MarkPolicy, SourceConfig};
use crate::ticket::Ticket;
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppData {
    #[serde(default)]
    app_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    grid: Grid,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Grid {
    #[serde(default, deserialize_with = "nullable")]
    items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridItem {
    pub id: i64,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub row: Option<String>,
    /// Display price, e.g. `"£1,234"` or `"$95.50"`.
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub raw_price: Option<f64>,
    #[serde(default)]
    pub sold_x_time_ago_site_message: Option<SiteMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub has_value: bool,
}

impl GridItem {
    pub fn is_sold(&self) -> bool {
        self.sold_x_time_ago_site_message
            .as_ref()
            .map(|m| m.has_value)
            .unwrap_or(false)
    }
}

/// Locate `<script id="{script_id}">` in `html` and decode its listing grid,
/// skipping sold listings and items that do not decode.
pub fn extract_grid(html: &str, script_id: &str) -> Result<Vec<GridItem>, FetchError> {
    let css = format!("script#{}", script_id);
    let selector = Selector::parse(&css).map_err(|_| FetchError::Selector(css.clone()))?;

    let document = Html::parse_document(html);
    let payload: String = document
        .select(&selector)
        .next()
        .ok_or_else(|| FetchError::MissingElement(css.clone()))?
        .text()
        .collect();

    let data: AppData = serde_json::from_str(payload.trim())?;
    let total = data.grid.items.len();
    let items: Vec<GridItem> = decode_records(data.grid.items, "grid")
        .into_iter()
        .filter(|i: &GridItem| !i.is_sold())
        .collect();

    debug!(
        app = ?data.app_name,
        total = total,
        unsold = items.len(),
        "parsed embedded listing grid"
    );
    Ok(items)
}

pub struct EmbeddedJsonSource {
    url: String,
    script_id: String,
    mark: MarkPolicy,
    client: reqwest::Client,
}

impl EmbeddedJsonSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(Self {
            url: config.url.clone(),
            script_id: config.script_id.clone(),
            mark: config.mark_policy(),
            client: build_client(
                &config.user_agent,
                Duration::from_secs(config.request_timeout_secs),
            )?,
        })
    }
}

#[async_trait]
impl SourceAdapter for EmbeddedJsonSource {
    fn name(&self) -> &'static str {
        "embedded_json"
    }

    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let body = fetch_body(&self.client, &self.url).await?;
        let items = extract_grid(&body, &self.script_id)?;
        Ok(items.into_iter().map(RawListing::Grid).collect())
    }

    fn listing_link(&self, ticket: &Ticket) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{}listingId={}", self.url, sep, ticket.identifier)
    }

    fn mark_policy(&self) -> MarkPolicy {
        self.mark
    }
}
