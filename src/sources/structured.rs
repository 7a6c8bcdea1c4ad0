//! Structured inventory API adapter.
//!
//! Polls a JSON endpoint of the form
//! `{"responseData": [{"id": "...@<native>", "section": ..., "row": ...,
//!   "pricing": {"prices": [{"netSellingPrice": 5750, "netFee": 575}]},
//!   "splits": [1, 2, 4]}], "responseCode": 100}`.
//! Prices are in minor units. Only listings that can be bought in the
//! configured group size are returned.

use super::http::{build_client, fetch_body};
use super::{decode_records, nullable, FetchError, RawListing, SourceAdapter};
use crate::config::{MarkPolicy, SourceConfig};
use crate::ticket::Ticket;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InventoryResponse {
    /// Decoded record by record so one malformed listing is dropped alone.
    #[serde(default, deserialize_with = "nullable")]
    response_data: Vec<serde_json::Value>,
    #[serde(default)]
    response_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiListing {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub row: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub pricing: ApiPricing,
    #[serde(default, deserialize_with = "nullable")]
    pub splits: Vec<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPricing {
    #[serde(default, deserialize_with = "nullable")]
    pub prices: Vec<ApiPrice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPrice {
    /// Minor units.
    #[serde(default, deserialize_with = "nullable")]
    pub net_selling_price: f64,
    /// Minor units.
    #[serde(default, deserialize_with = "nullable")]
    pub net_fee: f64,
}

/// Decode an inventory payload, keeping listings sold in `required_split`.
///
/// Only an undecodable envelope is an error. A listing that does not match
/// the expected shape is logged and skipped.
pub fn parse_inventory(body: &str, required_split: u32) -> Result<Vec<ApiListing>, FetchError> {
    let response: InventoryResponse = serde_json::from_str(body)?;
    let total = response.response_data.len();

    let listings: Vec<ApiListing> = decode_records(response.response_data, "inventory")
        .into_iter()
        .filter(|l: &ApiListing| l.splits.contains(&required_split))
        .collect();

    debug!(
        total = total,
        kept = listings.len(),
        split = required_split,
        code = ?response.response_code,
        "parsed inventory"
    );
    Ok(listings)
}

pub struct StructuredApiSource {
    url: String,
    link_base: String,
    required_split: u32,
    mark: MarkPolicy,
    client: reqwest::Client,
}

impl StructuredApiSource {
    pub fn from_config(config: &SourceConfig) -> Result<Self, FetchError> {
        Ok(Self {
            url: config.url.clone(),
            link_base: config.link_base.clone(),
            required_split: config.required_split,
            mark: config.mark_policy(),
            client: build_client(
                &config.user_agent,
                Duration::from_secs(config.request_timeout_secs),
            )?,
        })
    }
}

#[async_trait]
impl SourceAdapter for StructuredApiSource {
    fn name(&self) -> &'static str {
        "structured_api"
    }

    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError> {
        let body = fetch_body(&self.client, &self.url).await?;
        let listings = parse_inventory(&body, self.required_split)?;
        Ok(listings.into_iter().map(RawListing::Api).collect())
    }

    fn listing_link(&self, ticket: &Ticket) -> String {
        format!("{}{},{}", self.link_base, ticket.identifier, self.required_split)
    }

    fn required_split(&self) -> Option<u32> {
        Some(self.required_split)
    }

    fn mark_policy(&self) -> MarkPolicy {
        self.mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceKind;
    use httpmock::prelude::*;
    use rust_decimal::Decimal;

    const BODY: &str = r#"{
        "responseData": [
            {"id": "block@aaa111", "section": "12", "row": "7", "splits": [1, 2],
             "pricing": {"prices": [{"currencyCode": "GBP", "netSellingPrice": 10500, "netFee": 1050}]}},
            {"id": "block@bbb222", "section": "14", "row": "2", "splits": [4],
             "pricing": {"prices": [{"netSellingPrice": 5000, "netFee": 500}]}},
            {"id": "block@ccc333", "section": null, "row": "1", "splits": [2, 4],
             "pricing": {"prices": []}}
        ],
        "responseCode": 100,
        "description": "OK"
    }"#;

    #[test]
    fn test_parse_inventory_filters_split() {
        let listings = parse_inventory(BODY, 2).unwrap();
        let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["block@aaa111", "block@ccc333"]);
        assert_eq!(listings[0].pricing.prices[0].net_selling_price, 10500.0);
        assert_eq!(listings[1].section, None);

        let fours = parse_inventory(BODY, 4).unwrap();
        assert_eq!(fours.len(), 2);
    }

    #[test]
    fn test_parse_inventory_rejects_garbage() {
        assert!(matches!(
            parse_inventory("<html>blocked</html>", 2),
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn test_missing_response_data_is_empty() {
        let listings = parse_inventory(r#"{"responseCode": 100}"#, 2).unwrap();
        assert!(listings.is_empty());
    }

    #[test]
    fn test_malformed_listing_skipped_alone() {
        let body = r#"{"responseData": [
            {"id": "block@good", "section": "12", "row": "7", "splits": [2],
             "pricing": {"prices": [{"netSellingPrice": 10500, "netFee": null}]}},
            {"id": "block@nullsplits", "section": "3", "row": "1", "splits": null,
             "pricing": {"prices": [{"netSellingPrice": 100, "netFee": 10}]}},
            {"id": "block@nullpricing", "section": "4", "row": "2", "splits": [2],
             "pricing": null},
            {"id": 42, "section": "5", "row": "3", "splits": [2]},
            "not a listing"
        ]}"#;
        let listings = parse_inventory(body, 2).unwrap();
        let ids: Vec<&str> = listings.iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["block@good", "block@nullpricing"]);
        assert_eq!(listings[0].pricing.prices[0].net_fee, 0.0);
        assert!(listings[1].pricing.prices.is_empty());
    }

    fn source_for(server: &MockServer) -> StructuredApiSource {
        let mut config = SourceConfig::new(SourceKind::StructuredApi, server.url("/inventory"));
        config.user_agent = "Mozilla/5.0 ticketwatch-test".into();
        StructuredApiSource::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_sends_browser_headers() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/inventory")
                    .header("cache-control", "no-cache")
                    .header("pragma", "no-cache")
                    .header("user-agent", "Mozilla/5.0 ticketwatch-test");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(BODY);
            })
            .await;

        let raw = source_for(&server).fetch().await.unwrap();
        mock.assert_async().await;
        assert_eq!(raw.len(), 2);
        assert!(matches!(&raw[0], RawListing::Api(l) if l.id == "block@aaa111"));
    }

    #[tokio::test]
    async fn test_fetch_non_2xx_is_status_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/inventory");
                then.status(503).body("maintenance");
            })
            .await;

        match source_for(&server).fetch().await {
            Err(FetchError::Status { status, url }) => {
                assert_eq!(status, 503);
                assert!(url.ends_with("/inventory"));
            }
            other => panic!("expected status error, got {:?}", other.map(|r| r.len())),
        }
    }

    #[test]
    fn test_listing_link_carries_split() {
        let mut config = SourceConfig::new(SourceKind::StructuredApi, "https://example.test/api");
        config.link_base = "https://example.test/app/block/".into();
        config.required_split = 3;
        let source = StructuredApiSource::from_config(&config).unwrap();
        let ticket = Ticket::new("abc", Decimal::from(50), "1", "2");
        assert_eq!(source.listing_link(&ticket), "https://example.test/app/block/abc,3");
        assert_eq!(source.required_split(), Some(3));
    }
}
