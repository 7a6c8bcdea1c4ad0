//! Marketplace source adapters.
//!
//! Every adapter fetches one configured endpoint and hands back the raw
//! listing records it found. Turning those into `Ticket`s is the
//! normalizer's job (`crate::normalize`).
//!
//! Variants:
//! - `structured`: JSON inventory API, filtered on split size
//! - `embedded`: HTML page with a JSON listing grid inside a `<script>`
//! - `rendered`: headless-browser page, listing text read from the DOM
//!
//! The variant is picked once at startup by `build_source`.

pub mod embedded;
pub mod http;
pub mod rendered;
pub mod structured;

use crate::config::{MarkPolicy, SourceConfig, SourceKind};
use crate::ticket::Ticket;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub use embedded::{EmbeddedJsonSource, GridItem};
pub use rendered::RenderedDomSource;
pub use structured::{ApiListing, StructuredApiSource};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("payload element not found: {0}")]
    MissingElement(String),
    #[error("invalid selector '{0}'")]
    Selector(String),
    #[error("browser error: {0}")]
    Browser(String),
}

/// One listing as the marketplace described it, before normalization.
#[derive(Debug, Clone)]
pub enum RawListing {
    Api(ApiListing),
    Grid(GridItem),
    /// Free text of one listing block on a rendered page.
    Text(String),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Fetch the endpoint once and return every listing worth normalizing.
    async fn fetch(&self) -> Result<Vec<RawListing>, FetchError>;

    /// Deep link back to the listing, sent in the notification.
    fn listing_link(&self, ticket: &Ticket) -> String;

    /// Group size required of listings, if the source filters on one.
    fn required_split(&self) -> Option<u32> {
        None
    }

    fn mark_policy(&self) -> MarkPolicy {
        MarkPolicy::Selected
    }
}

/// Treat an explicit JSON `null` like a missing field.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode each record on its own, dropping the ones that do not fit `T`.
pub(crate) fn decode_records<T: DeserializeOwned>(
    records: Vec<serde_json::Value>,
    what: &'static str,
) -> Vec<T> {
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value(record) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!(payload = what, index = index, error = %e, "skipping malformed record");
                None
            }
        })
        .collect()
}

/// Build the adapter selected by `config.kind`.
pub fn build_source(config: &SourceConfig) -> Result<Arc<dyn SourceAdapter>, FetchError> {
    let source: Arc<dyn SourceAdapter> = match config.kind {
        SourceKind::StructuredApi => Arc::new(StructuredApiSource::from_config(config)?),
        SourceKind::EmbeddedJson => Arc::new(EmbeddedJsonSource::from_config(config)?),
        SourceKind::RenderedDom => Arc::new(RenderedDomSource::from_config(config)),
    };
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_source_picks_variant() {
        let mut config = SourceConfig::new(SourceKind::StructuredApi, "https://example.test/api");
        assert_eq!(build_source(&config).unwrap().name(), "structured_api");

        config.kind = SourceKind::EmbeddedJson;
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "embedded_json");
        assert_eq!(source.mark_policy(), MarkPolicy::Selected);

        config.kind = SourceKind::RenderedDom;
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "rendered_dom");
        assert_eq!(source.mark_policy(), MarkPolicy::AllCandidates);
    }

    #[test]
    fn test_mark_override_applies() {
        let mut config = SourceConfig::new(SourceKind::StructuredApi, "https://example.test/api");
        config.mark = Some(MarkPolicy::Selected);
        assert_eq!(build_source(&config).unwrap().mark_policy(), MarkPolicy::Selected);
    }
}
