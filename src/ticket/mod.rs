//! Canonical ticket listing shared by every marketplace adapter.
//!
//! A `Ticket` is built fresh each cycle by the normalizer and never mutated
//! afterwards. Only its `identifier` outlives the cycle (in the dedup store).

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    /// Stable across repeated fetches of the same listing.
    pub identifier: String,
    /// Selling price including fees, in major currency units.
    pub price: Decimal,
    pub section: String,
    pub row: String,
    /// Group size the listing was filtered on, when the source supports splits.
    pub split: Option<u32>,
}

impl Ticket {
    pub fn new(
        identifier: impl Into<String>,
        price: Decimal,
        section: impl Into<String>,
        row: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            price,
            section: section.into(),
            row: row.into(),
            split: None,
        }
    }

    /// Build a ticket whose identifier is the content hash of its fields.
    pub fn hashed(price: Decimal, section: impl Into<String>, row: impl Into<String>) -> Self {
        let section = section.into();
        let row = row.into();
        let identifier = content_identifier(price, &section, &row);
        Self {
            identifier,
            price,
            section,
            row,
            split: None,
        }
    }

    pub fn with_split(mut self, split: u32) -> Self {
        self.split = Some(split);
        self
    }
}

impl std::fmt::Display for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2} section={} row={} id={}",
            self.price, self.section, self.row, self.identifier
        )
    }
}

/// SHA-256 hex of `"{price:.2}:{section}:{row}"`.
///
/// Price is rounded to pennies first so `115.5` and `115.50` hash alike.
pub fn content_identifier(price: Decimal, section: &str, row: &str) -> String {
    let data = format!("{:.2}:{}:{}", price.round_dp(2), section.trim(), row.trim());
    format!("{:x}", Sha256::digest(data.as_bytes()))
}
