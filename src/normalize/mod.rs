//! Raw listing -> `Ticket`.
//!
//! A record missing a price, section or row (or carrying one that does not
//! parse) is skipped with a `ParseError`; the rest of the batch carries on.

use crate::sources::{ApiListing, GridItem, RawListing};
use crate::ticket::Ticket;
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no {0} in listing")]
    Missing(&'static str),
    #[error("invalid {field}: {value:?}")]
    Invalid { field: &'static str, value: String },
}

fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[£$€]\s?(\d[\d,]*(?:\.\d{1,2})?)").expect("price regex"))
}

fn section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bsection\s+(\d+)").expect("section regex"))
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\brow\s+(\d+)").expect("row regex"))
}

fn amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d[\d,]*(?:\.\d+)?").expect("amount regex"))
}

/// Map one raw record to a ticket. `split` is the group size the source
/// filtered on, if any.
pub fn normalize(raw: &RawListing, split: Option<u32>) -> Result<Ticket, ParseError> {
    let ticket = match raw {
        RawListing::Api(listing) => normalize_api(listing)?,
        RawListing::Grid(item) => normalize_grid(item)?,
        RawListing::Text(text) => normalize_text(text)?,
    };
    Ok(match split {
        Some(n) => ticket.with_split(n),
        None => ticket,
    })
}

/// Normalize a whole fetch, logging and dropping records that fail.
pub fn normalize_batch(raw: &[RawListing], split: Option<u32>, source: &str) -> Vec<Ticket> {
    let mut tickets = Vec::with_capacity(raw.len());
    let mut skipped = 0usize;

    for (index, record) in raw.iter().enumerate() {
        match normalize(record, split) {
            Ok(ticket) => tickets.push(ticket),
            Err(e) => {
                skipped += 1;
                debug!(source = source, index = index, reason = %e, "skipping listing");
            }
        }
    }

    if skipped > 0 {
        info!(
            source = source,
            kept = tickets.len(),
            skipped = skipped,
            "some listings could not be normalized"
        );
    }
    tickets
}

fn normalize_api(listing: &ApiListing) -> Result<Ticket, ParseError> {
    let price = listing
        .pricing
        .prices
        .first()
        .ok_or(ParseError::Missing("price"))?;
    let minor = price.net_selling_price + price.net_fee;
    let minor = Decimal::try_from(minor).map_err(|_| ParseError::Invalid {
        field: "price",
        value: minor.to_string(),
    })?;
    let price = non_negative(minor / Decimal::ONE_HUNDRED)?;

    let section = required_text(listing.section.as_deref(), "section")?;
    let row = required_text(listing.row.as_deref(), "row")?;

    Ok(match extract_native_id(&listing.id) {
        Some(id) => Ticket::new(id, price, section, row),
        None => {
            debug!(raw_id = %listing.id, "listing has no native id, hashing content");
            Ticket::hashed(price, section, row)
        }
    })
}

fn normalize_grid(item: &GridItem) -> Result<Ticket, ParseError> {
    let price = match item.price.as_deref().and_then(parse_money) {
        Some(p) => p,
        None => {
            let raw = item.raw_price.ok_or(ParseError::Missing("price"))?;
            Decimal::try_from(raw).map_err(|_| ParseError::Invalid {
                field: "price",
                value: raw.to_string(),
            })?
        }
    };
    let price = non_negative(price)?;

    let section = required_text(item.section.as_deref(), "section")?;
    let row = required_text(item.row.as_deref(), "row")?;

    Ok(Ticket::new(item.id.to_string(), price, section, row))
}

fn normalize_text(text: &str) -> Result<Ticket, ParseError> {
    let price = extract_price(text)?;
    let section = extract_number(section_re(), text, "section")?;
    let row = extract_number(row_re(), text, "row")?;
    Ok(Ticket::hashed(price, section.to_string(), row.to_string()))
}

/// First currency-prefixed amount in `text`, e.g. `£115.50` or `$1,240`.
pub fn extract_price(text: &str) -> Result<Decimal, ParseError> {
    let caps = price_re()
        .captures(text)
        .ok_or(ParseError::Missing("price"))?;
    let digits = caps[1].replace(',', "");
    Decimal::from_str(&digits).map_err(|_| ParseError::Invalid {
        field: "price",
        value: caps[1].to_string(),
    })
}

fn extract_number(re: &Regex, text: &str, field: &'static str) -> Result<u32, ParseError> {
    let caps = re.captures(text).ok_or(ParseError::Missing(field))?;
    caps[1].parse::<u32>().map_err(|_| ParseError::Invalid {
        field,
        value: caps[1].to_string(),
    })
}

/// Text after the first `@` of a composite listing id, if any.
pub fn extract_native_id(raw: &str) -> Option<&str> {
    raw.split_once('@')
        .map(|(_, native)| native.trim())
        .filter(|native| !native.is_empty())
}

/// Parse a display price such as `"£1,234.50"` or `"95"`, ignoring currency
/// symbols and thousands separators.
pub fn parse_money(display: &str) -> Option<Decimal> {
    let m = amount_re().find(display)?;
    Decimal::from_str(&m.as_str().replace(',', "")).ok()
}

fn required_text(value: Option<&str>, field: &'static str) -> Result<String, ParseError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ParseError::Missing(field)),
    }
}

fn non_negative(price: Decimal) -> Result<Decimal, ParseError> {
    if price.is_sign_negative() {
        return Err(ParseError::Invalid {
            field: "price",
            value: price.to_string(),
        });
    }
    Ok(price)
}
