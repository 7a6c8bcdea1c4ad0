//! One-shot source probe: fetch the configured marketplace once, normalize
//! every listing and print them cheapest first. Never sends an SMS.
//!
//! Usage:
//!   cargo run --bin probe                    # uses ticketwatch.toml or env
//!   cargo run --bin probe -- path/to.toml

use anyhow::{Context, Result};
use std::path::PathBuf;

use ticketwatch::config::Config;
use ticketwatch::normalize::normalize;
use ticketwatch::notify::format_message;
use ticketwatch::selector::select_cheapest;
use ticketwatch::sources::build_source;
use ticketwatch::ticket::Ticket;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("ticketwatch.toml"));

    let config = if path.exists() {
        Config::load(&path).with_context(|| format!("loading {}", path.display()))?
    } else {
        Config::from_env()?
    };
    if config.source.url.is_empty() {
        anyhow::bail!("no source url configured (source.url or TICKETWATCH_SOURCE_URL)");
    }

    println!("=== Source Probe ===");
    println!("Kind: {}  |  URL: {}", config.source.kind, config.source.url);
    println!();

    let source = build_source(&config.source)?;
    let raw = source
        .fetch()
        .await
        .with_context(|| format!("fetching {}", config.source.url))?;

    let mut tickets: Vec<Ticket> = Vec::new();
    let mut skipped = 0usize;
    for (i, record) in raw.iter().enumerate() {
        match normalize(record, source.required_split()) {
            Ok(t) => tickets.push(t),
            Err(e) => {
                skipped += 1;
                println!("  skip #{:<3} {}", i, e);
            }
        }
    }

    println!(
        "{} raw listings, {} tickets, {} skipped",
        raw.len(),
        tickets.len(),
        skipped
    );
    println!();

    let cheapest = select_cheapest(&tickets).cloned();

    tickets.sort_by(|a, b| a.price.cmp(&b.price));
    for t in &tickets {
        println!(
            "  {}{:>9.2}  section {:<12} row {:<6} split {:<3} {}",
            config.selection.currency_symbol,
            t.price,
            t.section,
            t.row,
            t.split.map(|n| n.to_string()).unwrap_or_else(|| "-".into()),
            t.identifier
        );
    }

    let max_price = config.selection.max_price;
    if let Some(t) = cheapest {
        println!();
        if t.price > max_price {
            println!(
                "Cheapest ticket ({}{:.2}) is above max price {}{}",
                config.selection.currency_symbol, t.price, config.selection.currency_symbol, max_price
            );
        } else {
            let link = source.listing_link(&t);
            println!(
                "Would notify: {}",
                format_message(&t, &config.selection.currency_symbol, &link)
            );
        }
    }

    Ok(())
}
