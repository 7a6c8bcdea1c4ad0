//! Fixed-interval poller driving fetch -> normalize -> dedupe -> select -> notify.
//!
//! Every tick spawns an independent cycle task, so a slow fetch never
//! delays the next tick. Cycles share nothing but the `DedupStore`.
//! Two overlapping cycles can both see a ticket as unseen and both notify
//! it; there is deliberately no cross-cycle lock.

use crate::config::{Config, MarkPolicy};
use crate::dedup::DedupStore;
use crate::normalize::normalize_batch;
use crate::notify::{Notifier, NotifyReport};
use crate::selector::select_cheapest;
use crate::sources::SourceAdapter;
use crate::ticket::Ticket;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, warn, Instrument};

/// How a single cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Fetch failed; nothing else ran.
    FetchFailed(String),
    /// The source returned nothing usable.
    NoListings,
    /// Every listing was already seen.
    NothingNew,
    /// Cheapest unseen ticket costs more than the threshold. Marked, not sent.
    AboveThreshold(Ticket),
    Notified { ticket: Ticket, report: NotifyReport },
    /// Cycle exceeded `cycle_timeout` and was abandoned.
    TimedOut,
}

#[derive(Debug, Default)]
pub struct PollerStats {
    cycles: AtomicU64,
    fetch_failures: AtomicU64,
    timeouts: AtomicU64,
    notifications: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub cycles: u64,
    pub fetch_failures: u64,
    pub timeouts: u64,
    pub notifications: u64,
}

impl PollerStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
        }
    }
}

pub struct Poller {
    source: Arc<dyn SourceAdapter>,
    dedup: DedupStore,
    notifier: Notifier,
    max_price: Decimal,
    interval: Duration,
    cycle_timeout: Duration,
    stats: PollerStats,
}

impl Poller {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        dedup: DedupStore,
        notifier: Notifier,
        max_price: Decimal,
        interval: Duration,
        cycle_timeout: Duration,
    ) -> Self {
        Self {
            source,
            dedup,
            notifier,
            max_price,
            interval,
            cycle_timeout,
            stats: PollerStats::default(),
        }
    }

    pub fn from_config(
        config: &Config,
        source: Arc<dyn SourceAdapter>,
        dedup: DedupStore,
        notifier: Notifier,
    ) -> Self {
        Self::new(
            source,
            dedup,
            notifier,
            config.selection.max_price,
            Duration::from_secs(config.scheduler.interval_secs),
            Duration::from_secs(config.scheduler.cycle_timeout_secs),
        )
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Tick forever, spawning one cycle per tick. Never returns.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            max_price = %self.max_price,
            recipients = self.notifier.recipients().len(),
            "poller started"
        );

        let mut cycle_no: u64 = 0;
        loop {
            ticker.tick().await;
            cycle_no += 1;

            let poller = self.clone();
            let span = info_span!("cycle", n = cycle_no);
            tokio::spawn(
                async move {
                    poller.run_cycle_bounded().await;
                }
                .instrument(span),
            );
        }
    }

    /// `run_cycle` under the configured timeout.
    pub async fn run_cycle_bounded(&self) -> CycleOutcome {
        match tokio::time::timeout(self.cycle_timeout, self.run_cycle()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(
                    source = self.source.name(),
                    timeout_secs = self.cycle_timeout.as_secs(),
                    "cycle timed out, abandoning"
                );
                CycleOutcome::TimedOut
            }
        }
    }

    /// One full cycle. Every component error is logged and absorbed here.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        let source = self.source.name();

        let raw = match self.source.fetch().await {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(source = source, error = %e, "fetch failed, skipping cycle");
                return CycleOutcome::FetchFailed(e.to_string());
            }
        };

        let tickets = normalize_batch(&raw, self.source.required_split(), source);
        if tickets.is_empty() {
            info!(source = source, raw = raw.len(), "no tickets found");
            return CycleOutcome::NoListings;
        }

        let total = tickets.len();
        let unseen = self.dedup.filter_unseen(tickets);
        let cheapest = match select_cheapest(&unseen) {
            Some(t) => t.clone(),
            None => {
                info!(source = source, tickets = total, "no new tickets available");
                return CycleOutcome::NothingNew;
            }
        };

        match self.source.mark_policy() {
            MarkPolicy::Selected => {
                self.dedup.mark_seen(&cheapest.identifier);
            }
            MarkPolicy::AllCandidates => {
                for t in &unseen {
                    self.dedup.mark_seen(&t.identifier);
                }
            }
        }

        debug!(
            source = source,
            tickets = total,
            unseen = unseen.len(),
            seen_total = self.dedup.len(),
            cheapest = %cheapest,
            "selected cheapest unseen ticket"
        );

        if cheapest.price > self.max_price {
            info!(
                source = source,
                price = %cheapest.price,
                max_price = %self.max_price,
                id = %cheapest.identifier,
                "no tickets available within the price range"
            );
            return CycleOutcome::AboveThreshold(cheapest);
        }

        info!(
            source = source,
            price = %cheapest.price,
            section = %cheapest.section,
            row = %cheapest.row,
            split = ?cheapest.split,
            id = %cheapest.identifier,
            "ticket found"
        );

        let link = self.source.listing_link(&cheapest);
        let report = self.notifier.notify(&cheapest, &link).await;
        self.stats
            .notifications
            .fetch_add(report.delivered.len() as u64, Ordering::Relaxed);
        if !report.any_delivered() {
            warn!(
                source = source,
                id = %cheapest.identifier,
                failed = report.failed.len(),
                "no recipient received the notification"
            );
        }

        debug!(stats = ?self.stats.snapshot(), "cycle complete");
        CycleOutcome::Notified {
            ticket: cheapest,
            report,
        }
    }
}
