//! Ticket marketplace watcher.
//!
//! Polls one marketplace endpoint on a fixed interval, normalizes its
//! listings, drops ones already seen, picks the cheapest new ticket and
//! sends an SMS when it is within the price threshold.
//!
//! Shared by the `ticketwatch` daemon and the `probe` diagnostic binary.

pub mod config;
pub mod dedup;
pub mod normalize;
pub mod notify;
pub mod scheduler;
pub mod selector;
pub mod sources;
pub mod ticket;
