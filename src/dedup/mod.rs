//! Identifiers of tickets already notified on or evaluated.
//!
//! Shared by every in-flight cycle. The set only grows for the lifetime of
//! the process and is never persisted; a bounded (LRU) or external store
//! would slot in behind the same three methods.

use crate::ticket::Ticket;
use dashmap::DashSet;
use std::sync::Arc;

/// Thread-safe set of seen ticket identifiers. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct DedupStore {
    seen: Arc<DashSet<String>>,
}

impl DedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the tickets whose identifier has not been marked, in batch order.
    pub fn filter_unseen(&self, tickets: Vec<Ticket>) -> Vec<Ticket> {
        tickets
            .into_iter()
            .filter(|t| !self.seen.contains(&t.identifier))
            .collect()
    }

    /// Record `identifier`. Returns true if it was not already present.
    pub fn mark_seen(&self, identifier: &str) -> bool {
        self.seen.insert(identifier.to_string())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn ticket(id: &str, price: i64) -> Ticket {
        Ticket::new(id, Decimal::from(price), "1", "1")
    }

    #[test]
    fn test_filter_unseen_exact_membership() {
        let store = DedupStore::new();
        store.mark_seen("b");

        let unseen = store.filter_unseen(vec![ticket("a", 10), ticket("b", 5), ticket("c", 7)]);
        let ids: Vec<&str> = unseen.iter().map(|t| t.identifier.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        // Filtering is a pure read.
        assert!(!store.contains("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_seen_idempotent() {
        let store = DedupStore::new();
        assert!(store.is_empty());
        assert!(store.mark_seen("x"));
        assert!(!store.mark_seen("x"));
        assert_eq!(store.len(), 1);
        assert!(store.contains("x"));
    }

    #[test]
    fn test_clones_share_state() {
        let store = DedupStore::new();
        let other = store.clone();
        other.mark_seen("shared");
        assert!(store.contains("shared"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_marks() {
        let store = DedupStore::new();
        let mut handles = Vec::new();
        for worker in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..250 {
                    // Half the ids overlap between workers.
                    store.mark_seen(&format!("id-{}", (worker % 2) * 1000 + i));
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.len(), 500);
    }
}
