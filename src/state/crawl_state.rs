use crate::state::CrawlPhase;
use crate::CrawlError;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Shared progress of a single crawl run
///
/// The coordinator owns the phase and the current listing URL. Item tasks
/// only touch the seen set and the counters, so those are safe to update from
/// many tasks at once. One `CrawlState` lives for exactly one run.
#[derive(Debug)]
pub struct CrawlState {
    phase: Mutex<CrawlPhase>,
    current_url: Mutex<String>,
    seen: Mutex<HashSet<String>>,
    pages_processed: AtomicU32,
    items_dispatched: AtomicU32,
    items_processed: AtomicU32,
    records_saved: AtomicU32,
    items_failed: AtomicU32,
}

impl CrawlState {
    pub fn new(start_url: impl Into<String>) -> Self {
        Self {
            phase: Mutex::new(CrawlPhase::Idle),
            current_url: Mutex::new(start_url.into()),
            seen: Mutex::new(HashSet::new()),
            pages_processed: AtomicU32::new(0),
            items_dispatched: AtomicU32::new(0),
            items_processed: AtomicU32::new(0),
            records_saved: AtomicU32::new(0),
            items_failed: AtomicU32::new(0),
        }
    }

    pub fn phase(&self) -> CrawlPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Moves the run to `next`, rejecting steps the state machine does not allow
    pub fn transition(&self, next: CrawlPhase) -> Result<(), CrawlError> {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if !phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: *phase,
                to: next,
            });
        }
        tracing::trace!("Crawl phase {} -> {}", *phase, next);
        *phase = next;
        Ok(())
    }

    pub fn current_url(&self) -> String {
        self.current_url
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_current_url(&self, url: impl Into<String>) {
        *self.current_url.lock().unwrap_or_else(|e| e.into_inner()) = url.into();
    }

    /// Inserts a canonical URL into the seen set
    ///
    /// Returns true if the URL was not seen before in this run. The check and
    /// the insert happen under one lock, so two callers can never both win.
    pub fn mark_seen(&self, url: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string())
    }

    pub fn seen_count(&self) -> usize {
        self.seen.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Claims one item slot if fewer than `max_items` were claimed so far
    pub fn try_reserve_item(&self, max_items: u32) -> bool {
        self.items_dispatched
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max_items).then_some(n + 1)
            })
            .is_ok()
    }

    pub fn quota_reached(&self, max_items: u32) -> bool {
        self.items_dispatched.load(Ordering::SeqCst) >= max_items
    }

    pub fn record_page(&self) -> u32 {
        self.pages_processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a completed item attempt; `saved` is true when a new record was stored
    pub fn record_item_done(&self, saved: bool) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
        if saved {
            self.records_saved.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records an item whose retries were exhausted
    pub fn record_item_failed(&self) {
        self.items_processed.fetch_add(1, Ordering::SeqCst);
        self.items_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn pages_processed(&self) -> u32 {
        self.pages_processed.load(Ordering::SeqCst)
    }

    pub fn items_dispatched(&self) -> u32 {
        self.items_dispatched.load(Ordering::SeqCst)
    }

    pub fn items_processed(&self) -> u32 {
        self.items_processed.load(Ordering::SeqCst)
    }

    pub fn records_saved(&self) -> u32 {
        self.records_saved.load(Ordering::SeqCst)
    }

    pub fn items_failed(&self) -> u32 {
        self.items_failed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_state() {
        let state = CrawlState::new("https://auto.ria.com/uk/car/used/");
        assert_eq!(state.phase(), CrawlPhase::Idle);
        assert_eq!(state.current_url(), "https://auto.ria.com/uk/car/used/");
        assert_eq!(state.items_processed(), 0);
        assert_eq!(state.seen_count(), 0);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let state = CrawlState::new("https://auto.ria.com/");
        let result = state.transition(CrawlPhase::DispatchingItems);
        assert!(matches!(
            result,
            Err(CrawlError::InvalidTransition {
                from: CrawlPhase::Idle,
                to: CrawlPhase::DispatchingItems
            })
        ));
        assert_eq!(state.phase(), CrawlPhase::Idle);
    }

    #[test]
    fn test_mark_seen_insert_if_absent() {
        let state = CrawlState::new("https://auto.ria.com/");
        assert!(state.mark_seen("https://auto.ria.com/auto_a_1.html"));
        assert!(!state.mark_seen("https://auto.ria.com/auto_a_1.html"));
        assert!(state.mark_seen("https://auto.ria.com/auto_a_2.html"));
        assert_eq!(state.seen_count(), 2);
    }

    #[test]
    fn test_reserve_stops_at_quota() {
        let state = CrawlState::new("https://auto.ria.com/");
        assert!(state.try_reserve_item(2));
        assert!(state.try_reserve_item(2));
        assert!(!state.try_reserve_item(2));
        assert!(state.quota_reached(2));
        assert_eq!(state.items_dispatched(), 2);
    }

    #[test]
    fn test_zero_quota_reserves_nothing() {
        let state = CrawlState::new("https://auto.ria.com/");
        assert!(!state.try_reserve_item(0));
        assert!(state.quota_reached(0));
    }

    #[test]
    fn test_concurrent_mark_seen_single_winner() {
        let state = Arc::new(CrawlState::new("https://auto.ria.com/"));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || state.mark_seen("https://auto.ria.com/auto_x_9.html"))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_item_counters() {
        let state = CrawlState::new("https://auto.ria.com/");
        state.record_item_done(true);
        state.record_item_done(false);
        state.record_item_failed();
        assert_eq!(state.items_processed(), 3);
        assert_eq!(state.records_saved(), 1);
        assert_eq!(state.items_failed(), 1);
    }
}
