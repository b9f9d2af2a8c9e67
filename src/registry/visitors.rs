use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, info};

use crate::helpers::time::{never, now, to_chrono};
use crate::observability::metrics::get_metrics;
use crate::registry::TokenRegistry;

impl TokenRegistry {
    /// Forgets a visitor and releases its usage of every token type it touched.
    pub fn unregister_visitor(&self, visitor_id: &str) {
        if visitor_id.is_empty() {
            return;
        }
        if let Some(token_types) = self.ledger.unregister(visitor_id) {
            debug!(visitor_id, types = token_types.len(), "visitor unregistered");
            self.release_usage(&token_types);
            get_metrics().active_visitors.set(self.ledger.len() as i64);
        }
    }

    /// Unregisters every visitor idle for longer than `threshold`; returns how many went.
    pub fn cleanup_inactive_visitors(&self, threshold: Duration) -> usize {
        let cutoff = now().checked_sub_signed(to_chrono(threshold)).unwrap_or_else(never);
        let mut evicted = 0;
        for visitor_id in self.ledger.inactive_since(cutoff) {
            // re-checked under the map lock: a visitor seen since the scan stays
            if let Some(token_types) = self.ledger.unregister_if_inactive(&visitor_id, cutoff) {
                self.release_usage(&token_types);
                evicted += 1;
            }
        }

        let metrics = get_metrics();
        metrics.evicted_visitors.inc_by(evicted as u64);
        metrics.active_visitors.set(self.ledger.len() as i64);
        if evicted > 0 {
            info!("evicted {} inactive visitors, {} remain", evicted, self.ledger.len());
        }
        evicted
    }

    fn release_usage(&self, token_types: &HashSet<String>) {
        for token_type in token_types {
            if let Some(record) = self.store.get(token_type) {
                record.adjust_usage(-1);
            }
        }
    }
}
