use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct VisitorState {
    active_token_types: HashSet<String>,
    last_activity_at: DateTime<Utc>,
}

/// Which token types an anonymous visitor uses and when it was last seen.
pub struct VisitorRecord {
    state: Mutex<VisitorState>,
}

impl VisitorRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(VisitorState {
                active_token_types: HashSet::new(),
                last_activity_at: now,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VisitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.lock().last_activity_at
    }

    pub fn active_token_types(&self) -> HashSet<String> {
        self.lock().active_token_types.clone()
    }

    fn touch(&self, token_type: &str, now: DateTime<Utc>) {
        let mut state = self.lock();
        state.active_token_types.insert(token_type.to_owned());
        state.last_activity_at = now;
    }

    fn is_inactive(&self, cutoff: DateTime<Utc>) -> bool {
        self.lock().last_activity_at < cutoff
    }
}

/// visitor_id -> visitor record
#[derive(Clone, Default)]
pub struct VisitorLedger {
    inner: Arc<DashMap<String, VisitorRecord>>,
}

impl VisitorLedger {
    pub fn new() -> Self {
        Self { inner: Arc::new(DashMap::new()) }
    }

    /// Registers `token_type` for the visitor and refreshes its activity time.
    /// Returns true when the visitor was not tracked before.
    pub fn touch(&self, visitor_id: &str, token_type: &str, now: DateTime<Utc>) -> bool {
        let mut created = false;
        let visitor = self
            .inner
            .entry(visitor_id.to_owned())
            .or_insert_with(|| {
                created = true;
                VisitorRecord::new(now)
            });
        visitor.touch(token_type, now);
        created
    }

    /// Removes the visitor and hands back the token types it had registered.
    pub fn unregister(&self, visitor_id: &str) -> Option<HashSet<String>> {
        self.inner
            .remove(visitor_id)
            .map(|(_, visitor)| visitor.active_token_types())
    }

    /// Removes the visitor only if it is still inactive at removal time, so a visitor
    /// touched between the sweep scan and the removal survives.
    pub fn unregister_if_inactive(&self, visitor_id: &str, cutoff: DateTime<Utc>) -> Option<HashSet<String>> {
        self.inner
            .remove_if(visitor_id, |_, visitor| visitor.is_inactive(cutoff))
            .map(|(_, visitor)| visitor.active_token_types())
    }

    /// Ids of visitors whose last activity is older than `cutoff`.
    pub fn inactive_since(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.inner
            .iter()
            .filter(|entry| entry.value().is_inactive(cutoff))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn active_token_types(&self, visitor_id: &str) -> Option<HashSet<String>> {
        self.inner.get(visitor_id).map(|visitor| visitor.active_token_types())
    }

    pub fn last_activity_at(&self, visitor_id: &str) -> Option<DateTime<Utc>> {
        self.inner.get(visitor_id).map(|visitor| visitor.last_activity_at())
    }

    pub fn contains(&self, visitor_id: &str) -> bool {
        self.inner.contains_key(visitor_id)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn touch_accumulates_token_types() {
        let ledger = VisitorLedger::new();
        let now = Utc::now();
        assert!(ledger.touch("v1", "api", now));
        assert!(!ledger.touch("v1", "analytics", now));
        assert!(!ledger.touch("v1", "api", now));

        let types = ledger.active_token_types("v1").unwrap();
        assert_eq!(types.len(), 2);
        assert!(types.contains("api") && types.contains("analytics"));
    }

    #[test]
    fn inactive_visitors_are_found_and_removed() {
        let ledger = VisitorLedger::new();
        let now = Utc::now();
        ledger.touch("old", "api", now - Duration::minutes(45));
        ledger.touch("fresh", "api", now);

        let cutoff = now - Duration::minutes(30);
        assert_eq!(ledger.inactive_since(cutoff), vec!["old".to_string()]);

        let types = ledger.unregister_if_inactive("old", cutoff).unwrap();
        assert!(types.contains("api"));
        assert!(ledger.unregister_if_inactive("fresh", cutoff).is_none());
        assert!(ledger.contains("fresh"));
        assert!(!ledger.contains("old"));
    }

    #[test]
    fn touched_visitor_survives_removal_recheck() {
        let ledger = VisitorLedger::new();
        let now = Utc::now();
        ledger.touch("v1", "api", now - Duration::hours(1));
        let cutoff = now - Duration::minutes(30);
        assert_eq!(ledger.inactive_since(cutoff).len(), 1);

        ledger.touch("v1", "api", now);
        assert!(ledger.unregister_if_inactive("v1", cutoff).is_none());
        assert_eq!(ledger.last_activity_at("v1"), Some(now));
    }
}
