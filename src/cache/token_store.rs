use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::cache::token_record::TokenRecord;
use crate::persistence::backup::BackupEntry;

/// token_type -> shared record. Records are created lazily and never removed.
#[derive(Clone, Default)]
pub struct TokenStore {
    inner: Arc<DashMap<String, Arc<TokenRecord>>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self { inner: Arc::new(DashMap::new()) }
    }

    pub fn get(&self, token_type: &str) -> Option<Arc<TokenRecord>> {
        self.inner.get(token_type).map(|entry| entry.value().clone())
    }

    /// Returns the record for `token_type` and whether this call created it.
    /// Exactly one caller observes `true` per token type.
    pub fn get_or_create(&self, token_type: &str) -> (Arc<TokenRecord>, bool) {
        if let Some(record) = self.get(token_type) {
            return (record, false);
        }
        match self.inner.entry(token_type.to_owned()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let record = Arc::new(TokenRecord::pending(token_type));
                entry.insert(record.clone());
                (record, true)
            }
        }
    }

    /// Merges one backup entry; returns true when the entry ended up in the store.
    pub fn merge_restored(&self, token_type: &str, entry: &BackupEntry, now: DateTime<Utc>) -> bool {
        match self.inner.entry(token_type.to_owned()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(TokenRecord::restored(token_type, entry)));
                true
            }
            Entry::Occupied(occupied) => occupied.get().merge_restored(entry, now),
        }
    }

    /// Point-in-time list of records; the map is not locked while callers use them.
    pub fn records(&self) -> Vec<Arc<TokenRecord>> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
