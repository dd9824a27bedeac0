//! Per-session memoization of permission results.

use std::{collections::HashMap, sync::Mutex};

use crate::request::CacheKey;

use super::{
    instance::InstantiatedPermission,
    model::{ModelKind, Op},
    predicate::Predicate,
};

/// Entries kept per map before it is flushed.
const MAX_ENTRIES: usize = 512;

pub(crate) type CheckKey = (ModelKind, Op, Option<String>, Option<i64>);
pub(crate) type FilterKey = (ModelKind, Op, Option<String>);

#[derive(Debug, Default)]
struct SessionCache {
    raw: HashMap<Op, Vec<InstantiatedPermission>>,
    checks: HashMap<CheckKey, bool>,
    filters: HashMap<FilterKey, Predicate>,
}

fn bounded_insert<K: std::hash::Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, value: V) {
    if map.len() >= MAX_ENTRIES {
        map.clear();
    }
    map.insert(key, value);
}

#[derive(Debug, Default)]
pub(crate) struct PermissionCache {
    sessions: Mutex<HashMap<CacheKey, SessionCache>>,
}

impl PermissionCache {
    fn with_session<T>(&self, key: &CacheKey, f: impl FnOnce(&mut SessionCache) -> T) -> Option<T> {
        let mut sessions = self.sessions.lock().ok()?;
        let session = sessions.entry(key.clone()).or_default();
        Some(f(session))
    }

    pub(crate) fn raw(&self, key: &CacheKey, op: Op) -> Option<Vec<InstantiatedPermission>> {
        self.with_session(key, |session| session.raw.get(&op).cloned())
            .flatten()
    }

    pub(crate) fn put_raw(&self, key: &CacheKey, op: Op, rules: Vec<InstantiatedPermission>) {
        self.with_session(key, |session| bounded_insert(&mut session.raw, op, rules));
    }

    pub(crate) fn check(&self, key: &CacheKey, check: &CheckKey) -> Option<bool> {
        self.with_session(key, |session| session.checks.get(check).copied())
            .flatten()
    }

    pub(crate) fn put_check(&self, key: &CacheKey, check: CheckKey, allowed: bool) {
        self.with_session(key, |session| bounded_insert(&mut session.checks, check, allowed));
    }

    pub(crate) fn filter(&self, key: &CacheKey, filter: &FilterKey) -> Option<Predicate> {
        self.with_session(key, |session| session.filters.get(filter).cloned())
            .flatten()
    }

    pub(crate) fn put_filter(&self, key: &CacheKey, filter: FilterKey, predicate: Predicate) {
        self.with_session(key, |session| {
            bounded_insert(&mut session.filters, filter, predicate)
        });
    }

    /// Session keys currently cached.
    pub(crate) fn keys(&self) -> Vec<CacheKey> {
        self.sessions
            .lock()
            .map(|sessions| sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn forget(&self, key: &CacheKey) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.remove(key);
        }
    }

    pub(crate) fn clear(&self) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.clear();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_per_session() {
        let cache = PermissionCache::default();
        let alice = CacheKey::Session("alice".to_string());
        let bob = CacheKey::Session("bob".to_string());
        let key = (ModelKind::Account, Op::View, None, Some(1));

        cache.put_check(&alice, key.clone(), true);
        assert_eq!(cache.check(&alice, &key), Some(true));
        assert_eq!(cache.check(&bob, &key), None);

        cache.forget(&alice);
        assert_eq!(cache.check(&alice, &key), None);
    }

    #[test]
    fn flushes_when_full() {
        let cache = PermissionCache::default();
        let session = CacheKey::Session("s".to_string());
        for pk in 0..MAX_ENTRIES as i64 {
            cache.put_check(&session, (ModelKind::Account, Op::View, None, Some(pk)), true);
        }
        let first = (ModelKind::Account, Op::View, None, Some(0));
        assert_eq!(cache.check(&session, &first), Some(true));
        cache.put_check(&session, (ModelKind::Account, Op::View, None, Some(-1)), true);
        assert_eq!(cache.check(&session, &first), None);
    }
}
