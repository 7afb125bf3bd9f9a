use mywire_core::cache::StringCache;

use crate::statement::PreparedStatementHandle;

/// Server-side statement handles kept for reuse, by normalized SQL.
///
/// Handles are checked out with [`take`](Self::take) and come back with
/// [`put`](Self::put), so a handle is never cached and in use at the same time. Whatever
/// `put` hands back must be closed on the server by the caller.
#[derive(Debug)]
pub(crate) struct StatementCache {
    inner: StringCache<PreparedStatementHandle>,
}

impl StatementCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: StringCache::new(capacity),
        }
    }

    /// Checks out the cached handle for `sql`, if any.
    pub(crate) fn take(&mut self, sql: &str) -> Option<PreparedStatementHandle> {
        self.inner.remove(normalize(sql))
    }

    /// Returns a handle to the cache.
    ///
    /// Yields the handles to close: the least recently used one when the cache is full, an
    /// older handle for the same SQL, or `handle` itself when it is not poolable or caching
    /// is disabled.
    pub(crate) fn put(&mut self, handle: PreparedStatementHandle) -> Option<PreparedStatementHandle> {
        if handle.closed {
            return None;
        }

        if !handle.poolable {
            return Some(handle);
        }

        let key = normalize(&handle.sql).to_owned();
        self.inner.insert(&key, handle)
    }

    /// Empties the cache, returning every handle, least recently used first.
    pub(crate) fn drain(&mut self) -> Vec<PreparedStatementHandle> {
        self.inner.drain()
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    fn contains(&mut self, sql: &str) -> bool {
        self.inner.get_mut(normalize(sql)).is_some()
    }
}

/// Statements differing only in surrounding whitespace or a trailing `;` share a handle.
fn normalize(sql: &str) -> &str {
    let sql = sql.trim();
    sql.strip_suffix(';').map_or(sql, str::trim_end)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::statement::FetchMode;

    fn handle(id: u32, sql: &str) -> PreparedStatementHandle {
        PreparedStatementHandle {
            id,
            sql: sql.to_owned(),
            param_count: 0,
            params: Arc::default(),
            columns: Arc::default(),
            column_names: Arc::new(HashMap::new()),
            poolable: true,
            closed: false,
            fetch_mode: FetchMode::All,
        }
    }

    #[test]
    fn it_normalizes_keys() {
        assert_eq!(normalize("  SELECT 1 ;\n"), "SELECT 1");
        assert_eq!(normalize("SELECT ';'"), "SELECT ';'");
    }

    #[test]
    fn it_evicts_the_least_recently_used_handle() {
        let mut cache = StatementCache::new(2);

        assert!(cache.put(handle(1, "SELECT 1")).is_none());
        assert!(cache.put(handle(2, "SELECT 2")).is_none());

        // checking out and returning refreshes recency
        let first = cache.take("SELECT 1").unwrap();
        assert!(cache.put(first).is_none());

        let evicted = cache.put(handle(3, "SELECT 3")).unwrap();

        assert_eq!(evicted.id, 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn it_never_hands_out_a_checked_out_handle() {
        let mut cache = StatementCache::new(4);
        cache.put(handle(1, "SELECT ?"));

        let checked_out = cache.take("SELECT ?").unwrap();

        assert!(cache.take("SELECT ?").is_none());
        assert_eq!(checked_out.id, 1);
    }

    #[test]
    fn it_replaces_an_older_handle_for_the_same_sql() {
        let mut cache = StatementCache::new(4);
        cache.put(handle(1, "SELECT ?"));

        let replaced = cache.put(handle(2, "SELECT ?;")).unwrap();

        assert_eq!(replaced.id, 1);
        assert_eq!(cache.take("SELECT ?").unwrap().id, 2);
    }

    #[test]
    fn it_closes_what_it_cannot_keep() {
        let mut disabled = StatementCache::new(0);
        assert_eq!(disabled.put(handle(1, "SELECT 1")).unwrap().id, 1);
        assert_eq!(disabled.len(), 0);

        let mut cache = StatementCache::new(4);
        let mut not_poolable = handle(2, "SELECT 2");
        not_poolable.set_poolable(false);

        assert_eq!(cache.put(not_poolable).unwrap().id, 2);
        assert!(!cache.contains("SELECT 2"));

        // toggled back before release: cached as usual
        let mut toggled = handle(3, "SELECT 3");
        toggled.set_poolable(false);
        toggled.set_poolable(true);

        assert!(cache.put(toggled).is_none());
        assert!(cache.contains("SELECT 3"));
    }
}
