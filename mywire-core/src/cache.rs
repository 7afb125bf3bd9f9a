use hashlink::lru_cache::LruCache;

/// An LRU cache with string keys.
///
/// Differs from [`LruCache`] by making the removal process explicit to allow a caller to
/// clean up resources: every value that leaves the cache through eviction or replacement
/// is handed back to the caller.
///
/// Backs the prepared statement cache of a connection.
#[derive(Debug)]
pub struct StringCache<T> {
    inner: LruCache<String, T>,
    capacity: usize,
}

impl<T> StringCache<T> {
    /// Create a new cache with the given capacity. A capacity of `0` disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: LruCache::new(capacity.max(1)),
            capacity,
        }
    }

    /// Returns a mutable reference to the value corresponding to the given key
    /// in the cache, if any, and marks it as most recently used.
    pub fn get_mut(&mut self, k: &str) -> Option<&mut T> {
        self.inner.get_mut(k)
    }

    /// Removes the value for the given key, if any.
    pub fn remove(&mut self, k: &str) -> Option<T> {
        self.inner.remove(k)
    }

    /// Inserts a new item in the cache, returning the least recently used
    /// value if the cache is full, or if inserting with an existing key,
    /// the replaced existing value.
    ///
    /// With caching disabled the value itself is returned.
    pub fn insert(&mut self, k: &str, v: T) -> Option<T> {
        if !self.is_enabled() {
            return Some(v);
        }

        let mut lru_item = None;

        if self.inner.contains_key(k) {
            lru_item = self.inner.remove(k);
        } else if self.len() >= self.capacity {
            lru_item = self.remove_lru();
        }

        self.inner.insert(k.to_owned(), v);

        lru_item
    }

    /// The number of values in the cache.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes the least recently used item from the cache.
    pub fn remove_lru(&mut self) -> Option<T> {
        self.inner.remove_lru().map(|(_, v)| v)
    }

    /// Removes every value from the cache, least recently used first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len());

        while let Some(value) = self.remove_lru() {
            values.push(value);
        }

        values
    }

    /// True if cache has a value for the given key.
    pub fn contains_key(&self, k: &str) -> bool {
        self.inner.contains_key(k)
    }

    /// Returns the maximum number of values the cache can hold.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if the cache capacity is more than 0.
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }
}

#[cfg(test)]
mod tests {
    use super::StringCache;

    #[test]
    fn it_evicts_the_least_recently_used() {
        let mut cache = StringCache::new(2);

        assert_eq!(cache.insert("a", 1), None);
        assert_eq!(cache.insert("b", 2), None);

        // touch `a` so `b` becomes the eviction candidate
        assert!(cache.get_mut("a").is_some());

        assert_eq!(cache.insert("c", 3), Some(2));
        assert!(cache.contains_key("a"));
        assert!(cache.contains_key("c"));
        assert!(!cache.contains_key("b"));
    }

    #[test]
    fn it_returns_replaced_values() {
        let mut cache = StringCache::new(2);

        cache.insert("a", 1);
        assert_eq!(cache.insert("a", 10), Some(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove("a"), Some(10));
    }

    #[test]
    fn it_hands_back_values_when_disabled() {
        let mut cache = StringCache::new(0);

        assert!(!cache.is_enabled());
        assert_eq!(cache.insert("a", 1), Some(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn it_drains_in_lru_order() {
        let mut cache = StringCache::new(3);

        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);

        assert_eq!(cache.drain(), vec![1, 2, 3]);
        assert!(cache.is_empty());
    }
}
