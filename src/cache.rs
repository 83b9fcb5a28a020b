//! Bounded ordered map with a pluggable eviction hook.
//!
//! Backed by a `HashMap` for key lookup and an arena-based doubly-linked
//! list for recency order, so `put`/`get`/`remove` are all amortized O(1)
//! without unsafe code. An insert that breaches the size bound evicts exactly
//! one entry - the least recently used or the oldest inserted, depending on
//! the configured [`OrderMode`] - and hands it to the eviction hook before
//! the operation completes. Explicit [`remove`](BoundedLruCache::remove) and
//! [`drain`](BoundedLruCache::drain) bypass the hook: removal on request is
//! not eviction.
//!
//! Not thread-safe; callers needing concurrent access serialize externally.
//!
//! ```
//! use transport_pool::{BoundedLruCache, OrderMode};
//!
//! let mut cache = BoundedLruCache::new(2, OrderMode::Access);
//! cache.put(1, "one");
//! cache.put(2, "two");
//! cache.get(&1);
//! cache.put(3, "three"); // evicts 2, the least recently used
//! assert!(cache.get(&2).is_none());
//! assert_eq!(cache.len(), 2);
//! ```

use std::collections::HashMap;
use std::hash::Hash;

/// Sentinel for null links in the arena list.
const NIL: usize = usize::MAX;

/// Which entry a breaching insert evicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderMode {
    /// Least-recently-used order: lookups and updates promote an entry.
    #[default]
    Access,
    /// Insertion order: only fresh inserts affect the order.
    Insertion,
}

struct Node<K, V> {
    key: K,
    value: Option<V>,
    prev: usize,
    next: usize,
}

type EvictionHook<K, V> = Box<dyn FnMut(K, V) + Send>;

/// Fixed-capacity key/value map with deterministic eviction order.
pub struct BoundedLruCache<K, V> {
    max_size: usize,
    mode: OrderMode,
    map: HashMap<K, usize>,
    arena: Vec<Node<K, V>>,
    head: usize,
    tail: usize,
    free: usize,
    on_evict: Option<EvictionHook<K, V>>,
}

impl<K: Eq + Hash + Clone, V> BoundedLruCache<K, V> {
    /// Create a cache bounded at `max_size` entries with no eviction hook.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize, mode: OrderMode) -> Self {
        assert!(max_size > 0, "cache bound must be positive");
        Self {
            max_size,
            mode,
            map: HashMap::new(),
            arena: Vec::new(),
            head: NIL,
            tail: NIL,
            free: NIL,
            on_evict: None,
        }
    }

    /// Create a cache whose evicted entries are handed to `hook`.
    ///
    /// The hook runs synchronously, exactly once per evicted entry, as part
    /// of the `put` that breached the bound.
    pub fn with_eviction(
        max_size: usize,
        mode: OrderMode,
        hook: impl FnMut(K, V) + Send + 'static,
    ) -> Self {
        let mut cache = Self::new(max_size, mode);
        cache.on_evict = Some(Box::new(hook));
        cache
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Insert or update an entry, returning the replaced value if any.
    ///
    /// If the insert pushes the size past the bound, the single
    /// least-recently-used (or oldest-inserted) entry is evicted. Updates
    /// never trigger eviction; in access order they promote the entry, in
    /// insertion order they leave it in place.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if let Some(&idx) = self.map.get(&key) {
            let old = self.arena[idx].value.replace(value);
            if self.mode == OrderMode::Access {
                self.move_to_front(idx);
            }
            return old;
        }

        let idx = self.allocate(key.clone(), value);
        self.attach_front(idx);
        self.map.insert(key, idx);

        if self.map.len() > self.max_size {
            self.evict_one();
        }
        None
    }

    /// Look up a value; promotes the entry in access order.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        if self.mode == OrderMode::Access {
            self.move_to_front(idx);
        }
        self.arena[idx].value.as_ref()
    }

    /// Mutable lookup; same ordering effect as [`get`](Self::get).
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let idx = *self.map.get(key)?;
        if self.mode == OrderMode::Access {
            self.move_to_front(idx);
        }
        self.arena[idx].value.as_mut()
    }

    /// Look up a value without touching the order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.arena[idx].value.as_ref()
    }

    /// Remove an entry on request. The eviction hook is not invoked.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        let value = self.arena[idx].value.take();
        self.push_free(idx);
        value
    }

    /// Rebind the size cap.
    ///
    /// Entries beyond a smaller cap are not evicted until the next mutating
    /// operation, which still evicts one entry at a time.
    ///
    /// # Panics
    /// Panics if `max_size` is zero.
    pub fn set_max_size(&mut self, max_size: usize) {
        assert!(max_size > 0, "cache bound must be positive");
        self.max_size = max_size;
    }

    /// Iterate entries from most-recently-used to least-recently-used
    /// (newest to oldest insertion in insertion order).
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            cache: self,
            cursor: self.head,
        }
    }

    /// Empty the cache, returning every entry in order. No hook is invoked.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while cursor != NIL {
            let next = self.arena[cursor].next;
            let key = self.arena[cursor].key.clone();
            if let Some(value) = self.arena[cursor].value.take() {
                drained.push((key, value));
            }
            cursor = next;
        }
        self.map.clear();
        self.arena.clear();
        self.head = NIL;
        self.tail = NIL;
        self.free = NIL;
        drained
    }

    fn evict_one(&mut self) {
        let victim = self.tail;
        if victim == NIL {
            return;
        }
        self.detach(victim);
        let key = self.arena[victim].key.clone();
        let value = self.arena[victim]
            .value
            .take()
            .expect("eviction victim slot holds no value");
        self.map.remove(&key);
        self.push_free(victim);
        if let Some(hook) = self.on_evict.as_mut() {
            hook(key, value);
        }
    }

    fn allocate(&mut self, key: K, value: V) -> usize {
        if self.free != NIL {
            let idx = self.free;
            self.free = self.arena[idx].next;
            self.arena[idx].key = key;
            self.arena[idx].value = Some(value);
            idx
        } else {
            self.arena.push(Node {
                key,
                value: Some(value),
                prev: NIL,
                next: NIL,
            });
            self.arena.len() - 1
        }
    }

    fn push_free(&mut self, idx: usize) {
        self.arena[idx].next = self.free;
        self.arena[idx].prev = NIL;
        self.free = idx;
    }

    fn attach_front(&mut self, idx: usize) {
        self.arena[idx].prev = NIL;
        self.arena[idx].next = self.head;
        if self.head != NIL {
            self.arena[self.head].prev = idx;
        }
        self.head = idx;
        if self.tail == NIL {
            self.tail = idx;
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = (self.arena[idx].prev, self.arena[idx].next);
        if prev != NIL {
            self.arena[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.arena[next].prev = prev;
        } else {
            self.tail = prev;
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == idx {
            return;
        }
        self.detach(idx);
        self.attach_front(idx);
    }
}

/// Iterator over cache entries, most recent first.
pub struct Iter<'a, K, V> {
    cache: &'a BoundedLruCache<K, V>,
    cursor: usize,
}

impl<'a, K: Eq + Hash + Clone, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let node = &self.cache.arena[self.cursor];
        self.cursor = node.next;
        let value = node.value.as_ref().expect("linked slot holds no value");
        Some((&node.key, value))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    fn recording_cache(
        max_size: usize,
        mode: OrderMode,
    ) -> (BoundedLruCache<u32, &'static str>, Arc<Mutex<Vec<u32>>>) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&evicted);
        let cache = BoundedLruCache::with_eviction(max_size, mode, move |key, _value| {
            log.lock().push(key);
        });
        (cache, evicted)
    }

    #[test]
    fn breaching_insert_evicts_exactly_one() {
        let (mut cache, evicted) = recording_cache(3, OrderMode::Access);
        for key in 0..4 {
            cache.put(key, "v");
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(*evicted.lock(), vec![0]);
        assert!(!cache.contains_key(&0));
    }

    #[test]
    fn access_promotes_entry() {
        let (mut cache, evicted) = recording_cache(2, OrderMode::Access);
        cache.put(1, "one");
        cache.put(2, "two");
        cache.get(&1);
        cache.put(3, "three");
        assert_eq!(*evicted.lock(), vec![2]);
        assert!(cache.contains_key(&1));
    }

    #[test]
    fn insertion_order_ignores_access() {
        let (mut cache, evicted) = recording_cache(2, OrderMode::Insertion);
        cache.put(1, "one");
        cache.put(2, "two");
        cache.get(&1);
        cache.put(1, "uno"); // update keeps position
        cache.put(3, "three");
        assert_eq!(*evicted.lock(), vec![1]);
    }

    #[test]
    fn update_does_not_evict() {
        let (mut cache, evicted) = recording_cache(2, OrderMode::Access);
        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.put(2, "dos"), Some("two"));
        assert_eq!(cache.len(), 2);
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn remove_and_drain_skip_the_hook() {
        let (mut cache, evicted) = recording_cache(3, OrderMode::Access);
        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.remove(&1), Some("one"));
        let drained = cache.drain();
        assert_eq!(drained, vec![(2, "two")]);
        assert!(cache.is_empty());
        assert!(evicted.lock().is_empty());
    }

    #[test]
    fn shrinking_the_bound_is_lazy() {
        let (mut cache, evicted) = recording_cache(4, OrderMode::Access);
        for key in 0..4 {
            cache.put(key, "v");
        }
        cache.set_max_size(2);
        assert_eq!(cache.len(), 4, "no proactive eviction on rebind");
        cache.put(9, "v");
        assert_eq!(evicted.lock().len(), 1, "one eviction per mutating op");
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn iterates_most_recent_first() {
        let mut cache = BoundedLruCache::new(3, OrderMode::Access);
        cache.put(1, "one");
        cache.put(2, "two");
        cache.put(3, "three");
        cache.get(&1);
        let keys: Vec<u32> = cache.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 2]);
    }

    #[test]
    fn freed_slots_are_recycled() {
        let mut cache = BoundedLruCache::new(2, OrderMode::Access);
        for round in 0..16u32 {
            cache.put(round, round);
            cache.remove(&round);
        }
        cache.put(100, 100);
        cache.put(101, 101);
        assert_eq!(cache.peek(&100), Some(&100));
        assert_eq!(cache.peek(&101), Some(&101));
    }
}
