use std::{
    collections::{hash_map::RandomState, HashMap},
    hash::{BuildHasher, Hash},
};

use parking_lot::RwLock;

const DEFAULT_SHARD_COUNT: usize = 64;

/// Hash map split into independently locked shards.
///
/// Values are expected to carry their own interior mutability (atomics),
/// so updates to existing entries only take a shard's read lock. The write
/// lock is taken to insert or remove an entry.
pub struct ShardedMap<K, V, S = RandomState> {
    shards: Box<[RwLock<HashMap<K, V>>]>,
    hasher: S,
}

impl<K: Hash + Eq, V> Default for ShardedMap<K, V> {
    fn default() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }
}

impl<K: Hash + Eq, V> ShardedMap<K, V> {
    pub fn with_shard_count(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect();
        Self {
            shards,
            hasher: RandomState::new(),
        }
    }
}

impl<K: Hash + Eq, V, S: BuildHasher> ShardedMap<K, V, S> {
    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    /// Inserts `make()` under `key` unless the key is present. Returns
    /// whether this call inserted it; of any number of racing callers
    /// exactly one gets `true`.
    pub fn insert_if_absent(&self, key: K, make: impl FnOnce() -> V) -> bool {
        let mut shard = self.shard(&key).write();
        if shard.contains_key(&key) {
            return false;
        }
        shard.insert(key, make());
        true
    }

    /// Runs `f` on the value under `key`, inserting `make()` first if the
    /// key is missing.
    pub fn update_or_insert_with<R>(
        &self,
        key: K,
        make: impl FnOnce() -> V,
        f: impl FnOnce(&V) -> R,
    ) -> R {
        let lock = self.shard(&key);
        {
            let shard = lock.read();
            if let Some(value) = shard.get(&key) {
                return f(value);
            }
        }
        let mut shard = lock.write();
        f(shard.entry(key).or_insert_with(make))
    }

    pub fn with_value<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.shard(key).read().get(key).map(f)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// Maps every entry through `f`. Shards are visited one at a time, so
    /// the result is only a consistent snapshot when no writer is running.
    pub fn map_entries<R>(&self, mut f: impl FnMut(&K, &V) -> R) -> Vec<R> {
        let mut out = Vec::new();
        for shard in self.shards.iter() {
            out.extend(shard.read().iter().map(|(k, v)| f(k, v)));
        }
        out
    }

    pub fn keys(&self) -> Vec<K>
    where
        K: Clone,
    {
        self.map_entries(|k, _| k.clone())
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.read().is_empty())
    }
}
