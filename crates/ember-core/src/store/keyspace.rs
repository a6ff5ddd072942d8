//! The keyspace: a data map and an independent expiry map, each behind its
//! own lock. Lazy expiration happens on every read; active expiration is
//! driven by [`crate::store::expiration::spawn_expiration_loop`].

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::Mutex;
use rand::seq::index::sample;
use rustc_hash::FxHashMap;

use super::value::Value;

/// Upper bound on how many keys a single active-expiration sweep inspects.
pub const ACTIVE_EXPIRE_SAMPLE_SIZE: usize = 20;

/// The store's keyspace.
///
/// `data` and `expiry` are two independent maps rather than one map of
/// `(Value, Option<i64>)` pairs, matching the wire format's separate
/// opcode families for values and expiry timestamps. Lock ordering is
/// always expiry-before-data to avoid deadlocks between the read path
/// (lazy expiry check) and the active expiration sweep.
pub struct Keyspace {
    data: Mutex<FxHashMap<Bytes, Value>>,
    expiry: Mutex<FxHashMap<Bytes, i64>>,
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyspace {
    /// Creates an empty keyspace.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(FxHashMap::default()),
            expiry: Mutex::new(FxHashMap::default()),
        }
    }

    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_millis() as i64
    }

    /// Removes `key` from both maps if its expiry has passed. Must be called
    /// with the expiry lock already held, to keep the expiry-before-data
    /// ordering.
    fn expire_if_due(
        key: &Bytes,
        expiry: &mut FxHashMap<Bytes, i64>,
        data: &mut FxHashMap<Bytes, Value>,
        now: i64,
    ) -> bool {
        if let Some(&at) = expiry.get(key) {
            if at <= now {
                expiry.remove(key);
                data.remove(key);
                return true;
            }
        }
        false
    }

    /// Sets `key` to `value`, optionally with an expiry timestamp (ms since
    /// epoch). A prior expiry on `key` is cleared unless `expire_at_ms`
    /// replaces it.
    pub fn set(&self, key: Bytes, value: Value, expire_at_ms: Option<i64>) {
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        match expire_at_ms {
            Some(at) => {
                expiry.insert(key.clone(), at);
            }
            None => {
                expiry.remove(&key);
            }
        }
        data.insert(key, value);
    }

    /// Looks up `key`, lazily expiring it first if its TTL has passed.
    #[must_use]
    pub fn get(&self, key: &Bytes) -> Option<Value> {
        let now = Self::now_ms();
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        if Self::expire_if_due(key, &mut expiry, &mut data, now) {
            return None;
        }
        data.get(key).cloned()
    }

    /// Removes `key` outright, returning whether it was present (and not
    /// already expired).
    pub fn delete(&self, key: &Bytes) -> bool {
        let now = Self::now_ms();
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        let was_live = !Self::expire_if_due(key, &mut expiry, &mut data, now) && data.contains_key(key);
        expiry.remove(key);
        data.remove(key);
        was_live
    }

    /// Returns every live key whose name matches the glob `pattern`,
    /// lazily expiring each candidate as it is visited.
    #[must_use]
    pub fn keys_matching(&self, pattern: &[u8]) -> Vec<Bytes> {
        let now = Self::now_ms();
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        let candidates: Vec<Bytes> = data.keys().cloned().collect();
        let mut out = Vec::new();
        for key in candidates {
            if Self::expire_if_due(&key, &mut expiry, &mut data, now) {
                continue;
            }
            if crate::glob::matches(pattern, &key) {
                out.push(key);
            }
        }
        out
    }

    /// The number of keys currently present (including any not yet lazily
    /// expired), for `INFO`/diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Whether the keyspace holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expiry timestamp for `key`, if any, without mutating anything.
    #[must_use]
    pub fn expiry_of(&self, key: &Bytes) -> Option<i64> {
        self.expiry.lock().get(key).copied()
    }

    /// One active-expiration sweep: samples up to
    /// [`ACTIVE_EXPIRE_SAMPLE_SIZE`] keys from the expiry table uniformly
    /// without replacement and evicts the ones that are due. Returns the
    /// number of keys evicted.
    pub fn active_expire_cycle(&self) -> usize {
        let now = Self::now_ms();
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        let n = expiry.len();
        if n == 0 {
            return 0;
        }
        let sample_size = ACTIVE_EXPIRE_SAMPLE_SIZE.min(n);
        let indices = sample(&mut rand::thread_rng(), n, sample_size);
        let candidates: Vec<Bytes> = expiry
            .keys()
            .enumerate()
            .filter(|(i, _)| indices.contains(*i))
            .map(|(_, k)| k.clone())
            .collect();
        let mut evicted = 0;
        for key in candidates {
            if Self::expire_if_due(&key, &mut expiry, &mut data, now) {
                evicted += 1;
            }
        }
        evicted
    }

    /// Snapshots a consistent view of the whole keyspace (key, value, expiry)
    /// for `SAVE`, lazily dropping anything already expired.
    #[must_use]
    pub fn snapshot_entries(&self) -> Vec<(Bytes, Value, Option<i64>)> {
        let now = Self::now_ms();
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        let keys: Vec<Bytes> = data.keys().cloned().collect();
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if Self::expire_if_due(&key, &mut expiry, &mut data, now) {
                continue;
            }
            if let Some(value) = data.get(&key).cloned() {
                let at = expiry.get(&key).copied();
                out.push((key, value, at));
            }
        }
        out
    }

    /// Loads a `(key, value, expiry)` entry straight from a snapshot,
    /// bypassing expiry checks since the caller has already decided whether
    /// to skip already-expired entries.
    pub fn load_entry(&self, key: Bytes, value: Value, expire_at_ms: Option<i64>) {
        let mut expiry = self.expiry.lock();
        let mut data = self.data.lock();
        if let Some(at) = expire_at_ms {
            expiry.insert(key.clone(), at);
        }
        data.insert(key, value);
    }
}
