//! In-memory cache store partitioned into independently locked buckets
//!
//! Every operation hashes its key to one bucket, takes that bucket's lock for
//! its whole duration and scans the bucket list once. The scan doubles as
//! lazy expiration: anything past its expiry is unlinked as it is passed.

use crate::CacheError;
use crate::storage::bucket::{Bucket, ItemList, Slot};
use crate::storage::hasher::BucketHasher;
use crate::storage::item::{Item, current_timestamp};
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Result of a successful fetch. The value shares the stored buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub value: Bytes,
    pub flags: u32,
    pub cas: u64,
}

/// Store-wide counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Linked items, tombstones included
    pub items: usize,
    /// Items removed by lazy expiration
    pub purged: u64,
}

/// Lock-partitioned hash table of items
pub struct CacheStore {
    buckets: Box<[Bucket]>,
    hasher: BucketHasher,
    next_cas: AtomicU64,
    purged: AtomicU64,
}

impl CacheStore {
    /// Create a store with `buckets` slots (power of two)
    pub fn new(buckets: usize) -> Self {
        let buckets = buckets.max(1).next_power_of_two();
        Self {
            buckets: (0..buckets).map(|_| Bucket::new()).collect(),
            hasher: BucketHasher::new(buckets),
            next_cas: AtomicU64::new(1),
            purged: AtomicU64::new(0),
        }
    }

    /// Number of buckets
    pub fn buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Index of the bucket `key` hashes to
    pub fn bucket_of(&self, key: &[u8]) -> usize {
        self.hasher.bucket(key)
    }

    /// Access a bucket directly. Used to observe lock independence.
    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    fn next_cas(&self) -> u64 {
        self.next_cas.fetch_add(1, Ordering::Relaxed)
    }

    /// Lock the bucket of `key`, look the key up and run `f` on the result
    /// while the lock is still held.
    fn with_entry<T>(
        &self,
        key: &[u8],
        f: impl FnOnce(&mut ItemList, Option<Slot>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let index = self.bucket_of(key);
        let mut list = self.buckets[index].lock();
        let (slot, purged) = list.lookup(key, current_timestamp())?;
        if purged > 0 {
            self.purged.fetch_add(purged as u64, Ordering::Relaxed);
            trace!(bucket = index, purged, "Lazy expiration: purged expired items");
        }
        f(&mut list, slot)
    }

    /// Store unconditionally, creating or overwriting the item
    pub fn set(&self, key: Bytes, value: Bytes, flags: u32, exptime: u64) -> Result<(), CacheError> {
        let cas = self.next_cas();
        self.with_entry(&key.clone(), |list, slot| {
            match slot.and_then(|s| list.get_mut(s)) {
                Some(item) => {
                    item.value = value;
                    item.flags = flags;
                    item.exptime = exptime;
                    item.dead = false;
                    item.cas = cas;
                }
                None => {
                    list.insert(Item::new(key, value, flags, exptime, cas))?;
                }
            }
            Ok(())
        })
    }

    /// Store only if no item (live or tombstoned) holds the key
    pub fn add(&self, key: Bytes, value: Bytes, flags: u32, exptime: u64) -> Result<(), CacheError> {
        let cas = self.next_cas();
        self.with_entry(&key.clone(), |list, slot| {
            if slot.is_some() {
                return Err(CacheError::Exists);
            }
            list.insert(Item::new(key, value, flags, exptime, cas))?;
            Ok(())
        })
    }

    /// Swap the value of a live item. Flags and expiry are kept.
    pub fn replace(&self, key: &[u8], value: Bytes) -> Result<(), CacheError> {
        let cas = self.next_cas();
        self.with_entry(key, |list, slot| {
            let item = live_mut(list, slot)?;
            item.value = value;
            item.cas = cas;
            Ok(())
        })
    }

    /// Add `suffix` after the current value
    pub fn append(&self, key: &[u8], suffix: &[u8]) -> Result<(), CacheError> {
        self.concat(key, suffix, false)
    }

    /// Add `prefix` before the current value
    pub fn prepend(&self, key: &[u8], prefix: &[u8]) -> Result<(), CacheError> {
        self.concat(key, prefix, true)
    }

    fn concat(&self, key: &[u8], extra: &[u8], before: bool) -> Result<(), CacheError> {
        let cas = self.next_cas();
        self.with_entry(key, |list, slot| {
            let item = live_mut(list, slot)?;
            if extra.is_empty() {
                return Ok(());
            }

            let mut value = BytesMut::with_capacity(item.length() + extra.len());
            if before {
                value.extend_from_slice(extra);
                value.extend_from_slice(&item.value);
            } else {
                value.extend_from_slice(&item.value);
                value.extend_from_slice(extra);
            }
            item.value = value.freeze();
            item.cas = cas;
            Ok(())
        })
    }

    /// Fetch a live item
    pub fn get(&self, key: &[u8]) -> Result<Fetched, CacheError> {
        self.with_entry(key, |list, slot| {
            let item = slot
                .and_then(|s| list.get(s))
                .filter(|item| item.is_live())
                .ok_or(CacheError::NotFound)?;
            Ok(Fetched {
                value: item.value.clone(),
                flags: item.flags,
                cas: item.cas,
            })
        })
    }

    /// Tombstone an item until `grace_end`.
    ///
    /// An existing tombstone is re-armed with the new end unless its current
    /// grace window ends after `grace_end`.
    pub fn delete(&self, key: &[u8], grace_end: u64) -> Result<(), CacheError> {
        let grace_end = grace_end.max(1);
        self.with_entry(key, |list, slot| {
            let item = slot
                .and_then(|s| list.get_mut(s))
                .ok_or(CacheError::NotFound)?;
            if item.dead && item.exptime > grace_end {
                return Err(CacheError::NotFound);
            }
            item.dead = true;
            item.exptime = grace_end;
            Ok(())
        })
    }

    /// Store only if the item's cas stamp still equals `token`
    pub fn cas(
        &self,
        key: &[u8],
        value: Bytes,
        flags: u32,
        exptime: u64,
        token: u64,
    ) -> Result<(), CacheError> {
        let cas = self.next_cas();
        self.with_entry(key, |list, slot| {
            let item = live_mut(list, slot)?;
            if item.cas != token {
                return Err(CacheError::Exists);
            }
            item.value = value;
            item.flags = flags;
            item.exptime = exptime;
            item.cas = cas;
            Ok(())
        })
    }

    /// Add `delta` to a numeric value, wrapping at 2^64
    pub fn incr(&self, key: &[u8], delta: u64) -> Result<u64, CacheError> {
        self.arith(key, |n| n.wrapping_add(delta))
    }

    /// Subtract `delta` from a numeric value, stopping at 0
    pub fn decr(&self, key: &[u8], delta: u64) -> Result<u64, CacheError> {
        self.arith(key, |n| n.saturating_sub(delta))
    }

    fn arith(&self, key: &[u8], op: impl FnOnce(u64) -> u64) -> Result<u64, CacheError> {
        let cas = self.next_cas();
        self.with_entry(key, |list, slot| {
            let item = live_mut(list, slot)?;
            let result = op(item.as_u64()?);
            item.set_numeric(result);
            item.cas = cas;
            Ok(result)
        })
    }

    /// Snapshot counters, taking each bucket lock in turn
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            items: self.buckets.iter().map(|b| b.lock().len()).sum(),
            purged: self.purged(),
        }
    }

    /// Items removed by lazy expiration so far
    pub fn purged(&self) -> u64 {
        self.purged.load(Ordering::Relaxed)
    }
}

fn live_mut(list: &mut ItemList, slot: Option<Slot>) -> Result<&mut Item, CacheError> {
    slot.and_then(|s| list.get_mut(s))
        .filter(|item| item.is_live())
        .ok_or(CacheError::NotFound)
}
