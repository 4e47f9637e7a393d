//! Stored items and expiration time handling
//!
//! TTL Rules (memcached-compatible):
//! - 0 = never expire
//! - <= 2592000 (30 days) = relative seconds from now
//! - > 2592000 = absolute Unix timestamp

use crate::CacheError;
use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum relative TTL value (30 days in seconds)
const MAX_RELATIVE_TTL: u64 = 2_592_000;

/// A cached record, owned by exactly one bucket list
#[derive(Debug)]
pub struct Item {
    pub key: Bytes,
    pub value: Bytes,
    /// Expiration timestamp (0 = never). For a tombstone, the end of its grace window.
    pub exptime: u64,
    pub flags: u32,
    /// Tombstone marker set by delete
    pub dead: bool,
    pub cas: u64,
}

impl Item {
    pub fn new(key: Bytes, value: Bytes, flags: u32, exptime: u64, cas: u64) -> Self {
        Self {
            key,
            value,
            exptime,
            flags,
            dead: false,
            cas,
        }
    }

    /// Value length in bytes
    pub fn length(&self) -> usize {
        self.value.len()
    }

    /// Check whether the item is past its expiry (or grace window) at `now`
    #[inline]
    pub fn is_expired_at(&self, now: u64) -> bool {
        self.exptime != 0 && self.exptime < now
    }

    /// Live means present and not tombstoned
    #[inline]
    pub fn is_live(&self) -> bool {
        !self.dead
    }

    /// Interpret the value as an unsigned decimal for incr/decr
    pub fn as_u64(&self) -> Result<u64, CacheError> {
        let s = std::str::from_utf8(&self.value).map_err(|_| CacheError::NonNumeric)?;
        s.trim().parse::<u64>().map_err(|_| CacheError::NonNumeric)
    }

    /// Replace the value with the decimal text of `value`
    pub fn set_numeric(&mut self, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.value = Bytes::copy_from_slice(buf.format(value).as_bytes());
    }
}

/// Calculate the absolute expiration timestamp from memcached exptime
pub fn calculate_expire_at(exptime: u64) -> u64 {
    if exptime == 0 {
        0 // Never expire
    } else if exptime <= MAX_RELATIVE_TTL {
        current_timestamp() + exptime
    } else {
        exptime
    }
}

/// Calculate the end of a delete grace window.
///
/// A requested time of 0 becomes 1, an instant already in the past, so the
/// tombstone is purged by the next scan of its bucket.
pub fn calculate_grace_end(time: u64) -> u64 {
    if time == 0 { 1 } else { current_timestamp() + time }
}

/// Get the current Unix timestamp
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(value: &'static [u8], exptime: u64) -> Item {
        Item::new(Bytes::from_static(b"k"), Bytes::from_static(value), 0, exptime, 1)
    }

    #[test]
    fn test_never_expire() {
        assert_eq!(calculate_expire_at(0), 0);
        assert!(!item(b"data", 0).is_expired_at(current_timestamp()));
    }

    #[test]
    fn test_relative_ttl() {
        let now = current_timestamp();
        let expire_at = calculate_expire_at(60);
        // Allow 1 second tolerance
        assert!(expire_at >= now + 59 && expire_at <= now + 61);
    }

    #[test]
    fn test_absolute_timestamp() {
        let future = current_timestamp() + 3_000_000;
        assert_eq!(calculate_expire_at(future), future);
    }

    #[test]
    fn test_expired() {
        assert!(item(b"data", 1).is_expired_at(current_timestamp()));
        // expiry is strict: an item expiring this second is still visible
        assert!(!item(b"data", 100).is_expired_at(100));
    }

    #[test]
    fn test_grace_end() {
        assert_eq!(calculate_grace_end(0), 1);
        assert!(calculate_grace_end(30) >= current_timestamp() + 29);
    }

    #[test]
    fn test_numeric_value() {
        let mut it = item(b"123", 0);
        assert_eq!(it.as_u64().unwrap(), 123);

        it.set_numeric(456);
        assert_eq!(it.value.as_ref(), b"456");
        assert_eq!(it.length(), 3);
    }

    #[test]
    fn test_invalid_numeric() {
        assert_eq!(item(b"hello", 0).as_u64(), Err(CacheError::NonNumeric));
        assert_eq!(item(b"-1", 0).as_u64(), Err(CacheError::NonNumeric));
    }
}
