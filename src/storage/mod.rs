//! Storage layer: items, buckets and the partitioned store

mod bucket;
mod hasher;
mod item;
mod store;

pub use bucket::{Bucket, ItemList, Slot};
pub use hasher::BucketHasher;
pub use item::{Item, calculate_expire_at, calculate_grace_end, current_timestamp};
pub use store::{CacheStore, Fetched, StoreStats};
