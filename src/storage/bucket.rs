//! Hash bucket: a circular doubly-linked list of items behind a mutex
//!
//! Nodes live in a per-bucket arena and link to each other by index. Slot 0
//! is the sentinel; an empty list is the sentinel linked to itself. Freed
//! slots are recycled through a free list, so insert and unlink are O(1).

use crate::CacheError;
use crate::storage::item::Item;
use parking_lot::{Mutex, MutexGuard};

const SENTINEL: usize = 0;

#[derive(Debug)]
struct Node {
    prev: usize,
    next: usize,
    item: Option<Item>,
}

/// Index handle to a linked item, valid while the bucket lock is held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(usize);

/// The list anchored at one bucket
#[derive(Debug)]
pub struct ItemList {
    nodes: Vec<Node>,
    free: Vec<usize>,
    len: usize,
}

impl ItemList {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                prev: SENTINEL,
                next: SENTINEL,
                item: None,
            }],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of linked items, tombstones included
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Verify `prev.next == idx` and `next.prev == idx`
    fn check(&self, idx: usize) -> Result<(), CacheError> {
        let node = self.nodes.get(idx).ok_or(CacheError::Corrupted)?;
        let prev = self.nodes.get(node.prev).ok_or(CacheError::Corrupted)?;
        let next = self.nodes.get(node.next).ok_or(CacheError::Corrupted)?;
        if prev.next != idx || next.prev != idx {
            return Err(CacheError::Corrupted);
        }
        Ok(())
    }

    /// Scan once for `key`, purging every expired item met on the way.
    ///
    /// Returns the slot of the first item whose key matches, tombstoned or not,
    /// along with the number of items purged.
    pub fn lookup(&mut self, key: &[u8], now: u64) -> Result<(Option<Slot>, usize), CacheError> {
        let mut purged = 0;
        let mut cur = self.nodes[SENTINEL].next;

        while cur != SENTINEL {
            self.check(cur)?;
            let next = self.nodes[cur].next;
            let item = self.nodes[cur].item.as_ref().ok_or(CacheError::Corrupted)?;

            if item.is_expired_at(now) {
                self.unlink(cur)?;
                purged += 1;
            } else if item.key.as_ref() == key {
                return Ok((Some(Slot(cur)), purged));
            }
            cur = next;
        }

        Ok((None, purged))
    }

    /// Link `item` at the head of the list
    pub fn insert(&mut self, item: Item) -> Result<Slot, CacheError> {
        let head = self.nodes[SENTINEL].next;
        if self.nodes.get(head).map(|n| n.prev) != Some(SENTINEL) {
            return Err(CacheError::Corrupted);
        }

        let node = Node {
            prev: SENTINEL,
            next: head,
            item: Some(item),
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        self.nodes[head].prev = idx;
        self.nodes[SENTINEL].next = idx;
        self.len += 1;
        Ok(Slot(idx))
    }

    /// Unlink the node at `idx` and release its item
    fn unlink(&mut self, idx: usize) -> Result<Item, CacheError> {
        self.check(idx)?;
        let Node { prev, next, .. } = self.nodes[idx];
        self.nodes[prev].next = next;
        self.nodes[next].prev = prev;

        let node = &mut self.nodes[idx];
        node.prev = idx;
        node.next = idx;
        let item = node.item.take().ok_or(CacheError::Corrupted)?;
        self.free.push(idx);
        self.len -= 1;
        Ok(item)
    }

    pub fn get(&self, slot: Slot) -> Option<&Item> {
        self.nodes.get(slot.0).and_then(|n| n.item.as_ref())
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Item> {
        self.nodes.get_mut(slot.0).and_then(|n| n.item.as_mut())
    }

    /// Iterate items from head to tail
    pub fn iter(&self) -> impl Iterator<Item = &Item> + '_ {
        let mut cur = self.nodes[SENTINEL].next;
        std::iter::from_fn(move || {
            if cur == SENTINEL {
                return None;
            }
            let node = self.nodes.get(cur)?;
            cur = node.next;
            node.item.as_ref()
        })
    }

    #[cfg(test)]
    pub(crate) fn corrupt_head(&mut self) {
        let head = self.nodes[SENTINEL].next;
        self.nodes[head].prev = head;
    }
}

impl Default for ItemList {
    fn default() -> Self {
        Self::new()
    }
}

/// One slot of the hash table
#[derive(Debug, Default)]
pub struct Bucket {
    list: Mutex<ItemList>,
}

impl Bucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, ItemList> {
        self.list.lock()
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, ItemList>> {
        self.list.try_lock()
    }
}
