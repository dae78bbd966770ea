//! Ordered record trees
//!
//! One [`RecordTree`] per attribute kind and per flow direction. Removal
//! always yields the record to the caller, and the expiry pass erases while
//! iterating through `BTreeMap::retain`, so traversal can never observe a
//! released record.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use crate::record::{AttrRecord, Expiring, FlowKey, FlowRecord};

/// Records that know their own tree key
pub trait Keyed {
    /// Key type, unique within one tree
    type Key: Ord + Clone + fmt::Debug;

    /// Key under which the record is stored
    fn key(&self) -> Self::Key;
}

impl Keyed for AttrRecord {
    type Key = String;

    fn key(&self) -> String {
        self.attribute.value().to_string()
    }
}

impl Keyed for FlowRecord {
    type Key = FlowKey;

    fn key(&self) -> FlowKey {
        self.key
    }
}

/// Attribute values to cached verdicts
pub type AttrTree = RecordTree<AttrRecord>;

/// Flow keys to cached verdicts
pub type FlowTree = RecordTree<FlowRecord>;

/// Ordered map of records keyed by [`Keyed::key`]
#[derive(Debug)]
pub struct RecordTree<R: Keyed> {
    entries: BTreeMap<R::Key, R>,
}

impl<R: Keyed> Default for RecordTree<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Keyed> RecordTree<R> {
    /// Empty tree
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Insert a record, returning the one it displaced
    pub fn insert(&mut self, record: R) -> Option<R> {
        self.entries.insert(record.key(), record)
    }

    /// Point lookup
    pub fn get<Q>(&self, key: &Q) -> Option<&R>
    where
        R::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get(key)
    }

    /// Point lookup for update
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut R>
    where
        R::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.get_mut(key)
    }

    /// Remove by key, handing the record to the caller
    pub fn remove<Q>(&mut self, key: &Q) -> Option<R>
    where
        R::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.remove(key)
    }

    /// True if `key` is stored
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        R::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the tree holds no record
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Head-to-tail traversal in key order
    pub fn iter(&self) -> impl Iterator<Item = &R> + '_ {
        self.entries.values()
    }

    /// Drop every record; returns how many were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}

impl<R: Keyed + Expiring> RecordTree<R> {
    /// Remove every record expired at `now`
    ///
    /// `on_evict` sees each record just before it is dropped. Returns the
    /// number of records removed.
    pub fn remove_expired<F>(&mut self, now: u64, mut on_evict: F) -> usize
    where
        F: FnMut(&R),
    {
        let before = self.entries.len();
        self.entries.retain(|_, record| {
            if record.is_expired(now) {
                on_evict(record);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }
}
