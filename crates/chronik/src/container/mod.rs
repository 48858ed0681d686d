//! In-memory typed containers.
//!
//! Four families — [`Dictionary`], [`ManyToMany`], [`OneToOne`],
//! [`OneToMany`] — each generic over the map kind of its index(es):
//! [`Ordered`] (B-tree, iteration by key ascending) or [`Unordered`] (hash,
//! arbitrary iteration order). Aliases spell out every concrete variant, e.g.
//! [`OrderedDictionary`] or [`UnorderedManyToOrderedMany`].
//!
//! A container is pure state: a primary map, derived secondary views, and a
//! per-key last-modified map that survives deletion. Journaling lives in the
//! writer handles (`*Writer`), which pair a container with the fields
//! aggregate's journal and clock; replay applies events through the same
//! `apply_updated` / `apply_deleted` hooks the writers use, minus the
//! journal.

use std::collections::{BTreeMap, HashMap};

use chronik_streamlog::Micros;

use crate::entry::StorageKey;

mod dictionary;
mod many_to_many;
mod one_to_many;
mod one_to_one;

pub use dictionary::{Dictionary, DictionaryWriter, OrderedDictionary, UnorderedDictionary};
pub use many_to_many::{
    ColView, ManyToMany, ManyToManyWriter, OrderedManyToOrderedMany, OrderedManyToUnorderedMany, RowView,
    UnorderedManyToOrderedMany, UnorderedManyToUnorderedMany,
};
pub use one_to_many::{
    OneToMany, OneToManyWriter, OrderedOneToOrderedMany, OrderedOneToUnorderedMany, UnorderedOneToOrderedMany,
    UnorderedOneToUnorderedMany,
};
pub use one_to_one::{
    OneToOne, OneToOneWriter, OrderedOneToOrderedOne, OrderedOneToUnorderedOne, UnorderedOneToOrderedOne,
    UnorderedOneToUnorderedOne,
};

/// Minimal map interface the containers need, satisfied by both `BTreeMap`
/// and `HashMap`.
pub trait KvMap<K: StorageKey, V>: Default {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool;
    fn get(&self, key: &K) -> Option<&V>;
    fn get_mut(&mut self, key: &K) -> Option<&mut V>;
    fn insert(&mut self, key: K, value: V) -> Option<V>;
    fn remove(&mut self, key: &K) -> Option<V>;
    fn contains_key(&self, key: &K) -> bool;
    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a;

    fn keys<'a>(&'a self) -> impl Iterator<Item = &'a K>
    where
        K: 'a,
        V: 'a,
    {
        self.iter().map(|(k, _)| k)
    }
}

impl<K: StorageKey, V> KvMap<K, V> for BTreeMap<K, V> {
    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.get_mut(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.remove(key)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.iter()
    }
}

impl<K: StorageKey, V> KvMap<K, V> for HashMap<K, V> {
    fn len(&self) -> usize {
        self.len()
    }

    fn is_empty(&self) -> bool {
        self.is_empty()
    }

    fn get(&self, key: &K) -> Option<&V> {
        self.get(key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.get_mut(key)
    }

    fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.insert(key, value)
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        self.remove(key)
    }

    fn contains_key(&self, key: &K) -> bool {
        self.contains_key(key)
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a V)>
    where
        K: 'a,
        V: 'a,
    {
        self.iter()
    }
}

/// Type-level selector of a container's index map implementation.
pub trait MapKind {
    type Map<K: StorageKey, V>: KvMap<K, V>;
}

/// B-tree maps; iteration yields keys in ascending order.
#[derive(Debug)]
pub enum Ordered {}

impl MapKind for Ordered {
    type Map<K: StorageKey, V> = BTreeMap<K, V>;
}

/// Hash maps; iteration order is unspecified.
#[derive(Debug)]
pub enum Unordered {}

impl MapKind for Unordered {
    type Map<K: StorageKey, V> = HashMap<K, V>;
}

/// Captured prior state of one key — everything needed to reverse a single
/// in-memory change. Rollback re-applies these in LIFO order.
#[derive(Clone, Debug, PartialEq)]
pub enum Restore<K, E> {
    /// The key held `entry`, last modified at `us`.
    Entry { key: K, entry: E, us: Micros },
    /// The key held nothing, but had been touched at `us`.
    Tombstone { key: K, us: Micros },
    /// The key had never been touched.
    Untouched { key: K },
}

/// Capture the prior state of `key` given the primary and last-modified maps.
pub(crate) fn capture_prior<K: StorageKey, E: Clone>(
    entry: Option<&E>,
    last_modified: Option<Micros>,
    key: &K,
) -> Restore<K, E> {
    match (entry, last_modified) {
        (Some(entry), Some(us)) => Restore::Entry {
            key: key.clone(),
            entry: entry.clone(),
            us,
        },
        (Some(entry), None) => {
            debug_assert!(false, "live entry without a last-modified stamp");
            Restore::Entry {
                key: key.clone(),
                entry: entry.clone(),
                us: Micros::ZERO,
            }
        }
        (None, Some(us)) => Restore::Tombstone { key: key.clone(), us },
        (None, None) => Restore::Untouched { key: key.clone() },
    }
}
