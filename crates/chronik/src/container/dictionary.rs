use std::collections::HashMap;
use std::ops::Deref;

use chronik_streamlog::{Micros, MonotonicClock};

use crate::container::{capture_prior, KvMap, MapKind, Ordered, Restore, Unordered};
use crate::entry::{KeyOf, KeyedEntry};
use crate::fields::KeyedField;
use crate::journal::MutationJournal;

/// Key → entry container with no secondary indexes.
///
/// The ordered variant iterates by key ascending; the unordered variant in
/// arbitrary order. Last-modified stamps survive deletion of their entry.
#[derive(Debug)]
pub struct Dictionary<E: KeyedEntry, K: MapKind = Ordered> {
    entries: K::Map<E::Key, E>,
    last_modified: HashMap<E::Key, Micros>,
}

pub type OrderedDictionary<E> = Dictionary<E, Ordered>;
pub type UnorderedDictionary<E> = Dictionary<E, Unordered>;

impl<E: KeyedEntry, K: MapKind> Default for Dictionary<E, K> {
    fn default() -> Self {
        Self {
            entries: Default::default(),
            last_modified: HashMap::new(),
        }
    }
}

impl<E: KeyedEntry + Clone, K: MapKind> Dictionary<E, K> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &E::Key) -> Option<&E> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &E::Key) -> bool {
        self.entries.contains_key(key)
    }

    /// When `key` was last updated or deleted, regardless of whether an entry
    /// currently exists for it.
    pub fn last_modified(&self, key: &E::Key) -> Option<Micros> {
        self.last_modified.get(key).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    pub fn keys(&self) -> impl Iterator<Item = &E::Key> {
        self.entries.keys()
    }

    /// Replay hook: the entry with `data`'s key is now `data`.
    pub fn apply_updated(&mut self, us: Micros, data: E) {
        let key = data.key();
        self.last_modified.insert(key.clone(), us);
        self.entries.insert(key, data);
    }

    /// Replay hook: the entry under `key` no longer exists. Returns whether
    /// an entry was actually there.
    pub fn apply_deleted(&mut self, us: Micros, key: &E::Key) -> bool {
        self.last_modified.insert(key.clone(), us);
        self.entries.remove(key).is_some()
    }

    pub(crate) fn prior(&self, key: &E::Key) -> Restore<E::Key, E> {
        capture_prior(self.entries.get(key), self.last_modified.get(key).copied(), key)
    }

    #[doc(hidden)]
    pub fn restore(&mut self, restore: Restore<E::Key, E>) {
        match restore {
            Restore::Entry { key, entry, us } => {
                self.last_modified.insert(key.clone(), us);
                self.entries.insert(key, entry);
            }
            Restore::Tombstone { key, us } => {
                self.last_modified.insert(key.clone(), us);
                self.entries.remove(&key);
            }
            Restore::Untouched { key } => {
                self.last_modified.remove(&key);
                self.entries.remove(&key);
            }
        }
    }
}

/// Journaling write handle over a [`Dictionary`], borrowed from the fields
/// aggregate for the duration of a mutation. Dereferences to the container
/// for reads.
pub struct DictionaryWriter<'a, F: KeyedField, K: MapKind> {
    container: &'a mut Dictionary<F::Entry, K>,
    journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
    clock: &'a MonotonicClock,
}

impl<'a, F: KeyedField, K: MapKind> DictionaryWriter<'a, F, K> {
    #[doc(hidden)]
    pub fn new(
        container: &'a mut Dictionary<F::Entry, K>,
        journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
        clock: &'a MonotonicClock,
    ) -> Self {
        Self {
            container,
            journal,
            clock,
        }
    }

    /// Insert `entry`, overwriting any entry with the same key. Journals an
    /// update event and the undo restoring the prior state.
    pub fn add(&mut self, entry: F::Entry) {
        let now = self.clock.now();
        let key = entry.key();
        self.journal
            .log(F::updated(now, entry.clone()), F::undo(self.container.prior(&key)));
        self.container.apply_updated(now, entry);
    }

    /// Remove the entry under `key`, if present. Erasing an absent key is a
    /// silent no-op and journals nothing.
    pub fn erase(&mut self, key: &KeyOf<F::Entry>) {
        if !self.container.contains(key) {
            return;
        }
        let now = self.clock.now();
        self.journal
            .log(F::deleted(now, key.clone()), F::undo(self.container.prior(key)));
        self.container.apply_deleted(now, key);
    }
}

impl<'a, F: KeyedField, K: MapKind> Deref for DictionaryWriter<'a, F, K> {
    type Target = Dictionary<F::Entry, K>;

    fn deref(&self) -> &Self::Target {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyed_entry;

    #[derive(Clone, Debug, PartialEq)]
    struct User {
        key: String,
        name: String,
    }

    keyed_entry!(User, key: String);

    fn user(key: &str, name: &str) -> User {
        User {
            key: key.into(),
            name: name.into(),
        }
    }

    #[test]
    fn apply_updated_overwrites_and_stamps() {
        let mut dict = OrderedDictionary::<User>::default();
        dict.apply_updated(Micros(1), user("u1", "Alice"));
        dict.apply_updated(Micros(2), user("u1", "Alicia"));

        assert_eq!(dict.len(), 1);
        assert_eq!(dict.get(&"u1".to_owned()).map(|u| u.name.as_str()), Some("Alicia"));
        assert_eq!(dict.last_modified(&"u1".to_owned()), Some(Micros(2)));
    }

    #[test]
    fn last_modified_survives_deletion() {
        let mut dict = OrderedDictionary::<User>::default();
        dict.apply_updated(Micros(1), user("u1", "Alice"));
        assert!(dict.apply_deleted(Micros(5), &"u1".to_owned()));

        assert!(dict.get(&"u1".to_owned()).is_none());
        assert_eq!(dict.last_modified(&"u1".to_owned()), Some(Micros(5)));
    }

    #[test]
    fn apply_deleted_reports_missing_entries() {
        let mut dict = OrderedDictionary::<User>::default();
        assert!(!dict.apply_deleted(Micros(1), &"ghost".to_owned()));
    }

    #[test]
    fn ordered_iteration_is_by_key_ascending() {
        let mut dict = OrderedDictionary::<User>::default();
        for key in ["c", "a", "b"] {
            dict.apply_updated(Micros(1), user(key, key));
        }
        let keys: Vec<_> = dict.keys().cloned().collect();
        assert_eq!(keys, vec!["a".to_owned(), "b".to_owned(), "c".to_owned()]);
    }

    #[test]
    fn restore_reverses_each_case() {
        let mut dict = OrderedDictionary::<User>::default();

        // Untouched: fresh insert fully reverts.
        dict.apply_updated(Micros(1), user("u1", "Alice"));
        dict.restore(Restore::Untouched { key: "u1".to_owned() });
        assert!(dict.get(&"u1".to_owned()).is_none());
        assert!(dict.last_modified(&"u1".to_owned()).is_none());

        // Entry: overwrite reverts to the prior value and stamp.
        dict.apply_updated(Micros(2), user("u1", "Alice"));
        dict.apply_updated(Micros(3), user("u1", "Mallory"));
        dict.restore(Restore::Entry {
            key: "u1".to_owned(),
            entry: user("u1", "Alice"),
            us: Micros(2),
        });
        assert_eq!(dict.get(&"u1".to_owned()), Some(&user("u1", "Alice")));
        assert_eq!(dict.last_modified(&"u1".to_owned()), Some(Micros(2)));

        // Tombstone: re-insert after delete reverts to deleted-with-stamp.
        dict.apply_deleted(Micros(4), &"u1".to_owned());
        dict.apply_updated(Micros(5), user("u1", "Eve"));
        dict.restore(Restore::Tombstone {
            key: "u1".to_owned(),
            us: Micros(4),
        });
        assert!(dict.get(&"u1".to_owned()).is_none());
        assert_eq!(dict.last_modified(&"u1".to_owned()), Some(Micros(4)));
    }
}
