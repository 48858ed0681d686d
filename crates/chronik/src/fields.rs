use std::fmt;

use chronik_streamlog::{Micros, MonotonicClock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::container::Restore;
use crate::entry::{CellEntry, CellKeyOf, KeyOf, KeyedEntry};
use crate::error::ReplayError;
use crate::journal::MutationJournal;

/// Marker for one declared dictionary field; ties the field's container into
/// the storage-wide mutation and undo variants.
///
/// Implementations are synthesized by
/// [`declare_storage!`](crate::declare_storage); the associated
/// `UpdateEvent` / `DeleteEvent` types, [`NAME`](Self::NAME), and
/// [`INDEX`](Self::INDEX) are the field-level introspection surface.
pub trait KeyedField {
    type Entry: KeyedEntry + Clone;
    type Mutation;
    type Undo;
    type UpdateEvent;
    type DeleteEvent;

    const NAME: &'static str;
    /// The field's position in its storage declaration;
    /// `FIELD_NAMES[INDEX] == NAME`.
    const INDEX: usize;

    fn updated(us: Micros, data: Self::Entry) -> Self::Mutation;
    fn deleted(us: Micros, key: KeyOf<Self::Entry>) -> Self::Mutation;
    fn undo(restore: Restore<KeyOf<Self::Entry>, Self::Entry>) -> Self::Undo;
}

/// Marker for one declared matrix-family field (many-to-many, one-to-one,
/// one-to-many); the cell analogue of [`KeyedField`].
pub trait CellField {
    type Entry: CellEntry + Clone;
    type Mutation;
    type Undo;
    type UpdateEvent;
    type DeleteEvent;

    const NAME: &'static str;
    /// The field's position in its storage declaration;
    /// `FIELD_NAMES[INDEX] == NAME`.
    const INDEX: usize;

    fn updated(us: Micros, data: Self::Entry) -> Self::Mutation;
    fn deleted(us: Micros, key: CellKeyOf<Self::Entry>) -> Self::Mutation;
    fn undo(restore: Restore<CellKeyOf<Self::Entry>, Self::Entry>) -> Self::Undo;
}

/// Position of `name` within `names`, evaluated at compile time.
///
/// The declaration macro uses this to give every field marker its `INDEX`
/// without threading a counter through the expansion. Declared field names
/// are unique (they are struct fields), so the scan is unambiguous.
#[doc(hidden)]
pub const fn field_position(names: &'static [&'static str], name: &'static str) -> usize {
    let mut i = 0;
    while i < names.len() {
        if str_eq(names[i], name) {
            return i;
        }
        i += 1;
    }
    panic!("field name missing from the declaration");
}

const fn str_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut i = 0;
    while i < a.len() {
        if a[i] != b[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// The contract of a generated fields aggregate: a bundle of named
/// containers, their shared journal and clock, and the dispatcher that
/// routes replayed mutations to the owning container.
pub trait StorageFields: Default + Send + 'static {
    /// The tagged union of every field's update and delete events.
    type Mutation: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + 'static;
    /// The union of every field's [`Restore`] payloads.
    type Undo;

    const STORAGE_NAME: &'static str;
    const FIELD_COUNT: usize;
    /// Field names in declaration order; the by-index half of introspection.
    const FIELD_NAMES: &'static [&'static str];

    fn journal(&mut self) -> &mut MutationJournal<Self::Mutation, Self::Undo>;
    fn clock(&self) -> &MonotonicClock;

    /// Replay hook: apply one mutation to the owning container, without
    /// touching the journal. The sole path by which persisted state is
    /// reconstituted, for both batch replay and live follower records.
    fn dispatch(&mut self, mutation: Self::Mutation) -> Result<(), ReplayError>;

    /// Reverse one in-memory change on the owning container.
    fn apply_undo(&mut self, undo: Self::Undo);

    /// Walk the journal backwards, reversing every change, and leave the
    /// journal empty.
    fn rollback(&mut self) {
        let undos = self.journal().take_rollback();
        for undo in undos.into_iter().rev() {
            self.apply_undo(undo);
        }
    }

    fn field_index(name: &str) -> Option<usize> {
        Self::FIELD_NAMES.iter().position(|n| *n == name)
    }

    /// Attach a meta-field to the transaction record under construction.
    fn set_transaction_meta_field(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.journal().set_meta_field(key, value);
    }

    fn erase_transaction_meta_field(&mut self, key: &str) {
        self.journal().erase_meta_field(key);
    }
}
