use std::collections::HashMap;
use std::ops::Deref;

use chronik_streamlog::{Micros, MonotonicClock};

use crate::container::many_to_many::{index_insert, index_remove};
use crate::container::{capture_prior, ColView, KvMap, MapKind, Ordered, Restore, Unordered};
use crate::entry::{CellEntry, CellKeyOf};
use crate::fields::CellField;
use crate::journal::MutationJournal;

/// `(row, col)` → entry container with at most one entry per row and
/// unbounded entries per column.
///
/// `add` keeps the row unique by deleting the previous occupant of the row
/// first, as its own journaled deletion under an earlier clock reading.
#[derive(Debug)]
pub struct OneToMany<E: CellEntry, R: MapKind = Ordered, C: MapKind = Ordered> {
    entries: HashMap<(E::Row, E::Col), E>,
    forward: R::Map<E::Row, E::Col>,
    transposed: C::Map<E::Col, R::Map<E::Row, ()>>,
    last_modified: HashMap<(E::Row, E::Col), Micros>,
}

pub type OrderedOneToOrderedMany<E> = OneToMany<E, Ordered, Ordered>;
pub type OrderedOneToUnorderedMany<E> = OneToMany<E, Ordered, Unordered>;
pub type UnorderedOneToOrderedMany<E> = OneToMany<E, Unordered, Ordered>;
pub type UnorderedOneToUnorderedMany<E> = OneToMany<E, Unordered, Unordered>;

impl<E: CellEntry, R: MapKind, C: MapKind> Default for OneToMany<E, R, C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            forward: Default::default(),
            transposed: Default::default(),
            last_modified: HashMap::new(),
        }
    }
}

impl<E: CellEntry + Clone, R: MapKind, C: MapKind> OneToMany<E, R, C> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, row: &E::Row, col: &E::Col) -> Option<&E> {
        self.entries.get(&(row.clone(), col.clone()))
    }

    /// The unique entry occupying `row`, if any.
    pub fn get_by_row(&self, row: &E::Row) -> Option<&E> {
        let col = self.forward.get(row)?;
        self.entries.get(&(row.clone(), col.clone()))
    }

    pub fn has_row(&self, row: &E::Row) -> bool {
        self.forward.contains_key(row)
    }

    pub fn has_col(&self, col: &E::Col) -> bool {
        self.transposed.contains_key(col)
    }

    pub fn last_modified(&self, row: &E::Row, col: &E::Col) -> Option<Micros> {
        self.last_modified.get(&(row.clone(), col.clone())).copied()
    }

    /// All entries, in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.entries.values()
    }

    /// All entries, in the row map kind's order.
    pub fn rows(&self) -> impl Iterator<Item = &E> {
        self.forward.iter().map(|(row, col)| {
            self.entries
                .get(&(row.clone(), col.clone()))
                .expect("row index entry missing from the primary map")
        })
    }

    /// The entries of one column; empty view if the column has none.
    pub fn col(&self, col: &E::Col) -> ColView<'_, E, R> {
        ColView::new(col.clone(), self.transposed.get(col), &self.entries)
    }

    /// Non-empty column partitions, in the column map kind's order.
    pub fn cols(&self) -> impl Iterator<Item = ColView<'_, E, R>> {
        self.transposed
            .iter()
            .map(|(col, rows)| ColView::new(col.clone(), Some(rows), &self.entries))
    }

    /// Replay hook: the entry at `data`'s cell is now `data`.
    pub fn apply_updated(&mut self, us: Micros, data: E) {
        let row = data.row();
        let col = data.col();
        self.last_modified.insert((row.clone(), col.clone()), us);
        self.forward.insert(row.clone(), col.clone());
        index_insert(&mut self.transposed, col.clone(), row.clone());
        self.entries.insert((row, col), data);
    }

    /// Replay hook: the entry at `key` no longer exists. Returns whether an
    /// entry was actually there.
    pub fn apply_deleted(&mut self, us: Micros, key: &CellKeyOf<E>) -> bool {
        self.last_modified.insert(key.clone(), us);
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.forward.remove(&key.0);
        index_remove(&mut self.transposed, &key.1, &key.0);
        true
    }

    pub(crate) fn prior(&self, key: &CellKeyOf<E>) -> Restore<CellKeyOf<E>, E> {
        capture_prior(self.entries.get(key), self.last_modified.get(key).copied(), key)
    }

    #[doc(hidden)]
    pub fn restore(&mut self, restore: Restore<CellKeyOf<E>, E>) {
        match restore {
            Restore::Entry { key, entry, us } => {
                self.last_modified.insert(key.clone(), us);
                self.forward.insert(key.0.clone(), key.1.clone());
                index_insert(&mut self.transposed, key.1.clone(), key.0.clone());
                self.entries.insert(key, entry);
            }
            Restore::Tombstone { key, us } => {
                self.remove_fully(&key);
                self.last_modified.insert(key, us);
            }
            Restore::Untouched { key } => {
                self.remove_fully(&key);
                self.last_modified.remove(&key);
            }
        }
    }

    fn remove_fully(&mut self, key: &CellKeyOf<E>) {
        if self.entries.remove(key).is_some() {
            self.forward.remove(&key.0);
            index_remove(&mut self.transposed, &key.1, &key.0);
        }
    }

    fn row_occupant(&self, row: &E::Row) -> Option<CellKeyOf<E>> {
        self.forward.get(row).map(|col| (row.clone(), col.clone()))
    }
}

/// Journaling write handle over a [`OneToMany`].
pub struct OneToManyWriter<'a, F: CellField, R: MapKind, C: MapKind> {
    container: &'a mut OneToMany<F::Entry, R, C>,
    journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
    clock: &'a MonotonicClock,
}

impl<'a, F: CellField, R: MapKind, C: MapKind> OneToManyWriter<'a, F, R, C> {
    #[doc(hidden)]
    pub fn new(
        container: &'a mut OneToMany<F::Entry, R, C>,
        journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
        clock: &'a MonotonicClock,
    ) -> Self {
        Self {
            container,
            journal,
            clock,
        }
    }

    /// Insert `entry`. An entry at the exact same cell is overwritten in
    /// place; a different entry occupying the row is deleted first as its
    /// own journaled deletion.
    pub fn add(&mut self, entry: F::Entry) {
        let mut now = self.clock.now();
        let key = (entry.row(), entry.col());

        if !self.container.entries.contains_key(&key) {
            if let Some(conflict) = self.container.row_occupant(&key.0) {
                self.journal
                    .log(F::deleted(now, conflict.clone()), F::undo(self.container.prior(&conflict)));
                self.container.apply_deleted(now, &conflict);
                now = self.clock.now();
            }
        }

        self.journal
            .log(F::updated(now, entry.clone()), F::undo(self.container.prior(&key)));
        self.container.apply_updated(now, entry);
    }

    /// Remove the entry at `(row, col)`, if present; silent no-op otherwise.
    pub fn erase(&mut self, row: &<F::Entry as CellEntry>::Row, col: &<F::Entry as CellEntry>::Col) {
        let key = (row.clone(), col.clone());
        if !self.container.entries.contains_key(&key) {
            return;
        }
        let now = self.clock.now();
        self.journal
            .log(F::deleted(now, key.clone()), F::undo(self.container.prior(&key)));
        self.container.apply_deleted(now, &key);
    }

    /// Remove the entry occupying `row`, if any.
    pub fn erase_by_row(&mut self, row: &<F::Entry as CellEntry>::Row) {
        if let Some((row, col)) = self.container.row_occupant(row) {
            self.erase(&row, &col);
        }
    }
}

impl<'a, F: CellField, R: MapKind, C: MapKind> Deref for OneToManyWriter<'a, F, R, C> {
    type Target = OneToMany<F::Entry, R, C>;

    fn deref(&self) -> &Self::Target {
        self.container
    }
}
