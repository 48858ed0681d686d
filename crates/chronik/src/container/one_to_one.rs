use std::collections::HashMap;
use std::ops::Deref;

use chronik_streamlog::{Micros, MonotonicClock};

use crate::container::{capture_prior, KvMap, MapKind, Ordered, Restore, Unordered};
use crate::entry::{CellEntry, CellKeyOf};
use crate::fields::CellField;
use crate::journal::MutationJournal;

/// Bijective `(row, col)` → entry container: at most one entry per row and
/// at most one per column.
///
/// `add` keeps the invariant by deleting conflicting entries first — the
/// row-conflict before the column-conflict, each as its own journaled
/// deletion with a fresh clock reading, so the emitted event timestamps are
/// strictly ordered and precede the insertion.
#[derive(Debug)]
pub struct OneToOne<E: CellEntry, R: MapKind = Ordered, C: MapKind = Ordered> {
    entries: HashMap<(E::Row, E::Col), E>,
    forward: R::Map<E::Row, E::Col>,
    transposed: C::Map<E::Col, E::Row>,
    last_modified: HashMap<(E::Row, E::Col), Micros>,
}

pub type OrderedOneToOrderedOne<E> = OneToOne<E, Ordered, Ordered>;
pub type OrderedOneToUnorderedOne<E> = OneToOne<E, Ordered, Unordered>;
pub type UnorderedOneToOrderedOne<E> = OneToOne<E, Unordered, Ordered>;
pub type UnorderedOneToUnorderedOne<E> = OneToOne<E, Unordered, Unordered>;

impl<E: CellEntry, R: MapKind, C: MapKind> Default for OneToOne<E, R, C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            forward: Default::default(),
            transposed: Default::default(),
            last_modified: HashMap::new(),
        }
    }
}

impl<E: CellEntry + Clone, R: MapKind, C: MapKind> OneToOne<E, R, C> {
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

    /// The unique entry occupying `col`, if any.
    pub fn get_by_col(&self, col: &E::Col) -> Option<&E> {
        let row = self.transposed.get(col)?;
        self.entries.get(&(row.clone(), col.clone()))
    }

    /// Whether inserting at `(row, col)` would displace nothing.
    pub fn does_not_conflict(&self, row: &E::Row, col: &E::Col) -> bool {
        !self.forward.contains_key(row) && !self.transposed.contains_key(col)
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

    /// All entries, in the column map kind's order.
    pub fn cols(&self) -> impl Iterator<Item = &E> {
        self.transposed.iter().map(|(col, row)| {
            self.entries
                .get(&(row.clone(), col.clone()))
                .expect("column index entry missing from the primary map")
        })
    }

    /// Replay hook: the entry at `data`'s cell is now `data`.
    pub fn apply_updated(&mut self, us: Micros, data: E) {
        let row = data.row();
        let col = data.col();
        self.last_modified.insert((row.clone(), col.clone()), us);
        self.forward.insert(row.clone(), col.clone());
        self.transposed.insert(col.clone(), row.clone());
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
        self.transposed.remove(&key.1);
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
                self.transposed.insert(key.1.clone(), key.0.clone());
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
            self.transposed.remove(&key.1);
        }
    }

    /// The cell of the entry occupying `row`, if any.
    fn row_occupant(&self, row: &E::Row) -> Option<CellKeyOf<E>> {
        self.forward.get(row).map(|col| (row.clone(), col.clone()))
    }

    /// The cell of the entry occupying `col`, if any.
    fn col_occupant(&self, col: &E::Col) -> Option<CellKeyOf<E>> {
        self.transposed.get(col).map(|row| (row.clone(), col.clone()))
    }
}

/// Journaling write handle over a [`OneToOne`].
pub struct OneToOneWriter<'a, F: CellField, R: MapKind, C: MapKind> {
    container: &'a mut OneToOne<F::Entry, R, C>,
    journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
    clock: &'a MonotonicClock,
}

impl<'a, F: CellField, R: MapKind, C: MapKind> OneToOneWriter<'a, F, R, C> {
    #[doc(hidden)]
    pub fn new(
        container: &'a mut OneToOne<F::Entry, R, C>,
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
    /// place; an entry holding only the row or only the column is deleted
    /// first, row-conflict before column-conflict, each deletion journaled
    /// under its own clock reading.
    pub fn add(&mut self, entry: F::Entry) {
        let mut now = self.clock.now();
        let key = (entry.row(), entry.col());

        if !self.container.entries.contains_key(&key) {
            let row_conflict = self.container.row_occupant(&key.0);
            let col_conflict = self.container.col_occupant(&key.1);
            for conflict in [row_conflict, col_conflict].into_iter().flatten() {
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
        self.erase_key((row.clone(), col.clone()));
    }

    /// Remove the entry occupying `row`, if any.
    pub fn erase_by_row(&mut self, row: &<F::Entry as CellEntry>::Row) {
        if let Some(key) = self.container.row_occupant(row) {
            self.erase_key(key);
        }
    }

    /// Remove the entry occupying `col`, if any.
    pub fn erase_by_col(&mut self, col: &<F::Entry as CellEntry>::Col) {
        if let Some(key) = self.container.col_occupant(col) {
            self.erase_key(key);
        }
    }

    fn erase_key(&mut self, key: CellKeyOf<F::Entry>) {
        if !self.container.entries.contains_key(&key) {
            return;
        }
        let now = self.clock.now();
        self.journal
            .log(F::deleted(now, key.clone()), F::undo(self.container.prior(&key)));
        self.container.apply_deleted(now, &key);
    }
}

impl<'a, F: CellField, R: MapKind, C: MapKind> Deref for OneToOneWriter<'a, F, R, C> {
    type Target = OneToOne<F::Entry, R, C>;

    fn deref(&self) -> &Self::Target {
        self.container
    }
}
