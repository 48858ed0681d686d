use std::collections::HashMap;
use std::ops::Deref;

use chronik_streamlog::{Micros, MonotonicClock};

use crate::container::{capture_prior, KvMap, MapKind, Ordered, Restore, Unordered};
use crate::entry::{CellEntry, CellKeyOf};
use crate::fields::CellField;
use crate::journal::MutationJournal;

/// `(row, col)` → entry container with row- and column-partitioned views.
///
/// The primary map owns the entries; the partitions are derived key indexes
/// kept in exact correspondence with it. Whole-container iteration order is
/// unspecified; partition iteration follows the partition's map kind.
#[derive(Debug)]
pub struct ManyToMany<E: CellEntry, R: MapKind = Ordered, C: MapKind = Ordered> {
    entries: HashMap<(E::Row, E::Col), E>,
    forward: R::Map<E::Row, C::Map<E::Col, ()>>,
    transposed: C::Map<E::Col, R::Map<E::Row, ()>>,
    last_modified: HashMap<(E::Row, E::Col), Micros>,
}

pub type OrderedManyToOrderedMany<E> = ManyToMany<E, Ordered, Ordered>;
pub type OrderedManyToUnorderedMany<E> = ManyToMany<E, Ordered, Unordered>;
pub type UnorderedManyToOrderedMany<E> = ManyToMany<E, Unordered, Ordered>;
pub type UnorderedManyToUnorderedMany<E> = ManyToMany<E, Unordered, Unordered>;

impl<E: CellEntry, R: MapKind, C: MapKind> Default for ManyToMany<E, R, C> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            forward: Default::default(),
            transposed: Default::default(),
            last_modified: HashMap::new(),
        }
    }
}

impl<E: CellEntry + Clone, R: MapKind, C: MapKind> ManyToMany<E, R, C> {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, row: &E::Row, col: &E::Col) -> Option<&E> {
        self.entries.get(&(row.clone(), col.clone()))
    }

    pub fn contains(&self, row: &E::Row, col: &E::Col) -> bool {
        self.get(row, col).is_some()
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

    /// The entries of one row; empty view if the row has none.
    pub fn row(&self, row: &E::Row) -> RowView<'_, E, C> {
        RowView {
            row: row.clone(),
            cols: self.forward.get(row),
            entries: &self.entries,
        }
    }

    /// The entries of one column; empty view if the column has none.
    pub fn col(&self, col: &E::Col) -> ColView<'_, E, R> {
        ColView {
            col: col.clone(),
            rows: self.transposed.get(col),
            entries: &self.entries,
        }
    }

    /// Non-empty row partitions, in the row map kind's order.
    pub fn rows(&self) -> impl Iterator<Item = RowView<'_, E, C>> {
        self.forward.iter().map(|(row, cols)| RowView {
            row: row.clone(),
            cols: Some(cols),
            entries: &self.entries,
        })
    }

    /// Non-empty column partitions, in the column map kind's order.
    pub fn cols(&self) -> impl Iterator<Item = ColView<'_, E, R>> {
        self.transposed.iter().map(|(col, rows)| ColView {
            col: col.clone(),
            rows: Some(rows),
            entries: &self.entries,
        })
    }

    /// Replay hook: the entry at `data`'s cell is now `data`.
    pub fn apply_updated(&mut self, us: Micros, data: E) {
        let row = data.row();
        let col = data.col();
        self.last_modified.insert((row.clone(), col.clone()), us);
        index_insert(&mut self.forward, row.clone(), col.clone());
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
        let (row, col) = key;
        index_remove(&mut self.forward, row, col);
        index_remove(&mut self.transposed, col, row);
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
                index_insert(&mut self.forward, key.0.clone(), key.1.clone());
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
            let (row, col) = key;
            index_remove(&mut self.forward, row, col);
            index_remove(&mut self.transposed, col, row);
        }
    }
}

pub(crate) fn index_insert<OK, IK, OM, IM>(outer: &mut OM, outer_key: OK, inner_key: IK)
where
    OK: crate::entry::StorageKey,
    IK: crate::entry::StorageKey,
    OM: KvMap<OK, IM>,
    IM: KvMap<IK, ()>,
{
    if let Some(inner) = outer.get_mut(&outer_key) {
        inner.insert(inner_key, ());
    } else {
        let mut inner = IM::default();
        inner.insert(inner_key, ());
        outer.insert(outer_key, inner);
    }
}

/// Remove `inner_key` from the partition under `outer_key`, dropping the
/// partition once empty so outer iteration never yields empty views.
pub(crate) fn index_remove<OK, IK, OM, IM>(outer: &mut OM, outer_key: &OK, inner_key: &IK)
where
    OK: crate::entry::StorageKey,
    IK: crate::entry::StorageKey,
    OM: KvMap<OK, IM>,
    IM: KvMap<IK, ()>,
{
    let now_empty = match outer.get_mut(outer_key) {
        Some(inner) => {
            inner.remove(inner_key);
            inner.is_empty()
        }
        None => false,
    };
    if now_empty {
        outer.remove(outer_key);
    }
}

/// The entries sharing one row.
pub struct RowView<'a, E: CellEntry, C: MapKind> {
    row: E::Row,
    cols: Option<&'a C::Map<E::Col, ()>>,
    entries: &'a HashMap<(E::Row, E::Col), E>,
}

impl<'a, E: CellEntry, C: MapKind> RowView<'a, E, C> {
    pub fn key(&self) -> &E::Row {
        &self.row
    }

    pub fn len(&self) -> usize {
        self.cols.map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, col: &E::Col) -> bool {
        self.cols.is_some_and(|cols| cols.contains_key(col))
    }

    pub fn get(&self, col: &E::Col) -> Option<&'a E> {
        self.cols
            .filter(|cols| cols.contains_key(col))
            .and_then(|_| self.entries.get(&(self.row.clone(), col.clone())))
    }

    /// Entries of this row, in the column map kind's order.
    pub fn iter(&self) -> impl Iterator<Item = &'a E> + '_ {
        let row = &self.row;
        let entries = self.entries;
        self.cols.into_iter().flat_map(|m| m.keys()).map(move |col| {
            entries
                .get(&(row.clone(), col.clone()))
                .expect("row view column missing from the primary map")
        })
    }
}

/// The entries sharing one column.
pub struct ColView<'a, E: CellEntry, R: MapKind> {
    col: E::Col,
    rows: Option<&'a R::Map<E::Row, ()>>,
    entries: &'a HashMap<(E::Row, E::Col), E>,
}

impl<'a, E: CellEntry, R: MapKind> ColView<'a, E, R> {
    pub(crate) fn new(col: E::Col, rows: Option<&'a R::Map<E::Row, ()>>, entries: &'a HashMap<(E::Row, E::Col), E>) -> Self {
        Self { col, rows, entries }
    }

    pub fn key(&self) -> &E::Col {
        &self.col
    }

    pub fn len(&self) -> usize {
        self.rows.map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has(&self, row: &E::Row) -> bool {
        self.rows.is_some_and(|rows| rows.contains_key(row))
    }

    pub fn get(&self, row: &E::Row) -> Option<&'a E> {
        self.rows
            .filter(|rows| rows.contains_key(row))
            .and_then(|_| self.entries.get(&(row.clone(), self.col.clone())))
    }

    /// Entries of this column, in the row map kind's order.
    pub fn iter(&self) -> impl Iterator<Item = &'a E> + '_ {
        let col = &self.col;
        let entries = self.entries;
        self.rows.into_iter().flat_map(|m| m.keys()).map(move |row| {
            entries
                .get(&(row.clone(), col.clone()))
                .expect("column view row missing from the primary map")
        })
    }
}

/// Journaling write handle over a [`ManyToMany`].
pub struct ManyToManyWriter<'a, F: CellField, R: MapKind, C: MapKind> {
    container: &'a mut ManyToMany<F::Entry, R, C>,
    journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
    clock: &'a MonotonicClock,
}

impl<'a, F: CellField, R: MapKind, C: MapKind> ManyToManyWriter<'a, F, R, C> {
    #[doc(hidden)]
    pub fn new(
        container: &'a mut ManyToMany<F::Entry, R, C>,
        journal: &'a mut MutationJournal<F::Mutation, F::Undo>,
        clock: &'a MonotonicClock,
    ) -> Self {
        Self {
            container,
            journal,
            clock,
        }
    }

    /// Insert `entry`, overwriting any entry at the same `(row, col)` cell.
    pub fn add(&mut self, entry: F::Entry) {
        let now = self.clock.now();
        let key = (entry.row(), entry.col());
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
}

impl<'a, F: CellField, R: MapKind, C: MapKind> Deref for ManyToManyWriter<'a, F, R, C> {
    type Target = ManyToMany<F::Entry, R, C>;

    fn deref(&self) -> &Self::Target {
        self.container
    }
}
