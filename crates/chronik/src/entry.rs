use std::fmt;
use std::hash::Hash;

/// Bounds every key, row, and column type must satisfy.
///
/// Keys are copied by value on extraction; containers never take ownership of
/// anything inside an entry. `Ord` is required uniformly so one entry type
/// can feed both ordered and unordered container variants.
pub trait StorageKey: Clone + Eq + Hash + Ord + fmt::Debug {}

impl<T: Clone + Eq + Hash + Ord + fmt::Debug> StorageKey for T {}

/// An entry addressed by a single key, as stored in dictionaries.
pub trait KeyedEntry {
    type Key: StorageKey;

    fn key(&self) -> Self::Key;
}

/// An entry addressed by a `(row, col)` cell, as stored in the matrix,
/// one-to-one, and one-to-many containers.
pub trait CellEntry {
    type Row: StorageKey;
    type Col: StorageKey;

    fn row(&self) -> Self::Row;
    fn col(&self) -> Self::Col;
}

pub type KeyOf<E> = <E as KeyedEntry>::Key;
pub type RowOf<E> = <E as CellEntry>::Row;
pub type ColOf<E> = <E as CellEntry>::Col;
pub type CellKeyOf<E> = (RowOf<E>, ColOf<E>);

/// Implement [`KeyedEntry`] for a struct, either off a named field or off a
/// zero-argument accessor method. Both styles behave identically.
///
/// ```
/// use chronik::keyed_entry;
///
/// #[derive(Clone)]
/// struct User {
///     id: String,
///     name: String,
/// }
///
/// keyed_entry!(User, id: String);
///
/// #[derive(Clone)]
/// struct Session {
///     token: u64,
/// }
///
/// impl Session {
///     fn get_token(&self) -> u64 {
///         self.token
///     }
/// }
///
/// keyed_entry!(Session, get_token() -> u64);
/// # let _ = (User { id: String::new(), name: String::new() }, Session { token: 0 });
/// ```
#[macro_export]
macro_rules! keyed_entry {
    ($entry:ty, $field:ident : $key:ty) => {
        impl $crate::KeyedEntry for $entry {
            type Key = $key;

            fn key(&self) -> $key {
                self.$field.clone()
            }
        }
    };
    ($entry:ty, $getter:ident() -> $key:ty) => {
        impl $crate::KeyedEntry for $entry {
            type Key = $key;

            fn key(&self) -> $key {
                self.$getter()
            }
        }
    };
}

/// Implement [`CellEntry`] for a struct; same two styles as [`keyed_entry!`].
#[macro_export]
macro_rules! cell_entry {
    ($entry:ty, $row_field:ident : $row:ty, $col_field:ident : $col:ty) => {
        impl $crate::CellEntry for $entry {
            type Row = $row;
            type Col = $col;

            fn row(&self) -> $row {
                self.$row_field.clone()
            }

            fn col(&self) -> $col {
                self.$col_field.clone()
            }
        }
    };
    ($entry:ty, $row_getter:ident() -> $row:ty, $col_getter:ident() -> $col:ty) => {
        impl $crate::CellEntry for $entry {
            type Row = $row;
            type Col = $col;

            fn row(&self) -> $row {
                self.$row_getter()
            }

            fn col(&self) -> $col {
                self.$col_getter()
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct ByField {
        key: String,
    }

    keyed_entry!(ByField, key: String);

    #[derive(Clone)]
    struct ByMethod {
        inner: String,
    }

    impl ByMethod {
        fn get_key(&self) -> String {
            self.inner.clone()
        }
    }

    keyed_entry!(ByMethod, get_key() -> String);

    #[derive(Clone)]
    struct Cell {
        row: u32,
        col: String,
    }

    cell_entry!(Cell, row: u32, col: String);

    #[test]
    fn both_accessor_styles_agree() {
        let a = ByField { key: "k".into() };
        let b = ByMethod { inner: "k".into() };
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn cell_accessors() {
        let c = Cell { row: 3, col: "c".into() };
        assert_eq!(c.row(), 3);
        assert_eq!(c.col(), "c".to_owned());
    }
}
