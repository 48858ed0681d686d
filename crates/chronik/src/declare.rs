//! The storage declaration metaprogram.
//!
//! [`declare_storage!`] turns a list of `(field name, container flavor,
//! entry type)` triples into everything the runtime needs: per-field update
//! and delete event types, the storage-wide mutation and undo variants, the
//! fields aggregate with its embedded journal and clock, per-field writer
//! accessors, the replay dispatcher, and field-name introspection.

/// Declare a storage schema.
///
/// ```
/// use chronik::{declare_storage, keyed_entry};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// pub struct User {
///     key: String,
///     name: String,
/// }
///
/// keyed_entry!(User, key: String);
///
/// declare_storage! {
///     pub storage UserStorage {
///         users: OrderedDictionary<User>,
///     }
/// }
///
/// # fn main() {
/// let mut fields = UserStorage::default();
/// fields.users().add(User { key: "u1".into(), name: "Alice".into() });
/// assert_eq!(fields.users.len(), 1);
/// # }
/// ```
///
/// For each field `f` of entry type `E`, the macro synthesizes `FUpdated`
/// (`{ us, data: E }`) and `FDeleted` (`{ us, key }`) event structs (names
/// camel-cased from the field name), a `<Name>Mutation` enum uniting every
/// event — serialized as an externally tagged union, the tag being the event
/// name — and an accessor method `f()` returning the container family's
/// journaling writer. Entry types must implement the matching accessor trait
/// ([`KeyedEntry`](crate::KeyedEntry) or [`CellEntry`](crate::CellEntry))
/// and derive `Clone`, `Debug`, `PartialEq`, `Serialize`, `Deserialize`.
///
/// Available container flavors: `OrderedDictionary`, `UnorderedDictionary`,
/// and the twelve `{Ordered,Unordered}{ManyTo,OneTo}{Many,One}` matrix-family
/// combinations, e.g. `UnorderedManyToUnorderedMany` or
/// `OrderedOneToOrderedOne`.
#[macro_export]
macro_rules! declare_storage {
    (
        $(#[$attr:meta])*
        $vis:vis storage $name:ident {
            $( $field:ident : $flavor:ident < $entry:ty > ),+ $(,)?
        }
    ) => {
        $crate::__private::paste! {
            $(
                #[doc = concat!("`", stringify!($field), "` now holds `data`.")]
                #[derive(Clone, Debug, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
                $vis struct [<$field:camel Updated>] {
                    pub us: $crate::Micros,
                    pub data: $entry,
                }

                #[doc = concat!("The `", stringify!($field), "` entry under `key` no longer exists.")]
                #[derive(Clone, Debug, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
                $vis struct [<$field:camel Deleted>] {
                    pub us: $crate::Micros,
                    pub key: $crate::__chronik_event_key_ty!($flavor, $entry),
                }

                #[doc(hidden)]
                $vis struct [<$field:camel Field>];
            )+

            #[doc = concat!("Tagged union of every `", stringify!($name), "` mutation event.")]
            #[derive(Clone, Debug, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
            $vis enum [<$name Mutation>] {
                $(
                    [<$field:camel Updated>]([<$field:camel Updated>]),
                    [<$field:camel Deleted>]([<$field:camel Deleted>]),
                )+
            }

            #[doc(hidden)]
            #[derive(Debug)]
            $vis enum [<$name Undo>] {
                $(
                    [<$field:camel>](
                        $crate::container::Restore<$crate::__chronik_event_key_ty!($flavor, $entry), $entry>
                    ),
                )+
            }

            $(#[$attr])*
            $vis struct $name {
                $( $vis $field: $crate::__chronik_container_ty!($flavor, $entry), )+
                chronik_mutation_journal: $crate::journal::MutationJournal<[<$name Mutation>], [<$name Undo>]>,
                chronik_clock: $crate::MonotonicClock,
            }

            impl ::core::default::Default for $name {
                fn default() -> Self {
                    Self {
                        $( $field: ::core::default::Default::default(), )+
                        chronik_mutation_journal: ::core::default::Default::default(),
                        chronik_clock: $crate::MonotonicClock::new(),
                    }
                }
            }

            impl $crate::StorageFields for $name {
                type Mutation = [<$name Mutation>];
                type Undo = [<$name Undo>];

                const STORAGE_NAME: &'static str = stringify!($name);
                const FIELD_COUNT: usize = Self::FIELD_NAMES.len();
                const FIELD_NAMES: &'static [&'static str] = &[ $( stringify!($field) ),+ ];

                fn journal(&mut self) -> &mut $crate::journal::MutationJournal<Self::Mutation, Self::Undo> {
                    &mut self.chronik_mutation_journal
                }

                fn clock(&self) -> &$crate::MonotonicClock {
                    &self.chronik_clock
                }

                fn dispatch(
                    &mut self,
                    mutation: Self::Mutation,
                ) -> ::core::result::Result<(), $crate::ReplayError> {
                    match mutation {
                        $(
                            [<$name Mutation>]::[<$field:camel Updated>](e) => {
                                self.$field.apply_updated(e.us, e.data);
                                ::core::result::Result::Ok(())
                            }
                            [<$name Mutation>]::[<$field:camel Deleted>](e) => {
                                if self.$field.apply_deleted(e.us, &e.key) {
                                    ::core::result::Result::Ok(())
                                } else {
                                    ::core::result::Result::Err($crate::ReplayError::integrity(
                                        stringify!($field),
                                        stringify!([<$field:camel Deleted>]),
                                        ::std::format!("{:?}", e.key),
                                    ))
                                }
                            }
                        )+
                    }
                }

                fn apply_undo(&mut self, undo: Self::Undo) {
                    match undo {
                        $(
                            [<$name Undo>]::[<$field:camel>](restore) => self.$field.restore(restore),
                        )+
                    }
                }
            }

            $( $crate::__chronik_field_impl! { $vis $name, $field, $flavor, $entry } )+
        }
    };
}

/// Key type carried by a flavor's delete events: the entry key for
/// dictionaries, the `(row, col)` cell for everything else.
#[doc(hidden)]
#[macro_export]
macro_rules! __chronik_event_key_ty {
    (OrderedDictionary, $entry:ty) => { $crate::KeyOf<$entry> };
    (UnorderedDictionary, $entry:ty) => { $crate::KeyOf<$entry> };
    ($other:ident, $entry:ty) => { $crate::CellKeyOf<$entry> };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __chronik_container_ty {
    (OrderedDictionary, $entry:ty) => {
        $crate::container::Dictionary<$entry, $crate::container::Ordered>
    };
    (UnorderedDictionary, $entry:ty) => {
        $crate::container::Dictionary<$entry, $crate::container::Unordered>
    };
    (OrderedManyToOrderedMany, $entry:ty) => {
        $crate::container::ManyToMany<$entry, $crate::container::Ordered, $crate::container::Ordered>
    };
    (OrderedManyToUnorderedMany, $entry:ty) => {
        $crate::container::ManyToMany<$entry, $crate::container::Ordered, $crate::container::Unordered>
    };
    (UnorderedManyToOrderedMany, $entry:ty) => {
        $crate::container::ManyToMany<$entry, $crate::container::Unordered, $crate::container::Ordered>
    };
    (UnorderedManyToUnorderedMany, $entry:ty) => {
        $crate::container::ManyToMany<$entry, $crate::container::Unordered, $crate::container::Unordered>
    };
    (OrderedOneToOrderedOne, $entry:ty) => {
        $crate::container::OneToOne<$entry, $crate::container::Ordered, $crate::container::Ordered>
    };
    (OrderedOneToUnorderedOne, $entry:ty) => {
        $crate::container::OneToOne<$entry, $crate::container::Ordered, $crate::container::Unordered>
    };
    (UnorderedOneToOrderedOne, $entry:ty) => {
        $crate::container::OneToOne<$entry, $crate::container::Unordered, $crate::container::Ordered>
    };
    (UnorderedOneToUnorderedOne, $entry:ty) => {
        $crate::container::OneToOne<$entry, $crate::container::Unordered, $crate::container::Unordered>
    };
    (OrderedOneToOrderedMany, $entry:ty) => {
        $crate::container::OneToMany<$entry, $crate::container::Ordered, $crate::container::Ordered>
    };
    (OrderedOneToUnorderedMany, $entry:ty) => {
        $crate::container::OneToMany<$entry, $crate::container::Ordered, $crate::container::Unordered>
    };
    (UnorderedOneToOrderedMany, $entry:ty) => {
        $crate::container::OneToMany<$entry, $crate::container::Unordered, $crate::container::Ordered>
    };
    (UnorderedOneToUnorderedMany, $entry:ty) => {
        $crate::container::OneToMany<$entry, $crate::container::Unordered, $crate::container::Unordered>
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __chronik_field_impl {
    ($vis:vis $name:ident, $field:ident, OrderedDictionary, $entry:ty) => {
        $crate::__chronik_keyed_field_impl! { $vis $name, $field, $entry, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedDictionary, $entry:ty) => {
        $crate::__chronik_keyed_field_impl! { $vis $name, $field, $entry, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedManyToOrderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, ManyToManyWriter, $crate::container::Ordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedManyToUnorderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, ManyToManyWriter, $crate::container::Ordered, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedManyToOrderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, ManyToManyWriter, $crate::container::Unordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedManyToUnorderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, ManyToManyWriter, $crate::container::Unordered, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedOneToOrderedOne, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToOneWriter, $crate::container::Ordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedOneToUnorderedOne, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToOneWriter, $crate::container::Ordered, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedOneToOrderedOne, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToOneWriter, $crate::container::Unordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedOneToUnorderedOne, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToOneWriter, $crate::container::Unordered, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedOneToOrderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToManyWriter, $crate::container::Ordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, OrderedOneToUnorderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToManyWriter, $crate::container::Ordered, $crate::container::Unordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedOneToOrderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToManyWriter, $crate::container::Unordered, $crate::container::Ordered }
    };
    ($vis:vis $name:ident, $field:ident, UnorderedOneToUnorderedMany, $entry:ty) => {
        $crate::__chronik_cell_field_impl! { $vis $name, $field, $entry, OneToManyWriter, $crate::container::Unordered, $crate::container::Unordered }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __chronik_keyed_field_impl {
    ($vis:vis $name:ident, $field:ident, $entry:ty, $kind:ty) => {
        $crate::__private::paste! {
            impl $crate::KeyedField for [<$field:camel Field>] {
                type Entry = $entry;
                type Mutation = [<$name Mutation>];
                type Undo = [<$name Undo>];
                type UpdateEvent = [<$field:camel Updated>];
                type DeleteEvent = [<$field:camel Deleted>];

                const NAME: &'static str = stringify!($field);
                const INDEX: usize = $crate::__private::field_position(
                    <$name as $crate::StorageFields>::FIELD_NAMES,
                    stringify!($field),
                );

                fn updated(us: $crate::Micros, data: $entry) -> Self::Mutation {
                    [<$name Mutation>]::[<$field:camel Updated>]([<$field:camel Updated>] { us, data })
                }

                fn deleted(us: $crate::Micros, key: $crate::KeyOf<$entry>) -> Self::Mutation {
                    [<$name Mutation>]::[<$field:camel Deleted>]([<$field:camel Deleted>] { us, key })
                }

                fn undo(restore: $crate::container::Restore<$crate::KeyOf<$entry>, $entry>) -> Self::Undo {
                    [<$name Undo>]::[<$field:camel>](restore)
                }
            }

            impl $name {
                #[doc = concat!("Journaling write handle for the `", stringify!($field), "` field.")]
                $vis fn $field(
                    &mut self,
                ) -> $crate::container::DictionaryWriter<'_, [<$field:camel Field>], $kind> {
                    $crate::container::DictionaryWriter::new(
                        &mut self.$field,
                        &mut self.chronik_mutation_journal,
                        &self.chronik_clock,
                    )
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __chronik_cell_field_impl {
    ($vis:vis $name:ident, $field:ident, $entry:ty, $writer:ident, $row_kind:ty, $col_kind:ty) => {
        $crate::__private::paste! {
            impl $crate::CellField for [<$field:camel Field>] {
                type Entry = $entry;
                type Mutation = [<$name Mutation>];
                type Undo = [<$name Undo>];
                type UpdateEvent = [<$field:camel Updated>];
                type DeleteEvent = [<$field:camel Deleted>];

                const NAME: &'static str = stringify!($field);
                const INDEX: usize = $crate::__private::field_position(
                    <$name as $crate::StorageFields>::FIELD_NAMES,
                    stringify!($field),
                );

                fn updated(us: $crate::Micros, data: $entry) -> Self::Mutation {
                    [<$name Mutation>]::[<$field:camel Updated>]([<$field:camel Updated>] { us, data })
                }

                fn deleted(us: $crate::Micros, key: $crate::CellKeyOf<$entry>) -> Self::Mutation {
                    [<$name Mutation>]::[<$field:camel Deleted>]([<$field:camel Deleted>] { us, key })
                }

                fn undo(restore: $crate::container::Restore<$crate::CellKeyOf<$entry>, $entry>) -> Self::Undo {
                    [<$name Undo>]::[<$field:camel>](restore)
                }
            }

            impl $name {
                #[doc = concat!("Journaling write handle for the `", stringify!($field), "` field.")]
                $vis fn $field(
                    &mut self,
                ) -> $crate::container::$writer<'_, [<$field:camel Field>], $row_kind, $col_kind> {
                    $crate::container::$writer::new(
                        &mut self.$field,
                        &mut self.chronik_mutation_journal,
                        &self.chronik_clock,
                    )
                }
            }
        }
    };
}
