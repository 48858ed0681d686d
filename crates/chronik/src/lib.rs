//! Typed, schema-declared, embedded transactional storage with append-only
//! event-sourced persistence.
//!
//! A storage is a bundle of named, typed containers declared with
//! [`declare_storage!`]. Every mutation inside a read-write transaction is
//! applied to the in-memory containers *and* journaled; on commit the
//! journal is appended to a durable stream as one atomic transaction record,
//! on abort it is rolled back change by change. A follower storage bound to
//! the same stream replays every record and mirrors the master's state
//! exactly; [`Storage::flip_to_master`] promotes it during failover.
//!
//! ```
//! use chronik::{declare_storage, keyed_entry, Memory, Rollback, Storage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
//! pub struct User {
//!     key: String,
//!     name: String,
//! }
//!
//! keyed_entry!(User, key: String);
//!
//! declare_storage! {
//!     pub storage UserStorage {
//!         users: OrderedDictionary<User>,
//!     }
//! }
//!
//! fn main() -> Result<(), chronik::StorageError> {
//!     let storage = Storage::<UserStorage>::create_master(Memory::new())?;
//!
//!     let result = storage.read_write(|fields| {
//!         fields.users().add(User {
//!             key: "u1".into(),
//!             name: "Alice".into(),
//!         });
//!         Ok::<_, Rollback<()>>(())
//!     })?;
//!     assert!(result.is_committed());
//!
//!     let count = storage.read_only(|fields| fields.users.len())?;
//!     assert_eq!(count, 1);
//!     Ok(())
//! }
//! ```

pub mod container;
mod declare;
mod entry;
pub mod error;
mod fields;
pub mod journal;
mod persister;
mod storage;
mod transaction;

pub use chronik_streamlog as streamlog;
pub use chronik_streamlog::{
    Backing, FileBacking, IdxTs, Memory, Micros, MonotonicClock, StreamLog, SubscriberScope, SubscriptionControl,
};

pub use crate::entry::{CellEntry, CellKeyOf, ColOf, KeyOf, KeyedEntry, RowOf, StorageKey};
pub use crate::error::{ReplayError, StorageError};
pub use crate::fields::{CellField, KeyedField, StorageFields};
pub use crate::persister::Stream;
pub use crate::storage::Storage;
pub use crate::transaction::{Rollback, TransactionMetaFields, TransactionRecord, TransactionResult};

#[doc(hidden)]
pub mod __private {
    pub use paste::paste;
    pub use serde;

    pub use crate::fields::field_position;
}
