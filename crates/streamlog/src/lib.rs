//! An append-only, totally ordered log of typed records.
//!
//! A [`StreamLog`] holds a sequence of records of some serializable type `R`,
//! each stamped with its index and a non-decreasing microsecond timestamp
//! ([`IdxTs`]). Appending goes through an exclusive [`Publisher`] capability,
//! of which at most one exists per log at any time. Reading is either an
//! ordered scan ([`StreamLog::read_from`]) or a push [`subscription`]
//! delivering records to a callback on a dedicated thread.
//!
//! Persistence is delegated to a [`Backing`]: either [`Memory`] or a
//! [`FileBacking`] writing one JSON object per line, preceded by a
//! `#`-prefixed signature line which readers skip.
//!
//! [`subscription`]: StreamLog::subscribe

mod backing;
pub mod error;
mod stream;
mod time;

pub use crate::{
    backing::{Backing, FileBacking, Memory},
    stream::{IdxTs, Publisher, Record, StreamLog, SubscriberScope, SubscriptionControl},
    time::{Micros, MonotonicClock},
};
