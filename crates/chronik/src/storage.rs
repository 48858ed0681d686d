use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use chronik_streamlog::{Backing, Micros, Publisher, SubscriberScope, SubscriptionControl};
use log::{debug, error};
use parking_lot::Mutex;

use crate::error::StorageError;
use crate::fields::StorageFields;
use crate::persister::{self, Stream};
use crate::transaction::{Rollback, TransactionRecord, TransactionResult};

struct StorageState<F: StorageFields> {
    fields: F,
    /// Held iff this storage is the master.
    publisher: Option<Publisher<TransactionRecord<F::Mutation>>>,
    /// Number of stream records applied to `fields` so far.
    next_idx: u64,
    last_applied_us: Micros,
    shutting_down: bool,
    /// Set when replay hit an integrity violation; the storage is unusable.
    defect: Option<crate::ReplayError>,
}

/// The storage shell: a fields aggregate bound to an append-only stream,
/// with serialized transactions on top.
///
/// A **master** owns the stream's publish capability and accepts read-write
/// transactions; a **follower** mirrors the stream through a background
/// subscription and accepts only read-only transactions, until
/// [`flip_to_master`](Self::flip_to_master).
///
/// All transactions serialize on one internal lock, so every closure sees a
/// consistent snapshot; containers are not internally synchronized.
/// Instances are neither `Clone` nor movable-by-handle; share the underlying
/// stream ([`borrow_stream`](Self::borrow_stream)) instead.
pub struct Storage<F: StorageFields> {
    state: Arc<Mutex<StorageState<F>>>,
    stream: Arc<Stream<F::Mutation>>,
    subscription: Mutex<Option<SubscriberScope<TransactionRecord<F::Mutation>>>>,
}

impl<F: StorageFields> Storage<F> {
    /// Create a master storage over a fresh stream on `backing`, replaying
    /// whatever the backing already holds.
    pub fn create_master(backing: impl Backing) -> Result<Self, StorageError> {
        let stream = Stream::open(backing)?;
        Self::create_master_atop(stream)
    }

    /// Create a master storage atop an existing stream handle.
    pub fn create_master_atop(stream: Arc<Stream<F::Mutation>>) -> Result<Self, StorageError> {
        let mut fields = F::default();
        let (next_idx, last_applied_us) = persister::replay(&stream, &mut fields)?;
        let publisher = Arc::clone(&stream).take_publisher()?;
        Ok(Self {
            state: Arc::new(Mutex::new(StorageState {
                fields,
                publisher: Some(publisher),
                next_idx,
                last_applied_us,
                shutting_down: false,
                defect: None,
            })),
            stream,
            subscription: Mutex::new(None),
        })
    }

    /// Create a follower storage over a stream on `backing`.
    pub fn create_following(backing: impl Backing) -> Result<Self, StorageError> {
        let stream = Stream::open(backing)?;
        Self::create_following_atop(stream)
    }

    /// Create a follower storage atop an existing stream handle: replay the
    /// log, then keep applying new records as they are published.
    pub fn create_following_atop(stream: Arc<Stream<F::Mutation>>) -> Result<Self, StorageError> {
        let mut fields = F::default();
        let (next_idx, last_applied_us) = persister::replay(&stream, &mut fields)?;
        let state = Arc::new(Mutex::new(StorageState {
            fields,
            publisher: None,
            next_idx,
            last_applied_us,
            shutting_down: false,
            defect: None,
        }));

        let weak: Weak<Mutex<StorageState<F>>> = Arc::downgrade(&state);
        let scope = Arc::clone(&stream)
            .subscribe(next_idx, move |record, idxts, _last| {
                let Some(state) = weak.upgrade() else {
                    return SubscriptionControl::Done;
                };
                let mut state = state.lock();
                if idxts.index < state.next_idx {
                    return SubscriptionControl::More;
                }
                for mutation in record.mutations {
                    if let Err(defect) = state.fields.dispatch(mutation) {
                        error!("follower replay failed: {defect}");
                        state.defect = Some(defect);
                        return SubscriptionControl::Done;
                    }
                }
                state.fields.clock().observe(record.us);
                state.last_applied_us = record.us;
                state.next_idx = idxts.index + 1;
                SubscriptionControl::More
            })
            .map_err(StorageError::Subscribe)?;

        Ok(Self {
            state,
            stream,
            subscription: Mutex::new(Some(scope)),
        })
    }

    /// Run a read-write transaction.
    ///
    /// The closure mutates containers through their writer handles; each
    /// mutation is journaled as it happens. On `Ok` the journal is persisted
    /// as one atomic transaction record and the result is
    /// [`TransactionResult::Committed`]. On [`Rollback`] every in-memory
    /// change is reversed in LIFO order and the result is
    /// [`TransactionResult::RolledBack`]. A panic in the closure also rolls
    /// back, then resumes unwinding.
    pub fn read_write<T>(
        &self,
        f: impl FnOnce(&mut F) -> Result<T, Rollback<T>>,
    ) -> Result<TransactionResult<T>, StorageError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        Self::check_usable(state)?;
        if state.publisher.is_none() {
            return Err(StorageError::ReadWriteInFollower);
        }
        state.fields.journal().assert_empty();

        match catch_unwind(AssertUnwindSafe(|| f(&mut state.fields))) {
            Ok(Ok(value)) => {
                let publisher = state
                    .publisher
                    .as_mut()
                    .expect("publisher checked at transaction start");
                if let Some(idxts) = persister::persist_journal(publisher, &mut state.fields)? {
                    state.last_applied_us = idxts.us;
                    state.next_idx = idxts.index + 1;
                }
                Ok(TransactionResult::Committed(value))
            }
            Ok(Err(Rollback::WithValue(value))) => {
                state.fields.rollback();
                Ok(TransactionResult::RolledBack(Some(value)))
            }
            Ok(Err(Rollback::NoValue)) => {
                state.fields.rollback();
                Ok(TransactionResult::RolledBack(None))
            }
            Err(panic) => {
                state.fields.rollback();
                resume_unwind(panic);
            }
        }
    }

    /// Two-stage read-write transaction: `f1` produces a value under the
    /// lock, `f2` consumes it under the same lock (typically to format a
    /// response). Rollback discards the intermediate value.
    pub fn read_write_with<T, U>(
        &self,
        f1: impl FnOnce(&mut F) -> Result<T, Rollback<T>>,
        f2: impl FnOnce(T) -> U,
    ) -> Result<TransactionResult<U>, StorageError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        Self::check_usable(state)?;
        if state.publisher.is_none() {
            return Err(StorageError::ReadWriteInFollower);
        }
        state.fields.journal().assert_empty();

        match catch_unwind(AssertUnwindSafe(|| f1(&mut state.fields).map(f2))) {
            Ok(Ok(value)) => {
                let publisher = state
                    .publisher
                    .as_mut()
                    .expect("publisher checked at transaction start");
                if let Some(idxts) = persister::persist_journal(publisher, &mut state.fields)? {
                    state.last_applied_us = idxts.us;
                    state.next_idx = idxts.index + 1;
                }
                Ok(TransactionResult::Committed(value))
            }
            Ok(Err(_)) => {
                state.fields.rollback();
                Ok(TransactionResult::RolledBack(None))
            }
            Err(panic) => {
                state.fields.rollback();
                resume_unwind(panic);
            }
        }
    }

    /// Run a read-only transaction under the same lock as writes, seeing a
    /// consistent snapshot. The closure gets a shared reference, so it
    /// cannot reach the writer handles; the journal stays untouched.
    pub fn read_only<T>(&self, f: impl FnOnce(&F) -> T) -> Result<T, StorageError> {
        let mut guard = self.state.lock();
        Self::check_usable(&guard)?;
        guard.fields.journal().assert_empty();
        Ok(f(&guard.fields))
    }

    pub fn is_master(&self) -> bool {
        self.state.lock().publisher.is_some()
    }

    /// Timestamp of the most recently applied transaction record,
    /// [`Micros::ZERO`] if none.
    pub fn last_applied_us(&self) -> Micros {
        self.state.lock().last_applied_us
    }

    /// A shared handle to the underlying stream, e.g. to subscribe to the
    /// raw transaction records.
    pub fn borrow_stream(&self) -> Arc<Stream<F::Mutation>> {
        Arc::clone(&self.stream)
    }

    /// Promote a follower to master: take the publish capability, stop the
    /// subscription, and catch up on any records published in between.
    ///
    /// The subscription thread is joined strictly before the storage lock is
    /// taken — it needs that lock to drain its final batch.
    pub fn flip_to_master(&self) -> Result<(), StorageError> {
        if self.is_master() {
            return Ok(());
        }
        // Claim the capability first: it is lock-free, so a refusal leaves
        // the subscription running and the follower fully intact.
        let publisher = Arc::clone(&self.stream).take_publisher()?;
        let scope = self.subscription.lock().take();
        drop(scope);
        let mut state = self.state.lock();
        for (idxts, record) in self.stream.read_from(state.next_idx) {
            for mutation in record.mutations {
                if let Err(defect) = state.fields.dispatch(mutation) {
                    state.defect = Some(defect.clone());
                    return Err(defect.into());
                }
            }
            state.fields.clock().observe(record.us);
            state.last_applied_us = record.us;
            state.next_idx = idxts.index + 1;
        }
        state.publisher = Some(publisher);
        debug!("storage flipped to master at record {}", state.next_idx);
        Ok(())
    }

    /// Latch: once set, every subsequent transaction fails fast with
    /// [`StorageError::StorageIsDestructing`]. In-flight transactions finish
    /// normally (they hold the lock).
    pub fn graceful_shutdown(&self) {
        self.state.lock().shutting_down = true;
    }

    fn check_usable(state: &StorageState<F>) -> Result<(), StorageError> {
        if state.shutting_down {
            return Err(StorageError::StorageIsDestructing);
        }
        if let Some(defect) = &state.defect {
            return Err(defect.clone().into());
        }
        Ok(())
    }
}

impl<F: StorageFields> Drop for Storage<F> {
    fn drop(&mut self) {
        // Join the subscription while the state lock is free.
        let scope = self.subscription.get_mut().take();
        drop(scope);
    }
}
