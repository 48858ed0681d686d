use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::backing::Backing;
use crate::error;
use crate::time::Micros;

/// Types which can be stored in a [`StreamLog`].
pub trait Record: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + 'static {}

impl<T: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + 'static> Record for T {}

/// Index and timestamp assigned to a record when it was published.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdxTs {
    pub index: u64,
    pub us: Micros,
}

/// On-disk framing of one record: the stream's stamp plus the payload.
/// The payload owner neither writes nor interprets this wrapper.
#[derive(Serialize, Deserialize)]
struct Stamped<R> {
    index: u64,
    us: Micros,
    data: R,
}

#[derive(Serialize)]
struct StampedRef<'a, R> {
    index: u64,
    us: Micros,
    data: &'a R,
}

struct Inner<R> {
    entries: Vec<(IdxTs, R)>,
    backing: Box<dyn Backing>,
    last_published_us: Micros,
}

/// An append-only, totally ordered, timestamped log of `R` records.
///
/// All appends go through the single [`Publisher`] capability. Records are
/// assigned consecutive indexes and non-decreasing microsecond timestamps.
pub struct StreamLog<R> {
    inner: Mutex<Inner<R>>,
    new_records: Condvar,
    publisher_taken: AtomicBool,
}

impl<R: Record> StreamLog<R> {
    /// Open a log from `backing`, loading and decoding all prior records.
    pub fn open(backing: impl Backing) -> Result<Arc<Self>, error::Open> {
        let mut backing = backing;
        let lines = backing.load_lines()?;
        let mut entries: Vec<(IdxTs, R)> = Vec::with_capacity(lines.len());
        let mut last_published_us = Micros::ZERO;
        for (n, line) in lines.iter().enumerate() {
            let stamped: Stamped<R> =
                serde_json::from_str(line).map_err(|source| error::Open::Corrupt { line: n + 1, source })?;
            let expected = entries.len() as u64;
            if stamped.index != expected {
                return Err(error::Open::OutOfOrder {
                    expected,
                    actual: stamped.index,
                });
            }
            if stamped.us < last_published_us {
                warn!(
                    "record {} timestamp {} below predecessor {}",
                    stamped.index, stamped.us, last_published_us
                );
            }
            last_published_us = stamped.us;
            entries.push((
                IdxTs {
                    index: stamped.index,
                    us: stamped.us,
                },
                stamped.data,
            ));
        }
        debug!("opened stream log with {} records", entries.len());
        Ok(Arc::new(Self {
            inner: Mutex::new(Inner {
                entries,
                backing: Box::new(backing),
                last_published_us,
            }),
            new_records: Condvar::new(),
            publisher_taken: AtomicBool::new(false),
        }))
    }

    /// Open a fresh log over a throwaway in-memory backing.
    pub fn in_memory() -> Arc<Self> {
        Self::open(crate::Memory::new()).expect("in-memory backing cannot fail to load")
    }

    /// Take the exclusive publish capability.
    ///
    /// At most one [`Publisher`] exists per log; the capability returns to the
    /// log when the publisher is dropped. Takes an [`Arc`] handle by value;
    /// clone one to keep reading the log directly.
    pub fn take_publisher(self: Arc<Self>) -> Result<Publisher<R>, error::PublisherTaken> {
        if self.publisher_taken.swap(true, Ordering::AcqRel) {
            return Err(error::PublisherTaken);
        }
        Ok(Publisher { log: self })
    }

    pub fn size(&self) -> u64 {
        self.inner.lock().entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Timestamp of the most recently published record, [`Micros::ZERO`] if none.
    pub fn last_published_us(&self) -> Micros {
        self.inner.lock().last_published_us
    }

    /// Ordered scan of all records from index `begin` to the current end.
    pub fn read_from(&self, begin: u64) -> Vec<(IdxTs, R)> {
        let inner = self.inner.lock();
        match inner.entries.get(begin as usize..) {
            Some(tail) => tail.to_vec(),
            None => Vec::new(),
        }
    }

    /// Ordered scan of records with indexes in `[begin, end)`.
    pub fn read_range(&self, begin: u64, end: u64) -> Vec<(IdxTs, R)> {
        let inner = self.inner.lock();
        let end = (end as usize).min(inner.entries.len());
        match inner.entries.get(begin as usize..end) {
            Some(slice) => slice.to_vec(),
            None => Vec::new(),
        }
    }

    /// Start a subscription thread delivering records from index `begin` on.
    ///
    /// The subscriber is invoked outside the log's lock with each record, its
    /// stamp, and the stamp of the newest record known at batch time. It
    /// returns [`SubscriptionControl::More`] to keep going or
    /// [`SubscriptionControl::Done`] to end the subscription. Dropping the
    /// returned [`SubscriberScope`] signals the thread and joins it.
    pub fn subscribe<F>(self: Arc<Self>, begin: u64, subscriber: F) -> std::io::Result<SubscriberScope<R>>
    where
        F: FnMut(R, IdxTs, IdxTs) -> SubscriptionControl + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let log = Arc::clone(&self);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("streamlog-subscriber".into())
            .spawn(move || run_subscriber(log, begin, thread_stop, subscriber))?;
        Ok(SubscriberScope {
            stop,
            log: self,
            handle: Some(handle),
        })
    }

    /// Stop-flag handshake shared with subscription threads: both the flag
    /// write and the waiters' checks happen under the log lock, so a
    /// subscriber cannot miss the wakeup.
    fn signal_stop(&self, stop: &AtomicBool) {
        let _inner = self.inner.lock();
        stop.store(true, Ordering::SeqCst);
        self.new_records.notify_all();
    }
}

impl<R: Record> fmt::Debug for StreamLog<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamLog")
            .field("size", &self.size())
            .field("publisher_taken", &self.publisher_taken.load(Ordering::Relaxed))
            .finish()
    }
}

fn run_subscriber<R: Record, F>(log: Arc<StreamLog<R>>, begin: u64, stop: Arc<AtomicBool>, mut subscriber: F)
where
    F: FnMut(R, IdxTs, IdxTs) -> SubscriptionControl + Send + 'static,
{
    let mut next = begin as usize;
    'outer: loop {
        let (batch, last) = {
            let mut inner = log.inner.lock();
            loop {
                if stop.load(Ordering::SeqCst) {
                    break 'outer;
                }
                if next < inner.entries.len() {
                    break;
                }
                log.new_records.wait(&mut inner);
            }
            let batch = inner.entries[next..].to_vec();
            let last = inner
                .entries
                .last()
                .map(|(idxts, _)| *idxts)
                .expect("waited for a non-empty log");
            (batch, last)
        };
        for (idxts, record) in batch {
            if stop.load(Ordering::SeqCst) {
                break 'outer;
            }
            next = idxts.index as usize + 1;
            trace!("delivering record {}", idxts.index);
            if subscriber(record, idxts, last) == SubscriptionControl::Done {
                break 'outer;
            }
        }
    }
    debug!("subscription thread exiting before index {next}");
}

/// Subscriber verdict after each delivered record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriptionControl {
    More,
    Done,
}

/// Joins the subscription thread when dropped.
pub struct SubscriberScope<R: Record> {
    stop: Arc<AtomicBool>,
    log: Arc<StreamLog<R>>,
    handle: Option<JoinHandle<()>>,
}

impl<R: Record> Drop for SubscriberScope<R> {
    fn drop(&mut self) {
        self.log.signal_stop(&self.stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<R: Record> fmt::Debug for SubscriberScope<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberScope")
            .field("stopped", &self.stop.load(Ordering::Relaxed))
            .finish()
    }
}

/// The exclusive append capability of one [`StreamLog`].
pub struct Publisher<R: Record> {
    log: Arc<StreamLog<R>>,
}

impl<R: Record> Publisher<R> {
    /// Atomically append `record`, stamping it with the next index and a
    /// timestamp no smaller than any already published.
    ///
    /// The record is written to the backing before it becomes visible to
    /// readers and subscribers.
    pub fn publish(&mut self, record: R, us: Micros) -> Result<IdxTs, error::Append> {
        let mut inner = self.log.inner.lock();
        let idxts = IdxTs {
            index: inner.entries.len() as u64,
            us: us.max(inner.last_published_us),
        };
        let line = serde_json::to_string(&StampedRef {
            index: idxts.index,
            us: idxts.us,
            data: &record,
        })
        .map_err(error::Append::Encode)?;
        inner.backing.append_line(&line)?;
        inner.entries.push((idxts, record));
        inner.last_published_us = idxts.us;
        drop(inner);
        self.log.new_records.notify_all();
        Ok(idxts)
    }

    pub fn stream(&self) -> &Arc<StreamLog<R>> {
        &self.log
    }
}

impl<R: Record> Drop for Publisher<R> {
    fn drop(&mut self) {
        self.log.publisher_taken.store(false, Ordering::Release);
    }
}

impl<R: Record> fmt::Debug for Publisher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Publisher")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileBacking, Memory};

    use std::sync::mpsc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note { text: text.into() }
    }

    #[test]
    fn publish_assigns_consecutive_indexes_and_monotonic_timestamps() {
        let log = StreamLog::<Note>::in_memory();
        let mut publisher = Arc::clone(&log).take_publisher().unwrap();

        let a = publisher.publish(note("a"), Micros(100)).unwrap();
        let b = publisher.publish(note("b"), Micros(50)).unwrap();
        let c = publisher.publish(note("c"), Micros(200)).unwrap();

        assert_eq!(a, IdxTs { index: 0, us: Micros(100) });
        // Timestamps never go backwards, even if the caller's clock does.
        assert_eq!(b, IdxTs { index: 1, us: Micros(100) });
        assert_eq!(c, IdxTs { index: 2, us: Micros(200) });
        assert_eq!(log.size(), 3);
        assert_eq!(log.last_published_us(), Micros(200));
    }

    #[test]
    fn publisher_capability_is_exclusive() {
        let log = StreamLog::<Note>::in_memory();
        let publisher = Arc::clone(&log).take_publisher().unwrap();
        assert!(Arc::clone(&log).take_publisher().is_err());
        drop(publisher);
        assert!(Arc::clone(&log).take_publisher().is_ok());
    }

    #[test]
    fn read_from_and_read_range() {
        let log = StreamLog::<Note>::in_memory();
        let mut publisher = Arc::clone(&log).take_publisher().unwrap();
        for (i, text) in ["a", "b", "c", "d"].into_iter().enumerate() {
            publisher.publish(note(text), Micros(i as u64 + 1)).unwrap();
        }

        let tail: Vec<_> = log.read_from(2).into_iter().map(|(_, r)| r.text).collect();
        assert_eq!(tail, vec!["c".to_owned(), "d".to_owned()]);

        let mid: Vec<_> = log.read_range(1, 3).into_iter().map(|(_, r)| r.text).collect();
        assert_eq!(mid, vec!["b".to_owned(), "c".to_owned()]);

        assert!(log.read_from(10).is_empty());
    }

    #[test]
    fn reopened_file_log_preserves_records_and_stamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stream.jsonl");

        {
            let log = StreamLog::<Note>::open(FileBacking::new(&path)).unwrap();
            let mut publisher = Arc::clone(&log).take_publisher().unwrap();
            publisher.publish(note("persisted"), Micros(7)).unwrap();
            publisher.publish(note("also"), Micros(9)).unwrap();
        }

        let log = StreamLog::<Note>::open(FileBacking::new(&path)).unwrap();
        assert_eq!(log.size(), 2);
        assert_eq!(log.last_published_us(), Micros(9));
        let texts: Vec<_> = log.read_from(0).into_iter().map(|(_, r)| r.text).collect();
        assert_eq!(texts, vec!["persisted".to_owned(), "also".to_owned()]);
    }

    #[test]
    fn corrupt_line_is_rejected_on_open() {
        let mut backing = Memory::new();
        backing.append_line("not json").unwrap();
        assert!(matches!(
            StreamLog::<Note>::open(backing),
            Err(error::Open::Corrupt { line: 1, .. })
        ));
    }

    #[test]
    fn subscription_delivers_backlog_and_live_records() {
        let log = StreamLog::<Note>::in_memory();
        let mut publisher = Arc::clone(&log).take_publisher().unwrap();
        publisher.publish(note("before"), Micros(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let _scope = log
            .subscribe(0, move |record, idxts, _last| {
                tx.send((idxts.index, record.text)).unwrap();
                SubscriptionControl::More
            })
            .unwrap();

        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (0, "before".to_owned())
        );

        publisher.publish(note("after"), Micros(2)).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            (1, "after".to_owned())
        );
    }

    #[test]
    fn dropping_the_scope_stops_the_subscriber() {
        let log = StreamLog::<Note>::in_memory();
        let mut publisher = Arc::clone(&log).take_publisher().unwrap();

        let (tx, rx) = mpsc::channel();
        let scope = log
            .subscribe(0, move |record, _idxts, _last| {
                tx.send(record.text).unwrap();
                SubscriptionControl::More
            })
            .unwrap();

        publisher.publish(note("seen"), Micros(1)).unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "seen".to_owned());

        drop(scope);
        publisher.publish(note("unseen"), Micros(2)).unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[test]
    fn done_ends_the_subscription() {
        let log = StreamLog::<Note>::in_memory();
        let mut publisher = Arc::clone(&log).take_publisher().unwrap();
        publisher.publish(note("one"), Micros(1)).unwrap();
        publisher.publish(note("two"), Micros(2)).unwrap();

        let (tx, rx) = mpsc::channel();
        let _scope = log
            .subscribe(0, move |record, _idxts, _last| {
                tx.send(record.text).unwrap();
                SubscriptionControl::Done
            })
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "one".to_owned());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
