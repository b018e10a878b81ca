//! Change notifications for record store mutations.
//!
//! Every successful add, update, remove, removeAll or restore on a record
//! store publishes one [`StoreEvent`] carrying copies of the affected
//! records. Consumers can:
//! - receive events on a channel with [`ChangeFeed::subscribe`]
//! - register a callback with [`ChangeFeed::listen`]
//! - catch up from a sequence number with [`ChangeFeed::poll`]
//!
//! # Usage
//!
//! ```rust
//! use almanac_codec::{Fields, Record};
//! use almanac_core::{ChangeFeed, ChangeKind};
//!
//! let feed = ChangeFeed::new();
//! let receiver = feed.subscribe();
//!
//! feed.publish("events", ChangeKind::Add, vec![Record::new("e1", Fields::new())]);
//!
//! let event = receiver.recv().unwrap();
//! assert_eq!(event.kind, ChangeKind::Add);
//! assert_eq!(event.sequence, 1);
//! ```

use almanac_codec::Record;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

/// Kind of mutation that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A record was added.
    Add,
    /// One or more records were updated.
    Update,
    /// A record was removed by id.
    Remove,
    /// Every record matching a query was removed.
    RemoveAll,
    /// A record was written back with a known id.
    Restore,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Add => "add",
            ChangeKind::Update => "update",
            ChangeKind::Remove => "remove",
            ChangeKind::RemoveAll => "removeAll",
            ChangeKind::Restore => "restore",
        };
        f.write_str(name)
    }
}

/// A single change event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    /// Sequence number, increasing by one per event.
    pub sequence: u64,
    /// Name of the record store.
    pub store: String,
    /// Kind of mutation.
    pub kind: ChangeKind,
    /// The affected records after the mutation (before it, for removals).
    pub records: Vec<Record>,
}

/// Handle returned by [`ChangeFeed::listen`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

struct History {
    next_sequence: u64,
    events: Vec<StoreEvent>,
}

/// A typed publish/subscribe hub for store events.
///
/// The feed:
/// - Numbers events in publish order
/// - Supports multiple subscribers and listeners
/// - Drops subscribers whose receiver is gone
/// - Is thread-safe
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<StoreEvent>>>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    history: Mutex<History>,
    next_listener: Mutex<u64>,
    max_history: usize,
}

impl fmt::Debug for ChangeFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeed")
            .field("subscribers", &self.subscriber_count())
            .field("listeners", &self.listeners.read().len())
            .field("history", &self.history_len())
            .field("max_history", &self.max_history)
            .finish()
    }
}

impl ChangeFeed {
    /// Creates a new change feed.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a change feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            listeners: RwLock::new(Vec::new()),
            history: Mutex::new(History {
                next_sequence: 1,
                events: Vec::new(),
            }),
            next_listener: Mutex::new(0),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver that will receive all future events.
    pub fn subscribe(&self) -> Receiver<StoreEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Registers a callback invoked synchronously for every future event.
    pub fn listen<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_listener.lock();
            *next += 1;
            ListenerId(*next)
        };
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a callback. Returns false if it was not registered.
    pub fn unlisten(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Publishes an event and returns it.
    pub fn publish(&self, store: &str, kind: ChangeKind, records: Vec<Record>) -> StoreEvent {
        let event = {
            let mut history = self.history.lock();
            let event = StoreEvent {
                sequence: history.next_sequence,
                store: store.to_string(),
                kind,
                records,
            };
            history.next_sequence += 1;
            history.events.push(event.clone());
            if history.events.len() > self.max_history {
                let excess = history.events.len() - self.max_history;
                history.events.drain(0..excess);
            }
            event
        };

        tracing::trace!(store, %kind, sequence = event.sequence, "publishing change event");

        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());

        // Listeners may register others; call them outside the lock.
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(&event);
        }
        event
    }

    /// Polls events with a sequence above `cursor`, up to `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<StoreEvent> {
        self.history
            .lock()
            .events
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the latest published sequence number, 0 if none.
    pub fn latest_sequence(&self) -> u64 {
        self.history.lock().next_sequence - 1
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    pub fn history_len(&self) -> usize {
        self.history.lock().events.len()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
