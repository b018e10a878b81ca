//! Side effects applied around record store mutations.
//!
//! Mutating operations are wrapped with [`with_side_effects`], which awaits
//! the operation and then runs each [`Effect`] in order:
//!
//! - [`Effect::NotifyChanged`] bumps the [`RefreshSignal`] whatever the
//!   outcome, so views can always re-read consistent state
//! - [`Effect::Emit`] publishes a typed event, only when the operation
//!   succeeded

use crate::change_feed::{ChangeFeed, ChangeKind};
use crate::error::CoreResult;
use almanac_codec::Record;
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One side effect of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Signal that data may have changed.
    NotifyChanged,
    /// Publish a change event with the affected records.
    Emit(ChangeKind),
}

/// Values whose records can be reported in a change event.
pub trait Affected {
    /// Returns copies of the affected records.
    fn affected(&self) -> Vec<Record>;
}

impl Affected for Record {
    fn affected(&self) -> Vec<Record> {
        vec![self.clone()]
    }
}

impl Affected for Vec<Record> {
    fn affected(&self) -> Vec<Record> {
        self.clone()
    }
}

type RefreshListener = Arc<dyn Fn(u64) + Send + Sync>;

/// A cheap, idempotent "data changed" signal.
///
/// Each notification increments a generation counter and calls the
/// registered listeners with the new generation.
#[derive(Default)]
pub struct RefreshSignal {
    generation: AtomicU64,
    listeners: RwLock<Vec<RefreshListener>>,
}

impl fmt::Debug for RefreshSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshSignal")
            .field("generation", &self.generation())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

impl RefreshSignal {
    /// Creates a signal at generation 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Registers a listener.
    pub fn listen<F>(&self, listener: F)
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    /// Bumps the generation and notifies listeners.
    pub fn notify(&self) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let listeners: Vec<RefreshListener> = self.listeners.read().clone();
        for listener in listeners {
            listener(generation);
        }
    }
}

/// Where side effects are delivered.
#[derive(Debug, Clone, Copy)]
pub struct EffectSinks<'a> {
    /// Store name used in emitted events.
    pub store: &'a str,
    /// Signal bumped by [`Effect::NotifyChanged`].
    pub refresh: &'a RefreshSignal,
    /// Feed receiving [`Effect::Emit`] events.
    pub feed: &'a ChangeFeed,
}

/// Awaits `operation`, then applies `effects` in order.
///
/// The operation's outcome is returned unchanged.
pub async fn with_side_effects<T, F>(
    sinks: EffectSinks<'_>,
    effects: &[Effect],
    operation: F,
) -> CoreResult<T>
where
    T: Affected,
    F: Future<Output = CoreResult<T>>,
{
    let outcome = operation.await;
    for effect in effects {
        match effect {
            Effect::NotifyChanged => sinks.refresh.notify(),
            Effect::Emit(kind) => {
                if let Ok(value) = &outcome {
                    sinks.feed.publish(sinks.store, *kind, value.affected());
                }
            }
        }
    }
    outcome
}
