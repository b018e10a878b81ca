//! # Almanac Core
//!
//! Persistent record storage with indexed querying and bulk transactions.
//!
//! This crate provides:
//! - [`RecordStore`], CRUD and partial-match queries over one object store
//! - [`IndexRegistry`] and [`QueryPlan`], choosing the best index per query
//! - [`BulkTransaction`], batched writes with retry and rollback
//! - [`ChangeFeed`] and [`RefreshSignal`], notifications after mutations
//! - [`Collection`], a typed view over a record store
//!
//! ## Example
//!
//! ```rust
//! use almanac_codec::Fields;
//! use almanac_core::{BulkTransaction, CommitState, Query, RecordStore};
//! use almanac_storage::{IndexDescriptor, InMemoryBackend, StoreSchema};
//! use std::sync::Arc;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let schema = StoreSchema::new("events")
//!     .index(IndexDescriptor::new(["calendar_id", "startDate"]));
//! let backend = Arc::new(InMemoryBackend::open([schema]).unwrap());
//! let events = RecordStore::open(backend, "events").unwrap();
//!
//! let a = events.add(Fields::new().with("calendar_id", "c1").with("startDate", 9)).await.unwrap();
//! let b = events.add(Fields::new().with("calendar_id", "c1").with("startDate", 14)).await.unwrap();
//!
//! // Swap the two start dates atomically.
//! let mut bulk = BulkTransaction::new([a.clone(), b.clone()], &events);
//! bulk.update(a.id(), Fields::new().with("startDate", 14)).unwrap();
//! bulk.update(b.id(), Fields::new().with("startDate", 9)).unwrap();
//! bulk.commit().await.unwrap();
//! assert_eq!(bulk.state(), CommitState::Committed);
//!
//! let first = events.find(&Query::all().eq("calendar_id", "c1").eq("startDate", 9)).await;
//! assert_eq!(first.map(|r| r.id().to_string()), Some(b.id().to_string()));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bulk;
mod change_feed;
mod collection;
mod config;
mod effects;
mod error;
mod planner;
mod query;
mod store;

pub use bulk::{BulkOperation, BulkTransaction, CommitState, OperationKind};
pub use change_feed::{ChangeFeed, ChangeKind, ListenerId, StoreEvent};
pub use collection::Collection;
pub use config::Config;
pub use effects::{with_side_effects, Affected, Effect, EffectSinks, RefreshSignal};
pub use error::{CoreError, CoreResult};
pub use planner::{Access, IndexRegistry, QueryPlan};
pub use query::Query;
pub use store::RecordStore;
