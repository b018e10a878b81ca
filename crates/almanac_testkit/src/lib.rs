//! # Almanac Testkit
//!
//! Test utilities for Almanac.
//!
//! This crate provides:
//! - Calendar fixtures and store helpers
//! - A fault-injecting storage backend
//! - Property-based test generators using proptest
//! - Cross-crate integration test helpers
//!
//! ## Usage
//!
//! ```rust
//! use almanac_testkit::prelude::*;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let (backend, events) = flaky_events();
//! let record = events.add(event("c1", 100, "Standup")).await.unwrap();
//!
//! backend.inject(Fault::on_id(record.id()).always());
//! assert!(events.remove(record.id()).await.is_err());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use integration::*;
