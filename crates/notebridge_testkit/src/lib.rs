//! # notebridge testkit
//!
//! Test utilities for notebridge.
//!
//! This crate provides:
//! - A harness wiring in-memory stores, a shared clock and a driver
//! - Convergence assertions over both stores and the persisted state
//! - Property-based generators for note sets and edit sequences
//!
//! ## Usage
//!
//! ```rust
//! use notebridge_testkit::prelude::*;
//!
//! let h = SyncHarness::new();
//! h.notes.insert_note("[Work] Plan", "draft");
//! h.pass();
//! h.assert_converged();
//! assert_eq!(h.pass().counts.changes(), 0);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
