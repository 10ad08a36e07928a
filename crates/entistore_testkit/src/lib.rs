//! # Entistore Testkit
//!
//! Test utilities for entistore.
//!
//! This crate provides:
//! - A small HR test domain (humans, organizations, employment edges,
//!   departments with composite teams) and its relationship schema
//! - Store fixtures, prebuilt secondary indices and a recording listener
//! - A JSON entity codec for snapshot tests
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use entistore_testkit::prelude::*;
//!
//! #[test]
//! fn removes_cleanly() {
//!     let store = domain_store();
//!     let alice = Human::create("Alice Tegnér", "Alice", "Alice", "Tegnér");
//!     store.put(0, alice.clone()).unwrap();
//!     store.remove("Human", &0).unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::codec::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use codec::*;
pub use fixtures::*;
pub use generators::*;
