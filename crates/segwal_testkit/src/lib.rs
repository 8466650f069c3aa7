//! # SegWAL Testkit
//!
//! Test utilities for SegWAL.
//!
//! This crate provides:
//! - Temporary-directory WAL fixtures
//! - Corruption and crash helpers that edit segment files in place
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segwal_testkit::prelude::*;
//!
//! #[test]
//! fn survives_reopen() {
//!     let mut wal = TestWal::new(b"meta");
//!     wal.save(&mut [Entry::new(b"a".to_vec())]).unwrap();
//!     let (_, entries) = wal.reopen();
//!     assert_eq!(entries.len(), 1);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use segwal_core::{Entry, Wal, WalConfig, WalError};
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
