//! # SegWAL Core
//!
//! A segmented, checksummed, crash-recoverable write-ahead log.
//!
//! This crate provides:
//! - Chained CRC64 checksums that link every record to all records before it
//! - A length-prefixed, 8-byte aligned frame codec with page-aligned writes
//! - Background pre-allocation of segment files
//! - The [`Wal`] manager: append, rotation, replay with torn-write recovery,
//!   and retention of sealed segments
//!
//! ## Example
//!
//! ```rust,ignore
//! use segwal_core::{Entry, Wal, WalConfig};
//!
//! let config = WalConfig::default();
//! let wal = Wal::create("wal", b"node-1", &config)?;
//! let next = wal.save(&mut [Entry::new(b"hello".to_vec())])?;
//! wal.sync()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod allocator;
mod checksum;
pub mod codec;
mod config;
mod error;
mod record;
pub mod segment;
mod wal;

pub use allocator::{AllocatedFile, SegmentAllocator};
pub use checksum::ChainedCrc64;
pub use config::{WalConfig, MIN_SECTOR_SIZE};
pub use error::{WalError, WalResult};
pub use record::{Entry, Record, RecordKind, RECORD_HEADER_SIZE};
pub use segment::SegmentName;
pub use wal::Wal;
