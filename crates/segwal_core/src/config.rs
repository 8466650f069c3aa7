//! WAL configuration.

use crate::error::{WalError, WalResult};
use std::time::Duration;

/// Smallest unit the storage medium is assumed to persist atomically.
pub const MIN_SECTOR_SIZE: usize = 512;

/// Configuration for creating or opening a WAL.
///
/// Built once by the owning process and passed by reference to
/// [`crate::Wal::create`] and [`crate::Wal::open`].
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Pre-allocated size of each segment file. A segment is rotated once its
    /// written length reaches this size, so a segment may grow slightly past it.
    pub segment_size_bytes: u64,

    /// Alignment for flushing buffered frames to the segment file.
    pub page_bytes: usize,

    /// Buffered bytes the page writer accumulates before writing through.
    pub buffer_watermark_bytes: usize,

    /// Whether to reserve segment space with `fallocate` instead of a plain
    /// `set_len`.
    pub use_fallocate: bool,

    /// fsync calls slower than this are logged as warnings.
    pub slow_sync_threshold: Duration,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            segment_size_bytes: 8 * 1000 * 1000, // 8 MB
            page_bytes: 8 * MIN_SECTOR_SIZE,
            buffer_watermark_bytes: 128 * 1024,
            use_fallocate: true,
            slow_sync_threshold: Duration::from_secs(1),
        }
    }
}

impl WalConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the segment size.
    #[must_use]
    pub const fn segment_size_bytes(mut self, size: u64) -> Self {
        self.segment_size_bytes = size;
        self
    }

    /// Sets the page alignment used when flushing.
    #[must_use]
    pub const fn page_bytes(mut self, size: usize) -> Self {
        self.page_bytes = size;
        self
    }

    /// Sets the page writer's buffer watermark.
    #[must_use]
    pub const fn buffer_watermark_bytes(mut self, size: usize) -> Self {
        self.buffer_watermark_bytes = size;
        self
    }

    /// Sets whether to pre-allocate with `fallocate`.
    #[must_use]
    pub const fn use_fallocate(mut self, value: bool) -> Self {
        self.use_fallocate = value;
        self
    }

    /// Sets the slow fsync warning threshold.
    #[must_use]
    pub const fn slow_sync_threshold(mut self, threshold: Duration) -> Self {
        self.slow_sync_threshold = threshold;
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::InvalidConfig`] if the segment size or watermark is
    /// zero, or the page size is not a non-zero multiple of the sector size.
    pub fn validate(&self) -> WalResult<()> {
        if self.segment_size_bytes == 0 {
            return Err(WalError::invalid_config("segment size must be non-zero"));
        }
        if self.page_bytes == 0 || self.page_bytes % MIN_SECTOR_SIZE != 0 {
            return Err(WalError::invalid_config(format!(
                "page size {} is not a multiple of {MIN_SECTOR_SIZE}",
                self.page_bytes
            )));
        }
        if self.buffer_watermark_bytes == 0 {
            return Err(WalError::invalid_config(
                "buffer watermark must be non-zero",
            ));
        }
        Ok(())
    }
}
