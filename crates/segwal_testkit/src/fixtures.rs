//! Test fixtures and WAL helpers.
//!
//! Provides a WAL living in a temporary directory, plus configurations that
//! make rotation happen after a handful of entries.

use segwal_core::{Entry, Wal, WalConfig};
use std::path::Path;
use tempfile::TempDir;

/// Segment size used by [`small_segment_config`].
pub const SMALL_SEGMENT_BYTES: u64 = 4096;

/// Configuration with tiny segments, so tests rotate often.
pub fn small_segment_config() -> WalConfig {
    WalConfig::new()
        .segment_size_bytes(SMALL_SEGMENT_BYTES)
        .use_fallocate(false)
}

/// Configuration with the default segment size and no `fallocate`.
pub fn test_config() -> WalConfig {
    WalConfig::new().use_fallocate(false)
}

/// A test WAL with automatic cleanup.
pub struct TestWal {
    /// The WAL instance.
    pub wal: Wal,
    /// Configuration used to open the WAL.
    pub config: WalConfig,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: TempDir,
}

impl TestWal {
    /// Creates a WAL with [`test_config`] in a fresh temporary directory.
    pub fn new(metadata: &[u8]) -> Self {
        Self::with_config(metadata, test_config())
    }

    /// Creates a WAL with `config` in a fresh temporary directory.
    pub fn with_config(metadata: &[u8], config: WalConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let wal = Wal::create(wal_dir(&temp_dir), metadata, &config).expect("Failed to create WAL");
        Self {
            wal,
            config,
            temp_dir,
        }
    }

    /// Returns the WAL directory.
    pub fn path(&self) -> &Path {
        self.wal.dir()
    }

    /// Closes the WAL, opens it again and replays it.
    pub fn reopen(&mut self) -> (Vec<u8>, Vec<Entry>) {
        self.try_reopen().expect("Failed to replay WAL")
    }

    /// Closes the WAL, opens it again and replays it, returning replay errors.
    pub fn try_reopen(&mut self) -> segwal_core::WalResult<(Vec<u8>, Vec<Entry>)> {
        self.wal.close().expect("Failed to close WAL");
        self.wal = Wal::open(wal_dir(&self.temp_dir), &self.config)?;
        self.wal.read_all()
    }

    /// Closes the WAL without reopening, for tests that edit files on disk.
    pub fn close(&self) {
        self.wal.close().expect("Failed to close WAL");
    }
}

impl std::ops::Deref for TestWal {
    type Target = Wal;

    fn deref(&self) -> &Self::Target {
        &self.wal
    }
}

fn wal_dir(temp_dir: &TempDir) -> std::path::PathBuf {
    temp_dir.path().join("wal")
}

/// Runs a test with a WAL in a temporary directory.
///
/// # Example
///
/// ```rust,ignore
/// use segwal_testkit::with_temp_wal;
///
/// #[test]
/// fn my_test() {
///     with_temp_wal(b"meta", |wal| {
///         wal.save(&mut [Entry::new(b"x".to_vec())]).unwrap();
///     });
/// }
/// ```
pub fn with_temp_wal<F, R>(metadata: &[u8], f: F) -> R
where
    F: FnOnce(&Wal) -> R,
{
    let test_wal = TestWal::new(metadata);
    f(&test_wal.wal)
}

/// Builds entries from string data.
pub fn entries_from(data: &[&str]) -> Vec<Entry> {
    data.iter().map(|d| Entry::new(d.as_bytes().to_vec())).collect()
}

/// Returns the data of `entries`.
pub fn entry_data(entries: &[Entry]) -> Vec<Vec<u8>> {
    entries.iter().map(|e| e.data.clone()).collect()
}

/// Returns the indices of `entries`.
pub fn entry_indices(entries: &[Entry]) -> Vec<u64> {
    entries.iter().map(|e| e.index).collect()
}
