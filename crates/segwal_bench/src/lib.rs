//! Benchmark utilities.

use segwal_core::{Entry, WalConfig};
use segwal_testkit::payload;

/// Segment size used by the benchmarks.
pub const BENCH_SEGMENT_BYTES: u64 = 4 * 1024 * 1024;

/// Configuration for benchmark WALs.
pub fn bench_config() -> WalConfig {
    WalConfig::new().segment_size_bytes(BENCH_SEGMENT_BYTES)
}

/// Generate a batch of entries with `payload_size` bytes each.
pub fn generate_entries(count: usize, payload_size: usize) -> Vec<Entry> {
    (0..count as u64)
        .map(|i| Entry::new(payload(i, payload_size)))
        .collect()
}
