//! The write-ahead log manager.
//!
//! A [`Wal`] owns a directory of segment files. It starts in read mode when
//! opened over an existing log, and moves to append mode once
//! [`Wal::read_all`] has replayed every record:
//!
//! ```text
//! create (new dir) ───────────────────────────────► Append
//! open / create (existing) ──► Read ──read_all──► Append | Idle (read-only)
//! Append ──rotation fails after sealing──► Idle
//! any ──close──► Closed
//! ```
//!
//! Every segment starts with a checksum anchor carrying the chain value of
//! the previous segment, followed by the caller's metadata, so each segment
//! can be verified on its own once earlier segments are removed.

mod recovery;
mod retention;

use crate::allocator::{AllocatedFile, SegmentAllocator};
use crate::codec::{Decoder, Encoder};
use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::record::{Entry, Record};
use crate::segment::{list_segments, DirHandle, SegmentName};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A segmented, checksummed, crash-recoverable write-ahead log.
///
/// All methods take `&self` and serialize on an internal lock, so a `Wal`
/// can be shared behind an `Arc`. There must be only one writer per
/// directory.
///
/// # Example
///
/// ```rust,ignore
/// use segwal_core::{Entry, Wal, WalConfig};
///
/// let config = WalConfig::default();
/// let wal = Wal::create("node/wal", b"cluster-7", &config)?;
/// wal.save(&mut [Entry::new(b"tx".to_vec())])?;
/// wal.sync()?;
/// wal.close()?;
///
/// let wal = Wal::open("node/wal", &config)?;
/// let (metadata, entries) = wal.read_all()?;
/// ```
#[derive(Debug)]
pub struct Wal {
    dir: PathBuf,
    inner: Mutex<WalInner>,
}

#[derive(Debug)]
struct WalInner {
    config: WalConfig,
    dir_handle: Option<DirHandle>,
    metadata: Vec<u8>,
    /// Metadata passed to `create` over an existing log.
    expected_metadata: Option<Vec<u8>>,
    mode: Mode,
    read_only: bool,
    next_index: u64,
    next_seq: u64,
    /// Sealed segments in log order, then the tail.
    segments: Vec<Segment>,
    allocator: Option<SegmentAllocator>,
    torn_tail: bool,
}

#[derive(Debug)]
enum Mode {
    Read(Decoder<File>),
    Append(Encoder<File>),
    /// No active segment: a replayed read-only log, or a rotation that
    /// failed after sealing the tail.
    Idle,
    Closed,
}

#[derive(Debug)]
struct Segment {
    path: PathBuf,
    file: File,
    /// `None` for the temporary tail.
    sealed: Option<SegmentName>,
}

impl Wal {
    /// Creates a WAL in `dir`.
    ///
    /// If `dir` holds no segment files, it is created if needed and a first
    /// segment is written with `metadata` in its header; the WAL is ready to
    /// append. If a log already exists, it is opened for recovery instead:
    /// call [`Wal::read_all`], which fails with
    /// [`WalError::MetadataConflict`] if the log's metadata differs from
    /// `metadata`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the directory or
    /// first segment cannot be created.
    pub fn create(dir: impl AsRef<Path>, metadata: &[u8], config: &WalConfig) -> WalResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();

        if dir.is_dir() && !list_segments(dir)?.is_empty() {
            tracing::info!(dir = %dir.display(), "WAL exists, opening for recovery");
            let wal = Self::open_impl(dir, config, false)?;
            wal.inner.lock().expected_metadata = Some(metadata.to_vec());
            return Ok(wal);
        }

        fs::create_dir_all(dir)?;
        let dir_handle = DirHandle::open(dir)?;
        let allocator =
            SegmentAllocator::start(dir, config.segment_size_bytes, config.use_fallocate)?;

        let allocated = allocator.get_new_file()?;
        let mut encoder = Encoder::new(allocated.file.try_clone()?, 0, 0, config);
        write_header(&mut encoder, 0, metadata)?;
        allocated.file.sync_all()?;
        dir_handle.sync()?;

        tracing::info!(
            dir = %dir.display(),
            tail = %allocated.path.display(),
            "created WAL"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            inner: Mutex::new(WalInner {
                config: config.clone(),
                dir_handle: Some(dir_handle),
                metadata: metadata.to_vec(),
                expected_metadata: None,
                mode: Mode::Append(encoder),
                read_only: false,
                next_index: 0,
                next_seq: 0,
                segments: vec![Segment {
                    path: allocated.path,
                    file: allocated.file,
                    sealed: None,
                }],
                allocator: Some(allocator),
                torn_tail: false,
            }),
        })
    }

    /// Opens an existing WAL for reading and then appending.
    ///
    /// Unwritten pre-allocated files left behind by a crash are removed.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::FileNotFound`] if `dir` holds no segment files,
    /// [`WalError::BadName`] for a malformed segment name, or an I/O error.
    pub fn open(dir: impl AsRef<Path>, config: &WalConfig) -> WalResult<Self> {
        config.validate()?;
        Self::open_impl(dir.as_ref(), config, false)
    }

    /// Opens an existing WAL read-only.
    ///
    /// The returned WAL never modifies the directory; after
    /// [`Wal::read_all`] it can only be closed.
    ///
    /// # Errors
    ///
    /// Same as [`Wal::open`].
    pub fn open_for_read(dir: impl AsRef<Path>, config: &WalConfig) -> WalResult<Self> {
        config.validate()?;
        Self::open_impl(dir.as_ref(), config, true)
    }

    /// Appends `entries`, assigning each the next index.
    ///
    /// Rotates to a new segment once the tail reaches the configured size.
    /// Returns the index the next entry will get.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::InvalidState`] before [`Wal::read_all`] on a
    /// recovered log, [`WalError::ReadOnly`], [`WalError::Closed`], or the
    /// encoding or rotation error. Entries encoded before a failure keep
    /// their assigned index.
    pub fn save(&self, entries: &mut [Entry]) -> WalResult<u64> {
        let mut inner = self.inner.lock();
        for entry in entries.iter_mut() {
            inner.append_entry(entry)?;
        }
        inner.cut_if_full(&self.dir)?;
        Ok(inner.next_index)
    }

    /// Appends one entry and flushes it to the segment file.
    ///
    /// # Errors
    ///
    /// Same as [`Wal::save`].
    pub fn save_single(&self, entry: &mut Entry) -> WalResult<u64> {
        let mut inner = self.inner.lock();
        inner.append_entry(entry)?;
        inner.encoder()?.flush()?;
        inner.cut_if_full(&self.dir)?;
        Ok(inner.next_index)
    }

    /// Seals the tail segment and starts a new one.
    ///
    /// # Errors
    ///
    /// Returns the same state errors as [`Wal::save`], an allocator error, or
    /// an I/O error. If sealing fails before the rename, the current tail is
    /// kept.
    pub fn cut(&self) -> WalResult<()> {
        self.inner.lock().cut(&self.dir)
    }

    /// Flushes buffered frames and fsyncs the tail segment.
    ///
    /// # Errors
    ///
    /// Returns the same state errors as [`Wal::save`] or an I/O error.
    pub fn sync(&self) -> WalResult<()> {
        self.inner.lock().sync()
    }

    /// Closes the WAL.
    ///
    /// Stops the allocator, syncs the tail if appending, and releases every
    /// file handle. Calling `close` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the error from the final sync. The WAL is closed regardless.
    pub fn close(&self) -> WalResult<()> {
        let mut inner = self.inner.lock();
        if matches!(inner.mode, Mode::Closed) {
            return Ok(());
        }

        if let Some(mut allocator) = inner.allocator.take() {
            allocator.close();
        }
        let result = if matches!(inner.mode, Mode::Append(_)) {
            inner.sync()
        } else {
            Ok(())
        };

        inner.mode = Mode::Closed;
        inner.segments.clear();
        inner.dir_handle = None;
        tracing::debug!(dir = %self.dir.display(), "closed WAL");
        result
    }

    /// Closes the WAL and deletes its directory.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directory cannot be removed.
    pub fn destroy(self) -> WalResult<()> {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "error closing WAL before removal");
        }
        fs::remove_dir_all(&self.dir)?;
        tracing::info!(dir = %self.dir.display(), "removed WAL directory");
        Ok(())
    }

    /// Returns the index the next saved entry will get.
    #[must_use]
    pub fn next_index(&self) -> u64 {
        self.inner.lock().next_index
    }

    /// Returns the WAL directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the metadata stored in the segment headers.
    ///
    /// Empty until [`Wal::read_all`] on a recovered log.
    #[must_use]
    pub fn metadata(&self) -> Vec<u8> {
        self.inner.lock().metadata.clone()
    }

    /// Returns the paths of all held segments, tail last.
    #[must_use]
    pub fn segment_paths(&self) -> Vec<PathBuf> {
        self.inner
            .lock()
            .segments
            .iter()
            .map(|s| s.path.clone())
            .collect()
    }

    /// Returns the path of the tail segment.
    #[must_use]
    pub fn tail_path(&self) -> Option<PathBuf> {
        self.inner.lock().segments.last().map(|s| s.path.clone())
    }

    /// Returns true if [`Wal::read_all`] stopped at a torn write.
    #[must_use]
    pub fn recovered_torn_tail(&self) -> bool {
        self.inner.lock().torn_tail
    }

    /// Returns true if the WAL was opened with [`Wal::open_for_read`].
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.inner.lock().read_only
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(dir = %self.dir.display(), error = %err, "error closing WAL");
        }
    }
}

impl WalInner {
    /// Returns the active encoder, or the error explaining why there is none.
    fn encoder(&mut self) -> WalResult<&mut Encoder<File>> {
        if self.read_only {
            return Err(WalError::ReadOnly);
        }
        match &mut self.mode {
            Mode::Append(encoder) => Ok(encoder),
            Mode::Closed => Err(WalError::Closed),
            Mode::Read(_) => Err(WalError::invalid_state(
                "read_all must complete before appending",
            )),
            Mode::Idle => Err(WalError::invalid_state(
                "no active segment, reopen the log to continue appending",
            )),
        }
    }

    fn append_entry(&mut self, entry: &mut Entry) -> WalResult<()> {
        let index = self.next_index;
        let encoder = self.encoder()?;
        entry.index = index;
        encoder.encode(&mut Record::entry(entry))?;
        self.next_index = index + 1;
        Ok(())
    }

    fn cut_if_full(&mut self, dir: &Path) -> WalResult<()> {
        let segment_size = self.config.segment_size_bytes;
        if self.encoder()?.offset() < segment_size {
            return Ok(());
        }
        self.cut(dir)
    }

    fn cut(&mut self, dir: &Path) -> WalResult<()> {
        self.encoder()?;
        let allocated = self
            .allocator
            .as_ref()
            .ok_or(WalError::AllocatorClosed)?
            .get_new_file()?;
        self.rotate(dir, allocated)
    }

    /// Seals the tail and adopts `allocated` as the new tail.
    ///
    /// A failure before the rename leaves the old tail active. A failure
    /// after it leaves no active segment: appends fail until the log is
    /// reopened, which starts a fresh tail after the sealed one.
    fn rotate(&mut self, dir: &Path, allocated: AllocatedFile) -> WalResult<()> {
        let name = SegmentName::new(self.next_seq, self.next_index);
        let sealed_path = dir.join(name.file_name());
        let prev_crc = match self.seal_tail(&sealed_path) {
            Ok(crc) => crc,
            Err(err) => {
                discard_unused(allocated);
                return Err(err);
            }
        };

        // The old encoder writes into what is now a sealed file.
        self.mode = Mode::Idle;
        if let Some(tail) = self.segments.last_mut() {
            tail.path = sealed_path;
            tail.sealed = Some(name);
        }
        self.next_seq += 1;
        tracing::info!(segment = %name, next_index = self.next_index, "sealed segment");

        if let Err(err) = self.start_tail(allocated, prev_crc) {
            tracing::error!(
                segment = %name,
                error = %err,
                "failed to start new segment, appends disabled until reopen"
            );
            return Err(err);
        }
        Ok(())
    }

    /// Writes a header continuing from `prev_crc` into `allocated` and makes
    /// it the tail. The file is removed if any step fails.
    fn start_tail(&mut self, allocated: AllocatedFile, prev_crc: u64) -> WalResult<()> {
        match self.begin_segment(&allocated, prev_crc) {
            Ok(encoder) => {
                self.segments.push(Segment {
                    path: allocated.path,
                    file: allocated.file,
                    sealed: None,
                });
                self.mode = Mode::Append(encoder);
                Ok(())
            }
            Err(err) => {
                discard_unused(allocated);
                Err(err)
            }
        }
    }

    fn begin_segment(&self, allocated: &AllocatedFile, prev_crc: u64) -> WalResult<Encoder<File>> {
        if let Some(dir_handle) = &self.dir_handle {
            dir_handle.sync()?;
        }
        let mut encoder = Encoder::new(allocated.file.try_clone()?, prev_crc, 0, &self.config);
        write_header(&mut encoder, prev_crc, &self.metadata)?;
        allocated.file.sync_all()?;
        Ok(encoder)
    }

    /// Flushes, truncates, fsyncs and renames the tail to `sealed_path`.
    ///
    /// Returns the chain value the next segment continues from.
    fn seal_tail(&mut self, sealed_path: &Path) -> WalResult<u64> {
        let encoder = self.encoder()?;
        encoder.flush()?;
        let offset = encoder.offset();
        let prev_crc = encoder.last_crc();

        let tail = self
            .segments
            .last()
            .ok_or_else(|| WalError::invalid_state("no tail segment"))?;
        tail.file.set_len(offset)?;
        tail.file.sync_all()?;
        fs::rename(&tail.path, sealed_path)?;
        Ok(prev_crc)
    }

    fn sync(&mut self) -> WalResult<()> {
        let threshold = self.config.slow_sync_threshold;
        let start = Instant::now();
        self.encoder()?.flush()?;
        if let Some(tail) = self.segments.last() {
            tail.file.sync_all()?;
        }

        let took = start.elapsed();
        if took > threshold {
            tracing::warn!(
                took_ms = took.as_millis() as u64,
                expected_ms = threshold.as_millis() as u64,
                "slow fsync"
            );
        }
        Ok(())
    }
}

/// Deletes a pre-allocated file that never became the tail.
fn discard_unused(allocated: AllocatedFile) {
    drop(allocated.file);
    if let Err(err) = fs::remove_file(&allocated.path) {
        tracing::warn!(
            path = %allocated.path.display(),
            error = %err,
            "failed to remove unused segment"
        );
    }
}

/// Writes a segment header continuing the chain from `prev_crc`, and flushes
/// it. The caller fsyncs.
fn write_header(
    encoder: &mut Encoder<File>,
    prev_crc: u64,
    metadata: &[u8],
) -> WalResult<()> {
    encoder.encode(&mut Record::anchor(prev_crc))?;
    encoder.encode(&mut Record::metadata(metadata))?;
    encoder.flush()
}
