//! Background segment pre-allocation.
//!
//! A [`SegmentAllocator`] owns one worker thread that keeps the next segment
//! file ready: created under a temporary name and sized to the segment limit
//! before anyone asks for it. Rotation then only has to take the file from a
//! rendezvous channel instead of waiting on the filesystem.
//!
//! ```text
//! worker: allocate ──► send (blocks until taken) ──► allocate ──► ...
//!                │
//!                └─ on error: remove file, report on error channel, stop
//! ```

use crate::error::{WalError, WalResult};
use crate::segment::temp_segment_name;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

/// A pre-allocated segment file and the path it was created at.
#[derive(Debug)]
pub struct AllocatedFile {
    /// Temporary path of the file.
    pub path: PathBuf,
    /// Open read-write handle, positioned at offset 0.
    pub file: File,
}

/// Hands out pre-allocated segment files produced by a background thread.
#[derive(Debug)]
pub struct SegmentAllocator {
    files: Option<Receiver<AllocatedFile>>,
    errors: Receiver<io::Error>,
    worker: Option<JoinHandle<()>>,
}

impl SegmentAllocator {
    /// Starts a worker that pre-allocates `segment_size` byte files in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the worker thread cannot be spawned.
    pub fn start(dir: &Path, segment_size: u64, use_fallocate: bool) -> WalResult<Self> {
        let (file_tx, file_rx) = mpsc::sync_channel(0);
        let (err_tx, err_rx) = mpsc::sync_channel(1);
        let dir = dir.to_path_buf();

        let worker = thread::Builder::new()
            .name("segwal-allocator".to_string())
            .spawn(move || run(&dir, segment_size, use_fallocate, &file_tx, &err_tx))?;

        Ok(Self {
            files: Some(file_rx),
            errors: err_rx,
            worker: Some(worker),
        })
    }

    /// Blocks until the next pre-allocated file is ready.
    ///
    /// # Errors
    ///
    /// Returns the allocation error reported by the worker, or
    /// [`WalError::AllocatorClosed`] once the worker has stopped.
    pub fn get_new_file(&self) -> WalResult<AllocatedFile> {
        let files = self.files.as_ref().ok_or(WalError::AllocatorClosed)?;
        match files.recv() {
            Ok(allocated) => Ok(allocated),
            Err(mpsc::RecvError) => match self.errors.try_recv() {
                Ok(err) => Err(WalError::Io(err)),
                Err(_) => Err(WalError::AllocatorClosed),
            },
        }
    }

    /// Stops the worker and waits for it to exit.
    ///
    /// A file the worker was holding is deleted. Safe to call more than once.
    pub fn close(&mut self) {
        // Dropping the receiver fails the worker's pending send.
        self.files = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("segment allocator thread panicked");
            }
        }
    }
}

impl Drop for SegmentAllocator {
    fn drop(&mut self) {
        self.close();
    }
}

fn run(
    dir: &Path,
    segment_size: u64,
    use_fallocate: bool,
    files: &SyncSender<AllocatedFile>,
    errors: &SyncSender<io::Error>,
) {
    let mut counter: u64 = 0;
    loop {
        let path = dir.join(temp_segment_name(timestamp_nanos(), counter));
        counter += 1;

        let file = match allocate(&path, segment_size, use_fallocate) {
            Ok(file) => file,
            Err(err) => {
                tracing::error!(
                    path = %path.display(),
                    error = %err,
                    "segment allocation failed"
                );
                let _ = fs::remove_file(&path);
                let _ = errors.try_send(err);
                return;
            }
        };
        tracing::debug!(path = %path.display(), size = segment_size, "pre-allocated segment");

        if let Err(mpsc::SendError(unused)) = files.send(AllocatedFile { path, file }) {
            drop(unused.file);
            if let Err(err) = fs::remove_file(&unused.path) {
                tracing::warn!(
                    path = %unused.path.display(),
                    error = %err,
                    "failed to remove unused segment"
                );
            }
            return;
        }
    }
}

fn allocate(path: &Path, size: u64, use_fallocate: bool) -> io::Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create_new(true)
        .open(path)?;

    if use_fallocate {
        match file.allocate(size) {
            Ok(()) => return Ok(file),
            Err(err) if is_unsupported(&err) => {
                tracing::debug!(error = %err, "fallocate unsupported, extending with set_len");
            }
            Err(err) => return Err(err),
        }
    }
    file.set_len(size)?;
    Ok(file)
}

fn is_unsupported(err: &io::Error) -> bool {
    // EOPNOTSUPP is not mapped to `ErrorKind::Unsupported`.
    (cfg!(target_os = "linux") && err.raw_os_error() == Some(95))
        || err.kind() == io::ErrorKind::Unsupported
}

fn timestamp_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
