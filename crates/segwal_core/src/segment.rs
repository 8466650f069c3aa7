//! Segment file naming and directory utilities.
//!
//! ```text
//! <wal_dir>/
//! ├─ 0000000000000000-0000000000000400.wal   # sealed, entries [.., 0x400)
//! ├─ 0000000000000001-0000000000000a12.wal   # sealed
//! └─ .01718000000000000000.000002.wal.tmp    # active tail
//! ```
//!
//! Sealed names are `{sequence:016x}-{next_index:016x}.wal`, where
//! `next_index` is one past the last entry index the segment holds.
//! The tail is the one temporary file that holds data, or the first
//! temporary file in sorted order when none does. Any further temporary
//! files are candidates the allocator created but never handed out.

use crate::error::{WalError, WalResult};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Extension of sealed segment files.
pub const SEGMENT_EXT: &str = ".wal";

/// Extension of temporary (tail or pre-allocated) segment files.
pub const TEMP_EXT: &str = ".wal.tmp";

/// Sequence number and entry high-water mark of a sealed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SegmentName {
    /// Position of the segment in the log.
    pub seq: u64,
    /// One past the highest entry index stored in the segment.
    pub next_index: u64,
}

impl SegmentName {
    /// Creates a segment name.
    #[must_use]
    pub const fn new(seq: u64, next_index: u64) -> Self {
        Self { seq, next_index }
    }

    /// Parses a sealed segment file name.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::BadName`] if `name` is not of the form
    /// `{16 hex digits}-{16 hex digits}.wal`.
    pub fn parse(name: &str) -> WalResult<Self> {
        let bad = || WalError::BadName {
            name: name.to_string(),
        };

        let stem = name.strip_suffix(SEGMENT_EXT).ok_or_else(bad)?;
        let (seq, index) = stem.split_once('-').ok_or_else(bad)?;
        if seq.len() != 16 || index.len() != 16 {
            return Err(bad());
        }
        let seq = u64::from_str_radix(seq, 16).map_err(|_| bad())?;
        let next_index = u64::from_str_radix(index, 16).map_err(|_| bad())?;
        Ok(Self { seq, next_index })
    }

    /// Returns the file name for this segment.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.to_string()
    }

    /// Returns true if every entry in the segment has an index `<= index`.
    #[must_use]
    pub const fn covered_by(&self, index: u64) -> bool {
        self.next_index <= index.saturating_add(1)
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}-{:016x}{SEGMENT_EXT}", self.seq, self.next_index)
    }
}

/// Builds the name of a temporary segment file.
#[must_use]
pub fn temp_segment_name(stamp: u128, counter: u64) -> String {
    format!(".{stamp:020}.{counter:06}{TEMP_EXT}")
}

/// Returns true for temporary segment file names.
#[must_use]
pub fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_EXT)
}

/// Returns true for file names that claim to be sealed segments.
#[must_use]
pub fn is_sealed_name(name: &str) -> bool {
    name.ends_with(SEGMENT_EXT)
}

/// Segment files found in a WAL directory.
#[derive(Debug, Default)]
pub struct SegmentListing {
    /// Sealed segments in log order.
    pub sealed: Vec<(PathBuf, SegmentName)>,
    /// The active tail, if any temporary file exists.
    pub tail: Option<PathBuf>,
    /// Unwritten temporary files other than the tail.
    pub extra_temps: Vec<PathBuf>,
}

impl SegmentListing {
    /// Returns true if the directory holds no segment files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty() && self.tail.is_none()
    }

    /// Sequence numbers missing between the first and last sealed segment.
    #[must_use]
    pub fn sequence_gaps(&self) -> Vec<(u64, u64)> {
        self.sealed
            .windows(2)
            .filter(|pair| pair[1].1.seq != pair[0].1.seq + 1)
            .map(|pair| (pair[0].1.seq, pair[1].1.seq))
            .collect()
    }
}

/// Scans `dir` for segment files.
///
/// Files that are neither sealed nor temporary segments are ignored.
///
/// # Errors
///
/// Returns [`WalError::BadName`] for a `.wal` file whose name does not parse,
/// [`WalError::InvalidState`] if more than one temporary file holds data, or
/// an I/O error if the directory cannot be read.
pub fn list_segments(dir: &Path) -> WalResult<SegmentListing> {
    let mut sealed = Vec::new();
    let mut temps = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if is_temp_name(&name) {
            temps.push(entry.path());
        } else if is_sealed_name(&name) {
            sealed.push((entry.path(), SegmentName::parse(&name)?));
        }
    }

    sealed.sort_by(|a, b| a.1.cmp(&b.1));
    temps.sort();

    let mut written = Vec::new();
    let mut unwritten = Vec::new();
    for path in temps {
        if is_unwritten(&path)? {
            unwritten.push(path);
        } else {
            written.push(path);
        }
    }
    if written.len() > 1 {
        return Err(WalError::invalid_state(format!(
            "{} temporary segments hold data in {}",
            written.len(),
            dir.display()
        )));
    }

    let tail = match written.pop() {
        Some(path) => Some(path),
        None if unwritten.is_empty() => None,
        None => Some(unwritten.remove(0)),
    };
    Ok(SegmentListing {
        sealed,
        tail,
        extra_temps: unwritten,
    })
}

/// Discards everything after the current position of `file`.
///
/// The file is truncated at its position and re-extended to its previous
/// length, so the discarded range reads back as zeros. The position is left
/// unchanged.
pub fn zero_to_end(file: &mut File) -> io::Result<()> {
    let offset = file.stream_position()?;
    let len = file.metadata()?.len();
    file.set_len(offset)?;
    file.set_len(len.max(offset))?;
    file.seek(SeekFrom::Start(offset))?;
    Ok(())
}

/// Returns true if the file at `path` starts with an empty frame header,
/// meaning nothing was ever written to it.
pub fn is_unwritten(path: &Path) -> io::Result<bool> {
    use std::io::Read;

    let mut header = [0u8; 8];
    let mut file = File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        match file.read(&mut header[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(header.iter().all(|&b| b == 0))
}

/// Handle on a WAL directory, used to make renames and deletions durable.
#[derive(Debug)]
pub struct DirHandle {
    path: PathBuf,
    #[cfg(unix)]
    file: File,
}

impl DirHandle {
    /// Opens a handle on `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            #[cfg(unix)]
            file: File::open(path)?,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs directory entries to disk.
    #[cfg(unix)]
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Syncs directory entries to disk.
    ///
    /// NTFS journals metadata, so there is nothing to do on other platforms.
    #[cfg(not(unix))]
    pub fn sync(&self) -> io::Result<()> {
        Ok(())
    }
}
