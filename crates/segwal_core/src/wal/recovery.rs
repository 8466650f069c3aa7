//! Opening an existing log and replaying it.

use super::{write_header, Mode, Segment, Wal, WalInner};
use crate::allocator::SegmentAllocator;
use crate::codec::{Decoder, Encoder};
use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::record::{Entry, RecordKind};
use crate::segment::{list_segments, zero_to_end, DirHandle};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom};
use std::path::Path;

impl Wal {
    pub(super) fn open_impl(dir: &Path, config: &WalConfig, read_only: bool) -> WalResult<Self> {
        let listing = list_segments(dir)?;
        if listing.is_empty() {
            return Err(WalError::FileNotFound {
                dir: dir.to_path_buf(),
            });
        }
        for (before, after) in listing.sequence_gaps() {
            tracing::warn!(before, after, "gap in sealed segment sequence");
        }

        if !read_only {
            for path in &listing.extra_temps {
                fs::remove_file(path)?;
                tracing::info!(path = %path.display(), "removed unused pre-allocated segment");
            }
        }

        let mut segments = Vec::with_capacity(listing.sealed.len() + 1);
        for (path, name) in &listing.sealed {
            segments.push(Segment {
                path: path.clone(),
                file: File::open(path)?,
                sealed: Some(*name),
            });
        }
        if let Some(path) = &listing.tail {
            let file = if read_only {
                File::open(path)?
            } else {
                OpenOptions::new().read(true).write(true).open(path)?
            };
            segments.push(Segment {
                path: path.clone(),
                file,
                sealed: None,
            });
        }

        let readers = segments
            .iter()
            .map(|s| s.file.try_clone())
            .collect::<Result<Vec<_>, _>>()?;
        let next_seq = listing.sealed.last().map_or(0, |(_, name)| name.seq + 1);

        let (dir_handle, allocator) = if read_only {
            (None, None)
        } else {
            (
                Some(DirHandle::open(dir)?),
                Some(SegmentAllocator::start(
                    dir,
                    config.segment_size_bytes,
                    config.use_fallocate,
                )?),
            )
        };

        tracing::debug!(
            dir = %dir.display(),
            segments = segments.len(),
            read_only,
            "opened WAL"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            inner: Mutex::new(WalInner {
                config: config.clone(),
                dir_handle,
                metadata: Vec::new(),
                expected_metadata: None,
                mode: Mode::Read(Decoder::new(readers)),
                read_only,
                next_index: 0,
                next_seq,
                segments,
                allocator,
                torn_tail: false,
            }),
        })
    }

    /// Replays every record and returns the metadata and all entries.
    ///
    /// A torn write at the end of the tail segment ends the log; see
    /// [`Wal::recovered_torn_tail`]. On a read-write WAL the tail is then
    /// truncated at the last verified record and the WAL switches to append
    /// mode, continuing the checksum chain.
    ///
    /// # Errors
    ///
    /// - [`WalError::MetadataConflict`] if segment headers disagree, or differ
    ///   from the metadata passed to [`Wal::create`]
    /// - [`WalError::ChecksumMismatch`], [`WalError::UnexpectedEndOfLog`] or
    ///   [`WalError::InvalidRecord`] for corruption
    /// - [`WalError::InvalidState`] if called more than once
    pub fn read_all(&self) -> WalResult<(Vec<u8>, Vec<Entry>)> {
        let mut inner = self.inner.lock();
        let mut decoder = match std::mem::replace(&mut inner.mode, Mode::Idle) {
            Mode::Read(decoder) => decoder,
            Mode::Closed => {
                inner.mode = Mode::Closed;
                return Err(WalError::Closed);
            }
            other => {
                inner.mode = other;
                return Err(WalError::invalid_state("log has already been read"));
            }
        };

        let mut metadata: Option<Vec<u8>> = None;
        let mut entries = Vec::new();
        let mut next_index = 0;
        while let Some(record) = decoder.decode()? {
            match record.kind {
                RecordKind::Metadata => {
                    if let Some(seen) = &metadata {
                        if *seen != record.payload {
                            return Err(WalError::MetadataConflict);
                        }
                    } else {
                        metadata = Some(record.payload);
                    }
                }
                RecordKind::Entry => {
                    let entry = Entry::decode(&record.payload)?;
                    next_index = next_index.max(entry.index.saturating_add(1));
                    entries.push(entry);
                }
                RecordKind::ChecksumAnchor => {}
            }
        }

        // Sealed names keep the high-water mark once their entries are gone.
        let sealed_next = inner
            .segments
            .iter()
            .filter_map(|s| s.sealed)
            .map(|name| name.next_index)
            .max()
            .unwrap_or(0);
        next_index = next_index.max(sealed_next);

        if let (Some(expected), Some(found)) = (&inner.expected_metadata, &metadata) {
            if expected != found {
                return Err(WalError::MetadataConflict);
            }
        }
        let metadata = metadata
            .or_else(|| inner.expected_metadata.clone())
            .unwrap_or_default();

        if decoder.torn() {
            tracing::warn!(
                offset = decoder.last_offset(),
                "torn write at end of WAL, recovered up to last complete record"
            );
            inner.torn_tail = true;
        }
        tracing::info!(
            dir = %self.dir.display(),
            entries = entries.len(),
            next_index,
            segments = inner.segments.len(),
            "replayed WAL"
        );

        inner.metadata.clone_from(&metadata);
        inner.next_index = next_index;
        if !inner.read_only {
            inner.resume_append(decoder.last_crc(), decoder.last_offset())?;
        }
        Ok((metadata, entries))
    }
}

impl WalInner {
    /// Positions the tail for appending after a replay that ended at
    /// `last_offset` in the tail with chain value `last_crc`.
    fn resume_append(&mut self, last_crc: u64, last_offset: u64) -> WalResult<()> {
        let tail_is_temp = self.segments.last().is_some_and(|s| s.sealed.is_none());

        if tail_is_temp {
            let tail = self
                .segments
                .last_mut()
                .ok_or_else(|| WalError::invalid_state("no tail segment"))?;
            tail.file.seek(SeekFrom::Start(last_offset))?;
            zero_to_end(&mut tail.file)?;

            let mut encoder =
                Encoder::new(tail.file.try_clone()?, last_crc, last_offset, &self.config);
            if last_offset == 0 {
                write_header(&mut encoder, last_crc, &self.metadata)?;
            }
            tail.file.sync_all()?;
            tracing::debug!(path = %tail.path.display(), offset = last_offset, "resuming tail");
            self.mode = Mode::Append(encoder);
            return Ok(());
        }

        // The last segment was sealed but no new tail was adopted.
        let allocated = self
            .allocator
            .as_ref()
            .ok_or(WalError::AllocatorClosed)?
            .get_new_file()?;
        let path = allocated.path.clone();
        self.start_tail(allocated, last_crc)?;
        tracing::info!(path = %path.display(), "started new tail after sealed segment");
        Ok(())
    }
}
