//! Crash and corruption simulation for segment files.
//!
//! These helpers edit closed segment files in place to reproduce what a
//! crash or a bad disk leaves behind:
//!
//! 1. **Torn write** - the body of the last frame never reached the disk
//! 2. **Bit rot** - a byte flipped somewhere inside a record
//! 3. **Lost tail** - the active segment vanished after a rotation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use segwal_testkit::crash::*;
//!
//! wal.close();
//! let tail = tail_segment(wal.path()).unwrap();
//! zero_last_frame_body(&tail).unwrap();
//! ```

use segwal_core::codec::{decode_frame_size, FRAME_SIZE_LEN};
use segwal_core::segment::{is_sealed_name, is_temp_name};
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Location of one frame inside a segment file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSpan {
    /// Offset of the length field.
    pub offset: u64,
    /// Length of body plus padding.
    pub body_len: u64,
}

impl FrameSpan {
    /// Offset of the first body byte.
    pub fn body_offset(&self) -> u64 {
        self.offset + FRAME_SIZE_LEN
    }

    /// Offset just past the frame.
    pub fn end(&self) -> u64 {
        self.body_offset() + self.body_len
    }
}

/// Returns the sealed segment files of `dir` in log order.
pub fn sealed_segments(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut out = list_matching(dir, is_sealed_name)?;
    out.sort();
    Ok(out)
}

/// Returns the active tail segment of `dir`, if any.
pub fn tail_segment(dir: &Path) -> io::Result<Option<PathBuf>> {
    let mut temps = list_matching(dir, is_temp_name)?;
    temps.sort();
    Ok(temps.into_iter().next())
}

fn list_matching(dir: &Path, matches: fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_str().is_some_and(matches) {
            out.push(entry.path());
        }
    }
    Ok(out)
}

/// Walks the frames of a segment until a zero length field or end of file.
///
/// Frames are not verified; a frame running past the end of the file ends
/// the walk.
pub fn frame_spans(path: &Path) -> io::Result<Vec<FrameSpan>> {
    let data = fs::read(path)?;
    let mut spans = Vec::new();
    let mut offset = 0u64;
    while offset + FRAME_SIZE_LEN <= data.len() as u64 {
        let start = offset as usize;
        let mut field = [0u8; 8];
        field.copy_from_slice(&data[start..start + 8]);
        let length_field = u64::from_le_bytes(field);
        if length_field == 0 {
            break;
        }
        let (record_bytes, pad_bytes) = decode_frame_size(length_field);
        let span = FrameSpan {
            offset,
            body_len: record_bytes + pad_bytes,
        };
        if span.end() > data.len() as u64 {
            break;
        }
        spans.push(span);
        offset = span.end();
    }
    Ok(spans)
}

/// Zeroes the body of the last frame in `path`, leaving its length field.
///
/// Reproduces a crash where the length field was persisted but the body
/// sectors were not. Returns the span that was zeroed.
pub fn zero_last_frame_body(path: &Path) -> io::Result<FrameSpan> {
    let span = frame_spans(path)?
        .pop()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "segment has no frames"))?;
    write_at(path, span.body_offset(), &vec![0u8; span.body_len as usize])?;
    Ok(span)
}

/// Cuts `path` short in the middle of its last frame body.
pub fn truncate_last_frame(path: &Path) -> io::Result<FrameSpan> {
    let span = frame_spans(path)?
        .pop()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "segment has no frames"))?;
    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(span.body_offset() + span.body_len / 2)?;
    file.sync_all()?;
    Ok(span)
}

/// Returns the offset of the first occurrence of `needle` in `path`.
pub fn find_bytes(path: &Path, needle: &[u8]) -> io::Result<Option<u64>> {
    let data = fs::read(path)?;
    if needle.is_empty() {
        return Ok(Some(0));
    }
    Ok(data
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p as u64))
}

/// Inverts every bit of the byte at `offset`.
pub fn flip_byte(path: &Path, offset: u64) -> io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut byte = [0u8; 1];
    file.read_exact(&mut byte)?;
    byte[0] ^= 0xFF;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&byte)?;
    file.sync_all()
}

/// Flips the first byte of `needle` inside `path`.
///
/// Returns `false` if `needle` does not occur.
pub fn corrupt_needle(path: &Path, needle: &[u8]) -> io::Result<bool> {
    match find_bytes(path, needle)? {
        Some(offset) => {
            flip_byte(path, offset)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Overwrites bytes of `path` starting at `offset`.
pub fn write_at(path: &Path, offset: u64, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Reads every file of `dir` into `(name, bytes)` pairs, sorted by name.
pub fn snapshot_dir(dir: &Path) -> io::Result<Vec<(String, Vec<u8>)>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        out.push((name, fs::read(entry.path())?));
    }
    out.sort();
    Ok(out)
}
