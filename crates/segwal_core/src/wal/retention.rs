//! Releasing and removing sealed segments that are no longer needed.

use super::{Wal, WalInner};
use crate::error::{WalError, WalResult};
use std::fs;

impl Wal {
    /// Closes the handles of sealed segments whose entries all have an index
    /// `<= index`. The files stay on disk. The tail is never released.
    ///
    /// Returns the number of segments released.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::ReadOnly`] or [`WalError::Closed`].
    pub fn release_lock_to(&self, index: u64) -> WalResult<usize> {
        let mut inner = self.inner.lock();
        let count = inner.covered_count(index)?;
        for segment in inner.segments.drain(..count) {
            tracing::debug!(path = %segment.path.display(), "released segment");
        }
        Ok(count)
    }

    /// Deletes sealed segments whose entries all have an index `<= index`.
    /// The tail is never removed, and while the tail holds no entries the
    /// newest sealed segment is kept, since its name records the next index.
    ///
    /// Returns the number of segments removed.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::ReadOnly`], [`WalError::Closed`], or an I/O error
    /// from deleting a file. Segments deleted before the error stay deleted;
    /// the failed one and those after it stay in the log.
    pub fn remove_files(&self, index: u64) -> WalResult<usize> {
        let mut inner = self.inner.lock();
        let count = inner.covered_count(index)?;

        let mut removed = 0;
        let mut result: WalResult<()> = Ok(());
        while removed < count {
            let path = inner.segments[0].path.clone();
            if let Err(err) = fs::remove_file(&path) {
                result = Err(err.into());
                break;
            }
            inner.segments.remove(0);
            removed += 1;
            tracing::info!(path = %path.display(), index, "removed segment");
        }

        if removed > 0 {
            if let Some(dir_handle) = &inner.dir_handle {
                dir_handle.sync()?;
            }
        }
        result.map(|()| removed)
    }
}

impl WalInner {
    /// Counts the leading sealed segments retention may drop for `index`.
    fn covered_count(&self, index: u64) -> WalResult<usize> {
        if self.read_only {
            return Err(WalError::ReadOnly);
        }
        if matches!(self.mode, super::Mode::Closed) {
            return Err(WalError::Closed);
        }

        let Some((tail, sealed)) = self.segments.split_last() else {
            return Ok(0);
        };
        let mut count = sealed
            .iter()
            .take_while(|s| s.sealed.is_some_and(|name| name.covered_by(index)))
            .count();

        let tail_is_empty = tail.sealed.is_none()
            && sealed
                .last()
                .and_then(|s| s.sealed)
                .is_some_and(|name| name.next_index == self.next_index);
        if count > 0 && count == sealed.len() && tail_is_empty {
            count -= 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::WalConfig;
    use crate::error::WalError;
    use crate::record::Entry;
    use crate::wal::Wal;
    use tempfile::tempdir;

    fn wal_with_three_segments(dir: &std::path::Path) -> Wal {
        let config = WalConfig::new().use_fallocate(false);
        let wal = Wal::create(dir, b"m", &config).unwrap();
        wal.save(&mut [Entry::new(b"0".to_vec()), Entry::new(b"1".to_vec())])
            .unwrap();
        wal.cut().unwrap();
        wal.save(&mut [Entry::new(b"2".to_vec()), Entry::new(b"3".to_vec())])
            .unwrap();
        wal.cut().unwrap();
        wal.save(&mut [Entry::new(b"4".to_vec())]).unwrap();
        wal
    }

    #[test]
    fn release_keeps_files() {
        let dir = tempdir().unwrap();
        let wal = wal_with_three_segments(dir.path());
        let before = wal.segment_paths();

        assert_eq!(wal.release_lock_to(2).unwrap(), 1);
        assert_eq!(wal.segment_paths(), before[1..].to_vec());
        assert!(before[0].exists());
    }

    #[test]
    fn remove_deletes_only_covered_sealed_segments() {
        let dir = tempdir().unwrap();
        let wal = wal_with_three_segments(dir.path());
        let before = wal.segment_paths();

        assert_eq!(wal.remove_files(0).unwrap(), 0);
        assert_eq!(wal.remove_files(3).unwrap(), 2);
        assert!(!before[0].exists());
        assert!(!before[1].exists());
        assert!(before[2].exists());

        // The tail is retained even when every entry is covered.
        assert_eq!(wal.remove_files(u64::MAX).unwrap(), 0);
        assert_eq!(wal.segment_paths(), vec![before[2].clone()]);
    }

    #[test]
    fn log_reopens_after_removal() {
        let dir = tempdir().unwrap();
        let wal = wal_with_three_segments(dir.path());
        wal.remove_files(1).unwrap();
        wal.close().unwrap();

        let config = WalConfig::new().use_fallocate(false);
        let wal = Wal::open(dir.path(), &config).unwrap();
        let (meta, entries) = wal.read_all().unwrap();
        assert_eq!(meta, b"m");
        let indices: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert_eq!(wal.next_index(), 5);
    }

    #[test]
    fn next_index_survives_removal_of_every_entry() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new().use_fallocate(false);
        let wal = Wal::create(dir.path(), b"m", &config).unwrap();
        let mut batch: Vec<_> = (0..3u8).map(|i| Entry::new(vec![i])).collect();
        wal.save(&mut batch).unwrap();
        wal.cut().unwrap();

        // The tail holds no entries, so the sealed segment stays.
        assert_eq!(wal.remove_files(2).unwrap(), 0);
        wal.close().unwrap();

        let wal = Wal::open(dir.path(), &config).unwrap();
        wal.read_all().unwrap();
        assert_eq!(wal.next_index(), 3);
        let mut entry = Entry::new(b"next".to_vec());
        wal.save_single(&mut entry).unwrap();
        assert_eq!(entry.index, 3);

        // With an entry in the tail the sealed segment can go.
        assert_eq!(wal.remove_files(2).unwrap(), 1);
        wal.close().unwrap();

        let wal = Wal::open(dir.path(), &config).unwrap();
        let (_, entries) = wal.read_all().unwrap();
        let indices: Vec<_> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![3]);
        assert_eq!(wal.next_index(), 4);
    }

    #[test]
    fn empty_sealed_segment_keeps_next_index() {
        let dir = tempdir().unwrap();
        let config = WalConfig::new().use_fallocate(false);
        let wal = Wal::create(dir.path(), b"m", &config).unwrap();
        let mut batch: Vec<_> = (0..3u8).map(|i| Entry::new(vec![i])).collect();
        wal.save(&mut batch).unwrap();
        wal.cut().unwrap();
        wal.cut().unwrap();

        assert_eq!(wal.remove_files(2).unwrap(), 1);
        wal.close().unwrap();

        let wal = Wal::open(dir.path(), &config).unwrap();
        let (_, entries) = wal.read_all().unwrap();
        assert!(entries.is_empty());
        assert_eq!(wal.next_index(), 3);
        assert_eq!(wal.save(&mut [Entry::new(b"x".to_vec())]).unwrap(), 4);
    }

    #[cfg(unix)]
    #[test]
    fn failed_removal_keeps_later_segments() {
        let dir = tempdir().unwrap();
        let wal = wal_with_three_segments(dir.path());
        let before = wal.segment_paths();

        // A directory in place of the first segment cannot be removed as a file.
        std::fs::remove_file(&before[0]).unwrap();
        std::fs::create_dir(&before[0]).unwrap();

        assert!(wal.remove_files(3).is_err());
        assert_eq!(wal.segment_paths(), before);
        assert!(before[1].exists());
    }

    #[test]
    fn retention_on_closed_wal_fails() {
        let dir = tempdir().unwrap();
        let wal = wal_with_three_segments(dir.path());
        wal.close().unwrap();
        assert!(matches!(wal.remove_files(10), Err(WalError::Closed)));
        assert!(matches!(wal.release_lock_to(10), Err(WalError::Closed)));
    }
}
