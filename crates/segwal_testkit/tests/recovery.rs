//! Recovery tests across the whole WAL: rotation, reopen, torn tails and
//! corruption.

use proptest::prelude::*;
use segwal_core::{Entry, Wal, WalError};
use segwal_testkit::prelude::*;
use std::thread;

#[test]
fn save_and_reopen_scenario() {
    let mut wal = TestWal::new(b"somedata");
    let mut first = entries_from(&["Entry1", "Entry2"]);
    let mut second = entries_from(&["Entry1", "Entry2"]);
    assert_eq!(wal.save(&mut first).unwrap(), 2);
    assert_eq!(wal.save(&mut second).unwrap(), 4);

    let (meta, entries) = wal.reopen();
    assert_eq!(meta, b"somedata");
    assert_eq!(entry_indices(&entries), vec![0, 1, 2, 3]);
    assert_eq!(
        entry_data(&entries),
        vec![
            b"Entry1".to_vec(),
            b"Entry2".to_vec(),
            b"Entry1".to_vec(),
            b"Entry2".to_vec(),
        ]
    );
}

#[test]
fn save_with_cut_scenario() {
    let mut wal = TestWal::new(b"somedata");
    wal.save(&mut entries_from(&["Entry1", "Entry2"])).unwrap();
    wal.cut().unwrap();
    wal.save(&mut entries_from(&["Entry3", "Entry4"])).unwrap();
    wal.close();

    let sealed = sealed_segments(wal.path()).unwrap();
    assert_eq!(sealed.len(), 1);
    assert_eq!(
        sealed[0].file_name().unwrap(),
        "0000000000000000-0000000000000002.wal"
    );

    let (meta, entries) = wal.reopen();
    assert_eq!(meta, b"somedata");
    assert_eq!(entry_indices(&entries), vec![0, 1, 2, 3]);
    assert_eq!(
        entry_data(&entries),
        vec![
            b"Entry1".to_vec(),
            b"Entry2".to_vec(),
            b"Entry3".to_vec(),
            b"Entry4".to_vec(),
        ]
    );
}

#[test]
fn close_is_idempotent() {
    let wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["a"])).unwrap();
    wal.wal.close().unwrap();
    wal.wal.close().unwrap();
    wal.wal.close().unwrap();
}

#[test]
fn rotation_preserves_order() {
    let mut wal = TestWal::with_config(b"rotating", small_segment_config());
    let mut expected = Vec::new();
    for i in 0..200u64 {
        let data = payload(i, 100 + (i as usize % 50));
        expected.push(data.clone());
        wal.save(&mut [Entry::new(data)]).unwrap();
    }
    wal.close();
    assert!(sealed_segments(wal.path()).unwrap().len() > 3);

    let (meta, entries) = wal.reopen();
    assert_eq!(meta, b"rotating");
    assert_eq!(entry_indices(&entries), (0..200).collect::<Vec<_>>());
    assert_eq!(entry_data(&entries), expected);
}

#[test]
fn sealed_names_track_next_index() {
    let wal = TestWal::with_config(b"m", small_segment_config());
    for i in 0..100u64 {
        wal.save(&mut [Entry::new(payload(i, 200))]).unwrap();
    }
    wal.close();

    let mut prev = None;
    for (seq, path) in sealed_segments(wal.path()).unwrap().iter().enumerate() {
        let name = path.file_name().unwrap().to_str().unwrap();
        let parsed = segwal_core::SegmentName::parse(name).unwrap();
        assert_eq!(parsed.seq, seq as u64);
        if let Some(prev) = prev {
            assert!(parsed.next_index > prev);
        }
        prev = Some(parsed.next_index);
    }
}

#[test]
fn torn_tail_is_tolerated() {
    let mut wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["a", "b", "c"])).unwrap();
    wal.close();

    let tail = tail_segment(wal.path()).unwrap().unwrap();
    let span = zero_last_frame_body(&tail).unwrap();

    let (_, entries) = wal.reopen();
    assert_eq!(entry_data(&entries), vec![b"a".to_vec(), b"b".to_vec()]);
    assert!(wal.recovered_torn_tail());
    assert_eq!(wal.next_index(), 2);

    // The torn frame is gone and appends continue in its place.
    let data = std::fs::read(&tail).unwrap();
    assert!(data[span.offset as usize..span.end() as usize]
        .iter()
        .all(|&b| b == 0));
    assert_eq!(wal.save(&mut entries_from(&["c2"])).unwrap(), 3);

    let (_, entries) = wal.reopen();
    assert_eq!(
        entry_data(&entries),
        vec![b"a".to_vec(), b"b".to_vec(), b"c2".to_vec()]
    );
    assert_eq!(entry_indices(&entries), vec![0, 1, 2]);
    assert!(!wal.recovered_torn_tail());
}

#[test]
fn truncated_tail_is_tolerated() {
    let mut wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["a", "b"])).unwrap();
    wal.cut().unwrap();
    wal.save(&mut entries_from(&["c", "d"])).unwrap();
    wal.close();

    let tail = tail_segment(wal.path()).unwrap().unwrap();
    truncate_last_frame(&tail).unwrap();

    let (_, entries) = wal.reopen();
    assert_eq!(entry_indices(&entries), vec![0, 1, 2]);
    assert!(wal.recovered_torn_tail());
}

#[test]
fn corruption_in_sealed_segment_is_rejected() {
    let mut wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["sealed-entry", "other"])).unwrap();
    wal.cut().unwrap();
    wal.save(&mut entries_from(&["tail-entry"])).unwrap();
    wal.close();

    let sealed = sealed_segments(wal.path()).unwrap();
    assert!(corrupt_needle(&sealed[0], b"sealed-entry").unwrap());

    let err = wal.try_reopen().unwrap_err();
    assert!(matches!(err, WalError::ChecksumMismatch { .. }));
    assert!(err.is_corruption());
}

#[test]
fn corruption_in_tail_is_rejected() {
    let mut wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["first", "second"])).unwrap();
    wal.close();

    let tail = tail_segment(wal.path()).unwrap().unwrap();
    assert!(corrupt_needle(&tail, b"first").unwrap());

    let err = wal.try_reopen().unwrap_err();
    assert!(matches!(err, WalError::ChecksumMismatch { .. }));
}

#[test]
fn reordered_segments_are_rejected() {
    let wal = TestWal::new(b"m");
    wal.save(&mut entries_from(&["a"])).unwrap();
    wal.cut().unwrap();
    wal.save(&mut entries_from(&["b"])).unwrap();
    wal.cut().unwrap();
    wal.close();

    // Swap the sealed segments' contents.
    let sealed = sealed_segments(wal.path()).unwrap();
    let first = std::fs::read(&sealed[0]).unwrap();
    let second = std::fs::read(&sealed[1]).unwrap();
    std::fs::write(&sealed[0], second).unwrap();
    std::fs::write(&sealed[1], first).unwrap();

    let reopened = Wal::open(wal.path(), &wal.config).unwrap();
    assert!(matches!(
        reopened.read_all(),
        Err(WalError::ChecksumMismatch { .. })
    ));
}

#[test]
fn metadata_must_match() {
    let wal = TestWal::new(b"original");
    wal.save(&mut entries_from(&["a"])).unwrap();
    wal.close();

    let conflicting = Wal::create(wal.path(), b"different", &wal.config).unwrap();
    assert!(matches!(
        conflicting.read_all(),
        Err(WalError::MetadataConflict)
    ));
    conflicting.close().unwrap();

    let same = Wal::create(wal.path(), b"original", &wal.config).unwrap();
    let (meta, entries) = same.read_all().unwrap();
    assert_eq!(meta, b"original");
    assert_eq!(entries.len(), 1);
}

#[test]
fn header_only_log_reopens_empty() {
    let mut wal = TestWal::new(b"empty");
    let (meta, entries) = wal.reopen();
    assert_eq!(meta, b"empty");
    assert!(entries.is_empty());
    assert_eq!(wal.next_index(), 0);
}

#[test]
fn read_only_open_leaves_files_untouched() {
    let wal = TestWal::with_config(b"m", small_segment_config());
    for i in 0..40u64 {
        wal.save(&mut [Entry::new(payload(i, 300))]).unwrap();
    }
    wal.close();

    let tail = tail_segment(wal.path()).unwrap().unwrap();
    zero_last_frame_body(&tail).unwrap();
    let before = snapshot_dir(wal.path()).unwrap();

    let reader = Wal::open_for_read(wal.path(), &wal.config).unwrap();
    let (_, entries) = reader.read_all().unwrap();
    assert_eq!(entries.len(), 39);
    assert!(reader.recovered_torn_tail());
    assert!(matches!(reader.remove_files(100), Err(WalError::ReadOnly)));
    reader.close().unwrap();

    assert_eq!(snapshot_dir(wal.path()).unwrap(), before);
}

#[test]
fn retention_then_reopen() {
    let mut wal = TestWal::with_config(b"m", small_segment_config());
    for i in 0..60u64 {
        wal.save(&mut [Entry::new(payload(i, 250))]).unwrap();
    }
    let sealed_before = wal.segment_paths().len() - 1;
    assert!(sealed_before >= 2);

    let removed = wal.remove_files(20).unwrap();
    assert!(removed >= 1);
    assert!(wal.tail_path().unwrap().exists());

    let (_, entries) = wal.reopen();
    let first = entries.first().unwrap().index;
    assert!(first <= 21);
    assert_eq!(entries.last().unwrap().index, 59);
    assert_eq!(
        entry_indices(&entries),
        (first..60).collect::<Vec<_>>()
    );
}

#[test]
fn indices_continue_after_retention_to_last_entry() {
    let mut wal = TestWal::with_config(b"m", small_segment_config());
    // 15 frames of 280 bytes fill a segment, so rotation leaves an empty tail.
    for i in 0..30u64 {
        wal.save(&mut [Entry::new(payload(i, 250))]).unwrap();
    }
    let last = wal.next_index() - 1;
    wal.remove_files(last).unwrap();
    assert!(!sealed_segments(wal.path()).unwrap().is_empty());

    let (_, entries) = wal.reopen();
    assert_eq!(wal.next_index(), 30);
    assert_eq!(entries.last().map(|e| e.index), Some(29));

    let mut next = Entry::new(b"after".to_vec());
    wal.save_single(&mut next).unwrap();
    assert_eq!(next.index, 30);

    wal.remove_files(next.index).unwrap();
    let (_, entries) = wal.reopen();
    assert_eq!(entry_indices(&entries), vec![30]);
    assert_eq!(wal.next_index(), 31);
}

#[test]
fn concurrent_writers_get_unique_indices() {
    let mut test_wal = TestWal::with_config(b"m", small_segment_config());
    thread::scope(|scope| {
        for t in 0..4u64 {
            let wal = &test_wal.wal;
            scope.spawn(move || {
                for i in 0..25u64 {
                    wal.save_single(&mut Entry::new(payload(t * 100 + i, 64)))
                        .unwrap();
                }
            });
        }
    });
    assert_eq!(test_wal.next_index(), 100);

    let (_, entries) = test_wal.reopen();
    assert_eq!(entry_indices(&entries), (0..100).collect::<Vec<_>>());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn round_trip(metadata in metadata_strategy(), batches in batches_strategy()) {
        let mut wal = TestWal::with_config(&metadata, small_segment_config());
        let mut expected = Vec::new();
        for batch in &batches {
            let mut entries: Vec<Entry> = batch.iter().cloned().map(Entry::new).collect();
            wal.save(&mut entries).unwrap();
            expected.extend(batch.iter().cloned());
        }

        let (meta, entries) = wal.reopen();
        prop_assert_eq!(meta, metadata);
        prop_assert_eq!(entry_data(&entries), expected);
        let indices = entry_indices(&entries);
        prop_assert_eq!(indices, (0..entries.len() as u64).collect::<Vec<_>>());
    }
}
