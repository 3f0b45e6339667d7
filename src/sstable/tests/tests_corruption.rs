use std::fs;

use tempfile::tempdir;

use crate::codec::OpKind;
use crate::sstable::{SSTable, SSTableError, SstWriter};

#[test]
fn truncated_file_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.sst");
    SstWriter::new(&path)
        .build([(b"k".as_slice(), OpKind::Set, b"v".as_slice())].into_iter(), 1)
        .unwrap();

    let bytes = fs::read(&path).unwrap();
    let truncated = &bytes[..bytes.len() / 2];
    fs::write(&path, truncated).unwrap();

    let result = SSTable::open(&path);
    assert!(matches!(result, Err(SSTableError::Corruption(_))));
}

#[test]
fn file_smaller_than_footer_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.sst");
    fs::write(&path, [0u8; 4]).unwrap();

    let result = SSTable::open(&path);
    assert!(matches!(result, Err(SSTableError::Corruption(_))));
}

#[test]
fn footer_lengths_exceeding_file_size_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("000000.sst");

    // A 16-byte footer claiming absurd index/filter lengths, no data at all.
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&u64::MAX.to_le_bytes());
    bytes.extend_from_slice(&u64::MAX.to_le_bytes());
    fs::write(&path, &bytes).unwrap();

    let result = SSTable::open(&path);
    assert!(matches!(result, Err(SSTableError::Corruption(_))));
}
