use tempfile::tempdir;

use crate::codec::OpKind;
use crate::sstable::{GetResult, SstWriter};

use super::*;

fn write_sst(dir: &Path, level: usize, seq: u64, entries: &[(&[u8], OpKind, &[u8])]) -> PathBuf {
    let path = dir.join(sst_filename(level, seq));
    SstWriter::new(&path)
        .build(entries.iter().map(|&(k, op, v)| (k, op, v)), entries.len())
        .unwrap();
    path
}

#[test]
fn parses_and_formats_filenames_round_trip() {
    assert_eq!(sst_filename(0, 7), "0_000007.sst");
    assert_eq!(parse_sst_filename("0_000007.sst"), Some((0, 7)));
    assert_eq!(parse_sst_filename("garbage"), None);
    assert_eq!(parse_sst_filename("3_abc.sst"), None);
}

#[test]
fn recovers_levels_from_directory_scan() {
    let dir = tempdir().unwrap();
    write_sst(dir.path(), 0, 0, &[(b"a", OpKind::Set, b"1")]);
    write_sst(dir.path(), 0, 1, &[(b"b", OpKind::Set, b"2")]);
    write_sst(dir.path(), 1, 0, &[(b"c", OpKind::Set, b"3")]);

    let mgr = LevelManager::open(dir.path(), LevelConfig::default()).unwrap();
    assert_eq!(mgr.snapshot(0).len(), 2);
    assert_eq!(mgr.snapshot(1).len(), 1);
    assert_eq!(mgr.allocate_seq(), 2);
}

#[test]
fn get_prefers_newest_l0_file() {
    let dir = tempdir().unwrap();
    write_sst(dir.path(), 0, 0, &[(b"k", OpKind::Set, b"old")]);
    write_sst(dir.path(), 0, 1, &[(b"k", OpKind::Set, b"new")]);

    let mgr = LevelManager::open(dir.path(), LevelConfig::default()).unwrap();
    assert_eq!(mgr.get(b"k").unwrap(), GetResult::Value(b"new".to_vec()));
}

#[test]
fn get_falls_through_to_lower_levels() {
    let dir = tempdir().unwrap();
    write_sst(dir.path(), 1, 0, &[(b"k", OpKind::Set, b"deep")]);

    let mgr = LevelManager::open(dir.path(), LevelConfig::default()).unwrap();
    assert_eq!(mgr.get(b"k").unwrap(), GetResult::Value(b"deep".to_vec()));
    assert_eq!(mgr.get(b"missing").unwrap(), GetResult::NotFound);
}

#[test]
fn l0_triggers_at_capacity() {
    let dir = tempdir().unwrap();
    let config = LevelConfig {
        l0_capacity: 2,
        ..LevelConfig::default()
    };
    write_sst(dir.path(), 0, 0, &[(b"a", OpKind::Set, b"1")]);
    write_sst(dir.path(), 0, 1, &[(b"b", OpKind::Set, b"2")]);

    let mgr = LevelManager::open(dir.path(), config).unwrap();
    let job = mgr.select_compaction().expect("should trigger");
    assert_eq!(job.source_level, 0);
    assert_eq!(job.target_level, 1);
    assert_eq!(job.victims.len(), 2);
}

#[test]
fn second_trigger_is_suppressed_while_compacting() {
    let dir = tempdir().unwrap();
    let config = LevelConfig {
        l0_capacity: 1,
        ..LevelConfig::default()
    };
    write_sst(dir.path(), 0, 0, &[(b"a", OpKind::Set, b"1")]);

    let mgr = LevelManager::open(dir.path(), config).unwrap();
    assert!(mgr.select_compaction().is_some());
    assert!(mgr.select_compaction().is_none());
}

#[test]
fn apply_compaction_swaps_inputs_for_outputs_and_unlinks() {
    let dir = tempdir().unwrap();
    let config = LevelConfig {
        l0_capacity: 1,
        ..LevelConfig::default()
    };
    let old_path = write_sst(dir.path(), 0, 0, &[(b"a", OpKind::Set, b"1")]);

    let mgr = LevelManager::open(dir.path(), config).unwrap();
    let job = mgr.select_compaction().unwrap();

    let out_seq = mgr.allocate_seq();
    let out_path = mgr.path_for(1, out_seq);
    SstWriter::new(&out_path)
        .build([(b"a".as_slice(), OpKind::Set, b"1".as_slice())].into_iter(), 1)
        .unwrap();

    mgr.apply_compaction(&job, vec![(out_path.clone(), out_seq)])
        .unwrap();

    assert_eq!(mgr.snapshot(0).len(), 0);
    assert_eq!(mgr.snapshot(1).len(), 1);

    drop(job);
    assert!(!old_path.exists(), "old L0 file should be unlinked after refs drop");
    assert!(out_path.exists());
}
