use tempfile::tempdir;

use crate::engine::{Engine, EngineConfig};

#[test]
fn reopen_is_deterministic_across_many_keys() {
    let dir = tempdir().unwrap();
    let config = EngineConfig {
        memtable_size_limit: 4096,
        l0_capacity: 3,
        ..EngineConfig::default()
    };

    {
        let mut engine = Engine::open(dir.path(), config).unwrap();
        for i in 0..1000u32 {
            let key = format!("key{i:06}").into_bytes();
            let value = format!("value{i:06}").into_bytes();
            engine.insert(key, value).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(dir.path(), config).unwrap();
    for i in 0..1000u32 {
        let key = format!("key{i:06}").into_bytes();
        let expected = format!("value{i:06}").into_bytes();
        assert_eq!(engine.get(&key).unwrap(), Some(expected), "mismatch at key {i}");
    }
}

#[test]
fn reopen_with_no_prior_data_is_empty() {
    let dir = tempdir().unwrap();
    {
        let _engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    }

    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.get(b"anything").unwrap(), None);
}

#[test]
fn empty_directory_scan_recovers_cleanly() {
    let dir = tempdir().unwrap();
    std::fs::create_dir_all(dir.path()).unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default());
    assert!(engine.is_ok());
}
