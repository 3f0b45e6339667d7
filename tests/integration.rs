use stratakv::engine::{Engine, EngineConfig};

fn key(i: u32) -> Vec<u8> {
    format!("key{i:06}").into_bytes()
}

fn value(i: u32) -> Vec<u8> {
    format!("value{i:06}").into_bytes()
}

#[test]
fn basic_set_and_get() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"1".to_vec()));
}

#[test]
fn overwrite_shadows_older_value() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
    engine.insert(b"a".to_vec(), b"2".to_vec()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn tombstone_shadows_older_value() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
    engine.delete(b"a".to_vec()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), None);
}

#[test]
fn survives_flush_with_small_memtable() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        memtable_size_limit: 256,
        ..EngineConfig::default()
    };
    let mut engine = Engine::open(dir.path(), config).unwrap();

    for i in 0..300u32 {
        engine.insert(key(i), value(i)).unwrap();
    }
    engine.close().unwrap();

    let engine = Engine::open(dir.path(), config).unwrap();
    for i in 0..300u32 {
        assert_eq!(engine.get(&key(i)).unwrap(), Some(value(i)));
    }
}

#[test]
fn survives_compaction_with_overwrite_hierarchy() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        memtable_size_limit: 128,
        l0_capacity: 2,
        ..EngineConfig::default()
    };
    let mut engine = Engine::open(dir.path(), config).unwrap();

    for generation in 0..4u32 {
        for i in 0..50u32 {
            engine
                .insert(key(i), format!("gen{generation}-{i:06}").into_bytes())
                .unwrap();
        }
    }
    engine.close().unwrap();

    let engine = Engine::open(dir.path(), config).unwrap();
    for i in 0..50u32 {
        let expected = format!("gen3-{i:06}").into_bytes();
        assert_eq!(engine.get(&key(i)).unwrap(), Some(expected));
    }
}

#[test]
fn reopen_is_deterministic_for_one_thousand_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        memtable_size_limit: 2048,
        l0_capacity: 4,
        ..EngineConfig::default()
    };

    {
        let mut engine = Engine::open(dir.path(), config).unwrap();
        for i in 0..1000u32 {
            engine.insert(key(i), value(i)).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(dir.path(), config).unwrap();
    for i in 0..1000u32 {
        assert_eq!(engine.get(&key(i)).unwrap(), Some(value(i)), "key{i:06} mismatch");
    }
}

#[test]
fn empty_store_returns_not_found_for_everything() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();
    assert_eq!(engine.get(b"anything").unwrap(), None);
}

#[test]
fn reinsert_after_delete_is_visible_again() {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"a".to_vec(), b"1".to_vec()).unwrap();
    engine.delete(b"a".to_vec()).unwrap();
    engine.insert(b"a".to_vec(), b"2".to_vec()).unwrap();
    assert_eq!(engine.get(b"a").unwrap(), Some(b"2".to_vec()));
}

#[test]
fn concurrent_writers_do_not_corrupt_state() {
    use std::sync::Arc;
    use std::thread;

    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        memtable_size_limit: 512,
        l0_capacity: 3,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::open(dir.path(), config).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let engine = engine.clone();
            thread::spawn(move || {
                for i in 0..100u32 {
                    let k = format!("t{t}-k{i:05}").into_bytes();
                    engine.insert(k, b"v".to_vec()).unwrap();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for t in 0..4u32 {
        for i in 0..100u32 {
            let k = format!("t{t}-k{i:05}").into_bytes();
            assert_eq!(engine.get(&k).unwrap(), Some(b"v".to_vec()));
        }
    }
}
