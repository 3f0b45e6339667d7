use tempfile::tempdir;

use crate::engine::{Engine, EngineConfig};

#[test]
fn set_then_get_roundtrips() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"hello".to_vec(), b"world".to_vec()).unwrap();
    assert_eq!(engine.get(b"hello").unwrap(), Some(b"world".to_vec()));
}

#[test]
fn get_missing_key_is_none() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    assert_eq!(engine.get(b"nope").unwrap(), None);
}

#[test]
fn overwrite_returns_latest_value() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"k".to_vec(), b"v1".to_vec()).unwrap();
    engine.insert(b"k".to_vec(), b"v2".to_vec()).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), Some(b"v2".to_vec()));
}

#[test]
fn delete_hides_value() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    engine.insert(b"k".to_vec(), b"v".to_vec()).unwrap();
    engine.delete(b"k".to_vec()).unwrap();
    assert_eq!(engine.get(b"k").unwrap(), None);
}

#[test]
fn delete_of_absent_key_is_not_an_error() {
    let dir = tempdir().unwrap();
    let engine = Engine::open(dir.path(), EngineConfig::default()).unwrap();

    assert!(engine.delete(b"never-existed".to_vec()).is_ok());
    assert_eq!(engine.get(b"never-existed").unwrap(), None);
}
