use crate::memtable::{Memtable, MemtableLookup};

#[test]
fn insert_then_get_roundtrips() {
    let mut mt = Memtable::new(4096);
    mt.insert(b"hello".to_vec(), b"world".to_vec());
    assert_eq!(mt.get(b"hello"), MemtableLookup::Value(b"world".to_vec()));
}

#[test]
fn overwrite_replaces_prior_entry() {
    let mut mt = Memtable::new(4096);
    mt.insert(b"k".to_vec(), b"a".to_vec());
    mt.insert(b"k".to_vec(), b"b".to_vec());
    assert_eq!(mt.get(b"k"), MemtableLookup::Value(b"b".to_vec()));
    assert_eq!(mt.len(), 1);
}

#[test]
fn tombstone_hides_value() {
    let mut mt = Memtable::new(4096);
    mt.insert(b"k".to_vec(), b"v".to_vec());
    mt.insert_tombstone(b"k".to_vec());
    assert_eq!(mt.get(b"k"), MemtableLookup::Tombstone);
}

#[test]
fn missing_key_is_not_found() {
    let mt = Memtable::new(4096);
    assert_eq!(mt.get(b"missing"), MemtableLookup::NotFound);
}

#[test]
fn iter_yields_ascending_keys() {
    let mut mt = Memtable::new(4096);
    mt.insert(b"banana".to_vec(), b"2".to_vec());
    mt.insert(b"apple".to_vec(), b"1".to_vec());
    mt.insert(b"cherry".to_vec(), b"3".to_vec());

    let keys: Vec<&[u8]> = mt.iter().map(|(k, _, _)| k).collect();
    assert_eq!(keys, vec![b"apple".as_slice(), b"banana", b"cherry"]);
}

#[test]
fn has_room_respects_size_limit() {
    let mut mt = Memtable::new(10);
    assert!(mt.has_room(b"abc", b"def"));
    mt.insert(b"abc".to_vec(), b"def".to_vec());
    assert!(!mt.has_room(b"abc", b"defgh"));
}
