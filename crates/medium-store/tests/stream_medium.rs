//! Store behavior on forward-only stream media.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use medium_store::{Medium, MediumStore, StoreConfig, StoreError, StreamOwnership};
use pretty_assertions::assert_eq;
use std::io::{Cursor, Read};

fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn open_stream(data: Vec<u8>, ownership: StreamOwnership, config: StoreConfig) -> (Medium, MediumStore) {
    let medium = Medium::stream("stream", Cursor::new(data), ownership);
    let mut store = MediumStore::new(medium.clone(), config).unwrap();
    store.open().unwrap();
    (medium, store)
}

fn small_cache() -> StoreConfig {
    StoreConfig::new()
        .with_max_cache_size(64)
        .with_max_cache_region_size(16)
        .with_max_read_write_block_size(8)
}

#[test]
fn sequential_reads_are_served() {
    let data = content(100);
    let (_, mut store) = open_stream(data.clone(), StreamOwnership::Store, small_cache());

    let first = store.create_offset(0).unwrap();
    let second = store.create_offset(30).unwrap();

    assert_eq!(store.get_data(first, 30).unwrap().as_ref(), &data[..30]);
    assert_eq!(store.get_data(second, 30).unwrap().as_ref(), &data[30..60]);
}

#[test]
fn cached_ranges_can_be_read_again() {
    let data = content(40);
    let (_, mut store) = open_stream(data.clone(), StreamOwnership::Store, small_cache());

    let start = store.create_offset(0).unwrap();
    store.cache(start, 40).unwrap();
    let reads = store.stats().accessor_reads;

    assert_eq!(store.get_data(start, 40).unwrap().as_ref(), &data[..]);
    assert_eq!(store.stats().accessor_reads, reads);
}

#[test]
fn reading_ahead_caches_the_skipped_range() {
    let data = content(60);
    let (_, mut store) = open_stream(data.clone(), StreamOwnership::Store, small_cache());

    let ahead = store.create_offset(40).unwrap();
    store.cache(ahead, 10).unwrap();

    let start = store.create_offset(0).unwrap();
    assert_eq!(store.cached_byte_count_at(start).unwrap(), 50);
    assert_eq!(store.get_data(start, 40).unwrap().as_ref(), &data[..40]);
}

#[test]
fn uncached_range_behind_the_stream_position_fails() {
    let data = content(60);
    let config = small_cache().with_caching(false);
    let (_, mut store) = open_stream(data, StreamOwnership::Store, config);

    let start = store.create_offset(0).unwrap();
    store.get_data(start, 20).unwrap();

    let error = store.get_data(start, 20).unwrap_err();
    assert!(matches!(
        error,
        StoreError::InvalidMediumOffset { offset: 0, .. }
    ));
}

#[test]
fn end_of_stream_is_detected() {
    let data = content(10);
    let (_, mut store) = open_stream(data, StreamOwnership::Store, small_cache());
    let start = store.create_offset(0).unwrap();

    assert!(!store.is_at_end_of_medium(start).unwrap());
    store.get_data(start, 10).unwrap();
    // The offset is irrelevant for streams
    assert!(store.is_at_end_of_medium(start).unwrap());
}

#[test]
fn edits_are_rejected() {
    let (_, mut store) = open_stream(content(10), StreamOwnership::Store, small_cache());
    let start = store.create_offset(0).unwrap();

    assert!(matches!(
        store.insert_data(start, vec![1u8, 2, 3]),
        Err(StoreError::ReadOnlyMedium(_))
    ));
    assert!(matches!(store.flush(), Err(StoreError::ReadOnlyMedium(_))));
}

#[test]
fn caller_owned_stream_survives_close() {
    let data = content(30);
    let (medium, mut store) = open_stream(data.clone(), StreamOwnership::Caller, small_cache());

    let start = store.create_offset(0).unwrap();
    store.get_data(start, 10).unwrap();
    store.close().unwrap();

    let mut rest = Vec::new();
    medium
        .reclaim_stream()
        .expect("caller owned stream is handed back")
        .read_to_end(&mut rest)
        .unwrap();
    assert_eq!(rest, &data[10..]);
}

#[test]
fn end_check_does_not_consume_caller_owned_bytes() {
    let data = content(20);
    let (medium, mut store) = open_stream(data.clone(), StreamOwnership::Caller, small_cache());

    let start = store.create_offset(0).unwrap();
    store.get_data(start, 5).unwrap();
    assert!(!store.is_at_end_of_medium(start).unwrap());
    store.close().unwrap();

    let mut rest = Vec::new();
    medium
        .reclaim_stream()
        .expect("caller owned stream is handed back")
        .read_to_end(&mut rest)
        .unwrap();
    assert_eq!(rest, &data[5..]);
}

#[test]
fn store_owned_stream_cannot_be_reopened() {
    let (_, mut store) = open_stream(content(10), StreamOwnership::Store, small_cache());
    store.close().unwrap();

    assert!(matches!(
        store.open(),
        Err(StoreError::StreamUnavailable(_))
    ));
}
