//! Integration tests for heap files over file-backed storage.

use std::sync::Arc;

use approxdb::config::StorageConfig;
use approxdb::datum::{FieldType, Tuple, TupleDescriptor, Value};
use approxdb::heap::{HeapFile, TupleSource};
use approxdb::storage::PageCache;
use approxdb::storage::cache::{BackingStore, TransactionId};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn desc() -> Arc<TupleDescriptor> {
    Arc::new(TupleDescriptor::new(vec![
        FieldType::int64("id"),
        FieldType::float64("price"),
        FieldType::text("name", 8),
    ]))
}

fn row(desc: &Arc<TupleDescriptor>, id: i64) -> Tuple {
    Tuple::new(
        Arc::clone(desc),
        vec![
            Value::Int64(id),
            Value::Float64(id as f64 / 4.0),
            Value::Text(format!("item{}", id)),
        ],
    )
    .unwrap()
}

fn ids(tuples: impl Iterator<Item = Tuple>) -> Vec<i64> {
    let mut ids: Vec<i64> = tuples
        .map(|t| match t.value(0) {
            Some(Value::Int64(id)) => *id,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    ids.sort();
    ids
}

#[test]
fn test_rows_survive_reopen() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("items.dat");
    let desc = desc();
    let config = StorageConfig {
        page_size: 256,
        ..StorageConfig::default()
    };

    let expected: Vec<Tuple> = (0..40).map(|id| row(&desc, id)).collect();
    {
        let cache = Arc::new(PageCache::from_config(&config));
        let mut heap = HeapFile::open(&path, Arc::clone(&desc), cache, &config).unwrap();
        for tuple in &expected {
            heap.insert(tuple.clone()).unwrap();
        }
        heap.flush().unwrap();
        assert!(heap.num_pages() > 1);
    }

    let cache = Arc::new(PageCache::from_config(&config));
    let heap = HeapFile::open(&path, Arc::clone(&desc), cache, &config).unwrap();
    assert_eq!(heap.backing_path(), Some(path.as_path()));

    let mut found: Vec<Tuple> = heap.iter().map(|t| t.unwrap()).collect();
    found.sort_by_key(|t| t.rid());
    assert_eq!(found.len(), expected.len());
    for (found, expected) in found.iter().zip(&expected) {
        assert_eq!(found.values(), expected.values());
    }
}

#[test]
fn test_delete_then_reuse_slot() {
    init_logger();
    let desc = desc();
    let config = StorageConfig::default();
    let cache = Arc::new(PageCache::new(4));
    let mut heap = HeapFile::create(
        approxdb::storage::MemoryStorage::new(config.page_size),
        Arc::clone(&desc),
        cache,
        &config,
    )
    .unwrap();

    for id in 0..5 {
        heap.insert(row(&desc, id)).unwrap();
    }
    let victim = heap.iter().map(|t| t.unwrap()).nth(2).unwrap();
    let freed = victim.rid().unwrap();
    heap.delete(&victim).unwrap();
    assert_eq!(ids(heap.iter().map(|t| t.unwrap())), vec![0, 1, 3, 4]);

    let rid = heap.insert(row(&desc, 9)).unwrap();
    assert_eq!(rid, freed);
    assert_eq!(ids(heap.iter().map(|t| t.unwrap())), vec![0, 1, 3, 4, 9]);
}

#[test]
fn test_commit_persists_and_abort_discards() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let desc = desc();
    let config = StorageConfig::default();
    let cache = Arc::new(PageCache::new(4));
    let mut heap = HeapFile::open(
        dir.path().join("tx.dat"),
        Arc::clone(&desc),
        Arc::clone(&cache),
        &config,
    )
    .unwrap();

    let t1 = TransactionId::new();
    cache.begin_transaction(t1).unwrap();
    for id in 0..3 {
        TupleSource::insert(&mut heap, row(&desc, id), t1).unwrap();
    }
    heap.commit_transaction(t1).unwrap();
    // Committed rows are in storage, not just in the cache.
    assert_eq!(heap.store().read_page(0).unwrap().num_used_slots(), 3);

    let t2 = TransactionId::new();
    cache.begin_transaction(t2).unwrap();
    TupleSource::insert(&mut heap, row(&desc, 100), t2).unwrap();
    let first = TupleSource::iter(&heap, t2).next().unwrap().unwrap();
    TupleSource::delete(&mut heap, &first, t2).unwrap();
    heap.abort_transaction(t2).unwrap();

    let t3 = TransactionId::new();
    assert_eq!(ids(TupleSource::iter(&heap, t3).map(|t| t.unwrap())), vec![0, 1, 2]);
}
