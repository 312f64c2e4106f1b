//! Integration tests for the page cache driven through heap pages.
//!
//! These tests exercise eviction order, the no-steal rule and the
//! flush-when-full valve with real slotted pages and heap stores.

use std::sync::Arc;

use approxdb::config::StorageConfig;
use approxdb::datum::{FieldType, Tuple, TupleDescriptor, Value};
use approxdb::heap::{HeapError, HeapFile, HeapStore, SlottedPage};
use approxdb::storage::cache::{BackingStore, CacheError};
use approxdb::storage::{MemoryStorage, PageCache};

/// Two int64 fields: three tuples fit a page.
const SMALL_PAGE: usize = 8 + 3 * 16;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn desc() -> Arc<TupleDescriptor> {
    Arc::new(TupleDescriptor::new(vec![
        FieldType::int64("a"),
        FieldType::int64("b"),
    ]))
}

fn row(desc: &Arc<TupleDescriptor>, a: i64) -> Tuple {
    Tuple::new(Arc::clone(desc), vec![Value::Int64(a), Value::Int64(a * 10)]).unwrap()
}

fn store_with_pages(desc: &Arc<TupleDescriptor>, pages: usize) -> Arc<HeapStore> {
    let store = Arc::new(HeapStore::new(
        Box::new(MemoryStorage::new(SMALL_PAGE)),
        Arc::clone(desc),
        None,
    ));
    for _ in 0..pages {
        store.allocate_page().unwrap();
    }
    store
}

#[test]
fn test_capacity_never_exceeded() {
    init_logger();
    let desc = desc();
    let store = store_with_pages(&desc, 8);
    let cache: PageCache<SlottedPage> = PageCache::new(3);

    for page_no in [0, 1, 2, 3, 4, 0, 5, 6, 7, 1] {
        cache.get_page(&store, page_no).unwrap();
        assert!(cache.len() <= cache.capacity());
    }
    assert_eq!(cache.len(), 3);
}

#[test]
fn test_clean_page_evicted_dirty_page_kept() {
    init_logger();
    let desc = desc();
    let store = store_with_pages(&desc, 3);
    let cache: PageCache<SlottedPage> = PageCache::new(2);

    // A is clean, B is dirty.
    cache.get_page(&store, 0).unwrap();
    let b = cache.get_page(&store, 1).unwrap();
    b.lock().insert(row(&desc, 1)).unwrap();

    cache.get_page(&store, 2).unwrap();

    assert!(!cache.contains(store.page_key(0)));
    assert!(cache.contains(store.page_key(1)));
    assert_eq!(cache.is_dirty(store.page_key(1)), Some(true));
    // Nothing was stolen: storage still has the empty image of B.
    assert_eq!(store.read_page(1).unwrap().num_used_slots(), 0);
}

#[test]
fn test_all_dirty_rejects_admission() {
    init_logger();
    let desc = desc();
    let store = store_with_pages(&desc, 3);
    let cache: PageCache<SlottedPage> = PageCache::new(2);

    for page_no in 0..2 {
        let page = cache.get_page(&store, page_no).unwrap();
        page.lock().insert(row(&desc, page_no as i64)).unwrap();
    }

    assert!(matches!(
        cache.get_page(&store, 2),
        Err(CacheError::BufferPoolFull { resident: 2 })
    ));
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_heap_growth_needs_flush_valve() {
    init_logger();
    let desc = desc();
    let config = StorageConfig {
        page_size: SMALL_PAGE,
        cache_capacity: 1,
        ..StorageConfig::default()
    };
    let cache = Arc::new(PageCache::from_config(&config));
    let mut heap = HeapFile::create(
        MemoryStorage::new(SMALL_PAGE),
        Arc::clone(&desc),
        Arc::clone(&cache),
        &config,
    )
    .unwrap();

    for a in 0..3 {
        heap.insert(row(&desc, a)).unwrap();
    }
    assert!(matches!(
        heap.insert(row(&desc, 3)),
        Err(HeapError::Cache(CacheError::BufferPoolFull { .. }))
    ));

    {
        let _valve = cache.allow_flush_when_full();
        for a in 3..9 {
            heap.insert(row(&desc, a)).unwrap();
        }
    }
    assert!(!cache.flush_when_full());

    let _valve = cache.allow_flush_when_full();
    let mut seen: Vec<i64> = heap
        .iter()
        .map(|t| match t.unwrap().value(0) {
            Some(Value::Int64(a)) => *a,
            other => panic!("unexpected value {:?}", other),
        })
        .collect();
    seen.sort();
    assert_eq!(seen, (0..9).collect::<Vec<_>>());
    // The rejected fourth insert still grew the file; its page was reused.
    assert_eq!(heap.num_pages(), 3);
}
