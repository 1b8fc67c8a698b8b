//! Map Index Tests
//!
//! String-keyed storage: strict insert and update, upsert, batch deletes
//! with partial failure, and listing order.

use std::sync::Arc;
use std::time::Duration;

use pagekv::storage::{FsDriver, MemoryDriver, MemoryObjectClient, ObjectDriver};
use pagekv::{LockSettings, MapIndex, MapSelector, PageKvError, QueryResult, StorageDriver};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const DEFAULT_MAP_PAGE_SIZE: u64 = 1 << 54;

fn open_on(driver: Arc<dyn StorageDriver>, page_size: u64) -> MapIndex {
    driver.create_map_index("users").unwrap();
    MapIndex::new("users", driver, page_size).unwrap()
}

fn setup_memory() -> MapIndex {
    open_on(Arc::new(MemoryDriver::default()), DEFAULT_MAP_PAGE_SIZE)
}

fn setup_fs() -> (MapIndex, TempDir) {
    let dir = TempDir::new().unwrap();
    let driver = FsDriver::open(
        dir.path(),
        ".page",
        ".lock",
        LockSettings::new(Duration::from_millis(50)),
    )
    .unwrap();
    (open_on(Arc::new(driver), DEFAULT_MAP_PAGE_SIZE), dir)
}

fn setup_object() -> MapIndex {
    let driver = ObjectDriver::new(
        MemoryObjectClient::new(),
        None,
        ".page",
        ".lock",
        LockSettings::new(Duration::from_millis(200)),
    );
    open_on(Arc::new(driver), DEFAULT_MAP_PAGE_SIZE)
}

fn listed(result: QueryResult) -> Vec<String> {
    result.values().into_iter().map(str::to_string).collect()
}

fn check_upsert_scenario(index: &MapIndex) {
    index.insert(MapSelector::single("user1"), "alice@example.com").unwrap();
    index.upsert(MapSelector::single("user1"), "alice@new.example.com").unwrap();

    assert_eq!(index.count().unwrap(), 1);
    assert_eq!(
        index.query(MapSelector::single("user1")).unwrap(),
        QueryResult::single("alice@new.example.com")
    );
}

fn check_batch_delete(index: &MapIndex) {
    for name in ["a", "b", "c", "e"] {
        index.insert(MapSelector::single(name), name).unwrap();
    }

    let result = index
        .delete(MapSelector::array(["a", "b", "c", "d", "e"]))
        .unwrap();
    assert_eq!(result.len(), 5);
    assert_eq!(result.failed_positions(), vec![3]);
    assert_eq!(result.values(), vec!["a", "b", "c", "e"]);
    assert_eq!(index.count().unwrap(), 0);
}

// =============================================================================
// Insert / Update / Upsert
// =============================================================================

#[test]
fn test_upsert_overwrites_memory() {
    check_upsert_scenario(&setup_memory());
}

#[test]
fn test_upsert_overwrites_fs() {
    let (index, _dir) = setup_fs();
    check_upsert_scenario(&index);
}

#[test]
fn test_upsert_overwrites_object() {
    check_upsert_scenario(&setup_object());
}

#[test]
fn test_insert_is_strict() {
    let index = setup_memory();
    let result = index.insert(MapSelector::single("k"), "v1").unwrap();
    assert_eq!(result, QueryResult::single("v1"));

    assert!(matches!(
        index.insert(MapSelector::single("k"), "v2"),
        Err(PageKvError::KeyAlreadyExists(_))
    ));
    assert_eq!(index.query(MapSelector::single("k")).unwrap(), QueryResult::single("v1"));
}

#[test]
fn test_batch_insert_skips_existing_keys() {
    let index = setup_memory();
    index.insert(MapSelector::single("b"), "old").unwrap();

    let result = index.insert(MapSelector::array(["a", "b", "c"]), "new").unwrap();
    assert_eq!(result.failed_positions(), vec![1]);
    assert_eq!(
        listed(index.query(MapSelector::array(["a", "b", "c"])).unwrap()),
        vec!["new", "old", "new"]
    );
}

#[test]
fn test_update_requires_existing_key() {
    let index = setup_memory();
    assert!(matches!(
        index.update(MapSelector::single("ghost"), "x"),
        Err(PageKvError::NotExist(_))
    ));
    assert_eq!(index.count().unwrap(), 0);

    index.insert(MapSelector::single("real"), "1").unwrap();
    assert_eq!(
        index.update(MapSelector::single("real"), "2").unwrap(),
        QueryResult::single("2")
    );
}

// =============================================================================
// Query / Delete
// =============================================================================

#[test]
fn test_missing_key_query() {
    let index = setup_memory();
    assert!(matches!(
        index.query(MapSelector::single("nobody")),
        Err(PageKvError::NotExist(_))
    ));
}

#[test]
fn test_batch_delete_memory() {
    check_batch_delete(&setup_memory());
}

#[test]
fn test_batch_delete_fs() {
    let (index, _dir) = setup_fs();
    check_batch_delete(&index);
}

#[test]
fn test_batch_delete_object() {
    check_batch_delete(&setup_object());
}

#[test]
fn test_invalid_key_single_and_batch() {
    let index = setup_memory();
    assert!(matches!(
        index.upsert(MapSelector::single("a,b"), "x"),
        Err(PageKvError::InvalidKey(_))
    ));

    let result = index
        .upsert(MapSelector::array(["ok", "bad]", "fine"]), "x")
        .unwrap();
    assert_eq!(result.failed_positions(), vec![1]);
    assert_eq!(index.count().unwrap(), 2);
}

#[test]
fn test_numeric_keys_and_ranges_address_the_same_records() {
    let index = setup_memory();
    for key in ["10", "11", "12"] {
        index.insert(MapSelector::single(key), &format!("n{}", key)).unwrap();
    }
    let result = index.query(MapSelector::range(10, 12).unwrap()).unwrap();
    assert_eq!(listed(result), vec!["n10", "n11", "n12"]);
}

#[test]
fn test_signed_number_is_a_distinct_key() {
    let index = setup_memory();
    index.insert(MapSelector::single("5"), "five").unwrap();
    index.insert(MapSelector::single("+5"), "plus five").unwrap();

    assert_eq!(index.count().unwrap(), 2);
    assert_eq!(index.query(MapSelector::single("5")).unwrap(), QueryResult::single("five"));
    assert_eq!(
        index.query(MapSelector::single("+5")).unwrap(),
        QueryResult::single("plus five")
    );
}

#[test]
fn test_empty_selection_is_an_empty_collection() {
    let index = setup_memory();
    index.insert(MapSelector::single("k"), "v").unwrap();
    let none: Vec<String> = Vec::new();

    let queried = index.query(MapSelector::array(none.clone())).unwrap();
    assert_eq!(queried, QueryResult::Collection(Vec::new()));
    let deleted = index.delete(MapSelector::array(none)).unwrap();
    assert_eq!(deleted, QueryResult::Collection(Vec::new()));
    assert_eq!(index.count().unwrap(), 1);
}

#[test]
fn test_values_with_delimiters_survive_object_store() {
    let index = setup_object();
    let value = "line one\nkey:value\\tail\r";
    index.upsert(MapSelector::single("doc"), value).unwrap();
    assert_eq!(index.query(MapSelector::single("doc")).unwrap(), QueryResult::single(value));
}

// =============================================================================
// Listing
// =============================================================================

#[test]
fn test_list_orders_by_page_then_insertion() {
    let index = open_on(Arc::new(MemoryDriver::default()), 10);
    for key in ["15", "3", "12", "7"] {
        index.insert(MapSelector::single(key), key).unwrap();
    }

    // Page 0 holds 3 and 7; page 1 holds 15 and 12
    assert_eq!(listed(index.list(0, 0, false).unwrap()), vec!["3", "7", "15", "12"]);
    assert_eq!(listed(index.list(0, 0, true).unwrap()), vec!["12", "15", "7", "3"]);
    assert_eq!(listed(index.list(2, 1, false).unwrap()), vec!["7", "15"]);
}

#[test]
fn test_count_after_mixed_operations() {
    let (index, _dir) = setup_fs();
    for i in 0..20 {
        index.upsert(MapSelector::single(format!("user{}", i)), "x").unwrap();
    }
    index
        .delete(MapSelector::array(["user0", "user5", "user19"]))
        .unwrap();
    assert_eq!(index.count().unwrap(), 17);
    assert_eq!(index.list(0, 0, false).unwrap().len(), 17);
}
