//! Storage Driver Tests
//!
//! The same contract checks run against every backend: memory, filesystem
//! and the object driver over an in-process bucket.

use std::sync::Arc;
use std::time::Duration;

use pagekv::lock::LockCoordinator;
use pagekv::page::{MapPage, Page, PageData};
use pagekv::storage::{FsDriver, MemoryDriver, MemoryObjectClient, ObjectClient, ObjectDriver};
use pagekv::{IndexKind, LockSettings, PageKvError, StorageDriver};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn lock_settings() -> LockSettings {
    LockSettings::new(Duration::from_millis(200))
}

fn setup_fs() -> (FsDriver, TempDir) {
    let dir = TempDir::new().unwrap();
    let driver = FsDriver::open(dir.path(), ".page", ".lock", lock_settings()).unwrap();
    (driver, dir)
}

fn setup_object() -> ObjectDriver<Arc<MemoryObjectClient>> {
    ObjectDriver::new(
        Arc::new(MemoryObjectClient::new()),
        Some("tenant-a".to_string()),
        ".page",
        ".lock",
        lock_settings(),
    )
}

fn sample_auto_page() -> PageData {
    let mut page = Page::new();
    page.append("first");
    page.append("multi\nline: value");
    page.append("third");
    page.delete(2).unwrap();
    page.into_data()
}

fn sample_map_page() -> PageData {
    let mut page = MapPage::new();
    page.add(77, "seventy-seven").unwrap();
    page.add(3, "back\\slash").unwrap();
    page.into_data()
}

fn check_page_round_trip(driver: &dyn StorageDriver) {
    driver.create_auto_index("events").unwrap();
    driver.create_map_index("users").unwrap();

    let auto = sample_auto_page();
    driver.write_page(&auto, 0, "events").unwrap();
    let read = driver.read_page(0, "events", 16).unwrap();
    assert_eq!(read.values, auto.values);
    assert_eq!(read.ordered_keys, vec![1, 3]);
    assert_eq!(read.min_key, 4);

    let map = sample_map_page();
    driver.write_map_page(&map, 5, "users").unwrap();
    let read = driver.read_map_page(5, "users", 16).unwrap();
    assert_eq!(read.values, map.values);
    assert_eq!(read.ordered_keys, vec![77, 3]);
}

fn check_list_pages(driver: &dyn StorageDriver) {
    driver.create_auto_index("log").unwrap();
    assert!(driver.list_pages("log", false).unwrap().is_empty());

    let page = sample_auto_page();
    for page_id in [2, 10, 0, 1] {
        driver.write_page(&page, page_id, "log").unwrap();
    }
    assert_eq!(driver.list_pages("log", false).unwrap(), vec![0, 1, 2, 10]);
    assert_eq!(driver.list_pages("log", true).unwrap(), vec![10, 2, 1, 0]);
}

fn check_namespace_lifecycle(driver: &dyn StorageDriver) {
    driver.create_auto_index("orders").unwrap();
    assert_eq!(driver.index_kind("orders").unwrap(), IndexKind::Auto);

    // Names are shared by both flavors
    assert!(matches!(
        driver.create_map_index("orders"),
        Err(PageKvError::KeyAlreadyExists(_))
    ));
    assert!(matches!(
        driver.drop_map_index("orders"),
        Err(PageKvError::NotExist(_))
    ));

    driver.write_page(&sample_auto_page(), 0, "orders").unwrap();
    driver.drop_auto_index("orders").unwrap();

    assert!(matches!(driver.index_kind("orders"), Err(PageKvError::NotExist(_))));
    assert!(matches!(
        driver.read_page(0, "orders", 16),
        Err(PageKvError::NotExist(_))
    ));
    assert!(matches!(
        driver.write_page(&sample_auto_page(), 0, "orders"),
        Err(PageKvError::NotExist(_))
    ));
    assert!(matches!(driver.list_pages("orders", false), Err(PageKvError::NotExist(_))));
}

fn check_missing_page(driver: &dyn StorageDriver) {
    driver.create_map_index("sparse").unwrap();
    assert!(matches!(
        driver.read_map_page(9, "sparse", 16),
        Err(PageKvError::NotExist(_))
    ));
}

fn check_invalid_names(driver: &dyn StorageDriver) {
    for name in ["", ".hidden", "a/b", "a\\b"] {
        assert!(driver.create_auto_index(name).is_err(), "accepted {:?}", name);
    }
}

fn check_lock_markers(driver: &dyn StorageDriver) {
    driver.create_auto_index("locked").unwrap();
    assert!(!driver.index_is_locked("locked").unwrap().locked);

    let expiry = driver.lock_index("locked").unwrap().expect("uncontended lock");
    let status = driver.index_is_locked("locked").unwrap();
    assert!(status.locked);
    assert_eq!(status.expires_at_ms, expiry);

    // Lock markers are not pages
    assert!(driver.list_pages("locked", false).unwrap().is_empty());

    driver.release_lock("locked", expiry).unwrap();
    assert!(!driver.index_is_locked("locked").unwrap().locked);

    driver.lock_index("locked").unwrap();
    driver.unlock_index("locked").unwrap();
    assert!(!driver.index_is_locked("locked").unwrap().locked);
}

// =============================================================================
// Memory Driver
// =============================================================================

#[test]
fn test_memory_page_round_trip() {
    check_page_round_trip(&MemoryDriver::default());
}

#[test]
fn test_memory_list_pages() {
    check_list_pages(&MemoryDriver::default());
}

#[test]
fn test_memory_namespace_lifecycle() {
    check_namespace_lifecycle(&MemoryDriver::default());
}

#[test]
fn test_memory_missing_page() {
    check_missing_page(&MemoryDriver::default());
}

#[test]
fn test_memory_invalid_names() {
    check_invalid_names(&MemoryDriver::default());
}

#[test]
fn test_memory_locking_is_a_no_op() {
    let driver = MemoryDriver::default();
    driver.create_auto_index("idx").unwrap();
    assert!(driver.lock_index("idx").unwrap().is_some());
    assert!(driver.lock_index("idx").unwrap().is_some());
    assert!(!driver.index_is_locked("idx").unwrap().locked);
}

// =============================================================================
// Filesystem Driver
// =============================================================================

#[test]
fn test_fs_page_round_trip() {
    let (driver, _dir) = setup_fs();
    check_page_round_trip(&driver);
}

#[test]
fn test_fs_list_pages() {
    let (driver, _dir) = setup_fs();
    check_list_pages(&driver);
}

#[test]
fn test_fs_namespace_lifecycle() {
    let (driver, _dir) = setup_fs();
    check_namespace_lifecycle(&driver);
}

#[test]
fn test_fs_missing_page() {
    let (driver, _dir) = setup_fs();
    check_missing_page(&driver);
}

#[test]
fn test_fs_invalid_names() {
    let (driver, _dir) = setup_fs();
    check_invalid_names(&driver);
}

#[test]
fn test_fs_lock_markers() {
    let (driver, _dir) = setup_fs();
    check_lock_markers(&driver);
}

#[test]
fn test_fs_pages_are_files() {
    let (driver, dir) = setup_fs();
    driver.create_auto_index("events").unwrap();
    driver.write_page(&sample_auto_page(), 3, "events").unwrap();
    assert!(dir.path().join("events").join("3.page").is_file());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("events").join(".kind")).unwrap(),
        "auto"
    );
}

#[test]
fn test_fs_non_numeric_page_name_is_skipped() {
    let (driver, dir) = setup_fs();
    driver.create_auto_index("events").unwrap();
    driver.write_page(&sample_auto_page(), 1, "events").unwrap();
    std::fs::write(dir.path().join("events").join("junk.page"), b"x").unwrap();
    std::fs::write(dir.path().join("events").join("notes.txt"), b"x").unwrap();

    assert_eq!(driver.list_pages("events", false).unwrap(), vec![1]);
}

#[test]
fn test_fs_corrupt_page_is_reported() {
    let (driver, dir) = setup_fs();
    driver.create_auto_index("events").unwrap();
    driver.write_page(&sample_auto_page(), 0, "events").unwrap();

    let path = dir.path().join("events").join("0.page");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0x55;
    std::fs::write(&path, bytes).unwrap();

    assert!(matches!(
        driver.read_page(0, "events", 16),
        Err(PageKvError::CorruptData(_))
    ));
}

#[test]
fn test_fs_failed_write_leaves_no_temporary_file() {
    let (driver, dir) = setup_fs();
    driver.create_auto_index("events").unwrap();

    // A directory in the page's place makes the final rename fail
    let index_dir = dir.path().join("events");
    std::fs::create_dir(index_dir.join("0.page")).unwrap();
    std::fs::write(index_dir.join("0.page").join("occupant"), b"x").unwrap();

    assert!(driver.write_page(&sample_auto_page(), 0, "events").is_err());

    let leftovers: Vec<String> = std::fs::read_dir(&index_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
}

#[test]
fn test_fs_pages_survive_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let driver = FsDriver::open(dir.path(), ".page", ".lock", lock_settings()).unwrap();
        driver.create_map_index("users").unwrap();
        driver.write_map_page(&sample_map_page(), 0, "users").unwrap();
    }
    let driver = FsDriver::open(dir.path(), ".page", ".lock", lock_settings()).unwrap();
    assert_eq!(driver.index_kind("users").unwrap(), IndexKind::Map);
    assert_eq!(
        driver.read_map_page(0, "users", 16).unwrap().values,
        sample_map_page().values
    );
}

#[test]
fn test_fs_contended_lock_backs_off() {
    let (driver, _dir) = setup_fs();
    driver.create_auto_index("idx").unwrap();

    let held = driver.lock_index("idx").unwrap().unwrap();
    // Another caller placing a marker while one is live must back off
    std::thread::sleep(Duration::from_millis(2));
    assert_eq!(driver.lock_index("idx").unwrap(), None);
    assert_eq!(driver.index_is_locked("idx").unwrap().expires_at_ms, held);
}

// =============================================================================
// Object Driver
// =============================================================================

#[test]
fn test_object_page_round_trip() {
    check_page_round_trip(&setup_object());
}

#[test]
fn test_object_list_pages() {
    check_list_pages(&setup_object());
}

#[test]
fn test_object_namespace_lifecycle() {
    check_namespace_lifecycle(&setup_object());
}

#[test]
fn test_object_missing_page() {
    check_missing_page(&setup_object());
}

#[test]
fn test_object_invalid_names() {
    check_invalid_names(&setup_object());
}

#[test]
fn test_object_lock_markers() {
    check_lock_markers(&setup_object());
}

#[test]
fn test_object_keys_use_prefix() {
    let client = Arc::new(MemoryObjectClient::new());
    let driver = ObjectDriver::new(
        Arc::clone(&client),
        Some("/tenant-a/".to_string()),
        ".page",
        ".lock",
        lock_settings(),
    );
    driver.create_auto_index("events").unwrap();
    driver.write_page(&sample_auto_page(), 4, "events").unwrap();

    let keys = client.list("tenant-a/events/").unwrap();
    assert!(keys.contains(&"tenant-a/events/4.page".to_string()));

    driver.drop_auto_index("events").unwrap();
    assert_eq!(client.object_count(), 0);
}

// =============================================================================
// Lock Coordinator
// =============================================================================

#[test]
fn test_lock_wait_is_bounded() {
    let dir = TempDir::new().unwrap();
    let settings = LockSettings {
        duration: Duration::from_millis(500),
        poll_interval: Duration::from_millis(5),
        max_wait: Duration::from_millis(50),
    };
    let driver = FsDriver::open(dir.path(), ".page", ".lock", settings).unwrap();
    driver.create_auto_index("busy").unwrap();
    let driver: Arc<dyn StorageDriver> = Arc::new(driver);
    let coordinator = LockCoordinator::new(settings);

    let held = coordinator.acquire(&driver, "busy").unwrap();
    let result = coordinator.acquire(&driver, "busy");
    assert!(matches!(result, Err(PageKvError::LockTimeout { .. })));

    held.release().unwrap();
    let again = coordinator.acquire(&driver, "busy").unwrap();
    drop(again);
    assert!(!driver.index_is_locked("busy").unwrap().locked);
}

#[test]
fn test_expired_lock_is_ignored() {
    let settings = LockSettings::new(Duration::from_millis(20));
    let dir = TempDir::new().unwrap();
    let driver = FsDriver::open(dir.path(), ".page", ".lock", settings).unwrap();
    driver.create_auto_index("stale").unwrap();

    // A holder that never releases
    driver.lock_index("stale").unwrap().unwrap();
    std::thread::sleep(Duration::from_millis(40));

    assert!(!driver.index_is_locked("stale").unwrap().locked);
    assert!(driver.lock_index("stale").unwrap().is_some());
}
